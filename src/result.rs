//! Decomposition output, diagnostics and persistence.

use crate::error::{DeconError, DecompositionError, Result};
use crate::panel::ExcludedCellType;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Per-cell-type diagnostics beyond variance explained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTypeDiagnostics {
    /// Eligible markers before truncation to `max_gene`.
    pub n_candidates: usize,
    /// Correlation of the raw signal with mean marker expression.
    pub orientation_correlation: f64,
    /// The raw signal was negated during orientation.
    pub flipped: bool,
    /// Orientation could not be determined (zero correlation); the sign is arbitrary.
    pub low_confidence: bool,
}

/// Result of a marker-based decomposition.
///
/// `proportions` holds one row per processed cell type and one column per
/// sample. Values are **relative, proportion-like scores**: centered
/// principal-component scores oriented so that larger means more of the
/// cell type's marker signature. They are not fractions, do not sum to 1 and
/// are not comparable across cell types. The orientation is a heuristic (see
/// [`crate::orientation`]); check `diagnostics` for low-confidence cell types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionResult {
    /// Row labels of `proportions`.
    pub cell_types: Vec<String>,
    /// Column labels of `proportions`.
    pub sample_ids: Vec<String>,
    /// Shape: (cell_types.len(), sample_ids.len())
    pub proportions: Array2<f64>,
    /// Fraction of marker-submatrix variance captured by the leading components, in [0, 1].
    pub variance_explained: BTreeMap<String, f64>,
    /// Marker genes actually used, in panel order.
    pub genes_used: BTreeMap<String, Vec<String>>,
    pub diagnostics: BTreeMap<String, CellTypeDiagnostics>,
    /// Cell types dropped for having fewer than `min_gene` markers.
    pub excluded: Vec<ExcludedCellType>,
}

impl DecompositionResult {
    pub fn n_cell_types(&self) -> usize {
        self.cell_types.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Score row of one cell type.
    pub fn signal(&self, cell_type: &str) -> Option<ArrayView1<'_, f64>> {
        self.cell_types
            .iter()
            .position(|ct| ct == cell_type)
            .map(|row| self.proportions.row(row))
    }

    /// Cell types whose orientation could not be resolved.
    pub fn low_confidence_cell_types(&self) -> Vec<&str> {
        self.cell_types
            .iter()
            .filter(|ct| self.diagnostics.get(*ct).map_or(false, |d| d.low_confidence))
            .map(|ct| ct.as_str())
            .collect()
    }

    /// Writes `proportions` as TSV: a `cell_type` header column followed by
    /// one column per sample.
    pub fn write_proportions_tsv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        write!(writer, "cell_type")?;
        for sample in &self.sample_ids {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;
        for (cell_type, row) in self.cell_types.iter().zip(self.proportions.rows()) {
            write!(writer, "{}", cell_type)?;
            for value in row.iter() {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Saves the result with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| DeconError::Serialization(format!("Failed to serialize decomposition result: {}", e)))?;
        writer.flush()?;
        Ok(())
    }

    /// Loads a result saved with [`DecompositionResult::save`] and checks
    /// that its labels, matrix and maps agree.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let result: DecompositionResult =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| DeconError::Serialization(format!("Failed to deserialize decomposition result: {}", e)))?;
        result.validate()?;
        Ok(result)
    }

    /// Checks the structural invariants tying the fields together.
    pub fn validate(&self) -> std::result::Result<(), DecompositionError> {
        let invalid = |msg: String| Err(DecompositionError::InvalidInput(msg));
        if self.proportions.dim() != (self.cell_types.len(), self.sample_ids.len()) {
            return invalid(format!(
                "proportions shape {:?} does not match {} cell types x {} samples",
                self.proportions.dim(),
                self.cell_types.len(),
                self.sample_ids.len()
            ));
        }
        for cell_type in &self.cell_types {
            match self.variance_explained.get(cell_type) {
                Some(ve) if (0.0..=1.0).contains(ve) => {}
                Some(ve) => return invalid(format!("variance explained {} for '{}' outside [0, 1]", ve, cell_type)),
                None => return invalid(format!("no variance explained for '{}'", cell_type)),
            }
            if !self.genes_used.contains_key(cell_type) {
                return invalid(format!("no gene panel for '{}'", cell_type));
            }
        }
        if self.variance_explained.len() != self.cell_types.len()
            || self.genes_used.len() != self.cell_types.len()
        {
            return invalid("diagnostic maps are keyed by cell types absent from proportions".to_string());
        }
        Ok(())
    }
}
