//! Stacking of oriented per-cell-type signals into the result table.

use crate::error::DecompositionError;
use crate::orientation::OrientedSignal;
use crate::panel::ExcludedCellType;
use crate::result::{CellTypeDiagnostics, DecompositionResult};
use crate::subspace::ExtractedSignal;
use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything the assembler needs from one finished cell-type task.
#[derive(Debug, Clone)]
pub struct CellTypeSignal {
    pub cell_type: String,
    pub genes: Vec<String>,
    pub sample_ids: Vec<String>,
    pub signal: Array1<f64>,
    pub variance_explained: f64,
    pub diagnostics: CellTypeDiagnostics,
}

impl CellTypeSignal {
    pub fn from_parts(extracted: ExtractedSignal, oriented: OrientedSignal, n_candidates: usize) -> Self {
        Self {
            cell_type: extracted.cell_type,
            genes: extracted.genes,
            sample_ids: extracted.sample_ids,
            signal: oriented.signal,
            variance_explained: extracted.variance_explained,
            diagnostics: CellTypeDiagnostics {
                n_candidates,
                orientation_correlation: oriented.correlation,
                flipped: oriented.flipped,
                low_confidence: oriented.low_confidence,
            },
        }
    }
}

/// Aligns signals on the samples common to every cell type (intersection,
/// in the sample order of the first signal) and stacks them into a
/// cell-type × sample matrix. No rescaling is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProportionAssembler;

impl ProportionAssembler {
    /// # Errors
    /// `NoMarkerGenes` if `signals` is empty, `EmptySampleIntersection` if
    /// the cell types share no sample, `InvalidInput` if a signal's length
    /// disagrees with its sample ids.
    pub fn assemble(
        &self,
        signals: Vec<CellTypeSignal>,
        excluded: Vec<ExcludedCellType>,
    ) -> Result<DecompositionResult, DecompositionError> {
        let first = signals.first().ok_or(DecompositionError::NoMarkerGenes)?;
        for s in &signals {
            if s.signal.len() != s.sample_ids.len() {
                return Err(DecompositionError::InvalidInput(format!(
                    "signal for '{}' has {} values for {} samples",
                    s.cell_type,
                    s.signal.len(),
                    s.sample_ids.len()
                )));
            }
        }

        let sample_sets: Vec<HashSet<&str>> = signals
            .iter()
            .map(|s| s.sample_ids.iter().map(|id| id.as_str()).collect())
            .collect();
        let common_samples: Vec<String> = first
            .sample_ids
            .iter()
            .filter(|id| sample_sets.iter().all(|set| set.contains(id.as_str())))
            .cloned()
            .collect();
        if common_samples.is_empty() {
            return Err(DecompositionError::EmptySampleIntersection);
        }

        let mut proportions = Array2::<f64>::zeros((signals.len(), common_samples.len()));
        for (row, s) in signals.iter().enumerate() {
            let position: HashMap<&str, usize> = s
                .sample_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            for (col, sample) in common_samples.iter().enumerate() {
                // Present in every set by construction of common_samples.
                if let Some(&i) = position.get(sample.as_str()) {
                    proportions[[row, col]] = s.signal[i];
                }
            }
        }

        let mut cell_types = Vec::with_capacity(signals.len());
        let mut variance_explained = BTreeMap::new();
        let mut genes_used = BTreeMap::new();
        let mut diagnostics = BTreeMap::new();
        for s in signals {
            variance_explained.insert(s.cell_type.clone(), s.variance_explained);
            genes_used.insert(s.cell_type.clone(), s.genes);
            diagnostics.insert(s.cell_type.clone(), s.diagnostics);
            cell_types.push(s.cell_type);
        }

        Ok(DecompositionResult {
            cell_types,
            sample_ids: common_samples,
            proportions,
            variance_explained,
            genes_used,
            diagnostics,
            excluded,
        })
    }
}
