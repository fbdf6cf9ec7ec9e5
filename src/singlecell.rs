//! Conversion of single-cell count matrices into per-cell expression tables.
//!
//! Single-cell data arrive cells × genes with an identity label per cell.
//! Decomposition works on genes × samples, so the converter transposes the
//! counts, treats every cell as a sample, and derives the subject (donor) of
//! each cell from its identifier.

use crate::error::{ConfigurationError, Result};
use crate::expression::ExpressionTable;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How to read a subject id out of a cell id.
///
/// The subject is the `position`-th (0-based) field of the cell id split on
/// `delimiter`, e.g. `"donor3_AAACCTG"` with `'_'` and position 0 gives
/// `"donor3"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRule {
    pub delimiter: char,
    pub position: usize,
}

impl Default for SubjectRule {
    fn default() -> Self {
        Self {
            delimiter: '_',
            position: 0,
        }
    }
}

impl SubjectRule {
    pub fn subject_of<'a>(&self, cell_id: &'a str) -> Option<&'a str> {
        cell_id
            .split(self.delimiter)
            .nth(self.position)
            .filter(|field| !field.is_empty())
    }
}

/// Metadata row describing one converted sample (cell).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub sample: String,
    pub subject: String,
    pub cell_type: String,
}

/// Cells × genes count matrix with per-cell identity labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleCellCounts {
    counts: Array2<f64>,
    cell_ids: Vec<String>,
    gene_ids: Vec<String>,
    identities: Vec<String>,
}

impl SingleCellCounts {
    /// # Errors
    /// `ConfigurationError::InvalidTable` if the id or label vectors do not
    /// match the shape of `counts`, or cell ids repeat.
    pub fn new(
        counts: Array2<f64>,
        cell_ids: Vec<String>,
        gene_ids: Vec<String>,
        identities: Vec<String>,
    ) -> Result<Self> {
        let (n_cells, n_genes) = counts.dim();
        if cell_ids.len() != n_cells || identities.len() != n_cells {
            return Err(ConfigurationError::InvalidTable(format!(
                "{} cells in counts but {} cell ids and {} identity labels",
                n_cells,
                cell_ids.len(),
                identities.len()
            ))
            .into());
        }
        if gene_ids.len() != n_genes {
            return Err(ConfigurationError::InvalidTable(format!(
                "{} genes in counts but {} gene ids",
                n_genes,
                gene_ids.len()
            ))
            .into());
        }
        let mut seen = HashSet::with_capacity(n_cells);
        if let Some(dup) = cell_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ConfigurationError::InvalidTable(format!("duplicate cell id '{}'", dup)).into());
        }
        Ok(Self {
            counts,
            cell_ids,
            gene_ids,
            identities,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    /// Transposes the counts into a genes × cells [`ExpressionTable`] and
    /// builds one [`SampleMetadata`] row per cell, in cell order.
    ///
    /// # Errors
    /// `ConfigurationError::InvalidTable` if a cell id has no field at
    /// `rule.position`, or if the counts fail table validation.
    pub fn to_expression_table(&self, rule: &SubjectRule) -> Result<(ExpressionTable, Vec<SampleMetadata>)> {
        let metadata = self
            .cell_ids
            .iter()
            .zip(&self.identities)
            .map(|(cell_id, identity)| -> Result<SampleMetadata> {
                let subject = rule.subject_of(cell_id).ok_or_else(|| {
                    ConfigurationError::InvalidTable(format!(
                        "cell id '{}' has no field {} when split on '{}'",
                        cell_id, rule.position, rule.delimiter
                    ))
                })?;
                Ok(SampleMetadata {
                    sample: cell_id.clone(),
                    subject: subject.to_string(),
                    cell_type: identity.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let table = ExpressionTable::new(
            self.counts.t().to_owned(),
            self.gene_ids.clone(),
            self.cell_ids.clone(),
        )?;
        Ok((table, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeconError;
    use ndarray::array;

    fn counts() -> SingleCellCounts {
        SingleCellCounts::new(
            array![[1.0, 0.0], [3.0, 4.0], [0.0, 7.0]],
            vec!["d1_AAC".into(), "d1_GGT".into(), "d2_TTA".into()],
            vec!["CD3E".into(), "MS4A1".into()],
            vec!["T".into(), "T".into(), "B".into()],
        )
        .expect("valid counts")
    }

    #[test]
    fn converts_to_genes_by_cells_with_subjects() -> Result<()> {
        let (table, metadata) = counts().to_expression_table(&SubjectRule::default())?;
        assert_eq!(table.n_genes(), 2);
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.gene_row("MS4A1").map(|r| r.to_vec()), Some(vec![0.0, 4.0, 7.0]));
        assert_eq!(
            metadata[2],
            SampleMetadata {
                sample: "d2_TTA".into(),
                subject: "d2".into(),
                cell_type: "B".into(),
            }
        );
        Ok(())
    }

    #[test]
    fn missing_subject_field_is_an_error() {
        let rule = SubjectRule {
            delimiter: '_',
            position: 2,
        };
        assert!(matches!(
            counts().to_expression_table(&rule),
            Err(DeconError::Configuration(ConfigurationError::InvalidTable(_)))
        ));
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let result = SingleCellCounts::new(
            array![[1.0], [2.0]],
            vec!["a_1".into(), "a_2".into()],
            vec!["G".into()],
            vec!["T".into()],
        );
        assert!(result.is_err());
    }
}
