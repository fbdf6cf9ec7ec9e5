//! Marker panel selection.

use crate::error::{ConfigurationError, Result};
use crate::expression::ExpressionTable;
use crate::markers::MarkerEntry;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Panel-level subset of the decomposition configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelOptions {
    /// Cell types resolving fewer genes than this are excluded.
    pub min_gene: usize,
    /// Panels are truncated to at most this many genes.
    pub max_gene: usize,
    /// Order candidates by descending weight instead of input order.
    pub weighted: bool,
    /// Drop genes claimed by more than one cell type.
    pub unique_markers: bool,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            min_gene: 5,
            max_gene: 200,
            weighted: false,
            unique_markers: true,
        }
    }
}

impl PanelOptions {
    /// # Errors
    /// `ConfigurationError::InvalidBounds` if `min_gene` is zero or exceeds `max_gene`.
    pub fn validate(&self) -> Result<()> {
        if self.min_gene == 0 || self.min_gene > self.max_gene {
            return Err(ConfigurationError::InvalidBounds {
                min_gene: self.min_gene,
                max_gene: self.max_gene,
            }
            .into());
        }
        Ok(())
    }
}

/// The ordered genes used for one cell type.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPanel {
    pub cell_type: String,
    pub genes: Vec<String>,
    /// Number of eligible candidates before truncation to `max_gene`.
    pub n_candidates: usize,
}

impl MarkerPanel {
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// A cell type dropped because too few of its markers survived filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCellType {
    pub cell_type: String,
    /// Eligible markers found (below `min_gene`).
    pub available: usize,
}

/// Panels that passed the size bounds, plus the soft exclusions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelSelection {
    pub panels: Vec<MarkerPanel>,
    pub excluded: Vec<ExcludedCellType>,
}

/// Builds one [`MarkerPanel`] per cell type from marker entries and the gene
/// set of an expression table.
///
/// Steps, per cell type:
/// 1. keep entries whose gene is a row of the expression table;
/// 2. with `unique_markers`, drop genes annotated to more than one cell type
///    anywhere in the marker table;
/// 3. with `weighted`, stable-sort by descending weight (missing weights
///    last), otherwise keep input order;
/// 4. de-duplicate, keeping the first occurrence;
/// 5. truncate to `max_gene`;
/// 6. exclude the cell type if fewer than `min_gene` genes remain.
#[derive(Debug, Clone)]
pub struct MarkerPanelBuilder {
    options: PanelOptions,
}

impl MarkerPanelBuilder {
    pub fn new(options: PanelOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PanelOptions {
        &self.options
    }

    /// Resolves panels for `cell_types` (in that order), or for every cell
    /// type of `entries` in order of first appearance when `None`.
    pub fn build(
        &self,
        entries: &[MarkerEntry],
        table: &ExpressionTable,
        cell_types: Option<&[String]>,
    ) -> PanelSelection {
        let ordered_cell_types = resolve_cell_type_order(entries, cell_types);
        let shared_genes = if self.options.unique_markers {
            genes_claimed_by_multiple_cell_types(entries)
        } else {
            HashSet::new()
        };
        debug!(
            "Building marker panels for {} cell types from {} entries ({} shared genes removed from consideration).",
            ordered_cell_types.len(),
            entries.len(),
            shared_genes.len()
        );

        let mut selection = PanelSelection::default();
        for cell_type in ordered_cell_types {
            let mut candidates: Vec<&MarkerEntry> = entries
                .iter()
                .filter(|e| e.cell_type == cell_type)
                .filter(|e| table.contains_gene(&e.gene))
                .filter(|e| !shared_genes.contains(e.gene.as_str()))
                .collect();

            if self.options.weighted {
                // sort_by is stable, so equal weights keep input order.
                candidates.sort_by(|a, b| compare_weight_desc(a.weight, b.weight));
            }

            let mut seen = HashSet::with_capacity(candidates.len());
            let genes: Vec<String> = candidates
                .into_iter()
                .filter(|e| seen.insert(e.gene.as_str()))
                .map(|e| e.gene.clone())
                .collect();
            let n_candidates = genes.len();

            if n_candidates < self.options.min_gene {
                trace!(
                    "Cell type '{}' excluded: {} eligible markers < min_gene {}.",
                    cell_type,
                    n_candidates,
                    self.options.min_gene
                );
                selection.excluded.push(ExcludedCellType {
                    cell_type,
                    available: n_candidates,
                });
                continue;
            }

            let mut genes = genes;
            genes.truncate(self.options.max_gene);
            trace!(
                "Cell type '{}': {} of {} eligible markers kept.",
                cell_type,
                genes.len(),
                n_candidates
            );
            selection.panels.push(MarkerPanel {
                cell_type,
                genes,
                n_candidates,
            });
        }
        selection
    }
}

fn resolve_cell_type_order(entries: &[MarkerEntry], cell_types: Option<&[String]>) -> Vec<String> {
    let names: Vec<&String> = match cell_types {
        Some(list) => list.iter().collect(),
        None => entries.iter().map(|e| &e.cell_type).collect(),
    };
    let mut seen = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .filter(|ct| seen.insert(ct.as_str()))
        .cloned()
        .collect()
}

fn genes_claimed_by_multiple_cell_types(entries: &[MarkerEntry]) -> HashSet<&str> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut shared = HashSet::new();
    for entry in entries {
        match owners.get(entry.gene.as_str()) {
            Some(owner) if *owner != entry.cell_type.as_str() => {
                shared.insert(entry.gene.as_str());
            }
            Some(_) => {}
            None => {
                owners.insert(entry.gene.as_str(), entry.cell_type.as_str());
            }
        }
    }
    shared
}

fn compare_weight_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn table_with_genes(genes: &[&str]) -> ExpressionTable {
        ExpressionTable::new(
            Array2::from_elem((genes.len(), 3), 1.0),
            genes.iter().map(|g| g.to_string()).collect(),
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
        )
        .expect("valid table")
    }

    fn options(min_gene: usize, max_gene: usize, weighted: bool, unique_markers: bool) -> PanelOptions {
        PanelOptions {
            min_gene,
            max_gene,
            weighted,
            unique_markers,
        }
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(MarkerPanelBuilder::new(options(5, 4, false, false)).is_err());
        assert!(MarkerPanelBuilder::new(options(0, 4, false, false)).is_err());
        assert!(MarkerPanelBuilder::new(options(4, 4, false, false)).is_ok());
    }

    #[test]
    fn absent_genes_are_dropped_and_input_order_kept() -> Result<()> {
        let table = table_with_genes(&["G1", "G2", "G3"]);
        let entries = vec![
            MarkerEntry::new("T", "G3", None),
            MarkerEntry::new("T", "MISSING", None),
            MarkerEntry::new("T", "G1", None),
        ];
        let selection = MarkerPanelBuilder::new(options(1, 10, false, false))?.build(&entries, &table, None);
        assert_eq!(selection.panels.len(), 1);
        assert_eq!(selection.panels[0].genes, vec!["G3", "G1"]);
        Ok(())
    }

    #[test]
    fn weighted_sorts_descending_with_stable_ties() -> Result<()> {
        let table = table_with_genes(&["A", "B", "C", "D"]);
        let entries = vec![
            MarkerEntry::new("T", "A", Some(1.0)),
            MarkerEntry::new("T", "B", Some(3.0)),
            MarkerEntry::new("T", "C", Some(1.0)),
            MarkerEntry::new("T", "D", None),
        ];
        let selection = MarkerPanelBuilder::new(options(1, 3, true, false))?.build(&entries, &table, None);
        assert_eq!(selection.panels[0].genes, vec!["B", "A", "C"]);
        assert_eq!(selection.panels[0].n_candidates, 4);
        Ok(())
    }

    #[test]
    fn unique_markers_removes_shared_genes_before_truncation() -> Result<()> {
        let table = table_with_genes(&["S", "T1", "T2", "B1", "B2"]);
        let entries = vec![
            MarkerEntry::new("T", "S", None),
            MarkerEntry::new("T", "T1", None),
            MarkerEntry::new("T", "T2", None),
            MarkerEntry::new("B", "S", None),
            MarkerEntry::new("B", "B1", None),
            MarkerEntry::new("B", "B2", None),
        ];
        let selection = MarkerPanelBuilder::new(options(1, 2, false, true))?.build(&entries, &table, None);
        assert_eq!(selection.panels[0].genes, vec!["T1", "T2"]);
        assert_eq!(selection.panels[1].genes, vec!["B1", "B2"]);

        let shared = MarkerPanelBuilder::new(options(1, 2, false, false))?.build(&entries, &table, None);
        assert_eq!(shared.panels[0].genes, vec!["S", "T1"]);
        assert_eq!(shared.panels[1].genes, vec!["S", "B1"]);
        Ok(())
    }

    #[test]
    fn undersized_cell_types_are_excluded_not_padded() -> Result<()> {
        let table = table_with_genes(&["A", "B", "C"]);
        let entries = vec![
            MarkerEntry::new("Big", "A", None),
            MarkerEntry::new("Big", "B", None),
            MarkerEntry::new("Small", "C", None),
        ];
        let selection = MarkerPanelBuilder::new(options(2, 5, false, false))?.build(&entries, &table, None);
        assert_eq!(selection.panels.len(), 1);
        assert_eq!(selection.panels[0].cell_type, "Big");
        assert_eq!(
            selection.excluded,
            vec![ExcludedCellType {
                cell_type: "Small".to_string(),
                available: 1
            }]
        );
        Ok(())
    }

    #[test]
    fn explicit_cell_type_list_controls_order_and_membership() -> Result<()> {
        let table = table_with_genes(&["A", "B", "C"]);
        let entries = vec![
            MarkerEntry::new("X", "A", None),
            MarkerEntry::new("Y", "B", None),
            MarkerEntry::new("Z", "C", None),
        ];
        let wanted = vec!["Z".to_string(), "X".to_string(), "Unknown".to_string()];
        let selection = MarkerPanelBuilder::new(options(1, 5, false, false))?.build(&entries, &table, Some(&wanted));
        let names: Vec<&str> = selection.panels.iter().map(|p| p.cell_type.as_str()).collect();
        assert_eq!(names, vec!["Z", "X"]);
        assert_eq!(selection.excluded[0].cell_type, "Unknown");
        assert_eq!(selection.excluded[0].available, 0);
        Ok(())
    }

    #[test]
    fn duplicate_rows_within_a_cell_type_count_once() -> Result<()> {
        let table = table_with_genes(&["A", "B"]);
        let entries = vec![
            MarkerEntry::new("T", "A", None),
            MarkerEntry::new("T", "A", None),
            MarkerEntry::new("T", "B", None),
        ];
        let selection = MarkerPanelBuilder::new(options(1, 5, false, true))?.build(&entries, &table, None);
        assert_eq!(selection.panels[0].genes, vec!["A", "B"]);
        Ok(())
    }
}
