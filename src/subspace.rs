//! Extraction of the dominant shared signal of a marker panel.

use crate::error::DecompositionError;
use crate::expression::ExpressionTable;
use crate::panel::MarkerPanel;
use crate::pca::PCA;
use log::trace;
use ndarray::{Array1, Array2, Axis};

/// Number of leading components whose variance is summed into the
/// variance-explained diagnostic.
pub const DEFAULT_VARIANCE_COMPONENTS: usize = 20;

/// Raw (unoriented) first-component signal of one cell type's panel.
#[derive(Debug, Clone)]
pub struct ExtractedSignal {
    pub cell_type: String,
    /// Panel genes found in the expression table, in panel order.
    pub genes: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Uncentered marker expression, shape (genes.len(), sample_ids.len()).
    pub submatrix: Array2<f64>,
    /// First principal component score per sample.
    pub raw_signal: Array1<f64>,
    /// Fraction of submatrix variance captured by the leading components, in [0, 1].
    pub variance_explained: f64,
}

/// Runs a centered, unscaled PCA over the samples of a panel's submatrix.
///
/// Samples are observations and marker genes are variables. A single-gene
/// panel short-circuits: its signal is the gene's centered expression (all
/// zeros for a constant gene) and its variance explained is 1.
#[derive(Debug, Clone, Copy)]
pub struct SubspaceExtractor {
    n_variance_components: usize,
}

impl Default for SubspaceExtractor {
    fn default() -> Self {
        Self {
            n_variance_components: DEFAULT_VARIANCE_COMPONENTS,
        }
    }
}

impl SubspaceExtractor {
    pub fn new(n_variance_components: usize) -> Self {
        Self {
            n_variance_components: n_variance_components.max(1),
        }
    }

    /// # Errors
    /// - `EmptySubmatrix` if none of the panel genes is in `table`.
    /// - `IllConditioned` if there are fewer than 2 samples, a sample has
    ///   zero expression over every marker gene, a value is non-finite, a
    ///   multi-gene submatrix has no variance, or the PCA yields non-finite
    ///   scores.
    pub fn extract(&self, panel: &MarkerPanel, table: &ExpressionTable) -> Result<ExtractedSignal, DecompositionError> {
        let cell_type = panel.cell_type.clone();
        let genes: Vec<String> = panel
            .genes
            .iter()
            .filter(|g| table.contains_gene(g))
            .cloned()
            .collect();
        let submatrix = table.select_genes(&genes);
        if submatrix.nrows() == 0 {
            return Err(DecompositionError::EmptySubmatrix { cell_type });
        }
        let ill = |reason: String| DecompositionError::IllConditioned {
            cell_type: panel.cell_type.clone(),
            reason,
        };

        let sample_ids = table.sample_ids().to_vec();
        validate_submatrix(&submatrix, &sample_ids).map_err(ill)?;

        let (raw_signal, variance_explained) = if submatrix.nrows() == 1 {
            let row = submatrix.row(0);
            let mean = row.mean().unwrap_or(0.0);
            // A constant gene yields a zero signal; orientation flags it low-confidence.
            (row.mapv(|v| v - mean), 1.0)
        } else {
            let mut pca = PCA::new();
            let scores = pca.fit_transform(submatrix.t().to_owned()).map_err(|e| match e {
                DecompositionError::InvalidInput(reason) => ill(reason),
                other => other,
            })?;
            let variance_explained = pca
                .explained_variance_ratio(self.n_variance_components)
                .ok_or_else(|| ill("marker genes have no variance across samples".to_string()))?;
            (scores.column(0).to_owned(), variance_explained)
        };

        if raw_signal.iter().any(|v| !v.is_finite()) {
            return Err(ill("principal component scores are not finite".to_string()));
        }
        trace!(
            "Cell type '{}': {} genes x {} samples, variance explained {:.4}.",
            cell_type,
            genes.len(),
            sample_ids.len(),
            variance_explained
        );

        Ok(ExtractedSignal {
            cell_type,
            genes,
            sample_ids,
            submatrix,
            raw_signal,
            variance_explained,
        })
    }
}

fn validate_submatrix(submatrix: &Array2<f64>, sample_ids: &[String]) -> Result<(), String> {
    if submatrix.ncols() < 2 {
        return Err(format!("need at least 2 samples, got {}", submatrix.ncols()));
    }
    for (col, column) in submatrix.axis_iter(Axis(1)).enumerate() {
        if column.iter().any(|v| !v.is_finite()) {
            return Err(format!("sample '{}' has non-finite marker expression", sample_ids[col]));
        }
        if column.iter().all(|v| *v == 0.0) {
            return Err(format!(
                "sample '{}' has zero expression across all {} marker genes",
                sample_ids[col],
                submatrix.nrows()
            ));
        }
    }
    Ok(())
}
