//! Entry point: marker panels → per-cell-type PCA → orientation → assembly.

use crate::assembler::{CellTypeSignal, ProportionAssembler};
use crate::error::{DecompositionError, Result};
use crate::expression::ExpressionTable;
use crate::markers::{MarkerColumns, MarkerTable};
use crate::orientation::OrientationCorrector;
use crate::panel::{MarkerPanel, MarkerPanelBuilder, PanelOptions};
use crate::result::DecompositionResult;
use crate::subspace::{SubspaceExtractor, DEFAULT_VARIANCE_COMPONENTS};
use log::{debug, info, log, warn, Level};
use rayon::prelude::*;

/// Configuration of a decomposition run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionConfig {
    /// Marker-table column names for cell type (`ct_col`), gene (`gene_col`)
    /// and weight (`w_col`).
    pub columns: MarkerColumns,
    /// Cell types resolving fewer markers than this are excluded.
    pub min_gene: usize,
    /// Upper bound on panel size.
    pub max_gene: usize,
    /// Order markers by descending weight before truncation.
    pub weighted: bool,
    /// Drop genes annotated to more than one cell type.
    pub unique_markers: bool,
    /// Emit progress and diagnostics at `info` level instead of `debug`.
    pub verbose: bool,
    /// Restricts and orders the processed cell types. `None` processes every
    /// cell type of the marker table in order of first appearance.
    pub cell_types: Option<Vec<String>>,
    /// Leading components summed into the variance-explained diagnostic.
    pub variance_components: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        let panel = PanelOptions::default();
        Self {
            columns: MarkerColumns::default(),
            min_gene: panel.min_gene,
            max_gene: panel.max_gene,
            weighted: panel.weighted,
            unique_markers: panel.unique_markers,
            verbose: false,
            cell_types: None,
            variance_components: DEFAULT_VARIANCE_COMPONENTS,
        }
    }
}

impl DecompositionConfig {
    pub fn with_columns(mut self, ct_col: impl Into<String>, gene_col: impl Into<String>, w_col: impl Into<String>) -> Self {
        self.columns = MarkerColumns {
            cell_type: ct_col.into(),
            gene: gene_col.into(),
            weight: w_col.into(),
        };
        self
    }

    pub fn with_gene_bounds(mut self, min_gene: usize, max_gene: usize) -> Self {
        self.min_gene = min_gene;
        self.max_gene = max_gene;
        self
    }

    pub fn with_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    pub fn with_unique_markers(mut self, unique_markers: bool) -> Self {
        self.unique_markers = unique_markers;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_cell_types(mut self, cell_types: Vec<String>) -> Self {
        self.cell_types = Some(cell_types);
        self
    }

    pub fn panel_options(&self) -> PanelOptions {
        PanelOptions {
            min_gene: self.min_gene,
            max_gene: self.max_gene,
            weighted: self.weighted,
            unique_markers: self.unique_markers,
        }
    }

    fn progress_level(&self) -> Level {
        progress_level(self.verbose)
    }
}

/// Log level for progress and diagnostic reports: `info` when verbose,
/// `debug` otherwise.
pub(crate) fn progress_level(verbose: bool) -> Level {
    if verbose {
        Level::Info
    } else {
        Level::Debug
    }
}

/// Estimates a relative abundance score per cell type and sample.
///
/// For each cell type with a valid marker panel, the marker submatrix of
/// `bulk_table` is reduced to its first principal component across samples,
/// and the component is oriented to rise with mean marker expression. The
/// per-cell-type tasks run in parallel and are joined before assembly.
///
/// The returned scores are relative and directional only; see
/// [`DecompositionResult`].
///
/// # Errors
/// - `ConfigurationError` for invalid gene bounds or a missing marker column.
/// - `DecompositionError::NoMarkerGenes` if no cell type keeps a panel.
/// - `DecompositionError` from any cell type whose submatrix is
///   ill-conditioned, or if no sample is shared by all cell types.
pub fn decompose(
    bulk_table: &ExpressionTable,
    markers: &MarkerTable,
    config: &DecompositionConfig,
) -> Result<DecompositionResult> {
    let level = config.progress_level();
    let builder = MarkerPanelBuilder::new(config.panel_options())?;
    let entries = markers.entries(&config.columns, config.weighted)?;

    log!(
        level,
        "Starting marker decomposition: {} genes x {} samples, {} marker entries.",
        bulk_table.n_genes(),
        bulk_table.n_samples(),
        entries.len()
    );
    let overall_start_time = std::time::Instant::now();

    let selection = builder.build(&entries, bulk_table, config.cell_types.as_deref());
    if !selection.excluded.is_empty() {
        log!(
            level,
            "{} cell type(s) excluded for having fewer than {} marker genes: {}",
            selection.excluded.len(),
            config.min_gene,
            selection
                .excluded
                .iter()
                .map(|e| format!("{} ({})", e.cell_type, e.available))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if selection.panels.is_empty() {
        return Err(DecompositionError::NoMarkerGenes.into());
    }
    for panel in &selection.panels {
        log!(
            level,
            "Cell type '{}': using {} of {} eligible marker genes.",
            panel.cell_type,
            panel.len(),
            panel.n_candidates
        );
    }

    let extractor = SubspaceExtractor::new(config.variance_components);
    let task_results: Vec<std::result::Result<CellTypeSignal, DecompositionError>> = selection
        .panels
        .par_iter()
        .map(|panel| process_cell_type(panel, bulk_table, &extractor))
        .collect();

    let mut signals = Vec::with_capacity(task_results.len());
    for task_result in task_results {
        signals.push(task_result?);
    }

    for s in &signals {
        log!(
            level,
            "Cell type '{}': variance explained {:.4}, orientation correlation {:.4}{}.",
            s.cell_type,
            s.variance_explained,
            s.diagnostics.orientation_correlation,
            if s.diagnostics.flipped { " (sign flipped)" } else { "" }
        );
        if s.diagnostics.low_confidence {
            if config.verbose {
                warn!(
                    "Cell type '{}': signal is uncorrelated with mean marker expression; its sign is arbitrary.",
                    s.cell_type
                );
            } else {
                debug!("Cell type '{}' flagged low-confidence orientation.", s.cell_type);
            }
        }
    }

    let result = ProportionAssembler.assemble(signals, selection.excluded)?;
    if config.verbose {
        info!(
            "Finished marker decomposition of {} cell types over {} samples in {:?}. Scores are relative, not fractions.",
            result.n_cell_types(),
            result.n_samples(),
            overall_start_time.elapsed()
        );
    }
    Ok(result)
}

fn process_cell_type(
    panel: &MarkerPanel,
    table: &ExpressionTable,
    extractor: &SubspaceExtractor,
) -> std::result::Result<CellTypeSignal, DecompositionError> {
    let extracted = extractor.extract(panel, table)?;
    let oriented = OrientationCorrector.orient(&extracted.raw_signal, &extracted.submatrix);
    Ok(CellTypeSignal::from_parts(extracted, oriented, panel.n_candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigurationError, DeconError};
    use crate::markers::MarkerEntry;
    use ndarray::Array2;

    fn table() -> ExpressionTable {
        // Genes G0..G5 over 5 samples; G0-G2 rise with sample index, G3-G5 fall.
        let data = Array2::from_shape_fn((6, 5), |(g, s)| {
            let s = s as f64;
            let g_f = g as f64;
            if g < 3 {
                1.0 + (g_f + 1.0) * s + 0.1 * g_f * (s * s)
            } else {
                10.0 - (g_f - 2.0) * s + 0.05 * (s * s)
            }
        });
        ExpressionTable::new(
            data,
            (0..6).map(|g| format!("G{}", g)).collect(),
            (0..5).map(|s| format!("S{}", s)).collect(),
        )
        .expect("valid table")
    }

    fn markers() -> MarkerTable {
        MarkerTable::from_entries(&[
            MarkerEntry::new("Up", "G0", Some(1.0)),
            MarkerEntry::new("Up", "G1", Some(2.0)),
            MarkerEntry::new("Up", "G2", Some(3.0)),
            MarkerEntry::new("Down", "G3", Some(1.0)),
            MarkerEntry::new("Down", "G4", Some(1.0)),
            MarkerEntry::new("Down", "G5", Some(1.0)),
            MarkerEntry::new("Ghost", "NOT_THERE", Some(1.0)),
        ])
    }

    #[test]
    fn invalid_bounds_fail_before_any_work() {
        let config = DecompositionConfig::default().with_gene_bounds(4, 2);
        assert!(matches!(
            decompose(&table(), &markers(), &config),
            Err(DeconError::Configuration(ConfigurationError::InvalidBounds { .. }))
        ));
    }

    #[test]
    fn signals_follow_marker_direction() -> Result<()> {
        let config = DecompositionConfig::default().with_gene_bounds(2, 10);
        let result = decompose(&table(), &markers(), &config)?;
        assert_eq!(result.cell_types, vec!["Up", "Down"]);
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].cell_type, "Ghost");

        let up = result.signal("Up").ok_or(DecompositionError::NoMarkerGenes)?;
        assert!(up[4] > up[0], "Up signal should rise with its markers: {:?}", up);
        let down = result.signal("Down").ok_or(DecompositionError::NoMarkerGenes)?;
        assert!(down[0] > down[4], "Down signal should fall with sample index: {:?}", down);
        Ok(())
    }

    #[test]
    fn weighted_truncation_keeps_heaviest_markers() -> Result<()> {
        let config = DecompositionConfig::default()
            .with_gene_bounds(1, 2)
            .with_weighted(true);
        let result = decompose(&table(), &markers(), &config)?;
        assert_eq!(result.genes_used["Up"], vec!["G2", "G1"]);
        assert_eq!(result.genes_used["Down"], vec!["G3", "G4"]);
        Ok(())
    }

    #[test]
    fn constant_single_gene_panel_is_low_confidence_not_fatal() -> Result<()> {
        let data = ndarray::array![
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [2.0, 2.5, 4.0, 4.5, 6.0],
            [4.0, 4.0, 4.0, 4.0, 4.0],
        ];
        let table = ExpressionTable::new(
            data,
            vec!["A".into(), "B".into(), "C".into()],
            (0..5).map(|s| format!("S{}", s)).collect(),
        )?;
        let markers = MarkerTable::from_entries(&[
            MarkerEntry::new("T", "A", None),
            MarkerEntry::new("T", "B", None),
            MarkerEntry::new("Const", "C", None),
        ]);
        let config = DecompositionConfig::default().with_gene_bounds(1, 5);
        let result = decompose(&table, &markers, &config)?;

        assert_eq!(result.cell_types, vec!["T", "Const"]);
        assert_eq!(result.low_confidence_cell_types(), vec!["Const"]);
        assert_eq!(result.variance_explained["Const"], 1.0);
        let constant = result.signal("Const").ok_or(DecompositionError::NoMarkerGenes)?;
        assert!(constant.iter().all(|v| *v == 0.0));
        let t = result.signal("T").ok_or(DecompositionError::NoMarkerGenes)?;
        assert!(t[4] > t[0]);
        Ok(())
    }

    #[test]
    fn only_absent_genes_is_a_decomposition_error() {
        let markers = MarkerTable::from_entries(&[
            MarkerEntry::new("Ghost", "NOPE1", None),
            MarkerEntry::new("Ghost", "NOPE2", None),
        ]);
        let config = DecompositionConfig::default().with_gene_bounds(1, 5);
        assert!(matches!(
            decompose(&table(), &markers, &config),
            Err(DeconError::Decomposition(DecompositionError::NoMarkerGenes))
        ));
    }

    #[test]
    fn custom_column_names_are_honoured() -> Result<()> {
        let markers = MarkerTable::new(
            vec!["ct".to_string(), "symbol".to_string()],
            vec![
                vec!["Up".to_string(), "G0".to_string()],
                vec!["Up".to_string(), "G1".to_string()],
            ],
        )?;
        let config = DecompositionConfig::default()
            .with_columns("ct", "symbol", "w")
            .with_gene_bounds(2, 2);
        let result = decompose(&table(), &markers, &config)?;
        assert_eq!(result.cell_types, vec!["Up"]);

        let weighted = config.with_weighted(true);
        assert!(matches!(
            decompose(&table(), &markers, &weighted),
            Err(DeconError::Configuration(ConfigurationError::MissingColumn(_)))
        ));
        Ok(())
    }
}
