//! Library-size normalization and gene filters for expression tables.
//!
//! These are optional preprocessing steps applied before [`crate::decompose`].
//! Decomposition itself works on whatever scale the table is given in.

use crate::decompose::progress_level;
use crate::error::{DecompositionError, Result};
use crate::expression::ExpressionTable;
use log::log;
use ndarray::{Axis, Zip};
use rayon::prelude::*;

const CPM_SCALE: f64 = 1e6;

/// Scales every sample (column) so that it sums to one million.
///
/// # Errors
/// `DecompositionError::InvalidInput` if a sample has a zero or negative
/// library size.
pub fn counts_per_million(table: &ExpressionTable) -> Result<ExpressionTable> {
    let library_sizes = table.data().sum_axis(Axis(0));
    if let Some(col) = library_sizes.iter().position(|&size| size <= 0.0) {
        return Err(DecompositionError::InvalidInput(format!(
            "sample '{}' has library size {}; cannot normalize to counts per million",
            table.sample_ids()[col],
            library_sizes[col]
        ))
        .into());
    }

    let mut data = table.data().to_owned();
    Zip::from(data.axis_iter_mut(Axis(1)))
        .and(&library_sizes)
        .par_for_each(|mut column, &size| {
            let factor = CPM_SCALE / size;
            column.mapv_inplace(|v| v * factor);
        });

    ExpressionTable::new(data, table.gene_ids().to_vec(), table.sample_ids().to_vec())
}

/// Drops genes with zero expression in every sample.
///
/// Returns the filtered table and the number of genes removed. The removal
/// count is logged at `info` when `verbose`, else at `debug`.
pub fn filter_zero_expression(table: &ExpressionTable, verbose: bool) -> Result<(ExpressionTable, usize)> {
    let data = table.data();
    let keep: Vec<usize> = (0..table.n_genes())
        .into_par_iter()
        .filter(|&row| data.row(row).iter().any(|&v| v != 0.0))
        .collect();
    retain(table, keep, "zero expression", verbose)
}

/// Drops genes that are constant across samples.
///
/// Returns the filtered table and the number of genes removed.
pub fn filter_zero_variance(table: &ExpressionTable, verbose: bool) -> Result<(ExpressionTable, usize)> {
    let data = table.data();
    let keep: Vec<usize> = (0..table.n_genes())
        .into_par_iter()
        .filter(|&row| {
            let gene = data.row(row);
            let first = gene[0];
            gene.iter().any(|&v| v != first)
        })
        .collect();
    retain(table, keep, "zero variance", verbose)
}

fn retain(table: &ExpressionTable, keep: Vec<usize>, criterion: &str, verbose: bool) -> Result<(ExpressionTable, usize)> {
    if keep.is_empty() {
        return Err(DecompositionError::InvalidInput(format!(
            "all {} genes removed by the {} filter",
            table.n_genes(),
            criterion
        ))
        .into());
    }
    let removed = table.n_genes() - keep.len();
    log!(
        progress_level(verbose),
        "{} filter removed {} of {} genes.",
        criterion,
        removed,
        table.n_genes()
    );
    Ok((table.retain_rows(&keep)?, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeconError;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn table() -> ExpressionTable {
        ExpressionTable::new(
            array![[1.0, 0.0, 5.0], [0.0, 0.0, 0.0], [3.0, 3.0, 3.0], [6.0, 2.0, 2.0]],
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .expect("valid table")
    }

    #[test]
    fn cpm_columns_sum_to_a_million() -> Result<()> {
        let cpm = counts_per_million(&table())?;
        for column in cpm.data().axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.sum(), 1e6, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(cpm.data()[[0, 0]], 1e5, epsilon = 1e-9);
        assert_eq!(cpm.gene_ids(), table().gene_ids());
        Ok(())
    }

    #[test]
    fn cpm_rejects_empty_library() {
        let empty = ExpressionTable::new(
            array![[1.0, 0.0], [2.0, 0.0]],
            vec!["A".into(), "B".into()],
            vec!["s1".into(), "s2".into()],
        )
        .expect("valid table");
        match counts_per_million(&empty) {
            Err(DeconError::Decomposition(DecompositionError::InvalidInput(msg))) => assert!(msg.contains("s2")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn filters_report_removed_counts() -> Result<()> {
        let (expressed, removed) = filter_zero_expression(&table(), false)?;
        assert_eq!(removed, 1);
        assert_eq!(expressed.gene_ids(), &["A", "C", "D"]);

        let (variable, removed) = filter_zero_variance(&table(), true)?;
        assert_eq!(removed, 2);
        assert_eq!(variable.gene_ids(), &["A", "D"]);
        assert_eq!(variable.gene_row("D").map(|r| r.to_vec()), Some(vec![6.0, 2.0, 2.0]));
        Ok(())
    }

    #[test]
    fn filtering_everything_is_an_error() {
        let flat = ExpressionTable::new(
            array![[2.0, 2.0], [0.0, 0.0]],
            vec!["A".into(), "B".into()],
            vec!["s1".into(), "s2".into()],
        )
        .expect("valid table");
        assert!(filter_zero_variance(&flat, false).is_err());
    }
}
