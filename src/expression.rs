//! Gene × sample expression table.

use crate::error::{ConfigurationError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Immutable, dense expression matrix.
///
/// Rows are genes, columns are samples. Gene and sample identifiers are
/// unique, every value is finite and both dimensions are non-zero. Values are
/// expected to be normalized and non-negative (CPM or similar); the table
/// itself only enforces finiteness.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    /// Shape: (n_genes, n_samples)
    data: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
    gene_index: HashMap<String, usize>,
}

impl ExpressionTable {
    /// Builds a table from a dense matrix and its row/column identifiers.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidTable` if a dimension is zero, the
    /// identifier counts do not match the matrix shape, an identifier is
    /// duplicated, or any value is NaN or infinite.
    pub fn new(data: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = data.dim();
        if n_genes == 0 || n_samples == 0 {
            return Err(ConfigurationError::InvalidTable(format!(
                "expression table must have at least one gene and one sample (got {} x {})",
                n_genes, n_samples
            ))
            .into());
        }
        if gene_ids.len() != n_genes {
            return Err(ConfigurationError::InvalidTable(format!(
                "{} gene identifiers for {} matrix rows",
                gene_ids.len(),
                n_genes
            ))
            .into());
        }
        if sample_ids.len() != n_samples {
            return Err(ConfigurationError::InvalidTable(format!(
                "{} sample identifiers for {} matrix columns",
                sample_ids.len(),
                n_samples
            ))
            .into());
        }

        let mut gene_index = HashMap::with_capacity(n_genes);
        for (row, gene) in gene_ids.iter().enumerate() {
            if gene_index.insert(gene.clone(), row).is_some() {
                return Err(
                    ConfigurationError::InvalidTable(format!("duplicate gene identifier '{}'", gene)).into(),
                );
            }
        }
        let mut seen_samples = HashSet::with_capacity(n_samples);
        for sample in &sample_ids {
            if !seen_samples.insert(sample.as_str()) {
                return Err(ConfigurationError::InvalidTable(format!(
                    "duplicate sample identifier '{}'",
                    sample
                ))
                .into());
            }
        }

        if let Some(((row, col), value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigurationError::InvalidTable(format!(
                "non-finite value {} for gene '{}' in sample '{}'",
                value, gene_ids[row], sample_ids[col]
            ))
            .into());
        }

        Ok(Self {
            data,
            gene_ids,
            sample_ids,
            gene_index,
        })
    }

    /// Loads a table from a tab-separated file.
    ///
    /// See [`ExpressionTable::from_tsv_reader`] for the expected layout.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_tsv_reader(BufReader::new(file))
    }

    /// Parses a tab-separated table.
    ///
    /// Expected format:
    /// - First row: header; the first field labels the gene column, the
    ///   remaining fields are sample identifiers.
    /// - Subsequent rows: gene identifier followed by one value per sample.
    ///
    /// Blank lines are skipped.
    pub fn from_tsv_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ConfigurationError::InvalidTable("empty expression TSV".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        if header.len() < 2 {
            return Err(ConfigurationError::InvalidTable(
                "expression TSV must have at least one sample column".to_string(),
            )
            .into());
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut gene_ids = Vec::new();
        let mut values = Vec::new();
        for (line_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != n_samples + 1 {
                return Err(ConfigurationError::InvalidTable(format!(
                    "line {} has {} fields, expected {}",
                    line_idx + 2,
                    fields.len(),
                    n_samples + 1
                ))
                .into());
            }
            gene_ids.push(fields[0].trim().to_string());
            for (col_idx, raw) in fields[1..].iter().enumerate() {
                let value: f64 = raw.trim().parse().map_err(|_| {
                    ConfigurationError::InvalidTable(format!(
                        "invalid value '{}' at line {}, sample '{}'",
                        raw,
                        line_idx + 2,
                        sample_ids[col_idx]
                    ))
                })?;
                values.push(value);
            }
        }

        let n_genes = gene_ids.len();
        let data = Array2::from_shape_vec((n_genes, n_samples), values)
            .map_err(|e| ConfigurationError::InvalidTable(format!("failed to shape expression matrix: {}", e)))?;
        Self::new(data, gene_ids, sample_ids)
    }

    /// Writes the table as TSV with `gene` as the first header field.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        write!(writer, "gene")?;
        for sample in &self.sample_ids {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;
        for (gene, row) in self.gene_ids.iter().zip(self.data.axis_iter(Axis(0))) {
            write!(writer, "{}", gene)?;
            for value in row.iter() {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// The full matrix, shape (n_genes, n_samples).
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Row position of a gene, if present.
    #[inline]
    pub fn gene_position(&self, gene: &str) -> Option<usize> {
        self.gene_index.get(gene).copied()
    }

    #[inline]
    pub fn contains_gene(&self, gene: &str) -> bool {
        self.gene_index.contains_key(gene)
    }

    /// Expression of one gene across all samples.
    pub fn gene_row(&self, gene: &str) -> Option<ArrayView1<'_, f64>> {
        self.gene_position(gene).map(|row| self.data.row(row))
    }

    /// Copies the rows of `genes` (in that order) into a new
    /// (genes.len(), n_samples) matrix. Unknown genes are skipped.
    pub fn select_genes<S: AsRef<str>>(&self, genes: &[S]) -> Array2<f64> {
        let rows: Vec<usize> = genes
            .iter()
            .filter_map(|gene| self.gene_position(gene.as_ref()))
            .collect();
        self.data.select(Axis(0), &rows)
    }

    /// Builds a new table restricted to the given row positions.
    pub(crate) fn retain_rows(&self, rows: &[usize]) -> Result<Self> {
        let data = self.data.select(Axis(0), rows);
        let gene_ids = rows.iter().map(|&row| self.gene_ids[row].clone()).collect();
        Self::new(data, gene_ids, self.sample_ids.clone())
    }
}
