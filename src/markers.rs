//! Marker-gene annotation tables.
//!
//! A [`MarkerTable`] is the loosely-typed, named-column form in which marker
//! annotations usually arrive (e.g. a differential-expression export). Column
//! names are resolved once, through [`MarkerColumns`], into typed
//! [`MarkerEntry`] records; nothing downstream looks columns up by name.

use crate::error::{ConfigurationError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One marker annotation: `gene` characterizes `cell_type`, optionally with
/// a non-negative significance weight.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEntry {
    pub cell_type: String,
    pub gene: String,
    pub weight: Option<f64>,
}

impl MarkerEntry {
    pub fn new(cell_type: impl Into<String>, gene: impl Into<String>, weight: Option<f64>) -> Self {
        Self {
            cell_type: cell_type.into(),
            gene: gene.into(),
            weight,
        }
    }
}

/// Names of the marker-table columns holding cell type, gene and weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerColumns {
    pub cell_type: String,
    pub gene: String,
    pub weight: String,
}

impl Default for MarkerColumns {
    fn default() -> Self {
        Self {
            cell_type: "cluster".to_string(),
            gene: "gene".to_string(),
            weight: "avg_log2FC".to_string(),
        }
    }
}

/// Row-oriented table of string cells with a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MarkerTable {
    /// Builds a table from a header and rows of equal width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ConfigurationError::InvalidTable(format!(
                    "marker row {} has {} fields, header has {}",
                    idx,
                    row.len(),
                    columns.len()
                ))
                .into());
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a three-column table (`cluster`, `gene`, `avg_log2FC`) from
    /// typed entries, using the default column names. A missing weight is
    /// written as an empty cell.
    pub fn from_entries(entries: &[MarkerEntry]) -> Self {
        let defaults = MarkerColumns::default();
        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    entry.cell_type.clone(),
                    entry.gene.clone(),
                    entry.weight.map(|w| w.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        Self {
            columns: vec![defaults.cell_type, defaults.gene, defaults.weight],
            rows,
        }
    }

    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_tsv_reader(BufReader::new(file))
    }

    /// Parses a tab-separated table whose first line is the header.
    /// Blank lines are skipped.
    pub fn from_tsv_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| ConfigurationError::InvalidTable("empty marker TSV".to_string()))??;
        let columns: Vec<String> = header_line
            .trim_end_matches('\r')
            .split('\t')
            .map(|s| s.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            rows.push(line.split('\t').map(|s| s.trim().to_string()).collect());
        }
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ConfigurationError::MissingColumn(name.to_string()).into())
    }

    /// Resolves the named columns into typed entries, in table order.
    ///
    /// The weight column is only required (and parsed) when `weighted` is
    /// true; an empty weight cell then becomes `None`. Weights must be finite
    /// and non-negative.
    ///
    /// # Errors
    /// `ConfigurationError::MissingColumn` for an absent required column,
    /// `ConfigurationError::InvalidWeight` for an unparsable or negative weight.
    pub fn entries(&self, columns: &MarkerColumns, weighted: bool) -> Result<Vec<MarkerEntry>> {
        let ct_pos = self.column_position(&columns.cell_type)?;
        let gene_pos = self.column_position(&columns.gene)?;
        let weight_pos = if weighted {
            Some(self.column_position(&columns.weight)?)
        } else {
            None
        };

        let mut entries = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let cell_type = row[ct_pos].clone();
            let gene = row[gene_pos].clone();
            let weight = match weight_pos {
                Some(pos) => parse_weight(&row[pos], &cell_type, &gene)?,
                None => None,
            };
            entries.push(MarkerEntry {
                cell_type,
                gene,
                weight,
            });
        }
        Ok(entries)
    }
}

fn parse_weight(raw: &str, cell_type: &str, gene: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let invalid = |reason: &str| ConfigurationError::InvalidWeight {
        cell_type: cell_type.to_string(),
        gene: gene.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: f64 = raw.parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() {
        return Err(invalid("weight must be finite").into());
    }
    if value < 0.0 {
        return Err(invalid("weight must be non-negative").into());
    }
    Ok(Some(value))
}
