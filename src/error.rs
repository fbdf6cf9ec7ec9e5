//! Error types for marker-based decomposition.

use thiserror::Error;

/// Invalid configuration or malformed input tables. Recoverable only by
/// changing the inputs; no defaults are ever substituted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("min_gene ({min_gene}) must be at least 1 and not exceed max_gene ({max_gene})")]
    InvalidBounds { min_gene: usize, max_gene: usize },

    #[error("Missing column '{0}' in marker table")]
    MissingColumn(String),

    #[error("Invalid weight '{value}' for gene '{gene}' of cell type '{cell_type}': {reason}")]
    InvalidWeight {
        cell_type: String,
        gene: String,
        value: String,
        reason: String,
    },

    #[error("Invalid table: {0}")]
    InvalidTable(String),
}

/// Failures of the numeric decomposition itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecompositionError {
    #[error("No cell type resolved a marker panel against the expression table")]
    NoMarkerGenes,

    #[error("Marker submatrix for cell type '{cell_type}' has no rows")]
    EmptySubmatrix { cell_type: String },

    #[error("Marker submatrix for cell type '{cell_type}' is ill-conditioned: {reason}")]
    IllConditioned { cell_type: String, reason: String },

    #[error("Processed cell types share no common samples")]
    EmptySampleIntersection,

    #[error("Linear algebra backend failure: {0}")]
    Linalg(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DeconError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Decomposition error: {0}")]
    Decomposition(#[from] DecompositionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DeconError>;
