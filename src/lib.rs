// Marker-based decomposition of bulk expression

#![doc = include_str!("../README.md")]

pub mod assembler;
pub mod decompose;
pub mod error;
pub mod expression;
pub mod linalg_backends;
pub mod markers;
pub mod normalize;
pub mod orientation;
pub mod panel;
pub mod pca;
pub mod result;
pub mod singlecell;
pub mod subspace;


pub use assembler::{CellTypeSignal, ProportionAssembler};
pub use decompose::{decompose, DecompositionConfig};
pub use error::{ConfigurationError, DeconError, DecompositionError, Result};
pub use expression::ExpressionTable;
pub use markers::{MarkerColumns, MarkerEntry, MarkerTable};
pub use normalize::{counts_per_million, filter_zero_expression, filter_zero_variance};
pub use orientation::{pearson_correlation, OrientationCorrector, OrientedSignal};
pub use panel::{ExcludedCellType, MarkerPanel, MarkerPanelBuilder, PanelOptions, PanelSelection};
pub use pca::PCA;
pub use result::{CellTypeDiagnostics, DecompositionResult};
pub use singlecell::{SampleMetadata, SingleCellCounts, SubjectRule};
pub use subspace::{ExtractedSignal, SubspaceExtractor};
