//! NBLAST similarity scoring for neuron point clouds.
//!
//! Each neuron becomes a vector cloud: sampled points annotated with the
//! local principal direction of their neighbourhood. One cloud queries
//! another through a k-d tree; every query point contributes a score-table
//! lookup over its nearest-neighbour distance and the absolute dot product
//! of the paired tangents. Raw scores are asymmetric; [`ScoreMatrix`]
//! derives the normalised and mean forms used for clustering.
//!
//! Distances are physical and expressed in nanometres, matching the units
//! of the score table's distance thresholds.

mod kdtree;
mod score_matrix;
mod score_table;
mod vector_cloud;


pub use self::kdtree::{KdTree, Neighbour};
pub use self::score_matrix::ScoreMatrix;
pub use self::score_table::ScoreTable;
pub use self::vector_cloud::VectorCloud;

/// Errors returned while constructing NBLAST structures.
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum NblastError {
    /// The point set contained no points.
    #[error("point set contains no points")]
    EmptyPointSet,
    /// Point rows carried fewer than three coordinate columns.
    #[error("point rows must have at least 3 columns, got {columns}")]
    PointDimension {
        /// Number of columns found on the point matrix.
        columns: usize,
    },
    /// The score table matrix was not the expected `[21, 10]` shape.
    #[error("score table must be 21x10, got {rows}x{columns}")]
    TableShape {
        /// Number of rows found on the table matrix.
        rows: usize,
        /// Number of columns found on the table matrix.
        columns: usize,
    },
    /// A score matrix was requested over an empty set of clouds.
    #[error("score matrix requires at least one vector cloud")]
    EmptyCloudSet,
}

impl NblastError {
    /// Returns a stable, machine-readable error code for the variant.
    #[must_use]
    pub const fn code(&self) -> NblastErrorCode {
        match self {
            Self::EmptyPointSet => NblastErrorCode::EmptyPointSet,
            Self::PointDimension { .. } => NblastErrorCode::PointDimension,
            Self::TableShape { .. } => NblastErrorCode::TableShape,
            Self::EmptyCloudSet => NblastErrorCode::EmptyCloudSet,
        }
    }
}

/// Machine-readable error codes for [`NblastError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NblastErrorCode {
    /// The point set contained no points.
    EmptyPointSet,
    /// Point rows carried fewer than three coordinate columns.
    PointDimension,
    /// The score table matrix was not the expected `[21, 10]` shape.
    TableShape,
    /// A score matrix was requested over an empty set of clouds.
    EmptyCloudSet,
}

impl NblastErrorCode {
    /// Returns the symbolic identifier for logging and metrics surfaces.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyPointSet => "EMPTY_POINT_SET",
            Self::PointDimension => "POINT_DIMENSION",
            Self::TableShape => "TABLE_SHAPE",
            Self::EmptyCloudSet => "EMPTY_CLOUD_SET",
        }
    }
}
