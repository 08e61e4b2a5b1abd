use thiserror::Error;
use crate::grid::GridId;
use crate::units::Dimension;
use crate::validate::Diagnostic;




/**
 * Broad category of a construction failure. Every `Error` variant belongs to
 * exactly one of these.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UnitResolution,
    ShapeMismatch,
    Chunking,
    HierarchyTopology,
    ConsistencyViolation,
}




/**
 * Error to represent a failure to assemble a dataset. Structural errors abort
 * construction; `Consistency` is only produced when the caller asks for
 * diagnostics to be treated as fatal.
 */
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("dimension mismatch for {quantity}: expected {expected}, got {found}")]
    DimensionMismatch {
        quantity: String,
        expected: Dimension,
        found: Dimension,
    },

    #[error("field '{field}' on {} has shape {found:?}, expected {expected:?}",
        .grid.map_or_else(|| "the domain".to_string(), |g| format!("grid {}", g)))]
    ShapeMismatch {
        grid: Option<GridId>,
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("cannot split a domain of {dims:?} cells into {count} chunks")]
    InvalidChunkCount {
        count: usize,
        dims: [usize; 3],
    },

    #[error("grid {grid} at level {level} is not contained in any grid one level coarser")]
    OrphanGrid {
        grid: GridId,
        level: u32,
    },

    #[error("grid {grid} at level {level} has more than one candidate parent: {candidates:?}")]
    AmbiguousParent {
        grid: GridId,
        level: u32,
        candidates: Vec<GridId>,
    },

    #[error("{} consistency violation(s), first: {}", .0.len(), .0.first().map_or(String::new(), |d| d.to_string()))]
    Consistency(Vec<Diagnostic>),
}




// ============================================================================
impl Error {

    pub fn kind(&self) -> ErrorKind {
        use Error::*;

        match self {
            Configuration(_) => ErrorKind::Configuration,
            UnknownUnit(_) | DimensionMismatch { .. } => ErrorKind::UnitResolution,
            ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            InvalidChunkCount { .. } => ErrorKind::Chunking,
            OrphanGrid { .. } | AmbiguousParent { .. } => ErrorKind::HierarchyTopology,
            Consistency(_) => ErrorKind::ConsistencyViolation,
        }
    }

    pub(crate) fn config<S: Into<String>>(message: S) -> Self {
        Error::Configuration(message.into())
    }
}




/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
