//! Gridload assembles in-memory arrays into a read-only, hierarchical spatial
//! dataset. It uses structured, rectilinear grid patches in the style of
//! Berger-Oliger AMR: level-0 grids tile the domain, and each grid at a finer
//! level is nested inside exactly one grid one level coarser. A dataset is
//! built either from whole-domain arrays, which are split into equal level-0
//! chunks, or from an explicit list of patches. Every field carries a unit
//! resolved against the dataset's code units, and the assembled hierarchy is
//! checked for coverage, nesting and particle placement before use.

pub mod chunking;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod field;
pub mod geometry;
pub mod grid;
pub mod hierarchy;
pub mod index_space;
pub mod overlap;
pub mod units;
pub mod validate;

pub use dataset::{AmrGridConfig, Dataset, FieldInput, Loaded, ParticleInput, PatchSpec, UniformGridConfig, Validation};
pub use error::{Error, ErrorKind, Result};
pub use grid::GridId;
