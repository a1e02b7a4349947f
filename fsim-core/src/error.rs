//! Error types for FSIM operations.

use thiserror::Error;

/// Result type alias using the FSIM Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during FSIM operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid problem setup: mismatched topology, bad boundary data,
    /// inconsistent discretizations. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Assembly errors other than invalid physical states.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Invalid physical state encountered during assembly, e.g. a
    /// non-positive deformation gradient determinant (element inversion).
    /// Fatal for the current solve.
    #[error("bad solution: {0}")]
    BadSolution(String),

    /// Linear solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Invalid material properties.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
}
