use thiserror::Error;

/// Error type returned by the dense factorization routines.  Errors carry
/// the internal LAPACK info codes.
#[derive(Error, Debug)]
pub enum DenseFactorizationError {
    #[error("Matrix dimension fields and/or array lengths are incompatible")]
    IncompatibleDimension,
    #[error("LU error")]
    LU(i32),
    #[error("Cholesky error")]
    Cholesky(i32),
}
