//! The paripm interior-point solver.
//!
//! The main solver object is [`InteriorPoint`], constructed from a user
//! [`Problem`] implementation and a [`SolverSettings`] instance.

use thiserror::Error;

use crate::algebra::DenseFactorizationError;

mod barrier;
mod checkpoint;
mod gmres;
mod info;
mod info_print;
mod kktsystem;
mod linesearch;
mod problem;
mod qnewton;
mod residuals;
mod settings;
#[allow(clippy::module_inception)]
mod solver;
mod variables;

pub use info::*;
pub use problem::*;
pub use qnewton::*;
pub use settings::*;
pub use solver::*;
pub use variables::*;

pub(crate) use kktsystem::*;
pub(crate) use linesearch::*;
pub(crate) use residuals::*;

/// Error type returned by the solver driver.
#[derive(Error, Debug)]
pub enum SolverError {
    /// An objective/constraint or Hessian callback signalled failure.  The
    /// callback's error code is propagated as the process exit code.
    #[error(transparent)]
    Callback(#[from] EvalError),
    /// A factorization inside the step computation failed.
    #[error(transparent)]
    Factorization(#[from] DenseFactorizationError),
    /// Reading a solution file failed.
    #[error("solution file error: {0}")]
    SolutionFile(#[from] std::io::Error),
}

impl SolverError {
    /// Driver exit code: zero on success is represented by `Ok`; every
    /// error maps to a non-zero code, with callback codes passed through.
    pub fn exit_code(&self) -> i32 {
        match self {
            SolverError::Callback(e) => {
                if e.code != 0 {
                    e.code
                } else {
                    1
                }
            }
            _ => 1,
        }
    }
}
