use thiserror::Error;

use crate::algebra::FloatT;

/// Error returned from a [`Problem`] callback.
///
/// A non-zero code aborts the solve and is propagated as the driver's exit
/// code.  During a line search an evaluation failure is not immediately
/// fatal: the step is shrunk and the point re-tried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("problem callback failed (code {code})")]
pub struct EvalError {
    pub code: i32,
}

impl EvalError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Local problem dimensions, as seen by one process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProblemSizes {
    /// Process-local number of design variables.
    pub nvars: usize,
    /// Number of dense constraints (global, identical on every process).
    pub ncon: usize,
    /// Process-local number of sparse constraints.
    pub nwcon: usize,
    /// Block size of the sparse-constraint inner product; local counts
    /// must be a multiple of this.
    pub nwblock: usize,
}

/// The user problem callback surface.
///
/// Distributed vectors appear as process-local slices; `eval_obj_con` must
/// return the same objective and dense constraint values on every process.
/// Sparse-constraint operators act on the local slice only.
///
/// The sparse-constraint hooks default to empty constraints and the
/// Hessian hooks default to "unsupported"; implement them when the
/// corresponding dimensions or solver options are enabled.
#[allow(unused_variables)]
pub trait Problem<T: FloatT> {
    /// Problem dimensions; called once at solver construction.
    fn problem_sizes(&self) -> ProblemSizes;

    /// Whether the sparse constraints carry slack variables (inequalities).
    fn is_sparse_inequality(&self) -> bool {
        true
    }

    /// Whether the dense constraints are two-sided-slack inequalities
    /// `c(x) ≥ 0`; equality constraints otherwise.
    fn is_dense_inequality(&self) -> bool {
        true
    }

    fn use_lower_bounds(&self) -> bool {
        true
    }

    fn use_upper_bounds(&self) -> bool {
        true
    }

    /// Initial design point and variable bounds.  Bounds with magnitude at
    /// or above the configured `max_bound_val` are treated as absent.
    fn vars_and_bounds(&self, x: &mut [T], lb: &mut [T], ub: &mut [T]);

    /// Evaluate the objective and the dense constraints, returning the
    /// objective value.
    fn eval_obj_con(&mut self, x: &[T], con: &mut [T]) -> Result<T, EvalError>;

    /// Evaluate the objective gradient and dense constraint Jacobian rows.
    fn eval_obj_con_gradient(
        &mut self,
        x: &[T],
        g: &mut [T],
        ac: &mut [Vec<T>],
    ) -> Result<(), EvalError>;

    /// Exact Hessian-vector product `out = ∇²L(x, z, zw)·p`.  Required
    /// when `use_hvec_product` is enabled.
    fn eval_hvec_product(
        &mut self,
        x: &[T],
        z: &[T],
        zw: &[T],
        p: &[T],
        out: &mut [T],
    ) -> Result<(), EvalError> {
        Err(EvalError::new(-1))
    }

    /// Diagonal of the Lagrangian Hessian.  Required when
    /// `use_diag_hessian` is enabled.
    fn eval_hessian_diag(
        &mut self,
        x: &[T],
        z: &[T],
        zw: &[T],
        diag: &mut [T],
    ) -> Result<(), EvalError> {
        Err(EvalError::new(-1))
    }

    /// Evaluate the sparse constraints into `con` (local slice).
    fn eval_sparse_con(&mut self, x: &[T], con: &mut [T]) {}

    /// `out += alpha * Aw(x) * px`.
    fn add_sparse_jacobian(&mut self, alpha: T, x: &[T], px: &[T], out: &mut [T]) {}

    /// `out += alpha * Aw(x)ᵀ * zw`.
    fn add_sparse_jacobian_transpose(&mut self, alpha: T, x: &[T], zw: &[T], out: &mut [T]) {}

    /// `cw += alpha * Aw(x) * diag(cdiag) * Aw(x)ᵀ`, written into the
    /// packed upper-triangular block storage of the block-diagonal matrix.
    fn add_sparse_inner_product(&mut self, alpha: T, x: &[T], cdiag: &[T], cw: &mut [T]) {}

    /// Hook to damp or correct the quasi-Newton secant pair before the
    /// update is applied.
    fn compute_quasi_newton_update_correction(&mut self, s: &mut [T], y: &mut [T]) {}

    /// Output hook called every `write_output_frequency` major iterations.
    fn write_output(&mut self, iter: u32, x: &[T]) {}

    /// Gradient verification hook, called per `gradient_check_frequency`.
    fn check_gradients(&mut self, step: T, x: &[T], use_hvec: bool) {}
}
