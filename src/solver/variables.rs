#![allow(non_snake_case)]

use crate::algebra::*;
use crate::solver::{Problem, ProblemSizes};

/// Problem structure flags captured from the [`Problem`](crate::solver::Problem)
/// at construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProblemFlags {
    pub dense_inequality: bool,
    pub sparse_inequality: bool,
    pub use_lower: bool,
    pub use_upper: bool,
}

impl ProblemFlags {
    pub fn from_problem<T: FloatT, P: Problem<T>>(prob: &P) -> Self {
        Self {
            dense_inequality: prob.is_dense_inequality(),
            sparse_inequality: prob.is_sparse_inequality(),
            use_lower: prob.use_lower_bounds(),
            use_upper: prob.use_upper_bounds(),
        }
    }
}

/// One full primal-dual point.
///
/// The same shape serves three roles: the current iterate, the step
/// direction, and the KKT residual/right-hand side (each residual field
/// holds the residual of the equation that drives the step component of
/// the same name; the dense constraint residual sits in `z`, the sparse
/// constraint residual in `zw`).
pub struct PrimalDualVec<T> {
    /// design variables (local slice, length nvars)
    pub x: Vec<T>,
    /// lower bound multipliers (length nvars)
    pub zl: Vec<T>,
    /// upper bound multipliers (length nvars)
    pub zu: Vec<T>,
    /// dense constraint multipliers (length ncon, replicated)
    pub z: Vec<T>,
    /// dense constraint slacks (length ncon, replicated)
    pub s: Vec<T>,
    /// ℓ₁ relaxation slacks (length ncon, replicated)
    pub t: Vec<T>,
    /// multipliers paired with `t` (length ncon, replicated)
    pub zt: Vec<T>,
    /// sparse constraint multipliers (local slice, length nwcon)
    pub zw: Vec<T>,
    /// sparse constraint slacks (local slice, length nwcon)
    pub sw: Vec<T>,
}

impl<T> PrimalDualVec<T>
where
    T: FloatT,
{
    pub fn new(nvars: usize, ncon: usize, nwcon: usize) -> Self {
        Self {
            x: vec![T::zero(); nvars],
            zl: vec![T::zero(); nvars],
            zu: vec![T::zero(); nvars],
            z: vec![T::zero(); ncon],
            s: vec![T::zero(); ncon],
            t: vec![T::zero(); ncon],
            zt: vec![T::zero(); ncon],
            zw: vec![T::zero(); nwcon],
            sw: vec![T::zero(); nwcon],
        }
    }

    pub fn zero(&mut self) {
        self.x.set(T::zero());
        self.zl.set(T::zero());
        self.zu.set(T::zero());
        self.z.set(T::zero());
        self.s.set(T::zero());
        self.t.set(T::zero());
        self.zt.set(T::zero());
        self.zw.set(T::zero());
        self.sw.set(T::zero());
    }
}

/// Bounds, objective/constraint values and first-order data at the
/// current point.  Allocated once from the problem sizes.
pub struct ProblemData<T> {
    pub lb: Vec<T>,
    pub ub: Vec<T>,
    /// objective gradient (local slice)
    pub g: Vec<T>,
    /// dense constraint Jacobian rows (each a local slice)
    pub Ac: Vec<Vec<T>>,
    /// dense constraint values (replicated)
    pub c: Vec<T>,
    /// objective value (replicated)
    pub fobj: T,
}

impl<T> ProblemData<T>
where
    T: FloatT,
{
    pub fn new(sizes: &ProblemSizes) -> Self {
        Self {
            lb: vec![T::zero(); sizes.nvars],
            ub: vec![T::zero(); sizes.nvars],
            g: vec![T::zero(); sizes.nvars],
            Ac: vec![vec![T::zero(); sizes.nvars]; sizes.ncon],
            c: vec![T::zero(); sizes.ncon],
            fobj: T::zero(),
        }
    }

    /// Whether the local lower bound `i` is present (finite).
    #[inline]
    pub fn has_lb(&self, i: usize, max_bound_val: T) -> bool {
        self.lb[i].real_part() > -max_bound_val
    }

    /// Whether the local upper bound `i` is present (finite).
    #[inline]
    pub fn has_ub(&self, i: usize, max_bound_val: T) -> bool {
        self.ub[i].real_part() < max_bound_val
    }
}
