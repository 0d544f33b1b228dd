use crate::algebra::*;
use derive_builder::Builder;

/// Norm used for the KKT residual convergence measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NormType {
    #[default]
    Infinity,
    L1,
    L2,
}

/// Barrier parameter update strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BarrierStrategy {
    /// Solve a sequence of barrier subproblems with decreasing μ.
    #[default]
    Monotone,
    /// Mehrotra predictor-corrector style probing update.
    Mehrotra,
    /// μ set to a fraction of the current average complementarity.
    ComplementarityFraction,
}

/// How the multipliers and slacks are initialized before the first
/// major iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartingPointStrategy {
    /// Keep the user-supplied values.
    None,
    /// Least-squares estimate of the dense constraint multipliers.
    #[default]
    LeastSquares,
    /// One affine (μ = 0) step; multipliers set from its absolute values.
    AffineStep,
}

/// Which compact quasi-Newton approximation the solver constructs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QuasiNewtonType {
    #[default]
    Bfgs,
    Sr1,
    /// No approximation: sequential linear steps.
    None,
}

/// Solver configuration, constructed through [`SolverSettingsBuilder`].
///
/// ```
/// use paripm::solver::SolverSettingsBuilder;
/// let settings = SolverSettingsBuilder::<f64>::default()
///     .max_major_iters(200)
///     .barrier_param(0.01)
///     .build()
///     .unwrap();
/// ```

#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SolverSettings<T: FloatT> {
    ///maximum number of limited-memory quasi-Newton pairs
    #[builder(default = "10")]
    pub max_qn_size: usize,

    ///quasi-Newton approximation type
    #[builder(default)]
    pub qn_type: QuasiNewtonType,

    ///multiplier/slack initialization strategy
    #[builder(default)]
    pub starting_point_strategy: StartingPointStrategy,

    ///barrier parameter update strategy
    #[builder(default)]
    pub barrier_strategy: BarrierStrategy,

    ///norm for the KKT residual measures
    #[builder(default)]
    pub norm_type: NormType,

    ///maximum number of major iterations
    #[builder(default = "1000")]
    pub max_major_iters: u32,

    ///absolute KKT residual tolerance
    #[builder(default = "(1e-5).as_T()")]
    pub abs_res_tol: T,

    ///relative function-value convergence tolerance
    #[builder(default = "T::zero()")]
    pub rel_func_tol: T,

    ///absolute step-norm tolerance (disabled at zero)
    #[builder(default = "T::zero()")]
    pub abs_step_tol: T,

    ///precision of the objective/merit function evaluation
    #[builder(default = "(1e-10).as_T()")]
    pub function_precision: T,

    ///smallest meaningful relative change in a design variable
    #[builder(default = "(1e-15).as_T()")]
    pub design_precision: T,

    ///finite-difference step for the merit-derivative check
    #[builder(default = "(5e-8).as_T()")]
    pub merit_func_check_epsilon: T,

    ///initial barrier parameter μ
    #[builder(default = "(0.1).as_T()")]
    pub barrier_param: T,

    ///relative barrier factor η applied to the variable bounds
    #[builder(default = "T::one()")]
    pub rel_bound_barrier: T,

    ///monotone strategy: fraction applied to μ at subproblem convergence
    #[builder(default = "(0.25).as_T()")]
    pub monotone_barrier_fraction: T,

    ///monotone strategy: power applied to μ at subproblem convergence
    #[builder(default = "(1.1).as_T()")]
    pub monotone_barrier_power: T,

    ///minimum fraction-to-boundary parameter τ
    #[builder(default = "(0.95).as_T()")]
    pub min_fraction_to_boundary: T,

    ///ℓ₁ penalty weight γ applied to every dense constraint
    #[builder(default = "(1000.0).as_T()")]
    pub penalty_gamma: T,

    ///required descent fraction for the penalty parameter update
    #[builder(default = "(0.3).as_T()")]
    pub penalty_descent_fraction: T,

    ///lower bound on the line-search penalty parameter ρ
    #[builder(default = "T::zero()")]
    pub min_rho_penalty_search: T,

    ///Armijo sufficient-decrease constant c₁
    #[builder(default = "(1e-5).as_T()")]
    pub armijo_constant: T,

    ///perform a merit-function line search
    #[builder(default = "true")]
    pub use_line_search: bool,

    ///halve α when backtracking instead of quadratic interpolation
    #[builder(default = "false")]
    pub use_backtracking_alpha: bool,

    ///maximum line search iterations
    #[builder(default = "10")]
    pub max_line_iters: u32,

    ///drop the quasi-Newton approximation entirely (sequential linear)
    #[builder(default = "false")]
    pub sequential_linear_method: bool,

    ///reset the quasi-Newton approximation every this many iterations
    #[builder(default = "100_000_000")]
    pub hessian_reset_freq: u32,

    ///apply secant updates to the quasi-Newton approximation
    #[builder(default = "true")]
    pub use_quasi_newton_update: bool,

    ///ridge σ added to the diagonal of the approximate Hessian
    #[builder(default = "T::zero()")]
    pub qn_sigma: T,

    ///use exact Hessian-vector products (GMRES inexact-Newton steps)
    #[builder(default = "false")]
    pub use_hvec_product: bool,

    ///use the problem's diagonal Hessian in the KKT preconditioner
    #[builder(default = "false")]
    pub use_diag_hessian: bool,

    ///precondition GMRES with the quasi-Newton KKT solve
    #[builder(default = "true")]
    pub use_qn_gmres_precon: bool,

    ///residual threshold below which inexact-Newton steps are attempted
    #[builder(default = "(1e-3).as_T()")]
    pub nk_switch_tol: T,

    ///Eisenstat-Walker forcing exponent α, in [0, 2]
    #[builder(default = "(1.5).as_T()")]
    pub eisenstat_walker_alpha: T,

    ///Eisenstat-Walker forcing coefficient γ, in (0, 1]
    #[builder(default = "T::one()")]
    pub eisenstat_walker_gamma: T,

    ///GMRES subspace size (zero disables the inexact-Newton path)
    #[builder(default = "0")]
    pub gmres_subspace_size: usize,

    ///upper bound on the GMRES relative tolerance
    #[builder(default = "(0.1).as_T()")]
    pub max_gmres_rtol: T,

    ///GMRES absolute tolerance
    #[builder(default = "(1e-30).as_T()")]
    pub gmres_atol: T,

    ///call the problem's output hook every this many iterations
    #[builder(default = "10")]
    pub write_output_frequency: u32,

    ///gradient-check frequency (disabled when `None`)
    #[builder(default = "None")]
    pub gradient_check_frequency: Option<u32>,

    ///finite-difference step for the gradient check
    #[builder(default = "(1e-6).as_T()")]
    pub gradient_check_step: T,

    ///KKT/merit step verification frequency (disabled when `None`)
    #[builder(default = "None")]
    pub major_iter_step_check: Option<u32>,

    ///bounds with magnitude at or beyond this value are treated as absent
    #[builder(default = "(1e20).as_T()")]
    pub max_bound_val: T,

    ///floor for multipliers set by the affine-step start (finite bounds only)
    #[builder(default = "(1e-3).as_T()")]
    pub start_affine_multiplier_min: T,

    ///print progress to the output stream
    #[builder(default = "true")]
    pub verbose: bool,

    ///extra per-iteration output (line search and Krylov internals)
    #[builder(default = "0")]
    pub output_level: u32,
}

impl<T> Default for SolverSettings<T>
where
    T: FloatT,
{
    fn default() -> SolverSettings<T> {
        SolverSettingsBuilder::<T>::default().build().unwrap()
    }
}

/// Automatic pre-build settings validation
impl<T> SolverSettingsBuilder<T>
where
    T: FloatT,
{
    fn validate(&self) -> Result<(), String> {
        // NB: the two Eisenstat-Walker parameters are validated
        // independently of one another
        if let Some(alpha) = self.eisenstat_walker_alpha {
            if alpha < T::zero() || alpha > (2.0).as_T() {
                return Err(format!(
                    "eisenstat_walker_alpha must lie in [0, 2], got {alpha}"
                ));
            }
        }
        if let Some(gamma) = self.eisenstat_walker_gamma {
            if gamma <= T::zero() || gamma > T::one() {
                return Err(format!(
                    "eisenstat_walker_gamma must lie in (0, 1], got {gamma}"
                ));
            }
        }
        if let Some(tau) = self.min_fraction_to_boundary {
            if tau <= T::zero() || tau >= T::one() {
                return Err(format!(
                    "min_fraction_to_boundary must lie in (0, 1), got {tau}"
                ));
            }
        }
        if let Some(mu) = self.barrier_param {
            if mu <= T::zero() {
                return Err(format!("barrier_param must be positive, got {mu}"));
            }
        }
        if let Some(frac) = self.monotone_barrier_fraction {
            if frac <= T::zero() || frac >= T::one() {
                return Err(format!(
                    "monotone_barrier_fraction must lie in (0, 1), got {frac}"
                ));
            }
        }
        if self.use_hvec_product == Some(true) && self.gmres_subspace_size.unwrap_or(0) == 0 {
            return Err("use_hvec_product requires a nonzero gmres_subspace_size".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settings_validate() {
        // all standard settings
        SolverSettingsBuilder::<f64>::default().build().unwrap();

        // Eisenstat-Walker parameters are checked independently
        assert!(SolverSettingsBuilder::<f64>::default()
            .eisenstat_walker_alpha(2.5)
            .build()
            .is_err());
        assert!(SolverSettingsBuilder::<f64>::default()
            .eisenstat_walker_gamma(0.0)
            .build()
            .is_err());
        assert!(SolverSettingsBuilder::<f64>::default()
            .eisenstat_walker_alpha(2.0)
            .eisenstat_walker_gamma(1.0)
            .build()
            .is_ok());

        // inexact-Newton steps need a Krylov subspace
        assert!(SolverSettingsBuilder::<f64>::default()
            .use_hvec_product(true)
            .build()
            .is_err());
        assert!(SolverSettingsBuilder::<f64>::default()
            .use_hvec_product(true)
            .gmres_subspace_size(25)
            .build()
            .is_ok());

        // fraction-to-boundary must stay interior
        assert!(SolverSettingsBuilder::<f64>::default()
            .min_fraction_to_boundary(1.0)
            .build()
            .is_err());
    }
}
