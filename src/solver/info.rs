use crate::algebra::FloatT;

// ---------------------------------
// Solver status type
// ---------------------------------

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum SolverStatus {
    #[default]
    Unsolved,
    /// KKT residual below tolerance at the final barrier parameter.
    Solved,
    /// Converged on the relative function-value test.
    SolvedRelFunc,
    /// The merit function could not be improved in two consecutive
    /// iterations; the current point cannot be improved.
    NoImprovement,
    /// Iteration limit reached.
    MaxIterations,
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Progress information and evaluation counters for one solve.
#[derive(Debug, Default, Clone)]
pub struct SolverInfo<T> {
    /// completed major iterations
    pub major_iters: u32,
    /// objective/constraint evaluations
    pub neval: u32,
    /// gradient evaluations
    pub ngeval: u32,
    /// Hessian-vector products
    pub nhvec: u32,

    pub status: SolverStatus,

    /// norm of the KKT residual at the current barrier parameter
    pub res_norm: T,
    pub max_prime: T,
    pub max_dual: T,
    pub max_infeas: T,

    /// current average complementarity
    pub comp: T,
    /// line search step and the primal/dual fraction-to-boundary scalings
    /// from the previous iteration
    pub alpha_prev: T,
    pub alpha_x_prev: T,
    pub alpha_z_prev: T,
    /// merit function directional derivative from the previous iteration
    pub dm0_prev: T,

    /// per-iteration event codes (quasi-Newton damping, line search
    /// outcomes, step equalization, ...)
    pub events: String,
}

impl<T> SolverInfo<T>
where
    T: FloatT,
{
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn push_event(&mut self, ev: &str) {
        if !self.events.is_empty() {
            self.events.push(' ');
        }
        self.events.push_str(ev);
    }
}
