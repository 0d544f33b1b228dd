//Rust hates greek characters
#![allow(confusable_idents)]
#![allow(uncommon_codepoints)]

//! paripm: a parallel primal–dual interior-point solver for nonlinear
//! programming.
//!
//! paripm solves nonlinear programs of the form
//!
//! ```text
//! minimize   f(x) + Σᵢ γᵢ tᵢ
//! s.t.       c(x) - s + t = 0        (dense constraints, m small)
//!            cw(x) - sw   = 0        (block-structured sparse constraints)
//!            lb ≤ x ≤ ub,   s, t, sw ≥ 0
//! ```
//!
//! where the design vector `x` is distributed across processes, `c` is a
//! small set of dense global constraints and `cw` is a large set of sparse
//! constraints whose Jacobian carries a block-diagonal inner-product
//! structure.  The Hessian is approximated by a compact limited-memory
//! quasi-Newton scheme, optionally corrected with exact Hessian-vector
//! products through a right-preconditioned GMRES step.
//!
//! Problems are defined by implementing the [`Problem`](crate::solver::Problem)
//! callback trait.  Solver behaviour is controlled through
//! [`SolverSettings`](crate::solver::SolverSettings), constructed via its
//! builder:
//!
//! ```
//! use paripm::solver::SolverSettingsBuilder;
//!
//! let settings = SolverSettingsBuilder::<f64>::default()
//!     .abs_res_tol(1e-6)
//!     .verbose(false)
//!     .build()
//!     .unwrap();
//! ```

pub mod algebra;
pub mod comm;
pub mod solver;
pub mod timers;
