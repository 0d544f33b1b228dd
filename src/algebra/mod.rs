//! paripm algebra module.
//!
//! All floating point calculations are represented internally on values
//! implementing the [FloatT](crate::algebra::FloatT) trait.  The solver
//! carries its own implementations of the vector operations it needs
//! through the [VectorMath](crate::algebra::VectorMath) trait, implemented
//! on ordinary slices: a distributed vector is a process-local contiguous
//! slice, and all cross-process combination happens through explicit
//! collectives on the communicator.
//!
//! Dense factorizations (the bordered multiplier system and the
//! block-diagonal sparse-constraint matrix) are computed through LAPACK.

mod blas;
mod dense;
mod error_types;
mod floats;
mod math_traits;
mod scalarmath;
mod vecmath;

pub use blas::*;
pub use dense::*;
pub use error_types::*;
pub use floats::*;
pub use math_traits::*;
pub use scalarmath::*;
pub use vecmath::*;
