// All internal math for the solver goes through these core traits,
// which are implemented generically for floats of type FloatT.

/// Scalar operations on [`FloatT`](crate::algebra::FloatT)
pub trait ScalarMath {
    /// Safe calculation for log barriers.
    ///
    /// Returns log(s) if s > 0,  -Infinity otherwise.
    fn logsafe(&self) -> Self;
}

/// Vector operations on slices of [`FloatT`](crate::algebra::FloatT)
///
/// This is the local-operation surface of a distributed vector: every
/// method here touches only the process-local slice.  Cross-process
/// combinations (global norms, dot products and minima) are formed by
/// the caller from these local results through a communicator collective.
pub trait VectorMath {
    type T;

    /// Copy values from `src` to `self`
    fn copy_from(&mut self, src: &Self) -> &mut Self;

    /// Set all elements to the same value
    fn set(&mut self, c: Self::T) -> &mut Self;

    /// Elementwise scaling.
    fn scale(&mut self, c: Self::T) -> &mut Self;

    /// Elementwise negation of entries.
    fn negate(&mut self) -> &mut Self;

    /// BLAS-like shift in place.  Produces `self = self + a*x`
    fn axpy(&mut self, a: Self::T, x: &Self) -> &mut Self;

    /// BLAS-like shift and scale in place.  Produces `self = a*x + b*self`
    fn axpby(&mut self, a: Self::T, x: &Self, b: Self::T) -> &mut Self;

    /// BLAS-like shift and scale, non in-place version.  Produces `self = a*x + b*y`
    fn waxpby(&mut self, a: Self::T, x: &Self, b: Self::T, y: &Self) -> &mut Self;

    /// Dot product.
    ///
    /// Accumulation runs over a head of length `n mod 4` followed by a
    /// length-4 unrolled body so that the summation order is stable
    /// between runs and independent of how the global vector is split
    /// across processes.
    fn dot(&self, y: &Self) -> Self::T;

    /// Weighted dot product `Σᵢ selfᵢ yᵢ wᵢ`, same accumulation order as
    /// [dot](VectorMath::dot).
    fn dot_scaled(&self, y: &Self, w: &Self) -> Self::T;

    /// Sum of squares of the elements.
    fn sumsq(&self) -> Self::T;

    /// 2-norm of the local slice.
    fn norm(&self) -> Self::T;

    /// One norm of the local slice.
    fn norm_one(&self) -> Self::T;

    /// Infinity norm of the local slice.
    fn norm_inf(&self) -> Self::T;
}
