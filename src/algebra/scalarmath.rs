use super::{FloatT, ScalarMath};

impl<T: FloatT> ScalarMath for T {
    fn logsafe(&self) -> T {
        if *self <= T::zero() {
            -T::infinity()
        } else {
            self.ln()
        }
    }
}

/// Number of entries in a packed upper triangle of dimension `k`.
pub(crate) fn triangular_number(k: usize) -> usize {
    (k * (k + 1)) >> 1
}
