#![allow(non_snake_case)]

use crate::algebra::*;

/// Dense LU factorization of a small square matrix, kept factored for
/// repeated right-hand-side solves.
///
/// Used for the m×m bordered multiplier system and for the q×q low-rank
/// Schur complement.  Storage is allocated once at the maximum dimension
/// and reused; `factor` never allocates.
pub(crate) struct LuFactor<T> {
    a: Vec<T>,
    ipiv: Vec<i32>,
    n: usize,
}

impl<T> LuFactor<T>
where
    T: FloatT,
{
    pub fn new(max_n: usize) -> Self {
        Self {
            a: vec![T::zero(); max_n * max_n],
            ipiv: vec![0; max_n],
            n: 0,
        }
    }

    /// Factor the leading `n`×`n` column-major matrix stored in `A`.
    pub fn factor(&mut self, A: &[T], n: usize) -> Result<(), DenseFactorizationError> {
        if n * n > self.a.len() || A.len() < n * n {
            return Err(DenseFactorizationError::IncompatibleDimension);
        }
        self.n = n;
        self.a[..n * n].copy_from(&A[..n * n]);

        let An = n.try_into().unwrap();
        let info = &mut 0_i32;
        T::xgetrf(An, An, &mut self.a[..n * n], An, &mut self.ipiv[..n], info);

        if *info != 0 {
            return Err(DenseFactorizationError::LU(*info));
        }
        Ok(())
    }

    /// Solve in place using the stored factorization.
    pub fn solve(&self, b: &mut [T]) {
        let n = self.n;
        if n == 0 {
            return;
        }
        let An = n.try_into().unwrap();
        let info = &mut 0_i32;
        T::xgetrs(b'N', An, 1, &self.a[..n * n], An, &self.ipiv[..n], &mut b[..n], An, info);
        assert_eq!(*info, 0);
    }
}

/// Block-diagonal symmetric matrix in packed upper-triangular storage,
/// factored in place.
///
/// `nblocks * blocksize` rows, each block packed as its upper triangle.
/// Block size one is stored and factored as plain reciprocals; larger
/// blocks use a packed Cholesky factorization.  A non-positive pivot is a
/// hard error carrying the offending row index.
pub(crate) struct BlockCholesky<T> {
    data: Vec<T>,
    nrows: usize,
    blocksize: usize,
}

impl<T> BlockCholesky<T>
where
    T: FloatT,
{
    pub fn new(nrows: usize, blocksize: usize) -> Self {
        let blocksize = blocksize.max(1);
        let nblocks = nrows / blocksize;
        Self {
            data: vec![T::zero(); nblocks * triangular_number(blocksize)],
            nrows,
            blocksize,
        }
    }

    /// Packed storage, in block order, for assembly.  Within each block
    /// the j-th column's entries occupy positions tri(j)..tri(j+1).
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn zero(&mut self) {
        self.data.set(T::zero());
    }

    /// Factor every block in place.  Returns the failing row index on a
    /// zero (blocksize 1) or non-positive (Cholesky) pivot.
    pub fn factor(&mut self) -> Result<(), DenseFactorizationError> {
        if self.blocksize == 1 {
            for (i, c) in self.data.iter_mut().enumerate() {
                if *c == T::zero() {
                    return Err(DenseFactorizationError::Cholesky(i as i32 + 1));
                }
                *c = T::recip(*c);
            }
        } else {
            let nb: i32 = self.blocksize.try_into().unwrap();
            let incr = triangular_number(self.blocksize);
            for (blk, cw) in self.data.chunks_exact_mut(incr).enumerate() {
                let info = &mut 0_i32;
                T::xpptrf(b'U', nb, cw, info);
                if *info != 0 {
                    return Err(DenseFactorizationError::Cholesky(
                        (blk * self.blocksize) as i32 + *info,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Apply the factored matrix: `rhs <- C⁻¹ rhs`.
    pub fn solve(&self, rhs: &mut [T]) {
        assert_eq!(rhs.len(), self.nrows);
        if self.blocksize == 1 {
            for (r, c) in rhs.iter_mut().zip(&self.data) {
                *r *= *c;
            }
        } else {
            let nb: i32 = self.blocksize.try_into().unwrap();
            let incr = triangular_number(self.blocksize);
            for (cw, b) in self
                .data
                .chunks_exact(incr)
                .zip(rhs.chunks_exact_mut(self.blocksize))
            {
                let info = &mut 0_i32;
                T::xpptrs(b'U', nb, 1, cw, b, nb, info);
                assert_eq!(*info, 0);
            }
        }
    }
}

// ---- unit testing ----

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lu_solve() {
        // column-major [[3,2,4],[2,0,2],[4,2,3]]
        let A = [3., 2., 4., 2., 0., 2., 4., 2., 3.];
        let mut b = [-5., -2., -2.];
        let x = [1., 0., -2.];

        let mut lu = LuFactor::<f64>::new(3);
        lu.factor(&A, 3).unwrap();
        lu.solve(&mut b);

        for (bi, xi) in b.iter().zip(&x) {
            assert!((bi - xi).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lu_reuse_smaller_dim() {
        let mut lu = LuFactor::<f64>::new(4);
        let A = [2., 0., 0., 3.];
        let mut b = [4., 9.];
        lu.factor(&A, 2).unwrap();
        lu.solve(&mut b);
        assert!((b[0] - 2.0).abs() < 1e-14);
        assert!((b[1] - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_block_cholesky_scalar_blocks() {
        let mut chol = BlockCholesky::<f64>::new(3, 1);
        chol.data_mut().copy_from_slice(&[2., 4., 8.]);
        chol.factor().unwrap();

        let mut rhs = [2., 2., 2.];
        chol.solve(&mut rhs);
        assert_eq!(rhs, [1., 0.5, 0.25]);
    }

    #[test]
    fn test_block_cholesky_zero_pivot() {
        let mut chol = BlockCholesky::<f64>::new(2, 1);
        chol.data_mut().copy_from_slice(&[1., 0.]);
        assert!(matches!(
            chol.factor(),
            Err(DenseFactorizationError::Cholesky(2))
        ));
    }

    #[test]
    fn test_block_cholesky_2x2_blocks() {
        // two identical SPD blocks [[4,1],[1,3]], packed upper: [4, 1, 3]
        let mut chol = BlockCholesky::<f64>::new(4, 2);
        chol.data_mut().copy_from_slice(&[4., 1., 3., 4., 1., 3.]);
        chol.factor().unwrap();

        // block * [2,1] = [9,5]
        let mut rhs = [9., 5., 9., 5.];
        chol.solve(&mut rhs);
        for (r, x) in rhs.iter().zip(&[2., 1., 2., 1.]) {
            assert!((r - x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_block_cholesky_indefinite_block() {
        // [[1, 2],[2, 1]] is indefinite; packed upper [1, 2, 1]
        let mut chol = BlockCholesky::<f64>::new(2, 2);
        chol.data_mut().copy_from_slice(&[1., 2., 1.]);
        assert!(matches!(
            chol.factor(),
            Err(DenseFactorizationError::Cholesky(_))
        ));
    }
}
