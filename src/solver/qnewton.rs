#![allow(non_snake_case)]

use crate::algebra::*;
use crate::comm::ProcComm;

/// Outcome of a quasi-Newton secant update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QnUpdateKind {
    Applied,
    /// The secant pair was damped to preserve positive definiteness.
    Damped,
    /// The pair was rejected and the approximation left unchanged.
    Skipped,
}

/// Borrowed view of the compact quasi-Newton representation.
///
/// The approximation acts as
///
/// ```text
/// B = b0·I − Z·diag(d)·M⁻¹·diag(d)·Zᵀ
/// ```
///
/// with `q = z.len()` columns.  The KKT step applies the low-rank term
/// through the Schur complement `Ce = Zᵀ K⁻¹ Z − diag(d)⁻¹ M diag(d)⁻¹`,
/// which is the Sherman-Morrison-Woodbury companion of the sign
/// convention above.
pub struct CompactMat<'a, T> {
    pub b0: T,
    /// length q
    pub d: &'a [T],
    /// q×q, column major
    pub M: &'a [T],
    /// q distributed vectors (local slices)
    pub Z: &'a [Vec<T>],
}

impl<T> CompactMat<'_, T> {
    pub fn size(&self) -> usize {
        self.Z.len()
    }
}

/// A compact limited-memory quasi-Newton approximation of the Lagrangian
/// Hessian.
pub trait CompactQuasiNewton<T: FloatT> {
    /// Maximum number of secant pairs retained.
    fn max_subspace_size(&self) -> usize;

    /// Apply a secant update with the pair `(s, y)`.
    ///
    /// The multiplier estimates are provided for schemes that use them;
    /// the limited-memory updates here depend only on the pair itself.
    fn update(&mut self, x: &[T], z: &[T], zw: &[T], s: &[T], y: &[T]) -> QnUpdateKind;

    /// Refresh internal multiplier estimates without a secant pair.
    fn update_estimates(&mut self, _x: &[T], _z: &[T], _zw: &[T]) {}

    /// Discard all stored pairs.
    fn reset(&mut self);

    /// `out = B·v`
    fn mult(&mut self, v: &[T], out: &mut [T]);

    /// `out += alpha·B·v`
    fn mult_add(&mut self, alpha: T, v: &[T], out: &mut [T]);

    /// The compact representation of the current approximation.
    fn compact_mat(&self) -> CompactMat<'_, T>;
}

// ---------------------------------
// shared storage for the two limited-memory schemes
// ---------------------------------

struct CompactStore<T> {
    msub: usize,
    nvars: usize,
    /// stored secant pairs, oldest first
    svecs: Vec<Vec<T>>,
    yvecs: Vec<Vec<T>>,
    /// assembled compact data
    b0: T,
    d: Vec<T>,
    M: Vec<T>,
    Z: Vec<Vec<T>>,
    Mlu: LuFactor<T>,
    /// scratch for mult (length 2*msub)
    ztmp: Vec<T>,
    /// scratch for update curvature checks (length nvars)
    vtmp: Vec<T>,
}

impl<T: FloatT> CompactStore<T> {
    fn new(nvars: usize, msub: usize, zwidth: usize) -> Self {
        Self {
            msub,
            nvars,
            svecs: Vec::with_capacity(msub),
            yvecs: Vec::with_capacity(msub),
            b0: T::one(),
            d: Vec::with_capacity(zwidth * msub),
            M: vec![T::zero(); (zwidth * msub) * (zwidth * msub)],
            Z: Vec::with_capacity(zwidth * msub),
            Mlu: LuFactor::new(zwidth * msub),
            ztmp: vec![T::zero(); zwidth * msub],
            vtmp: vec![T::zero(); nvars],
        }
    }

    fn npairs(&self) -> usize {
        self.svecs.len()
    }

    fn reset(&mut self) {
        self.svecs.clear();
        self.yvecs.clear();
        self.d.clear();
        self.Z.clear();
        self.b0 = T::one();
    }

    /// Retire the oldest pair if at capacity, then store `(s, y)`.
    fn push_pair(&mut self, s: &[T], y: &[T]) {
        if self.svecs.len() == self.msub {
            // rotate the storage handles; no data copy
            self.svecs.rotate_left(1);
            self.yvecs.rotate_left(1);
            self.svecs.last_mut().unwrap().copy_from(s);
            self.yvecs.last_mut().unwrap().copy_from(y);
        } else {
            self.svecs.push(s.to_vec());
            self.yvecs.push(y.to_vec());
        }
    }

    /// All pairwise products SᵀS and SᵀY combined in one reduction.
    fn pair_products<C: ProcComm>(&self, comm: &C) -> PairProducts<T> {
        let k = self.npairs();
        let mut buf = vec![T::zero(); 2 * k * k];
        {
            let (ss, sy) = buf.split_at_mut(k * k);
            for j in 0..k {
                for i in 0..k {
                    ss[i + j * k] = self.svecs[i].dot(&self.svecs[j]);
                    sy[i + j * k] = self.svecs[i].dot(&self.yvecs[j]);
                }
            }
        }
        comm.allreduce_sum(&mut buf);
        PairProducts { k, buf }
    }
}

struct PairProducts<T> {
    k: usize,
    buf: Vec<T>,
}

impl<T: FloatT> PairProducts<T> {
    fn ss(&self, i: usize, j: usize) -> T {
        self.buf[i + j * self.k]
    }
    fn sy(&self, i: usize, j: usize) -> T {
        self.buf[self.k * self.k + i + j * self.k]
    }
}

// ---------------------------------
// compact L-BFGS
// ---------------------------------

/// Limited-memory BFGS in the compact representation
/// `B = σI − [σS Y]·N⁻¹·[σS Y]ᵀ` with
/// `N = [[σSᵀS, L], [Lᵀ, −D]]`, `L` the strictly lower triangle of `SᵀY`
/// and `D = diag(sᵢᵀyᵢ)`.
pub struct Lbfgs<T, C> {
    store: CompactStore<T>,
    comm: C,
}

impl<T, C> Lbfgs<T, C>
where
    T: FloatT,
    C: ProcComm,
{
    pub fn new(comm: C, nvars: usize, msub: usize) -> Self {
        Self {
            store: CompactStore::new(nvars, msub, 2),
            comm,
        }
    }

    /// Rebuild d, M, Z and the M factorization from the stored pairs.
    fn assemble(&mut self) -> Result<(), DenseFactorizationError> {
        let store = &mut self.store;
        let k = store.npairs();
        let q = 2 * k;
        let b0 = store.b0;

        let prods = store.pair_products(&self.comm);

        store.d.clear();
        store.d.resize(k, b0);
        store.d.resize(q, T::one());

        store.M[..q * q].set(T::zero());
        for j in 0..k {
            for i in 0..k {
                // (1,1) block: b0*S^T S
                store.M[i + j * q] = b0 * prods.ss(i, j);
                // (1,2) block: L, strictly lower triangle of S^T Y
                if i > j {
                    store.M[i + (k + j) * q] = prods.sy(i, j);
                    store.M[(k + j) + i * q] = prods.sy(i, j);
                }
            }
            // (2,2) block: -D
            store.M[(k + j) + (k + j) * q] = -prods.sy(j, j);
        }

        store.Z.clear();
        for s in &store.svecs {
            store.Z.push(s.clone());
        }
        for y in &store.yvecs {
            store.Z.push(y.clone());
        }

        if q > 0 {
            store.Mlu.factor(&store.M[..q * q], q)?;
        }
        Ok(())
    }
}

impl<T, C> CompactQuasiNewton<T> for Lbfgs<T, C>
where
    T: FloatT,
    C: ProcComm,
{
    fn max_subspace_size(&self) -> usize {
        2 * self.store.msub
    }

    fn update(&mut self, _x: &[T], _z: &[T], _zw: &[T], s: &[T], y: &[T]) -> QnUpdateKind {
        if self.store.msub == 0 {
            return QnUpdateKind::Skipped;
        }

        let mut prods = [s.dot(y), s.dot(s)];
        self.comm.allreduce_sum(&mut prods);
        let [mut sTy, sTs] = prods;

        // curvature guard with Powell damping: replace y by
        // theta*y + (1-theta)*B*s when s^T y < 0.2 s^T B s
        let mut kind = QnUpdateKind::Applied;
        let mut bs = std::mem::take(&mut self.store.vtmp);
        qn_apply(&mut self.store, &self.comm, T::one(), s, T::zero(), &mut bs);
        let mut dots = [s.dot(&bs)];
        self.comm.allreduce_sum(&mut dots);
        let sTBs = dots[0];

        if sTy.real_part() < <f64 as AsFloatT<T>>::as_T(&0.2) * sTBs.real_part() {
            let denom = sTBs - sTy;
            if denom.real_part() <= T::zero() {
                self.store.vtmp = bs;
                return QnUpdateKind::Skipped;
            }
            // bs becomes the damped gradient difference
            let theta = <f64 as AsFloatT<T>>::as_T(&0.8) * sTBs / denom;
            bs.scale(T::one() - theta).axpy(theta, y);
            sTy = theta * sTy + (T::one() - theta) * sTBs;
            kind = QnUpdateKind::Damped;
        } else {
            bs.copy_from(y);
        }

        let mut dots = [bs.dot(&bs)];
        self.comm.allreduce_sum(&mut dots);
        let yTy = dots[0];

        // reject pairs with no usable curvature
        if sTy.real_part() <= T::epsilon() * (sTs * yTy).sqrt().real_part() {
            self.store.vtmp = bs;
            return QnUpdateKind::Skipped;
        }

        self.store.push_pair(s, &bs);
        self.store.b0 = yTy / sTy;
        self.store.vtmp = bs;
        if self.assemble().is_err() {
            // a singular compact system cannot be applied; start over
            self.store.reset();
            return QnUpdateKind::Skipped;
        }
        kind
    }

    fn reset(&mut self) {
        self.store.reset();
    }

    fn mult(&mut self, v: &[T], out: &mut [T]) {
        qn_apply(&mut self.store, &self.comm, T::one(), v, T::zero(), out);
    }

    fn mult_add(&mut self, alpha: T, v: &[T], out: &mut [T]) {
        qn_apply(&mut self.store, &self.comm, alpha, v, T::one(), out);
    }

    fn compact_mat(&self) -> CompactMat<'_, T> {
        let q = self.store.Z.len();
        CompactMat {
            b0: self.store.b0,
            d: &self.store.d[..q],
            M: &self.store.M[..q * q],
            Z: &self.store.Z,
        }
    }
}

// ---------------------------------
// compact L-SR1
// ---------------------------------

/// Limited-memory SR1 in the compact representation
/// `B = σI + (Y − σS)·(D + L + Lᵀ − σSᵀS)⁻¹·(Y − σS)ᵀ`, mapped onto the
/// shared sign convention with `Z = Y − σS`, `d = 1` and
/// `M = −(D + L + Lᵀ − σSᵀS)`.
pub struct Lsr1<T, C> {
    store: CompactStore<T>,
    comm: C,
}

impl<T, C> Lsr1<T, C>
where
    T: FloatT,
    C: ProcComm,
{
    pub fn new(comm: C, nvars: usize, msub: usize) -> Self {
        Self {
            store: CompactStore::new(nvars, msub, 1),
            comm,
        }
    }

    fn assemble(&mut self) -> Result<(), DenseFactorizationError> {
        let store = &mut self.store;
        let k = store.npairs();
        let b0 = store.b0;

        let prods = store.pair_products(&self.comm);

        store.d.clear();
        store.d.resize(k, T::one());

        store.M[..k * k].set(T::zero());
        for j in 0..k {
            for i in 0..k {
                let mut m = -b0 * prods.ss(i, j);
                if i == j {
                    m += prods.sy(i, i);
                } else if i > j {
                    m += prods.sy(i, j);
                } else {
                    m += prods.sy(j, i);
                }
                store.M[i + j * k] = -m;
            }
        }

        store.Z.clear();
        for (s, y) in store.svecs.iter().zip(&store.yvecs) {
            let mut zi = y.clone();
            zi.axpy(-b0, s);
            store.Z.push(zi);
        }

        if k > 0 {
            store.Mlu.factor(&store.M[..k * k], k)?;
        }
        Ok(())
    }
}

impl<T, C> CompactQuasiNewton<T> for Lsr1<T, C>
where
    T: FloatT,
    C: ProcComm,
{
    fn max_subspace_size(&self) -> usize {
        self.store.msub
    }

    fn update(&mut self, _x: &[T], _z: &[T], _zw: &[T], s: &[T], y: &[T]) -> QnUpdateKind {
        if self.store.msub == 0 {
            return QnUpdateKind::Skipped;
        }

        // skip when (y - B s) is nearly orthogonal to s
        let mut r = std::mem::take(&mut self.store.vtmp);
        qn_apply(&mut self.store, &self.comm, -T::one(), s, T::zero(), &mut r);
        r.axpy(T::one(), y);
        let mut dots = [s.dot(&r), s.dot(s), r.dot(&r), s.dot(y), y.dot(y)];
        self.comm.allreduce_sum(&mut dots);
        let [sTr, sTs, rTr, sTy, yTy] = dots;
        self.store.vtmp = r;

        let tol: T = (1e-8).as_T();
        if sTr.abs().real_part() <= (tol * (sTs * rTr).sqrt()).real_part() {
            return QnUpdateKind::Skipped;
        }

        self.store.push_pair(s, y);
        if sTy.real_part() > T::zero() {
            self.store.b0 = yTy / sTy;
        }
        if self.assemble().is_err() {
            self.store.reset();
            return QnUpdateKind::Skipped;
        }
        QnUpdateKind::Applied
    }

    fn reset(&mut self) {
        self.store.reset();
    }

    fn mult(&mut self, v: &[T], out: &mut [T]) {
        qn_apply(&mut self.store, &self.comm, T::one(), v, T::zero(), out);
    }

    fn mult_add(&mut self, alpha: T, v: &[T], out: &mut [T]) {
        qn_apply(&mut self.store, &self.comm, alpha, v, T::one(), out);
    }

    fn compact_mat(&self) -> CompactMat<'_, T> {
        let q = self.store.Z.len();
        CompactMat {
            b0: self.store.b0,
            d: &self.store.d[..q],
            M: &self.store.M[..q * q],
            Z: &self.store.Z,
        }
    }
}

/// `out = beta*out + alpha*B*v`, with the Zᵀv products combined across
/// ranks in a single reduction.
fn qn_apply<T: FloatT, C: ProcComm>(
    store: &mut CompactStore<T>,
    comm: &C,
    alpha: T,
    v: &[T],
    beta: T,
    out: &mut [T],
) {
    debug_assert_eq!(v.len(), store.nvars);
    out.axpby(alpha * store.b0, v, beta);

    let q = store.Z.len();
    if q == 0 {
        return;
    }
    for i in 0..q {
        store.ztmp[i] = store.Z[i].dot(v);
    }
    comm.allreduce_sum(&mut store.ztmp[..q]);
    for i in 0..q {
        store.ztmp[i] *= store.d[i];
    }
    store.Mlu.solve(&mut store.ztmp[..q]);
    for i in 0..q {
        let w = alpha * store.d[i] * store.ztmp[i];
        out.axpy(-w, &store.Z[i]);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::SerialComm;

    fn secant_residual(qn: &mut dyn CompactQuasiNewton<f64>, s: &[f64], y: &[f64]) -> f64 {
        let mut bs = vec![0.0; s.len()];
        qn.mult(s, &mut bs);
        bs.iter()
            .zip(y)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_lbfgs_secant() {
        let mut qn = Lbfgs::new(SerialComm::new(), 3, 5);
        let s = [1.0, 0.5, -0.25];
        let y = [2.0, 1.5, -0.75];
        assert_eq!(qn.update(&[], &[], &[], &s, &y), QnUpdateKind::Applied);

        // compact BFGS reproduces the most recent secant pair exactly
        assert!(secant_residual(&mut qn, &s, &y) < 1e-12);

        let s2 = [0.0, 1.0, 1.0];
        let y2 = [0.5, 3.0, 2.0];
        assert_eq!(qn.update(&[], &[], &[], &s2, &y2), QnUpdateKind::Applied);
        assert!(secant_residual(&mut qn, &s2, &y2) < 1e-12);
    }

    #[test]
    fn test_lbfgs_negative_curvature_is_guarded() {
        let mut qn = Lbfgs::new(SerialComm::new(), 2, 5);
        let s = [1.0, 0.0];
        let y = [-2.0, 0.0];
        // s^T y < 0: either damped into a usable pair or skipped
        let kind = qn.update(&[], &[], &[], &s, &y);
        assert_ne!(kind, QnUpdateKind::Applied);
    }

    #[test]
    fn test_lbfgs_retires_oldest_pair() {
        let mut qn = Lbfgs::new(SerialComm::new(), 2, 1);
        qn.update(&[], &[], &[], &[1.0, 0.0], &[2.0, 0.0]);
        qn.update(&[], &[], &[], &[0.0, 1.0], &[0.0, 3.0]);
        assert_eq!(qn.compact_mat().size(), 2);
        // only the newest pair remains
        assert!(secant_residual(&mut qn, &[0.0, 1.0], &[0.0, 3.0]) < 1e-12);
    }

    #[test]
    fn test_lsr1_secant() {
        let mut qn = Lsr1::new(SerialComm::new(), 3, 5);
        let s = [1.0, 0.0, 0.5];
        let y = [3.0, 0.5, 0.25];
        assert_eq!(qn.update(&[], &[], &[], &s, &y), QnUpdateKind::Applied);
        assert!(secant_residual(&mut qn, &s, &y) < 1e-10);
    }

    #[test]
    fn test_compact_mat_matches_mult() {
        // reconstruct B*v from the compact pieces and compare with mult()
        let mut qn = Lbfgs::new(SerialComm::new(), 3, 5);
        qn.update(&[], &[], &[], &[1.0, 0.5, -0.25], &[2.0, 1.5, -0.75]);
        qn.update(&[], &[], &[], &[0.0, 1.0, 1.0], &[0.5, 3.0, 2.0]);

        let v = [0.3, -1.2, 0.7];
        let (b0, d, m, z) = {
            let cm = qn.compact_mat();
            (cm.b0, cm.d.to_vec(), cm.M.to_vec(), cm.Z.to_vec())
        };
        let q = z.len();

        // w = D Z^T v
        let mut w: Vec<f64> = (0..q).map(|i| d[i] * z[i].dot(&v[..])).collect();
        // solve M u = w
        let mut lu = crate::algebra::LuFactor::new(q);
        lu.factor(&m, q).unwrap();
        lu.solve(&mut w);
        // B v = b0 v - Z D w
        let mut bv: Vec<f64> = v.iter().map(|vi| b0 * vi).collect();
        for i in 0..q {
            bv.axpy(-d[i] * w[i], &z[i]);
        }

        let mut out = vec![0.0; 3];
        qn.mult(&v, &mut out);
        for (a, b) in out.iter().zip(&bv) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reset_clears_subspace() {
        let mut qn = Lbfgs::new(SerialComm::new(), 2, 4);
        qn.update(&[], &[], &[], &[1.0, 0.0], &[2.0, 0.0]);
        assert!(qn.compact_mat().size() > 0);
        qn.reset();
        assert_eq!(qn.compact_mat().size(), 0);

        // after reset the operator is b0*I with b0 = 1
        let mut out = vec![0.0; 2];
        qn.mult(&[3.0, -4.0], &mut out);
        assert_eq!(out, vec![3.0, -4.0]);
    }
}
