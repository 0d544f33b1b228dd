#![allow(non_snake_case)]
#![allow(clippy::too_many_arguments)]

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

/// The diagonal-Hessian KKT preconditioner and its low-rank quasi-Newton
/// correction.
///
/// Assembly produces, in order:
///
/// ```text
/// C  = diag( b0 + σ + zl/(x - lb) + zu/(ub - x) )    stored as C⁻¹
/// Cw = Zw⁻¹ Sw + Aw C⁻¹ Awᵀ                           factored per block
/// Ew[k] = Aw (C⁻¹ Ac[k])
/// D  = Ac C⁻¹ Acᵀ - Ewᵀ Cw⁻¹ Ew (+ S Z⁻¹ + T Zt⁻¹)    LU on the root rank
/// Ce = Zᵀ K⁻¹ Z - diag(d)⁻¹ M diag(d)⁻¹               LU, every rank
/// ```
///
/// D is reduced to the root, factored there and the factored data
/// broadcast, so the multiplier solves are bit-identical on every rank.
///
/// All solve entry points work out of two caller-provided scratch vectors
/// and never allocate; a scratch vector must not alias an input or output
/// of the same call.
pub(crate) struct KktSystem<T> {
    nvars: usize,
    ncon: usize,
    nwcon: usize,
    nwblock: usize,

    /// C⁻¹ diagonal
    pub cvec: Vec<T>,
    /// block-diagonal Cw, factored in place
    cw: BlockCholesky<T>,
    /// Ew[k] = Aw C⁻¹ Ac[k]
    ew: Vec<Vec<T>>,
    /// the bordered multiplier system
    dmat: Vec<T>,
    dlu: LuFactor<T>,
    /// quasi-Newton Schur complement
    ce: Vec<T>,
    celu: LuFactor<T>,
    /// current low-rank subspace size (0 disables the correction)
    pub qn_size: usize,
}

impl<T> KktSystem<T>
where
    T: FloatT,
{
    pub fn new(sizes: &ProblemSizes, max_qn_subspace: usize) -> Self {
        Self {
            nvars: sizes.nvars,
            ncon: sizes.ncon,
            nwcon: sizes.nwcon,
            nwblock: sizes.nwblock,
            cvec: vec![T::zero(); sizes.nvars],
            cw: BlockCholesky::new(sizes.nwcon, sizes.nwblock),
            ew: vec![vec![T::zero(); sizes.nwcon]; sizes.ncon],
            dmat: vec![T::zero(); sizes.ncon * sizes.ncon],
            dlu: LuFactor::new(sizes.ncon),
            ce: vec![T::zero(); max_qn_subspace * max_qn_subspace],
            celu: LuFactor::new(max_qn_subspace),
            qn_size: 0,
        }
    }

    /// Assemble and factor C, Cw, Ew and D at the current iterate.
    ///
    /// `b0` is the scalar diagonal of the approximate Hessian (from the
    /// quasi-Newton compact data, or zero); `hdiag` overrides it with the
    /// problem's diagonal Hessian when provided.
    pub fn setup_diag<P, C>(
        &mut self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        b0: T,
        hdiag: Option<&[T]>,
        qn_sigma: T,
        max_bound_val: T,
        xtmp: &mut [T],
        wtmp: &mut [T],
    ) -> Result<(), DenseFactorizationError>
    where
        P: Problem<T>,
        C: ProcComm,
    {
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        // C^{-1} = 1/(b0 + sigma + zl/(x - lb) + zu/(ub - x)), dropping
        // the terms at absent bounds
        for i in 0..nvars {
            let mut diag = hdiag.map_or(b0, |h| h[i]) + qn_sigma;
            if flags.use_lower && data.has_lb(i, max_bound_val) {
                diag += vars.zl[i] / (vars.x[i] - data.lb[i]);
            }
            if flags.use_upper && data.has_ub(i, max_bound_val) {
                diag += vars.zu[i] / (data.ub[i] - vars.x[i]);
            }
            self.cvec[i] = T::recip(diag);
        }

        if nwcon > 0 {
            // Cw = Zw^{-1}*Sw + Aw*C^{-1}*Aw^T
            self.cw.zero();
            if flags.sparse_inequality {
                let cwdata = self.cw.data_mut();
                if self.nwblock == 1 {
                    for i in 0..nwcon {
                        cwdata[i] = vars.sw[i] / vars.zw[i];
                    }
                } else {
                    let incr = triangular_number(self.nwblock);
                    for (blk, i0) in (0..nwcon).step_by(self.nwblock).enumerate() {
                        for j in 0..self.nwblock {
                            cwdata[blk * incr + triangular_number(j + 1) - 1] =
                                vars.sw[i0 + j] / vars.zw[i0 + j];
                        }
                    }
                }
            }
            prob.add_sparse_inner_product(T::one(), &vars.x, &self.cvec, self.cw.data_mut());
            self.cw.factor()?;

            // Ew[k] = Aw*(C^{-1}*Ac[k])
            for k in 0..ncon {
                for i in 0..nvars {
                    xtmp[i] = self.cvec[i] * data.Ac[k][i];
                }
                self.ew[k].set(T::zero());
                prob.add_sparse_jacobian(T::one(), &vars.x, xtmp, &mut self.ew[k]);
            }
        }

        // D = Ac*C^{-1}*Ac^T - Ew^T*Cw^{-1}*Ew, lower triangle first
        self.dmat.set(T::zero());

        if nwcon > 0 {
            for j in 0..ncon {
                wtmp.copy_from(&self.ew[j]);
                self.cw.solve(wtmp);
                for i in j..ncon {
                    self.dmat[i + ncon * j] = self.dmat[i + ncon * j] - self.ew[i].dot(wtmp);
                }
            }
        }

        for j in 0..ncon {
            for i in j..ncon {
                self.dmat[i + ncon * j] =
                    self.dmat[i + ncon * j] + data.Ac[i].dot_scaled(&data.Ac[j], &self.cvec);
            }
        }

        // mirror into the upper triangle
        for j in 0..ncon {
            for i in (j + 1)..ncon {
                self.dmat[j + ncon * i] = self.dmat[i + ncon * j];
            }
        }

        if ncon > 0 {
            // reduce to the root, complete the diagonal there, then
            // broadcast so the factorization is identical on every rank
            comm.reduce_sum_root(&mut self.dmat);
            if comm.is_root() && flags.dense_inequality {
                for i in 0..ncon {
                    self.dmat[i * (ncon + 1)] +=
                        vars.s[i] / vars.z[i] + vars.t[i] / vars.zt[i];
                }
            }
            comm.broadcast_root(&mut self.dmat);

            self.dlu.factor(&self.dmat, ncon)?;
        }

        Ok(())
    }

    /// Assemble and factor the quasi-Newton Schur complement
    /// `Ce = Zᵀ K⁻¹ Z − diag(d)⁻¹ M diag(d)⁻¹`.
    pub fn setup_schur<P, C>(
        &mut self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        qn: Option<&CompactMat<T>>,
        ztmp: &mut [T],
        xtmp1: &mut [T],
        xtmp2: &mut [T],
        wtmp: &mut [T],
    ) -> Result<(), DenseFactorizationError>
    where
        P: Problem<T>,
        C: ProcComm,
    {
        self.qn_size = 0;
        let Some(cm) = qn else {
            return Ok(());
        };
        let q = cm.size();
        if q == 0 {
            return Ok(());
        }

        for i in 0..q {
            // K^{-1}*Z[i], design component only
            self.solve_diag_yx_only(
                prob,
                comm,
                vars,
                data,
                flags,
                max_bound_val,
                &cm.Z[i],
                xtmp1,
                ztmp,
                xtmp2,
                wtmp,
            );

            // column i of Z^T K^{-1} Z
            for j in 0..q {
                self.ce[j + i * q] = xtmp1.dot(&cm.Z[j]);
            }
            comm.allreduce_sum(&mut self.ce[i * q..(i + 1) * q]);
        }

        for j in 0..q {
            for i in 0..q {
                self.ce[i + j * q] =
                    self.ce[i + j * q] - cm.M[i + j * q] / (cm.d[i] * cm.d[j]);
            }
        }

        self.celu.factor(&self.ce[..q * q], q)?;
        self.qn_size = q;
        Ok(())
    }

    /// Full diagonal-system solve `y = K⁻¹ b`.
    ///
    /// Every block of the right-hand side participates; see the variants
    /// below for the reduced entry points used in the inner loops.
    pub fn solve_diag<P, C>(
        &self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        b: &PrimalDualVec<T>,
        y: &mut PrimalDualVec<T>,
        xtmp: &mut [T],
        wtmp: &mut [T],
    ) where
        P: Problem<T>,
        C: ProcComm,
    {
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        // xtmp = C^{-1}*d = C^{-1}*(bx + (X - Xl)^{-1}*bzl - (Xu - X)^{-1}*bzu)
        for i in 0..nvars {
            xtmp[i] = self.cvec[i] * b.x[i];
        }
        if flags.use_lower {
            for i in 0..nvars {
                if data.has_lb(i, max_bound_val) {
                    xtmp[i] += self.cvec[i] * (b.zl[i] / (vars.x[i] - data.lb[i]));
                }
            }
        }
        if flags.use_upper {
            for i in 0..nvars {
                if data.has_ub(i, max_bound_val) {
                    xtmp[i] -= self.cvec[i] * (b.zu[i] / (data.ub[i] - vars.x[i]));
                }
            }
        }

        // wtmp = Cw^{-1}*(bcw + Zw^{-1}*bsw - Aw*C^{-1}*d)
        if nwcon > 0 {
            wtmp.copy_from(&b.zw);
            if flags.sparse_inequality {
                for i in 0..nwcon {
                    wtmp[i] += b.sw[i] / vars.zw[i];
                }
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);
        }

        // yz = bc + Z^{-1}*bs - Zt^{-1}*(bzt + T*bt) - Ac*C^{-1}*d - Ew^T*wtmp
        self.reduce_multiplier_rhs(comm, data, xtmp, wtmp, &mut y.z);
        if ncon > 0 {
            if comm.is_root() {
                if flags.dense_inequality {
                    for i in 0..ncon {
                        y.z[i] = b.z[i] + b.s[i] / vars.z[i]
                            - (b.zt[i] + vars.t[i] * b.t[i]) / vars.zt[i]
                            - y.z[i];
                    }
                } else {
                    for i in 0..ncon {
                        y.z[i] = b.z[i] - y.z[i];
                    }
                }
                self.dlu.solve(&mut y.z);
            }
            comm.broadcast_root(&mut y.z);

            if flags.dense_inequality {
                for i in 0..ncon {
                    y.s[i] = (b.s[i] - vars.s[i] * y.z[i]) / vars.z[i];
                    y.zt[i] = -b.t[i] - y.z[i];
                    y.t[i] = (b.zt[i] - vars.t[i] * y.zt[i]) / vars.zt[i];
                }
            } else {
                y.s.set(T::zero());
                y.t.set(T::zero());
                y.zt.set(T::zero());
            }
        }

        // yzw = Cw^{-1}*(bcw + Zw^{-1}*bsw - Ew*yz - Aw*C^{-1}*d)
        if nwcon > 0 {
            y.zw.copy_from(&b.zw);
            for i in 0..ncon {
                y.zw.axpy(-y.z[i], &self.ew[i]);
            }
            if flags.sparse_inequality {
                for i in 0..nwcon {
                    y.zw[i] += b.sw[i] / vars.zw[i];
                }
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, &mut y.zw);
            self.cw.solve(&mut y.zw);

            if flags.sparse_inequality {
                // ysw = Zw^{-1}*(bsw - Sw*yzw)
                for i in 0..nwcon {
                    y.sw[i] = (b.sw[i] - vars.sw[i] * y.zw[i]) / vars.zw[i];
                }
            }
        }

        // yx = C^{-1}*(Ac^T*yz + Aw^T*yzw) + C^{-1}*d
        self.recover_yx(prob, vars, data, xtmp, &y.z, &y.zw, &mut y.x);

        // bound multiplier steps, zero at absent bounds
        y.zl.set(T::zero());
        if flags.use_lower {
            for i in 0..nvars {
                if data.has_lb(i, max_bound_val) {
                    y.zl[i] = (b.zl[i] - vars.zl[i] * y.x[i]) / (vars.x[i] - data.lb[i]);
                }
            }
        }
        y.zu.set(T::zero());
        if flags.use_upper {
            for i in 0..nvars {
                if data.has_ub(i, max_bound_val) {
                    y.zu[i] = (b.zu[i] + vars.zu[i] * y.x[i]) / (data.ub[i] - vars.x[i]);
                }
            }
        }
    }

    /// Diagonal solve for a right-hand side whose only nonzero block is
    /// the design component `bx`.  Used by the low-rank Schur correction.
    pub fn solve_diag_bx<P, C>(
        &self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        bx: &[T],
        y: &mut PrimalDualVec<T>,
        xtmp: &mut [T],
        wtmp: &mut [T],
    ) where
        P: Problem<T>,
        C: ProcComm,
    {
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        for i in 0..nvars {
            xtmp[i] = self.cvec[i] * bx[i];
        }

        if nwcon > 0 {
            wtmp.set(T::zero());
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);
        }

        self.reduce_multiplier_rhs(comm, data, xtmp, wtmp, &mut y.z);
        if ncon > 0 {
            if comm.is_root() {
                for i in 0..ncon {
                    y.z[i] = -y.z[i];
                }
                self.dlu.solve(&mut y.z);
            }
            comm.broadcast_root(&mut y.z);

            if flags.dense_inequality {
                for i in 0..ncon {
                    y.s[i] = -(vars.s[i] * y.z[i]) / vars.z[i];
                    y.zt[i] = -y.z[i];
                    y.t[i] = -vars.t[i] * y.zt[i] / vars.zt[i];
                }
            } else {
                y.s.set(T::zero());
                y.t.set(T::zero());
                y.zt.set(T::zero());
            }
        }

        if nwcon > 0 {
            y.zw.set(T::zero());
            for i in 0..ncon {
                y.zw.axpy(-y.z[i], &self.ew[i]);
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, &mut y.zw);
            self.cw.solve(&mut y.zw);

            if flags.sparse_inequality {
                for i in 0..nwcon {
                    y.sw[i] = -(vars.sw[i] * y.zw[i]) / vars.zw[i];
                }
            }
        }

        self.recover_yx(prob, vars, data, xtmp, &y.z, &y.zw, &mut y.x);

        y.zl.set(T::zero());
        if flags.use_lower {
            for i in 0..nvars {
                if data.has_lb(i, max_bound_val) {
                    y.zl[i] = -(vars.zl[i] * y.x[i]) / (vars.x[i] - data.lb[i]);
                }
            }
        }
        y.zu.set(T::zero());
        if flags.use_upper {
            for i in 0..nvars {
                if data.has_ub(i, max_bound_val) {
                    y.zu[i] = (vars.zu[i] * y.x[i]) / (data.ub[i] - vars.x[i]);
                }
            }
        }
    }

    /// Fast path of [`solve_diag_bx`](Self::solve_diag_bx) producing the
    /// design component only; `ztmp` holds the multiplier solve.
    pub fn solve_diag_yx_only<P, C>(
        &self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        bx: &[T],
        yx: &mut [T],
        ztmp: &mut [T],
        xtmp: &mut [T],
        wtmp: &mut [T],
    ) where
        P: Problem<T>,
        C: ProcComm,
    {
        let _ = (flags, max_bound_val);
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        for i in 0..nvars {
            xtmp[i] = self.cvec[i] * bx[i];
        }

        if nwcon > 0 {
            wtmp.set(T::zero());
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);
        }

        let yz = &mut ztmp[..ncon];
        self.reduce_multiplier_rhs(comm, data, xtmp, wtmp, yz);
        if ncon > 0 {
            if comm.is_root() {
                yz.negate();
                self.dlu.solve(yz);
            }
            comm.broadcast_root(yz);
        }

        if nwcon > 0 {
            // wtmp becomes yzw
            wtmp.set(T::zero());
            for i in 0..ncon {
                wtmp.axpy(-yz[i], &self.ew[i]);
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);
        }

        self.recover_yx(prob, vars, data, xtmp, yz, wtmp, yx);
    }

    /// Diagonal solve with the design block `bx` separate and the
    /// remaining right-hand side `b` scaled by `alpha`.  Produces the
    /// design, slack and multiplier components used by the Krylov loop;
    /// the sparse multiplier solution is left in `wtmp`.
    pub fn solve_diag_scaled<P, C>(
        &self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        bx: &[T],
        alpha: T,
        b: &PrimalDualVec<T>,
        yx: &mut [T],
        yt: &mut [T],
        yz: &mut [T],
        ys: &mut [T],
        ysw: &mut [T],
        xtmp: &mut [T],
        wtmp: &mut [T],
    ) where
        P: Problem<T>,
        C: ProcComm,
    {
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        for i in 0..nvars {
            xtmp[i] = self.cvec[i] * bx[i];
        }
        if flags.use_lower {
            for i in 0..nvars {
                if data.has_lb(i, max_bound_val) {
                    xtmp[i] += alpha * self.cvec[i] * (b.zl[i] / (vars.x[i] - data.lb[i]));
                }
            }
        }
        if flags.use_upper {
            for i in 0..nvars {
                if data.has_ub(i, max_bound_val) {
                    xtmp[i] -= alpha * self.cvec[i] * (b.zu[i] / (data.ub[i] - vars.x[i]));
                }
            }
        }

        if nwcon > 0 {
            wtmp.copy_from(&b.zw);
            wtmp.scale(alpha);
            if flags.sparse_inequality {
                for i in 0..nwcon {
                    wtmp[i] += alpha * b.sw[i] / vars.zw[i];
                }
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);
        }

        let yz = &mut yz[..ncon];
        self.reduce_multiplier_rhs(comm, data, xtmp, wtmp, yz);
        if ncon > 0 {
            if comm.is_root() {
                if flags.dense_inequality {
                    for i in 0..ncon {
                        yz[i] = alpha
                            * (b.z[i] + b.s[i] / vars.z[i]
                                - (b.zt[i] + vars.t[i] * b.t[i]) / vars.zt[i])
                            - yz[i];
                    }
                } else {
                    for i in 0..ncon {
                        yz[i] = alpha * b.z[i] - yz[i];
                    }
                }
                self.dlu.solve(yz);
            }
            comm.broadcast_root(yz);

            if flags.dense_inequality {
                for i in 0..ncon {
                    ys[i] = (alpha * b.s[i] - vars.s[i] * yz[i]) / vars.z[i];
                    let yzt = -alpha * b.t[i] - yz[i];
                    yt[i] = (alpha * b.zt[i] - vars.t[i] * yzt) / vars.zt[i];
                }
            } else {
                ys[..ncon].set(T::zero());
                yt[..ncon].set(T::zero());
            }
        }

        if nwcon > 0 {
            // wtmp becomes yzw
            wtmp.copy_from(&b.zw);
            wtmp.scale(alpha);
            for i in 0..ncon {
                wtmp.axpy(-yz[i], &self.ew[i]);
            }
            if flags.sparse_inequality {
                for i in 0..nwcon {
                    wtmp[i] += alpha * b.sw[i] / vars.zw[i];
                }
            }
            prob.add_sparse_jacobian(-T::one(), &vars.x, xtmp, wtmp);
            self.cw.solve(wtmp);

            if flags.sparse_inequality {
                for i in 0..nwcon {
                    ysw[i] = (alpha * b.sw[i] - vars.sw[i] * wtmp[i]) / vars.zw[i];
                }
            }
        }

        self.recover_yx(prob, vars, data, xtmp, yz, wtmp, yx);
    }

    /// Apply the low-rank quasi-Newton correction to a completed diagonal
    /// solve:  `y -= K⁻¹ Z Ce⁻¹ Zᵀ yx`.  `scratch` is destroyed.
    pub fn apply_schur<P, C>(
        &self,
        prob: &mut P,
        comm: &C,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        flags: ProblemFlags,
        max_bound_val: T,
        qn: &CompactMat<T>,
        y: &mut PrimalDualVec<T>,
        scratch: &mut PrimalDualVec<T>,
        ztmp: &mut [T],
        xtmp1: &mut [T],
        xtmp2: &mut [T],
        wtmp: &mut [T],
    ) where
        P: Problem<T>,
        C: ProcComm,
    {
        let q = self.qn_size;
        if q == 0 {
            return;
        }

        // ztmp = Ce^{-1} Z^T yx
        for k in 0..q {
            ztmp[k] = y.x.dot(&qn.Z[k]);
        }
        comm.allreduce_sum(&mut ztmp[..q]);
        if comm.is_root() {
            self.celu.solve(&mut ztmp[..q]);
        }
        comm.broadcast_root(&mut ztmp[..q]);

        // xtmp1 = Z * ztmp
        xtmp1.set(T::zero());
        for k in 0..q {
            xtmp1.axpy(ztmp[k], &qn.Z[k]);
        }

        self.solve_diag_bx(
            prob,
            comm,
            vars,
            data,
            flags,
            max_bound_val,
            xtmp1,
            scratch,
            xtmp2,
            wtmp,
        );

        y.x.axpy(-T::one(), &scratch.x);
        y.zw.axpy(-T::one(), &scratch.zw);
        y.sw.axpy(-T::one(), &scratch.sw);
        y.zl.axpy(-T::one(), &scratch.zl);
        y.zu.axpy(-T::one(), &scratch.zu);
        for i in 0..self.ncon {
            y.z[i] -= scratch.z[i];
            y.s[i] -= scratch.s[i];
            y.t[i] -= scratch.t[i];
            y.zt[i] -= scratch.zt[i];
        }
    }

    /// Solve `Ce u = v` in place (used by the Krylov loop's design-only
    /// correction).
    pub fn solve_schur<C: ProcComm>(&self, comm: &C, v: &mut [T]) {
        let q = self.qn_size;
        if q == 0 {
            return;
        }
        comm.allreduce_sum(&mut v[..q]);
        if comm.is_root() {
            self.celu.solve(&mut v[..q]);
        }
        comm.broadcast_root(&mut v[..q]);
    }

    // yz_local = Ac*C^{-1}*d + Ew^T*wtmp, reduced to the root rank
    fn reduce_multiplier_rhs<C: ProcComm>(
        &self,
        comm: &C,
        data: &ProblemData<T>,
        d: &[T],
        w: &[T],
        yz: &mut [T],
    ) {
        let ncon = self.ncon;
        if ncon == 0 {
            return;
        }
        for i in 0..ncon {
            yz[i] = if self.nwcon > 0 {
                self.ew[i].dot(w)
            } else {
                T::zero()
            };
            yz[i] += data.Ac[i].dot(d);
        }
        comm.reduce_sum_root(&mut yz[..ncon]);
    }

    // yx = C^{-1}*(Ac^T*yz + Aw^T*yzw) + d
    fn recover_yx<P: Problem<T>>(
        &self,
        prob: &mut P,
        vars: &PrimalDualVec<T>,
        data: &ProblemData<T>,
        d: &[T],
        yz: &[T],
        yzw: &[T],
        yx: &mut [T],
    ) {
        yx.set(T::zero());
        for i in 0..self.ncon {
            yx.axpy(yz[i], &data.Ac[i]);
        }
        if self.nwcon > 0 {
            prob.add_sparse_jacobian_transpose(T::one(), &vars.x, yzw, yx);
        }
        for i in 0..self.nvars {
            yx[i] *= self.cvec[i];
        }
        yx.axpy(T::one(), d);
    }
}

#[cfg(test)]
mod test {
    use crate::solver::*;

    // three bounded variables with one dense inequality constraint
    struct Toy;

    impl Problem<f64> for Toy {
        fn problem_sizes(&self) -> ProblemSizes {
            ProblemSizes {
                nvars: 3,
                ncon: 1,
                nwcon: 0,
                nwblock: 0,
            }
        }

        fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
            x.copy_from_slice(&[2.0, 3.0, 4.0]);
            lb.iter_mut().for_each(|v| *v = 0.0);
            ub.iter_mut().for_each(|v| *v = 10.0);
        }

        fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
            con[0] = x[0] + 2.0 * x[1] + x[2] - 3.0;
            Ok(0.5 * (x[0] * x[0] + 2.0 * x[1] * x[1] + 3.0 * x[2] * x[2]) + x[0] * x[1])
        }

        fn eval_obj_con_gradient(
            &mut self,
            x: &[f64],
            g: &mut [f64],
            ac: &mut [Vec<f64>],
        ) -> Result<(), EvalError> {
            g[0] = x[0] + x[1];
            g[1] = 2.0 * x[1] + x[0];
            g[2] = 3.0 * x[2];
            ac[0].copy_from_slice(&[1.0, 2.0, 1.0]);
            Ok(())
        }
    }

    fn prepared_solver(prob: &mut Toy) -> InteriorPoint<'_, f64, Toy> {
        let settings = SolverSettingsBuilder::default().verbose(false).build().unwrap();
        let mut ip = InteriorPoint::new(prob, settings);
        ip.data.fobj = ip.prob.eval_obj_con(&ip.vars.x, &mut ip.data.c).unwrap();
        ip.prob
            .eval_obj_con_gradient(&ip.vars.x, &mut ip.data.g, &mut ip.data.Ac)
            .unwrap();
        ip
    }

    #[test]
    fn test_diag_solve_round_trip() {
        // applying the diagonal solver to the assembled residual must
        // satisfy every block of the linearized KKT system
        let mu = 0.1;
        let mut prob = Toy;
        let mut ip = prepared_solver(&mut prob);

        ip.compute_kkt_res(mu);
        ip.setup_kkt(false).unwrap();
        ip.compute_kkt_step();

        let tol = 1e-10;
        let (vars, step, res, data) = (&ip.vars, &ip.step, &ip.res, &ip.data);

        // -Ac^T pz - pzl + pzu = rx   (B0 = 0 with the correction off)
        for i in 0..3 {
            let lhs = -data.Ac[0][i] * step.z[0] - step.zl[i] + step.zu[i];
            assert!((lhs - res.x[i]).abs() < tol, "stationarity row {i}");
        }

        // Ac px - ps + pt = rc
        let acp: f64 = (0..3).map(|i| data.Ac[0][i] * step.x[i]).sum();
        assert!((acp - step.s[0] + step.t[0] - res.z[0]).abs() < tol);

        // Z ps + S pz = rs
        assert!(
            (vars.z[0] * step.s[0] + vars.s[0] * step.z[0] - res.s[0]).abs() < tol
        );

        // -pz - pzt = rt
        assert!((-step.z[0] - step.zt[0] - res.t[0]).abs() < tol);

        // T pzt + Zt pt = rzt
        assert!(
            (vars.t[0] * step.zt[0] + vars.zt[0] * step.t[0] - res.zt[0]).abs() < tol
        );

        // Zl px + (X - LB) pzl = rzl  and  -Zu px + (UB - X) pzu = rzu
        for i in 0..3 {
            let dl = vars.x[i] - data.lb[i];
            assert!(
                (vars.zl[i] * step.x[i] + dl * step.zl[i] - res.zl[i]).abs() < tol,
                "lower bound row {i}"
            );
            let du = data.ub[i] - vars.x[i];
            assert!(
                (-vars.zu[i] * step.x[i] + du * step.zu[i] - res.zu[i]).abs() < tol,
                "upper bound row {i}"
            );
        }
    }

    #[test]
    fn test_schur_correction_empty_subspace_is_identity() {
        // with no stored quasi-Newton pairs the corrected step equals the
        // plain diagonal solve
        let mu = 0.1;
        let mut prob = Toy;
        let mut ip = prepared_solver(&mut prob);

        ip.compute_kkt_res(mu);
        ip.setup_kkt(true).unwrap();
        assert_eq!(ip.kkt.qn_size, 0);
        ip.compute_kkt_step();
        let px = ip.step.x.clone();
        let pz = ip.step.z.clone();

        // direct diagonal solve of the same residuals
        ip.kkt.solve_diag(
            &mut *ip.prob,
            &ip.comm,
            &ip.vars,
            &ip.data,
            ip.flags,
            ip.settings.max_bound_val,
            &ip.res,
            &mut ip.step,
            &mut ip.xtmp,
            &mut ip.wtmp,
        );

        assert_eq!(px, ip.step.x);
        assert_eq!(pz, ip.step.z);
    }
}
