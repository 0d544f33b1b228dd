#![allow(non_snake_case)]

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

/// Workspace for the right-preconditioned GMRES solve, allocated once
/// when a Krylov subspace is configured.
///
/// The Arnoldi vectors carry a scalar tail representing the reduced dual
/// block, so the inner product is `wᵢᵀwⱼ + β·αᵢ·αⱼ` with `β` the
/// normalized dual-block weight.  The upper-Hessenberg matrix is stored
/// packed by columns.
pub(crate) struct GmresWorkspace<T> {
    pub w: Vec<Vec<T>>,
    pub h: Vec<T>,
    pub alpha: Vec<T>,
    pub res: Vec<T>,
    pub y: Vec<T>,
    pub fproj: Vec<T>,
    pub aproj: Vec<T>,
    pub awproj: Vec<T>,
    pub qcos: Vec<T>,
    pub qsin: Vec<T>,
}

impl<T: FloatT> GmresWorkspace<T> {
    pub fn new(nvars: usize, subspace: usize) -> Self {
        Self {
            w: (0..subspace + 1).map(|_| vec![T::zero(); nvars]).collect(),
            h: vec![T::zero(); triangular_number(subspace + 2)],
            alpha: vec![T::zero(); subspace + 1],
            res: vec![T::zero(); subspace + 1],
            y: vec![T::zero(); subspace],
            fproj: vec![T::zero(); subspace],
            aproj: vec![T::zero(); subspace],
            awproj: vec![T::zero(); subspace],
            qcos: vec![T::zero(); subspace],
            qsin: vec![T::zero(); subspace],
        }
    }
}

// packed column offset of the upper-Hessenberg matrix
#[inline]
fn hptr(i: usize) -> usize {
    (i + 1) * (i + 2) / 2 - 1
}

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// Directional derivative of `f + barrier + Σγt` along the step held
    /// in `step.{x, s, t, sw}`.  Identical on every rank.
    pub(crate) fn eval_obj_barrier_deriv(&mut self) -> T {
        let mbv = self.settings.max_bound_val;
        let eta = self.settings.rel_bound_barrier;

        let mut pos_presult = T::zero();
        let mut neg_presult = T::zero();

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    let p = eta * self.step.x[i] / (self.vars.x[i] - self.data.lb[i]);
                    if self.step.x[i].real_part() > T::zero().real_part() {
                        pos_presult += p;
                    } else {
                        neg_presult += p;
                    }
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    let p = eta * self.step.x[i] / (self.data.ub[i] - self.vars.x[i]);
                    if self.step.x[i].real_part() > T::zero().real_part() {
                        neg_presult -= p;
                    } else {
                        pos_presult -= p;
                    }
                }
            }
        }

        if self.nwcon > 0 && self.flags.sparse_inequality {
            for i in 0..self.nwcon {
                let p = self.step.sw[i] / self.vars.sw[i];
                if self.step.sw[i].real_part() > T::zero().real_part() {
                    pos_presult += p;
                } else {
                    neg_presult += p;
                }
            }
        }

        let mut buf = [pos_presult, neg_presult, self.data.g.dot(&self.step.x)];
        self.comm.allreduce_sum(&mut buf);
        let [mut pos_presult, mut neg_presult, gdot] = buf;

        if self.flags.dense_inequality {
            for i in 0..self.ncon {
                let p = self.step.s[i] / self.vars.s[i];
                if self.step.s[i].real_part() > T::zero().real_part() {
                    pos_presult += p;
                } else {
                    neg_presult += p;
                }
                let p = self.step.t[i] / self.vars.t[i];
                if self.step.t[i].real_part() > T::zero().real_part() {
                    pos_presult += p;
                } else {
                    neg_presult += p;
                }
            }
        }

        let mut pmerit = gdot - self.barrier_param * (pos_presult + neg_presult);
        if self.flags.dense_inequality {
            for i in 0..self.ncon {
                pmerit += self.penalty_gamma[i] * self.step.t[i];
            }
        }
        pmerit
    }

    /// Inexact-Newton step: solve the exact-Hessian KKT system by GMRES,
    /// right-preconditioned with the factored diagonal system and its
    /// quasi-Newton correction.
    ///
    /// Terminates once the residual meets `max(atol, rtol·‖b‖)` *and* the
    /// assembled step is a descent direction for the objective-barrier
    /// function or reduces the constraint infeasibility.  Returns the
    /// iteration count, negated when the subspace is exhausted without a
    /// usable descent direction (the caller then falls back to the
    /// quasi-Newton step).  The residuals are destroyed.
    pub(crate) fn compute_gmres_step(
        &mut self,
        rtol: T,
        atol: T,
        use_qn: bool,
    ) -> Result<i32, SolverError> {
        let subspace = self.settings.gmres_subspace_size;
        let mut gm = self.gmres.take().expect("gmres workspace not allocated");
        let mbv = self.settings.max_bound_val;
        let (ncon, nwcon) = (self.ncon, self.nwcon);

        // dual-block weight: all residual components outside the design
        // block, normalized by the full residual norm
        let mut tail = T::zero();
        if self.flags.use_lower {
            tail += self.res.zl.sumsq();
        }
        if self.flags.use_upper {
            tail += self.res.zu.sumsq();
        }
        if nwcon > 0 {
            tail += self.res.zw.sumsq();
            if self.flags.sparse_inequality {
                tail += self.res.sw.sumsq();
            }
        }
        let mut buf = [self.res.x.sumsq(), tail];
        self.comm.allreduce_sum(&mut buf);
        let mut beta = buf[1];
        for i in 0..ncon {
            beta += self.res.z[i] * self.res.z[i];
        }
        if self.flags.dense_inequality {
            for i in 0..ncon {
                beta += self.res.s[i] * self.res.s[i]
                    + self.res.t[i] * self.res.t[i]
                    + self.res.zt[i] * self.res.zt[i];
            }
        }
        let bnorm = (buf[0] + beta).sqrt();

        let mut bcast = [bnorm, beta];
        self.comm.broadcast_root(&mut bcast);
        let bnorm = bcast[0];
        let beta = bcast[1] / (bnorm * bnorm);

        // current constraint infeasibilities, for the descent tests
        let mut cinfeas = T::zero();
        for i in 0..ncon {
            let ci = if self.flags.dense_inequality {
                self.data.c[i] - self.vars.s[i] + self.vars.t[i]
            } else {
                self.data.c[i]
            };
            cinfeas += ci * ci;
        }
        let mut cscale = T::zero();
        if cinfeas.real_part() != T::zero().real_part() {
            cinfeas = cinfeas.sqrt();
            cscale = T::recip(cinfeas);
        }

        let mut cwinfeas = T::zero();
        let mut cwscale = T::zero();
        if nwcon > 0 {
            let mut b = [self.res.zw.sumsq()];
            self.comm.allreduce_sum(&mut b);
            cwinfeas = b[0].sqrt();
            if cwinfeas.real_part() != T::zero().real_part() {
                cwscale = T::recip(cwinfeas);
            }
        }

        gm.res[0] = bnorm;
        gm.w[0].copy_from(&self.res.x);
        gm.w[0].scale(T::recip(bnorm));
        gm.alpha[0] = T::one();

        let mut niters: usize = 0;

        self.print_gmres_start(rtol).ok();

        for i in 0..subspace {
            // apply the preconditioner to the combined vector
            // (W[i], alpha[i]) with the residual tail
            self.kkt.solve_diag_scaled(
                &mut *self.prob,
                &self.comm,
                &self.vars,
                &self.data,
                self.flags,
                mbv,
                &gm.w[i],
                gm.alpha[i] / bnorm,
                &self.res,
                &mut self.step.x,
                &mut self.step.t,
                &mut self.step.z,
                &mut self.step.s,
                &mut self.step.sw,
                &mut self.xtmp,
                &mut self.wtmp,
            );

            if use_qn && self.kkt.qn_size > 0 {
                // low-rank correction of the design component
                let q = self.kkt.qn_size;
                {
                    let cm = self.qn.as_ref().unwrap().compact_mat();
                    for k in 0..q {
                        self.ztmp[k] = self.step.x.dot(&cm.Z[k]);
                    }
                }
                self.kkt.solve_schur(&self.comm, &mut self.ztmp);
                {
                    let cm = self.qn.as_ref().unwrap().compact_mat();
                    self.y_qn.set(T::zero());
                    for k in 0..q {
                        self.y_qn.axpy(self.ztmp[k], &cm.Z[k]);
                    }
                }
                self.kkt.solve_diag_yx_only(
                    &mut *self.prob,
                    &self.comm,
                    &self.vars,
                    &self.data,
                    self.flags,
                    mbv,
                    &self.y_qn,
                    &mut self.s_qn,
                    &mut self.ztmp,
                    &mut self.xtmp,
                    &mut self.wtmp,
                );
                self.step.x.axpy(-T::one(), &self.s_qn);
            }

            // projections of this basis direction for the descent tests
            gm.fproj[i] = self.eval_obj_barrier_deriv();

            for j in 0..ncon {
                self.ztmp[j] = self.data.Ac[j].dot(&self.step.x);
            }
            self.comm.allreduce_sum(&mut self.ztmp[..ncon]);
            gm.aproj[i] = T::zero();
            for j in 0..ncon {
                let deriv = if self.flags.dense_inequality {
                    self.ztmp[j] - self.step.s[j] + self.step.t[j]
                } else {
                    self.ztmp[j]
                };
                gm.aproj[i] -= cscale * self.res.z[j] * deriv;
            }

            gm.awproj[i] = T::zero();
            if nwcon > 0 {
                self.s_qn.set(T::zero());
                self.prob.add_sparse_jacobian_transpose(
                    T::one(),
                    &self.vars.x,
                    &self.res.zw,
                    &mut self.s_qn,
                );
                let mut b = [
                    self.step.x.dot(&self.s_qn),
                    if self.flags.sparse_inequality {
                        self.res.zw.dot(&self.step.sw)
                    } else {
                        T::zero()
                    },
                ];
                self.comm.allreduce_sum(&mut b);
                gm.awproj[i] = -cwscale * b[0];
                if self.flags.sparse_inequality {
                    gm.awproj[i] += cwscale * b[1];
                }
            }

            // exact Hessian-vector product, minus the approximate part
            // already carried by the preconditioner
            if let Err(e) = self.prob.eval_hvec_product(
                &self.vars.x,
                &self.vars.z,
                &self.vars.zw,
                &self.step.x,
                &mut gm.w[i + 1],
            ) {
                self.gmres = Some(gm);
                return Err(SolverError::Callback(e));
            }
            self.info.nhvec += 1;

            if use_qn && self.qn.is_some() {
                let qn = self.qn.as_mut().unwrap();
                qn.mult_add(-T::one(), &self.step.x, &mut gm.w[i + 1]);
            }

            // the remaining blocks pass through the identity
            {
                let (wa, wb) = gm.w.split_at_mut(i + 1);
                wb[0].axpy(T::one(), &wa[i]);
            }
            gm.alpha[i + 1] = gm.alpha[i];

            // modified Gram-Schmidt over the combined inner product
            let hp = hptr(i);
            for j in (0..=i).rev() {
                let (wa, wb) = gm.w.split_at_mut(i + 1);
                let mut hb = [wb[0].dot(&wa[j])];
                self.comm.allreduce_sum(&mut hb);
                let hij = hb[0] + beta * gm.alpha[i + 1] * gm.alpha[j];
                gm.h[j + hp] = hij;

                wb[0].axpy(-hij, &wa[j]);
                let alpha_j = gm.alpha[j];
                gm.alpha[i + 1] -= hij * alpha_j;
            }

            let mut hb = [gm.w[i + 1].sumsq()];
            self.comm.allreduce_sum(&mut hb);
            let hnext = (hb[0] + beta * gm.alpha[i + 1] * gm.alpha[i + 1]).sqrt();
            gm.h[i + 1 + hp] = hnext;
            if hnext.real_part() != T::zero().real_part() {
                // a zero norm is the lucky breakdown: the subspace is
                // invariant and the least-squares solve is exact
                gm.w[i + 1].scale(T::recip(hnext));
                gm.alpha[i + 1] *= T::recip(hnext);
            }

            // apply the accumulated Givens rotations, then form the new one
            for k in 0..i {
                let h1 = gm.h[k + hp];
                let h2 = gm.h[k + 1 + hp];
                gm.h[k + hp] = h1 * gm.qcos[k] + h2 * gm.qsin[k];
                gm.h[k + 1 + hp] = -h1 * gm.qsin[k] + h2 * gm.qcos[k];
            }
            let h1 = gm.h[i + hp];
            let h2 = gm.h[i + 1 + hp];
            let sq = (h1 * h1 + h2 * h2).sqrt();
            gm.qcos[i] = h1 / sq;
            gm.qsin[i] = h2 / sq;
            gm.h[i + hp] = h1 * gm.qcos[i] + h2 * gm.qsin[i];
            gm.h[i + 1 + hp] = -h1 * gm.qsin[i] + h2 * gm.qcos[i];

            let r1 = gm.res[i];
            gm.res[i] = r1 * gm.qcos[i];
            gm.res[i + 1] = -r1 * gm.qsin[i];

            niters += 1;

            // current least-squares weights, for the projected derivatives
            for j in (0..niters).rev() {
                gm.y[j] = gm.res[j];
                for k in (j + 1)..niters {
                    gm.y[j] = gm.y[j] - gm.h[j + hptr(k)] * gm.y[k];
                }
                gm.y[j] = gm.y[j] / gm.h[j + hptr(j)];
            }

            let mut fpr = T::zero();
            let mut cpr = T::zero();
            for j in 0..niters {
                fpr += gm.y[j] * gm.fproj[j];
                cpr += gm.y[j] * (gm.aproj[j] + gm.awproj[j]);
            }

            self.print_gmres_iter(i + 1, gm.res[i + 1], gm.res[i + 1] / bnorm, fpr, cpr)
                .ok();

            // converged only when the step is also a descent direction
            let constraint_descent = cpr.real_part()
                <= (-<f64 as AsFloatT<T>>::as_T(&0.01) * (cinfeas + cwinfeas)).real_part();
            if (fpr.real_part() < T::zero().real_part() || constraint_descent)
                && (gm.res[i + 1].real_part().abs().real_part() < atol.real_part()
                    || gm.res[i + 1].real_part().abs().real_part()
                        < (rtol * bnorm).real_part())
            {
                break;
            }
        }

        // assemble the solution of the least-squares problem
        for i in (0..niters).rev() {
            for j in (i + 1)..niters {
                gm.res[i] = gm.res[i] - gm.h[i + hptr(j)] * gm.res[j];
            }
            gm.res[i] = gm.res[i] / gm.h[i + hptr(i)];
        }

        gm.w[0].scale(gm.res[0]);
        let mut gamma = gm.res[0] * gm.alpha[0];
        for i in 1..niters {
            let (wa, wb) = gm.w.split_at_mut(1);
            wa[0].axpy(gm.res[i], &wb[i - 1]);
            gamma += gm.res[i] * gm.alpha[i];
        }
        gamma = gamma / bnorm;

        // scale the non-design residual blocks and apply the
        // preconditioner once more to recover the full step
        for i in 0..ncon {
            self.res.z[i] *= gamma;
            self.res.s[i] *= gamma;
            self.res.t[i] *= gamma;
            self.res.zt[i] *= gamma;
        }
        self.res.zl.scale(gamma);
        self.res.zu.scale(gamma);
        if nwcon > 0 {
            self.res.zw.scale(gamma);
            self.res.sw.scale(gamma);
        }
        self.res.x.copy_from(&gm.w[0]);

        self.kkt.solve_diag(
            &mut *self.prob,
            &self.comm,
            &self.vars,
            &self.data,
            self.flags,
            mbv,
            &self.res,
            &mut self.step,
            &mut self.xtmp,
            &mut self.wtmp,
        );

        if use_qn && self.kkt.qn_size > 0 {
            let cm = self.qn.as_ref().unwrap().compact_mat();
            self.kkt.apply_schur(
                &mut *self.prob,
                &self.comm,
                &self.vars,
                &self.data,
                self.flags,
                mbv,
                &cm,
                &mut self.step,
                &mut self.res,
                &mut self.ztmp,
                &mut self.s_qn,
                &mut self.y_qn,
                &mut self.wtmp,
            );
        }

        // final descent verdict on the fully assembled step
        let fpr = self.eval_obj_barrier_deriv();
        let mut cpr = T::zero();
        for j in 0..ncon {
            self.ztmp[j] = self.data.Ac[j].dot(&self.step.x);
        }
        self.comm.allreduce_sum(&mut self.ztmp[..ncon]);
        for j in 0..ncon {
            if self.flags.dense_inequality {
                let deriv = self.ztmp[j] - self.step.s[j] + self.step.t[j];
                cpr += cscale
                    * (self.data.c[j] - self.vars.s[j] + self.vars.t[j])
                    * deriv;
            } else {
                cpr += cscale * self.data.c[j] * self.ztmp[j];
            }
        }
        if nwcon > 0 {
            // rcw = cw - sw at the current point
            self.prob.eval_sparse_con(&self.vars.x, &mut self.res.zw);
            if self.flags.sparse_inequality {
                self.res.zw.axpy(-T::one(), &self.vars.sw);
            }
            self.s_qn.set(T::zero());
            self.prob.add_sparse_jacobian_transpose(
                T::one(),
                &self.vars.x,
                &self.res.zw,
                &mut self.s_qn,
            );
            let mut b = [
                self.step.x.dot(&self.s_qn),
                if self.flags.sparse_inequality {
                    self.step.sw.dot(&self.res.zw)
                } else {
                    T::zero()
                },
            ];
            self.comm.allreduce_sum(&mut b);
            cpr += cwscale * b[0];
            if self.flags.sparse_inequality {
                cpr += cwscale * b[1];
            }
        }

        self.print_gmres_final(fpr, cpr).ok();

        self.gmres = Some(gm);

        if fpr.real_part() < T::zero().real_part()
            || cpr.real_part() < (-<f64 as AsFloatT<T>>::as_T(&0.01) * (cinfeas + cwinfeas)).real_part()
        {
            Ok(niters as i32)
        } else {
            Ok(-(niters as i32))
        }
    }
}

#[cfg(test)]
mod test {
    use crate::solver::*;

    // linear objective over a box: the exact Hessian is zero, so the
    // diagonal preconditioner reproduces the exact KKT system
    struct LinearBox;

    impl Problem<f64> for LinearBox {
        fn problem_sizes(&self) -> ProblemSizes {
            ProblemSizes {
                nvars: 3,
                ncon: 1,
                nwcon: 0,
                nwblock: 0,
            }
        }

        fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
            x.copy_from_slice(&[5.0, 4.0, 3.0]);
            lb.iter_mut().for_each(|v| *v = 0.0);
            ub.iter_mut().for_each(|v| *v = 10.0);
        }

        fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
            con[0] = x[0] + x[1] + x[2] - 2.0;
            Ok(x[0] + 2.0 * x[1] + 0.5 * x[2])
        }

        fn eval_obj_con_gradient(
            &mut self,
            _x: &[f64],
            g: &mut [f64],
            ac: &mut [Vec<f64>],
        ) -> Result<(), EvalError> {
            g.copy_from_slice(&[1.0, 2.0, 0.5]);
            ac[0].copy_from_slice(&[1.0, 1.0, 1.0]);
            Ok(())
        }

        fn eval_hvec_product(
            &mut self,
            _x: &[f64],
            _z: &[f64],
            _zw: &[f64],
            _p: &[f64],
            out: &mut [f64],
        ) -> Result<(), EvalError> {
            out.iter_mut().for_each(|v| *v = 0.0);
            Ok(())
        }
    }

    #[test]
    fn test_gmres_with_exact_preconditioner_reproduces_direct_solve() {
        let mu = 0.1;
        let mut prob = LinearBox;
        let settings = SolverSettingsBuilder::default()
            .gmres_subspace_size(10)
            .verbose(false)
            .build()
            .unwrap();
        let mut ip = InteriorPoint::new(&mut prob, settings);
        ip.data.fobj = ip.prob.eval_obj_con(&ip.vars.x, &mut ip.data.c).unwrap();
        ip.prob
            .eval_obj_con_gradient(&ip.vars.x, &mut ip.data.g, &mut ip.data.Ac)
            .unwrap();

        // reference: one application of the preconditioner
        ip.compute_kkt_res(mu);
        ip.setup_kkt(false).unwrap();
        ip.compute_kkt_step();
        let px_ref = ip.step.x.clone();
        let pz_ref = ip.step.z.clone();

        // the Krylov solve sees the same operator, so it must terminate
        // after a single inner iteration with the same step
        ip.compute_kkt_res(mu);
        let iters = ip.compute_gmres_step(1e-2, 1e-30, false).unwrap();
        assert_eq!(iters.abs(), 1, "gmres iterations: {iters}");

        for (a, b) in ip.step.x.iter().zip(&px_ref) {
            assert!((a - b).abs() < 1e-8, "px {:?} vs {:?}", ip.step.x, px_ref);
        }
        for (a, b) in ip.step.z.iter().zip(&pz_ref) {
            assert!((a - b).abs() < 1e-8);
        }
    }
}
