#![allow(non_snake_case)]

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

/// The three residual measures of the perturbed KKT conditions.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct KktNorms<T> {
    /// gradient of the Lagrangian and the t-multiplier condition
    pub prime: T,
    /// complementarity conditions
    pub dual: T,
    /// dense and sparse constraint infeasibility
    pub infeas: T,
}

impl<T: FloatT> KktNorms<T> {
    pub fn max(&self) -> T {
        let mut out = self.prime;
        if self.dual.real_part() > out.real_part() {
            out = self.dual;
        }
        if self.infeas.real_part() > out.real_part() {
            out = self.infeas;
        }
        out
    }
}

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// Assemble the negative KKT residuals at the given barrier parameter
    /// and measure them under the configured norm.
    ///
    /// The distributed contributions are accumulated locally and combined
    /// in a single reduction at the end; the replicated m-sized terms are
    /// folded in afterwards on every rank so they count exactly once.
    pub(crate) fn compute_kkt_res(&mut self, barrier: T) -> KktNorms<T> {
        let flags = self.flags;
        let mbv = self.settings.max_bound_val;
        let eta = self.settings.rel_bound_barrier;
        let (nvars, ncon, nwcon) = (self.nvars, self.ncon, self.nwcon);

        // rx = -(g - Ac^T z - Aw^T zw - zl + zu)
        if flags.use_lower {
            self.res.x.copy_from(&self.vars.zl);
        } else {
            self.res.x.set(T::zero());
        }
        if flags.use_upper {
            self.res.x.axpy(-T::one(), &self.vars.zu);
        }
        self.res.x.axpy(-T::one(), &self.data.g);
        for i in 0..ncon {
            self.res.x.axpy(self.vars.z[i], &self.data.Ac[i]);
        }

        if nwcon > 0 {
            self.prob.add_sparse_jacobian_transpose(
                T::one(),
                &self.vars.x,
                &self.vars.zw,
                &mut self.res.x,
            );

            // rcw = -(cw - sw)
            self.prob.eval_sparse_con(&self.vars.x, &mut self.res.zw);
            if flags.sparse_inequality {
                self.res.zw.axpy(-T::one(), &self.vars.sw);
            }
            self.res.zw.negate();
        }

        // dense constraint and complementarity residuals
        if flags.dense_inequality {
            for i in 0..ncon {
                self.res.z[i] = -(self.data.c[i] - self.vars.s[i] + self.vars.t[i]);
                self.res.s[i] = -(self.vars.s[i] * self.vars.z[i] - barrier);
                self.res.t[i] = -(self.penalty_gamma[i] - self.vars.zt[i] - self.vars.z[i]);
                self.res.zt[i] = -(self.vars.t[i] * self.vars.zt[i] - barrier);
            }
        } else {
            for i in 0..ncon {
                self.res.z[i] = -self.data.c[i];
                self.res.s[i] = T::zero();
                self.res.t[i] = T::zero();
                self.res.zt[i] = T::zero();
            }
        }

        // bound complementarity, only at finite bounds
        self.res.zl.set(T::zero());
        if flags.use_lower {
            for i in 0..nvars {
                if self.data.has_lb(i, mbv) {
                    self.res.zl[i] = -((self.vars.x[i] - self.data.lb[i]) * self.vars.zl[i]
                        - eta * barrier);
                }
            }
        }
        self.res.zu.set(T::zero());
        if flags.use_upper {
            for i in 0..nvars {
                if self.data.has_ub(i, mbv) {
                    self.res.zu[i] = -((self.data.ub[i] - self.vars.x[i]) * self.vars.zu[i]
                        - eta * barrier);
                }
            }
        }

        self.res.sw.set(T::zero());
        if nwcon > 0 && flags.sparse_inequality {
            for i in 0..nwcon {
                self.res.sw[i] = -(self.vars.sw[i] * self.vars.zw[i] - barrier);
            }
        }

        // --- norm accumulation ---
        const PRIME: usize = 0;
        const DUAL: usize = 1;
        const INFEAS: usize = 2;

        let nt = self.settings.norm_type;
        let mut acc = [T::zero(); 3];
        {
            let mut add = |slot: usize, v: &[T]| match nt {
                NormType::Infinity => {
                    let m = v.norm_inf();
                    if m.real_part() > acc[slot].real_part() {
                        acc[slot] = m;
                    }
                }
                NormType::L1 => acc[slot] += v.norm_one(),
                NormType::L2 => acc[slot] += v.sumsq(),
            };

            add(PRIME, &self.res.x);
            if nwcon > 0 {
                add(INFEAS, &self.res.zw);
                if flags.sparse_inequality {
                    add(DUAL, &self.res.sw);
                }
            }
            if flags.use_lower {
                add(DUAL, &self.res.zl);
            }
            if flags.use_upper {
                add(DUAL, &self.res.zu);
            }
        }

        match nt {
            NormType::Infinity => self.comm.allreduce_max(&mut acc),
            _ => self.comm.allreduce_sum(&mut acc),
        }

        // replicated m-sized terms, identical on every rank
        for i in 0..ncon {
            let (rt, rc, rs, rzt) = (
                self.res.t[i],
                self.res.z[i],
                self.res.s[i],
                self.res.zt[i],
            );
            match nt {
                NormType::Infinity => {
                    for (slot, v) in [(PRIME, rt), (INFEAS, rc), (DUAL, rs), (DUAL, rzt)] {
                        let m = v.real_part().abs();
                        if m.real_part() > acc[slot].real_part() {
                            acc[slot] = m;
                        }
                    }
                }
                NormType::L1 => {
                    acc[PRIME] += rt.real_part().abs();
                    acc[INFEAS] += rc.real_part().abs();
                    acc[DUAL] += rs.real_part().abs() + rzt.real_part().abs();
                }
                NormType::L2 => {
                    acc[PRIME] += rt * rt;
                    acc[INFEAS] += rc * rc;
                    acc[DUAL] += rs * rs + rzt * rzt;
                }
            }
        }

        if nt == NormType::L2 {
            for a in acc.iter_mut() {
                *a = a.sqrt();
            }
        }

        KktNorms {
            prime: acc[PRIME],
            dual: acc[DUAL],
            infeas: acc[INFEAS],
        }
    }

    /// Verify the computed step against the linearized KKT equations and
    /// report the largest residual of each block.  `res.x` and `res.zw`
    /// are reused as scratch, so the residuals must be recomputed before
    /// the next solve.
    pub(crate) fn check_kkt_step(&mut self, iteration: u32, is_newton: bool) {
        let mbv = self.settings.max_bound_val;
        let (ncon, nwcon) = (self.ncon, self.nwcon);

        self.print_check_header(iteration).ok();

        // (H + sigma I)*px - Ac^T(z + pz) - Aw^T(zw + pzw) - pzl + pzu
        //   + g - zl + zu
        if is_newton {
            let _ = self.prob.eval_hvec_product(
                &self.vars.x,
                &self.vars.z,
                &self.vars.zw,
                &self.step.x,
                &mut self.res.x,
            );
        } else if self.settings.use_diag_hessian {
            for i in 0..self.nvars {
                self.res.x[i] = self.step.x[i] * self.hdiag[i];
            }
        } else if self.qn.is_some() && !self.settings.sequential_linear_method {
            let sigma = self.settings.qn_sigma;
            let qn = self.qn.as_mut().unwrap();
            qn.mult(&self.step.x, &mut self.res.x);
            self.res.x.axpy(sigma, &self.step.x);
        } else {
            self.res.x.set(T::zero());
        }
        for i in 0..ncon {
            self.res
                .x
                .axpy(-(self.step.z[i] + self.vars.z[i]), &self.data.Ac[i]);
        }
        if self.flags.use_lower {
            self.res.x.axpy(-T::one(), &self.step.zl);
            self.res.x.axpy(-T::one(), &self.vars.zl);
        }
        if self.flags.use_upper {
            self.res.x.axpy(T::one(), &self.step.zu);
            self.res.x.axpy(T::one(), &self.vars.zu);
        }
        self.res.x.axpy(T::one(), &self.data.g);
        if nwcon > 0 {
            self.prob.add_sparse_jacobian_transpose(
                -T::one(),
                &self.vars.x,
                &self.vars.zw,
                &mut self.res.x,
            );
            self.prob.add_sparse_jacobian_transpose(
                -T::one(),
                &self.vars.x,
                &self.step.zw,
                &mut self.res.x,
            );
        }
        let max_val = self.global_norm_inf(false);
        self.print_check("(H + sigma*I)*px - Ac^T*pz - Aw^T*pzw - pzl + pzu + rdual", max_val)
            .ok();

        if nwcon > 0 {
            self.prob.eval_sparse_con(&self.vars.x, &mut self.res.zw);
            self.prob.add_sparse_jacobian(
                T::one(),
                &self.vars.x,
                &self.step.x,
                &mut self.res.zw,
            );
            if self.flags.sparse_inequality {
                self.res.zw.axpy(-T::one(), &self.vars.sw);
                self.res.zw.axpy(-T::one(), &self.step.sw);
            }
            let mut buf = [self.res.zw.norm_inf()];
            self.comm.allreduce_max(&mut buf);
            self.print_check("cw(x) - sw + Aw*px - psw", buf[0]).ok();
        }

        // dense constraint rows
        for i in 0..ncon {
            self.ztmp[i] = self.data.Ac[i].dot(&self.step.x);
        }
        self.comm.allreduce_sum(&mut self.ztmp[..ncon]);
        let mut max_val = T::zero();
        for i in 0..ncon {
            let val = if self.flags.dense_inequality {
                self.ztmp[i] - self.step.s[i] + self.step.t[i]
                    + (self.data.c[i] - self.vars.s[i] + self.vars.t[i])
            } else {
                self.ztmp[i] + self.data.c[i]
            };
            let v = val.real_part().abs();
            if v.real_part() > max_val.real_part() {
                max_val = v;
            }
        }
        self.print_check("A*px - ps + pt + (c - s + t)", max_val).ok();

        if self.flags.dense_inequality {
            let mut max_val = T::zero();
            for i in 0..ncon {
                let val = self.penalty_gamma[i]
                    - self.vars.z[i]
                    - self.vars.zt[i]
                    - self.step.z[i]
                    - self.step.zt[i];
                let v = val.real_part().abs();
                if v.real_part() > max_val.real_part() {
                    max_val = v;
                }
            }
            self.print_check("gamma - z - zt - pz - pzt", max_val).ok();

            let mut max_val = T::zero();
            for i in 0..ncon {
                let val = self.vars.t[i] * self.step.zt[i]
                    + self.vars.zt[i] * self.step.t[i]
                    + (self.vars.t[i] * self.vars.zt[i] - self.barrier_param);
                let v = val.real_part().abs();
                if v.real_part() > max_val.real_part() {
                    max_val = v;
                }
            }
            self.print_check("T*pzt + Zt*pt + (T*zt - mu)", max_val).ok();

            let mut max_val = T::zero();
            for i in 0..ncon {
                let val = self.vars.z[i] * self.step.s[i]
                    + self.vars.s[i] * self.step.z[i]
                    + (self.vars.z[i] * self.vars.s[i] - self.barrier_param);
                let v = val.real_part().abs();
                if v.real_part() > max_val.real_part() {
                    max_val = v;
                }
            }
            self.print_check("Z*ps + S*pz + (z*s - mu)", max_val).ok();
        }

        if self.flags.use_lower {
            let mut max_val = T::zero();
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    let d = self.vars.x[i] - self.data.lb[i];
                    let val = self.vars.zl[i] * self.step.x[i]
                        + d * self.step.zl[i]
                        + (self.vars.zl[i] * d - self.barrier_param);
                    let v = val.real_part().abs();
                    if v.real_part() > max_val.real_part() {
                        max_val = v;
                    }
                }
            }
            let mut buf = [max_val];
            self.comm.allreduce_max(&mut buf);
            self.print_check("Zl*px + (X - LB)*pzl + (Zl*(x - lb) - mu)", buf[0])
                .ok();
        }

        if self.flags.use_upper {
            let mut max_val = T::zero();
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    let d = self.data.ub[i] - self.vars.x[i];
                    let val = -self.vars.zu[i] * self.step.x[i]
                        + d * self.step.zu[i]
                        + (self.vars.zu[i] * d - self.barrier_param);
                    let v = val.real_part().abs();
                    if v.real_part() > max_val.real_part() {
                        max_val = v;
                    }
                }
            }
            let mut buf = [max_val];
            self.comm.allreduce_max(&mut buf);
            self.print_check("-Zu*px + (UB - X)*pzu + (Zu*(ub - x) - mu)", buf[0])
                .ok();
        }
    }

    /// Norm of the design step under the configured norm.  Collective.
    pub(crate) fn compute_step_norm(&self) -> T {
        match self.settings.norm_type {
            NormType::Infinity => {
                let mut buf = [self.step.x.norm_inf()];
                self.comm.allreduce_max(&mut buf);
                buf[0]
            }
            NormType::L1 => {
                let mut buf = [self.step.x.norm_one()];
                self.comm.allreduce_sum(&mut buf);
                buf[0]
            }
            NormType::L2 => {
                let mut buf = [self.step.x.sumsq()];
                self.comm.allreduce_sum(&mut buf);
                buf[0].sqrt()
            }
        }
    }
}
