#![allow(non_snake_case)]

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::solver::{apply_clipped_step, StepBound};
use crate::solver::*;

/// Bit-flag outcome of the merit line search.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub(crate) struct LineSearchFlags(u32);

impl LineSearchFlags {
    pub const NONE: Self = Self(0);
    pub const SUCCESS: Self = Self(1);
    pub const FAILURE: Self = Self(2);
    pub const MIN_STEP: Self = Self(4);
    pub const MAX_ITERS: Self = Self(8);
    pub const NO_IMPROVEMENT: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// Set the trial point `res.{x, s, t, sw} = vars + alpha*step`,
    /// clipped into the strict interior, and evaluate the objective and
    /// constraints there.
    fn eval_trial_point(&mut self, alpha: T) -> Result<T, EvalError> {
        let prec = self.settings.design_precision;

        self.res.x.copy_from(&self.vars.x);
        let lower = if self.flags.use_lower {
            StepBound::Slice(&self.data.lb)
        } else {
            StepBound::None
        };
        let upper = if self.flags.use_upper {
            StepBound::Slice(&self.data.ub)
        } else {
            StepBound::None
        };
        apply_clipped_step(&mut self.res.x, alpha, &self.step.x, lower, upper, prec);

        if self.nwcon > 0 && self.flags.sparse_inequality {
            self.res.sw.copy_from(&self.vars.sw);
            apply_clipped_step(
                &mut self.res.sw,
                alpha,
                &self.step.sw,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
        }
        if self.flags.dense_inequality {
            self.res.s.copy_from(&self.vars.s);
            apply_clipped_step(
                &mut self.res.s,
                alpha,
                &self.step.s,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
            self.res.t.copy_from(&self.vars.t);
            apply_clipped_step(
                &mut self.res.t,
                alpha,
                &self.step.t,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
        }

        let fobj = self.prob.eval_obj_con(&self.res.x, &mut self.data.c)?;
        self.info.neval += 1;
        self.data.fobj = fobj;
        Ok(fobj)
    }

    /// The ℓ₁-penalty merit function at the trial point stored in
    /// `res.{x, s, t, sw}` with constraint values in `data.c`.
    ///
    /// The log-barrier sums are split into positive and negative
    /// accumulators so the difference is taken once at the end.
    pub(crate) fn eval_merit_func(&mut self, fobj: T) -> T {
        let mbv = self.settings.max_bound_val;
        let eta = self.settings.rel_bound_barrier;

        let mut pos_result = T::zero();
        let mut neg_result = T::zero();

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    let d = self.res.x[i] - self.data.lb[i];
                    if d.real_part() > T::one().real_part() {
                        pos_result += d.logsafe();
                    } else {
                        neg_result += d.logsafe();
                    }
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    let d = self.data.ub[i] - self.res.x[i];
                    if d.real_part() > T::one().real_part() {
                        pos_result += d.logsafe();
                    } else {
                        neg_result += d.logsafe();
                    }
                }
            }
        }
        pos_result *= eta;
        neg_result *= eta;

        if self.nwcon > 0 && self.flags.sparse_inequality {
            for i in 0..self.nwcon {
                let sw = self.res.sw[i];
                if sw.real_part() > T::one().real_part() {
                    pos_result += sw.logsafe();
                } else {
                    neg_result += sw.logsafe();
                }
            }
        }

        // sparse constraint infeasibility at the trial point
        let mut weight_infeas = T::zero();
        if self.nwcon > 0 {
            self.prob.eval_sparse_con(&self.res.x, &mut self.wtmp);
            if self.flags.sparse_inequality {
                self.wtmp.axpy(-T::one(), &self.res.sw);
            }
            let mut buf = [self.wtmp.sumsq()];
            self.comm.allreduce_sum(&mut buf);
            weight_infeas = buf[0].sqrt();
        }

        let mut buf = [pos_result, neg_result];
        self.comm.reduce_sum_root(&mut buf);

        let mut merit = [T::zero()];
        if self.comm.is_root() {
            let (mut pos_result, mut neg_result) = (buf[0], buf[1]);
            if self.flags.dense_inequality {
                for i in 0..self.ncon {
                    let s = self.res.s[i];
                    if s.real_part() > T::one().real_part() {
                        pos_result += s.logsafe();
                    } else {
                        neg_result += s.logsafe();
                    }
                    let t = self.res.t[i];
                    if t.real_part() > T::one().real_part() {
                        pos_result += t.logsafe();
                    } else {
                        neg_result += t.logsafe();
                    }
                }
            }

            let mut dense_infeas = T::zero();
            for i in 0..self.ncon {
                let ci = if self.flags.dense_inequality {
                    self.data.c[i] - self.res.s[i] + self.res.t[i]
                } else {
                    self.data.c[i]
                };
                dense_infeas += ci * ci;
            }
            let infeas = dense_infeas.sqrt() + weight_infeas;

            merit[0] = fobj - self.barrier_param * (pos_result + neg_result)
                + self.rho_penalty * infeas;

            if self.flags.dense_inequality {
                for i in 0..self.ncon {
                    merit[0] += self.penalty_gamma[i] * self.res.t[i];
                }
            }
        }
        self.comm.broadcast_root(&mut merit);
        merit[0]
    }

    /// Refresh the penalty parameter so that the merit function has the
    /// required descent along the step, then return the merit value and
    /// its directional derivative at the current point.
    ///
    /// `res.x` and `res.zw` are dead once the step is assembled and are
    /// reused here as scratch.
    pub(crate) fn eval_merit_init_deriv(&mut self, max_x: T) -> (T, T) {
        let mbv = self.settings.max_bound_val;
        let eta = self.settings.rel_bound_barrier;

        let mut pos_result = T::zero();
        let mut neg_result = T::zero();
        let mut pos_presult = T::zero();
        let mut neg_presult = T::zero();

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    let d = self.vars.x[i] - self.data.lb[i];
                    if d.real_part() > T::one().real_part() {
                        pos_result += d.logsafe();
                    } else {
                        neg_result += d.logsafe();
                    }
                    let p = self.step.x[i] / d;
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
                    let d = self.data.ub[i] - self.vars.x[i];
                    if d.real_part() > T::one().real_part() {
                        pos_result += d.logsafe();
                    } else {
                        neg_result += d.logsafe();
                    }
                    let p = self.step.x[i] / d;
                    if self.step.x[i].real_part() > T::zero().real_part() {
                        neg_presult -= p;
                    } else {
                        pos_presult -= p;
                    }
                }
            }
        }
        pos_result *= eta;
        neg_result *= eta;
        pos_presult *= eta;
        neg_presult *= eta;

        if self.nwcon > 0 && self.flags.sparse_inequality {
            for i in 0..self.nwcon {
                let sw = self.vars.sw[i];
                if sw.real_part() > T::one().real_part() {
                    pos_result += sw.logsafe();
                } else {
                    neg_result += sw.logsafe();
                }
                let p = self.step.sw[i] / sw;
                if self.step.sw[i].real_part() > T::zero().real_part() {
                    pos_presult += p;
                } else {
                    neg_presult += p;
                }
            }
        }

        // sparse infeasibility and its projection onto the step
        let mut weight_infeas = T::zero();
        let mut weight_proj = T::zero();
        if self.nwcon > 0 {
            self.prob.eval_sparse_con(&self.vars.x, &mut self.wtmp);
            if self.flags.sparse_inequality {
                self.wtmp.axpy(-T::one(), &self.vars.sw);
            }

            // res.zw = Aw*px
            self.res.zw.set(T::zero());
            self.prob.add_sparse_jacobian(
                T::one(),
                &self.vars.x,
                &self.step.x,
                &mut self.res.zw,
            );

            let mut buf = [
                self.wtmp.sumsq(),
                self.wtmp.dot(&self.res.zw),
                if self.flags.sparse_inequality {
                    self.wtmp.dot(&self.step.sw)
                } else {
                    T::zero()
                },
            ];
            self.comm.allreduce_sum(&mut buf);
            weight_infeas = buf[0].sqrt();
            weight_proj = buf[1] - buf[2];
            if weight_infeas.real_part() > T::zero().real_part() {
                weight_proj = weight_proj / weight_infeas;
            }
        }

        // objective projection and the dense constraint row projections,
        // combined in a single reduction
        let ncon = self.ncon;
        let mut dots = vec![T::zero(); ncon + 1];
        dots[ncon] = self.data.g.dot(&self.step.x);
        for i in 0..ncon {
            dots[i] = self.data.Ac[i].dot(&self.step.x);
        }
        self.comm.allreduce_sum(&mut dots);
        let mut proj = dots[ncon];
        if self.flags.dense_inequality {
            for i in 0..ncon {
                proj += self.penalty_gamma[i] * self.step.t[i];
            }
        }

        let mut buf = [pos_result, neg_result, pos_presult, neg_presult];
        self.comm.reduce_sum_root(&mut buf);

        // dense infeasibility and its projection
        let mut dense_infeas = T::zero();
        let mut dense_proj = T::zero();
        for i in 0..ncon {
            if self.flags.dense_inequality {
                let ci = self.data.c[i] - self.vars.s[i] + self.vars.t[i];
                dense_infeas += ci * ci;
                dense_proj += ci * (dots[i] - self.step.s[i] + self.step.t[i]);
            } else {
                dense_infeas += self.data.c[i] * self.data.c[i];
                dense_proj += self.data.c[i] * dots[i];
            }
        }
        dense_infeas = dense_infeas.sqrt();
        if dense_infeas.real_part() > T::zero().real_part() {
            dense_proj = dense_proj / dense_infeas;
        }

        // curvature term p^T B p for the penalty update
        let mut pTBp = T::zero();
        if self.settings.use_diag_hessian {
            let mut local = T::zero();
            for i in 0..self.nvars {
                local += self.step.x[i] * self.step.x[i] * self.hdiag[i];
            }
            let mut b = [local];
            self.comm.allreduce_sum(&mut b);
            pTBp = b[0];
        } else if self.qn.is_some() {
            let qn = self.qn.as_mut().unwrap();
            qn.mult(&self.step.x, &mut self.res.x);
            let mut b = [self.res.x.dot(&self.step.x)];
            self.comm.allreduce_sum(&mut b);
            pTBp = <f64 as AsFloatT<T>>::as_T(&0.5) * b[0];
        }

        let mut out = [T::zero(); 3];
        if self.comm.is_root() {
            let (pos_result, neg_result, pos_presult, neg_presult) =
                (buf[0], buf[1], buf[2], buf[3]);

            let infeas = dense_infeas + weight_infeas;
            let infeas_proj = dense_proj + weight_proj;

            let mut numer = proj - self.barrier_param * (pos_presult + neg_presult);
            if pTBp.real_part() > T::zero().real_part() {
                numer += <f64 as AsFloatT<T>>::as_T(&0.5) * pTBp;
            }

            // smallest penalty parameter guaranteeing
            // numer + rho*infeas_proj <= -descent_frac*rho*max_x*infeas
            let mut rho = self.rho_penalty;
            let mut rho_hat = T::zero();
            if infeas.real_part() > (<f64 as AsFloatT<T>>::as_T(&0.01) * self.settings.abs_res_tol).real_part() {
                rho_hat = -numer
                    / (infeas_proj + self.settings.penalty_descent_fraction * max_x * infeas);
            }
            if rho_hat.real_part() > rho.real_part() {
                rho = rho_hat;
            } else {
                rho = <f64 as AsFloatT<T>>::as_T(&0.5) * rho;
                if rho.real_part() < rho_hat.real_part() {
                    rho = rho_hat;
                }
            }
            if rho.real_part() < self.settings.min_rho_penalty_search.real_part() {
                rho = self.settings.min_rho_penalty_search;
            }

            let mut merit = self.data.fobj
                - self.barrier_param * (pos_result + neg_result)
                + rho * infeas;
            let pmerit = proj - self.barrier_param * (pos_presult + neg_presult)
                + rho * infeas_proj;

            if self.flags.dense_inequality {
                for i in 0..ncon {
                    merit += self.penalty_gamma[i] * self.vars.t[i];
                }
            }

            out = [merit, pmerit, rho];
        }
        self.comm.broadcast_root(&mut out);

        self.rho_penalty = out[2];
        (out[0], out[1])
    }

    /// Backtracking/interpolating line search on the ℓ₁-penalty merit
    /// function.  An evaluation failure shrinks the step by 10x and
    /// retries; the best merit value seen is tracked so a precision-level
    /// decrease can still be accepted.
    pub(crate) fn line_search(
        &mut self,
        alpha_min: T,
        alpha: &mut T,
        m0: T,
        dm0: T,
    ) -> LineSearchFlags {
        let mut fail = LineSearchFlags::FAILURE;

        let mut best_merit = T::zero();
        let mut best_alpha = -T::one();
        let mut merit = T::zero();

        if self.settings.output_level > 0 {
            let px_norm = self.global_norm_inf(true);
            self.print_line_search_start(m0, dm0, px_norm, alpha_min).ok();
        }

        let max_iters = self.settings.max_line_iters;
        let mut j = 0;
        while j < max_iters {
            let fobj = match self.eval_trial_point(*alpha) {
                Ok(f) => f,
                Err(_) => {
                    if self.comm.is_root() {
                        eprintln!(
                            "paripm: evaluation failed during line search, trying new point"
                        );
                    }
                    // shrink well away from the undefined region
                    *alpha = <f64 as AsFloatT<T>>::as_T(&0.1) * *alpha;
                    j += 1;
                    continue;
                }
            };

            merit = self.eval_merit_func(fobj);

            if self.settings.output_level > 0 {
                self.print_line_search_iter(j + 1, *alpha, merit, (merit - m0) / *alpha)
                    .ok();
            }

            if best_alpha.real_part() < T::zero().real_part()
                || merit.real_part() < best_merit.real_part()
            {
                best_alpha = *alpha;
                best_merit = merit;
            }

            // Armijo condition, relaxed by the function precision
            if (merit - self.settings.armijo_constant * *alpha * dm0).real_part()
                < (m0 + self.settings.function_precision).real_part()
            {
                if fail.contains(LineSearchFlags::MIN_STEP) {
                    fail = LineSearchFlags::SUCCESS;
                    fail.insert(LineSearchFlags::MIN_STEP);
                } else {
                    fail = LineSearchFlags::SUCCESS;
                }
                break;
            } else if fail.contains(LineSearchFlags::MIN_STEP) {
                // already at the smallest allowed step
                break;
            }

            if j < max_iters - 1 {
                if self.settings.use_backtracking_alpha {
                    *alpha = <f64 as AsFloatT<T>>::as_T(&0.5) * *alpha;
                    if alpha.real_part() <= alpha_min.real_part() {
                        *alpha = alpha_min;
                        fail.insert(LineSearchFlags::MIN_STEP);
                    }
                } else {
                    // quadratic interpolation, clipped to [alpha_min, 0.01*alpha]
                    let alpha_new = -<f64 as AsFloatT<T>>::as_T(&0.5) * dm0 * (*alpha * *alpha)
                        / (merit - m0 - dm0 * *alpha);
                    if alpha_new.real_part() <= alpha_min.real_part() {
                        *alpha = alpha_min;
                        fail.insert(LineSearchFlags::MIN_STEP);
                    } else if alpha_new.real_part() < (<f64 as AsFloatT<T>>::as_T(&0.01) * *alpha).real_part() {
                        *alpha = <f64 as AsFloatT<T>>::as_T(&0.01) * *alpha;
                    } else {
                        *alpha = alpha_new;
                    }
                }
            }
            j += 1;
        }

        if j == max_iters {
            fail.insert(LineSearchFlags::MAX_ITERS);
        }

        if !fail.contains(LineSearchFlags::SUCCESS)
            && best_alpha.real_part() >= T::zero().real_part()
        {
            // a simple decrease within the function precision is still
            // accepted
            let prec = self.settings.function_precision;
            if best_merit.real_part() <= (m0 + prec).real_part() {
                fail.insert(LineSearchFlags::SUCCESS);
                fail.remove(LineSearchFlags::FAILURE);
            } else if (merit - m0).real_part().abs().real_part() <= prec.real_part() {
                // no change in the merit function to function precision
                fail.insert(LineSearchFlags::NO_IMPROVEMENT);
            }

            // the gradient is evaluated next at the accepted point, so
            // the objective must be re-evaluated there
            if *alpha != best_alpha {
                *alpha = best_alpha;
                if self.eval_trial_point(*alpha).is_err() {
                    if self.comm.is_root() {
                        eprintln!("paripm: evaluation failed during line search");
                    }
                    fail = LineSearchFlags::FAILURE;
                }
            }
        }

        fail
    }

    /// Finite-difference check of the merit function derivative along the
    /// current step, written to the output stream.
    pub(crate) fn check_merit_func_gradient(&mut self, dh: T) {
        let (m0, dm0) = self.eval_merit_init_deriv(T::one());

        match self.eval_trial_point(dh) {
            Ok(fobj) => {
                let merit = self.eval_merit_func(fobj);
                let fd = (merit - m0) / dh;
                self.print_merit_check(fd, dm0).ok();
            }
            Err(_) => {
                if self.comm.is_root() {
                    eprintln!("paripm: merit check evaluation failed");
                }
            }
        }
    }
}
