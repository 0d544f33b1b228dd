#![allow(non_snake_case)]

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::algebra::*;
use crate::comm::{ProcComm, SerialComm, VarRanges};
use crate::solver::gmres::GmresWorkspace;
use crate::solver::*;
use crate::timeit;
use crate::timers::Timers;

/// The interior-point driver.
///
/// Owns every piece of mutable solver state: the iterate, the step and
/// residual storage, the assembled KKT preconditioner, the quasi-Newton
/// approximation and all scratch vectors.  Everything is allocated once
/// from the problem sizes at construction and reused each iteration.
/// The [`Problem`] is borrowed for the driver's lifetime.
pub struct InteriorPoint<'a, T, P, C = SerialComm>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm,
{
    pub(crate) prob: &'a mut P,
    pub(crate) comm: C,
    pub(crate) ranges: VarRanges,

    pub(crate) nvars: usize,
    pub(crate) ncon: usize,
    pub(crate) nwcon: usize,
    pub(crate) flags: ProblemFlags,

    pub(crate) settings: SolverSettings<T>,
    pub(crate) penalty_gamma: Vec<T>,

    /// current iterate
    pub(crate) vars: PrimalDualVec<T>,
    /// step direction
    pub(crate) step: PrimalDualVec<T>,
    /// KKT residual; doubles as trial-point and scratch storage once the
    /// step has been computed
    pub(crate) res: PrimalDualVec<T>,
    /// bounds and first-order data at the current point
    pub(crate) data: ProblemData<T>,

    pub(crate) kkt: KktSystem<T>,
    pub(crate) qn: Option<Box<dyn CompactQuasiNewton<T>>>,
    pub(crate) hdiag: Vec<T>,
    pub(crate) gmres: Option<GmresWorkspace<T>>,

    // scratch vectors; callers must not pass one of these as an input and
    // an output of the same call
    pub(crate) xtmp: Vec<T>,
    pub(crate) wtmp: Vec<T>,
    pub(crate) ztmp: Vec<T>,
    /// quasi-Newton secant pair storage; used as x-sized scratch while a
    /// step is being assembled
    pub(crate) s_qn: Vec<T>,
    pub(crate) y_qn: Vec<T>,

    pub(crate) barrier_param: T,
    pub(crate) rho_penalty: T,

    pub(crate) info: SolverInfo<T>,
    pub(crate) out: Option<Box<dyn Write>>,
    pub(crate) timers: Timers,
}

impl<'a, T, P> InteriorPoint<'a, T, P, SerialComm>
where
    T: FloatT,
    P: Problem<T>,
{
    /// Construct a single-process solver.
    pub fn new(prob: &'a mut P, settings: SolverSettings<T>) -> Self {
        Self::new_with_comm(prob, settings, SerialComm::new())
    }
}

impl<'a, T, P, C> InteriorPoint<'a, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// Construct a solver over the given communicator.  Collective calls
    /// require every rank to construct the solver with the same settings.
    pub fn new_with_comm(prob: &'a mut P, settings: SolverSettings<T>, comm: C) -> Self {
        let sizes = prob.problem_sizes();
        let flags = ProblemFlags::from_problem::<T, P>(prob);
        let (nvars, ncon, nwcon) = (sizes.nvars, sizes.ncon, sizes.nwcon);

        if nwcon > 0 && sizes.nwblock > 0 && nwcon % sizes.nwblock != 0 {
            eprintln!("paripm warning: sparse constraint count is not a multiple of the block size");
        }

        let ranges = VarRanges::new(&comm, nvars, nwcon);

        let qn: Option<Box<dyn CompactQuasiNewton<T>>> = match settings.qn_type {
            QuasiNewtonType::Bfgs => Some(Box::new(Lbfgs::new(
                comm.clone(),
                nvars,
                settings.max_qn_size,
            ))),
            QuasiNewtonType::Sr1 => Some(Box::new(Lsr1::new(
                comm.clone(),
                nvars,
                settings.max_qn_size,
            ))),
            QuasiNewtonType::None => None,
        };
        let max_qn_subspace = qn.as_ref().map_or(0, |q| q.max_subspace_size());

        let gmres = if settings.gmres_subspace_size > 0 {
            Some(GmresWorkspace::new(nvars, settings.gmres_subspace_size))
        } else {
            None
        };

        let hdiag = if settings.use_diag_hessian {
            vec![T::zero(); nvars]
        } else {
            Vec::new()
        };

        let penalty_gamma = vec![settings.penalty_gamma; ncon];
        let barrier_param = settings.barrier_param;
        let rho_penalty = settings.min_rho_penalty_search;

        let mut solver = Self {
            prob,
            comm,
            ranges,
            nvars,
            ncon,
            nwcon,
            flags,
            settings,
            penalty_gamma,
            vars: PrimalDualVec::new(nvars, ncon, nwcon),
            step: PrimalDualVec::new(nvars, ncon, nwcon),
            res: PrimalDualVec::new(nvars, ncon, nwcon),
            data: ProblemData::new(&sizes),
            kkt: KktSystem::new(&sizes, max_qn_subspace),
            qn,
            hdiag,
            gmres,
            xtmp: vec![T::zero(); nvars],
            wtmp: vec![T::zero(); nwcon],
            ztmp: vec![T::zero(); ncon.max(max_qn_subspace)],
            s_qn: vec![T::zero(); nvars],
            y_qn: vec![T::zero(); nvars],
            barrier_param,
            rho_penalty,
            info: SolverInfo::default(),
            out: Some(Box::new(std::io::stdout())),
            timers: Timers::default(),
        };

        // positive initial multipliers and slacks
        solver.vars.zl.set(T::one());
        solver.vars.zu.set(T::one());
        solver.vars.zw.set(T::one());
        solver.vars.sw.set(T::one());
        solver.vars.z.set(T::one());
        solver.vars.s.set(T::one());
        solver.vars.zt.set(T::one());
        solver.vars.t.set(T::one());

        solver.init_and_check_design_and_bounds();
        solver
    }

    /// Redirect solver output; `None` silences it entirely.
    pub fn set_output(&mut self, out: Option<Box<dyn Write>>) {
        self.out = out;
    }

    /// Per-constraint ℓ₁ penalty weights, overriding the scalar setting.
    pub fn set_penalty_gamma(&mut self, gamma: &[T]) {
        self.penalty_gamma.copy_from(gamma);
    }

    /// Replace the quasi-Newton approximation.
    pub fn set_quasi_newton(&mut self, qn: Option<Box<dyn CompactQuasiNewton<T>>>) {
        self.qn = qn;
    }

    /// Discard the quasi-Newton subspace.
    pub fn reset_quasi_newton(&mut self) {
        if let Some(qn) = self.qn.as_mut() {
            qn.reset();
        }
    }

    pub fn barrier_param(&self) -> T {
        self.barrier_param
    }

    /// Average complementarity at the current point.  Collective.
    pub fn complementarity(&mut self) -> T {
        self.compute_comp()
    }

    pub fn info(&self) -> &SolverInfo<T> {
        &self.info
    }

    /// The current design point (local slice).
    pub fn x(&self) -> &[T] {
        &self.vars.x
    }

    /// Dense constraint multipliers.
    pub fn dense_multipliers(&self) -> &[T] {
        &self.vars.z
    }

    /// Dense slacks `(s, t)`.
    pub fn dense_slacks(&self) -> (&[T], &[T]) {
        (&self.vars.s, &self.vars.t)
    }

    /// Bound multipliers `(zl, zu)` (local slices).
    pub fn bound_multipliers(&self) -> (&[T], &[T]) {
        (&self.vars.zl, &self.vars.zu)
    }

    /// Sparse constraint multipliers and slacks `(zw, sw)` (local slices).
    pub fn sparse_multipliers(&self) -> (&[T], &[T]) {
        (&self.vars.zw, &self.vars.sw)
    }

    /// Objective value at the current point.
    pub fn objective(&self) -> T {
        self.data.fobj
    }

    // ---------------------------------
    // initial point handling
    // ---------------------------------

    /// Fetch the design point and bounds, repair inconsistencies, push the
    /// point strictly inside the bounds and zero the multipliers of
    /// absent bounds.
    pub(crate) fn init_and_check_design_and_bounds(&mut self) {
        self.prob
            .vars_and_bounds(&mut self.vars.x, &mut self.data.lb, &mut self.data.ub);

        let mbv = self.settings.max_bound_val;
        let rel_bound = <f64 as AsFloatT<T>>::as_T(&0.001) * self.barrier_param;
        let mut check_flag = 0u32;

        if self.flags.use_lower && self.flags.use_upper {
            for i in 0..self.nvars {
                // fixed variables are not allowed
                let mut delta = T::one();
                if self.data.has_lb(i, mbv) && self.data.has_ub(i, mbv) {
                    if self.data.lb[i].real_part() >= self.data.ub[i].real_part() {
                        check_flag |= 1;
                        let mid = <f64 as AsFloatT<T>>::as_T(&0.5) * (self.data.lb[i] + self.data.ub[i]);
                        self.data.lb[i] = mid - <f64 as AsFloatT<T>>::as_T(&0.5) * rel_bound;
                        self.data.ub[i] = self.data.lb[i] + rel_bound;
                    }
                    delta = self.data.ub[i] - self.data.lb[i];
                }

                // keep the start point away from the boundary
                if self.data.has_lb(i, mbv)
                    && self.vars.x[i].real_part() < (self.data.lb[i] + rel_bound * delta).real_part()
                {
                    check_flag |= 2;
                    self.vars.x[i] = self.data.lb[i] + rel_bound * delta;
                }
                if self.data.has_ub(i, mbv)
                    && self.vars.x[i].real_part() > (self.data.ub[i] - rel_bound * delta).real_part()
                {
                    check_flag |= 4;
                    self.vars.x[i] = self.data.ub[i] - rel_bound * delta;
                }
            }
        }

        check_flag = self.comm.allreduce_or(check_flag);

        if self.comm.is_root() {
            if check_flag & 1 != 0 {
                eprintln!("paripm warning: variable bounds are inconsistent");
            }
            if check_flag & 2 != 0 {
                eprintln!("paripm warning: variables may be too close to the lower bound");
            }
            if check_flag & 4 != 0 {
                eprintln!("paripm warning: variables may be too close to the upper bound");
            }
        }

        // multipliers of absent bounds are pinned to zero and never updated
        for i in 0..self.nvars {
            if !self.data.has_lb(i, mbv) {
                self.vars.zl[i] = T::zero();
            }
            if !self.data.has_ub(i, mbv) {
                self.vars.zu[i] = T::zero();
            }
        }
    }

    // ---------------------------------
    // KKT step assembly
    // ---------------------------------

    /// Assemble and factor the diagonal preconditioner and, when the
    /// quasi-Newton correction is active, its Schur complement.
    pub(crate) fn setup_kkt(&mut self, use_qn: bool) -> Result<(), DenseFactorizationError> {
        let qn_active = use_qn && self.qn.is_some();

        let b0 = if self.settings.use_diag_hessian {
            T::zero()
        } else if qn_active {
            self.qn.as_ref().unwrap().compact_mat().b0
        } else {
            T::zero()
        };
        let hdiag = if self.settings.use_diag_hessian {
            Some(&self.hdiag[..])
        } else {
            None
        };

        self.kkt.setup_diag(
            &mut *self.prob,
            &self.comm,
            &self.vars,
            &self.data,
            self.flags,
            b0,
            hdiag,
            self.settings.qn_sigma,
            self.settings.max_bound_val,
            &mut self.xtmp,
            &mut self.wtmp,
        )?;

        let cm = if qn_active {
            Some(self.qn.as_ref().unwrap().compact_mat())
        } else {
            None
        };
        self.kkt.setup_schur(
            &mut *self.prob,
            &self.comm,
            &self.vars,
            &self.data,
            self.flags,
            self.settings.max_bound_val,
            cm.as_ref(),
            &mut self.ztmp,
            &mut self.s_qn,
            &mut self.y_qn,
            &mut self.wtmp,
        )
    }

    /// Solve for the step from the current residuals, applying the
    /// low-rank correction when it was set up.  The residuals are
    /// consumed: on return they hold scratch data.
    pub(crate) fn compute_kkt_step(&mut self) {
        self.kkt.solve_diag(
            &mut *self.prob,
            &self.comm,
            &self.vars,
            &self.data,
            self.flags,
            self.settings.max_bound_val,
            &self.res,
            &mut self.step,
            &mut self.xtmp,
            &mut self.wtmp,
        );

        if self.kkt.qn_size > 0 {
            let cm = self.qn.as_ref().unwrap().compact_mat();
            self.kkt.apply_schur(
                &mut *self.prob,
                &self.comm,
                &self.vars,
                &self.data,
                self.flags,
                self.settings.max_bound_val,
                &cm,
                &mut self.step,
                &mut self.res,
                &mut self.ztmp,
                &mut self.s_qn,
                &mut self.y_qn,
                &mut self.wtmp,
            );
        }
    }

    // ---------------------------------
    // fraction-to-boundary rule
    // ---------------------------------

    /// Largest primal and dual steps keeping every positive quantity at
    /// least `(1 - tau)` of its current value.  Collective (min-reduce).
    pub(crate) fn compute_max_step(&self, tau: T) -> (T, T) {
        let mut max_x = T::one();
        let mut max_z = T::one();
        let mbv = self.settings.max_bound_val;

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.step.x[i].real_part() < T::zero() && self.data.has_lb(i, mbv) {
                    let alpha = -tau * (self.vars.x[i] - self.data.lb[i]) / self.step.x[i];
                    if alpha.real_part() < max_x.real_part() {
                        max_x = alpha;
                    }
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.step.x[i].real_part() > T::zero() && self.data.has_ub(i, mbv) {
                    let alpha = tau * (self.data.ub[i] - self.vars.x[i]) / self.step.x[i];
                    if alpha.real_part() < max_x.real_part() {
                        max_x = alpha;
                    }
                }
            }
        }

        if self.flags.dense_inequality {
            for i in 0..self.ncon {
                if self.step.s[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.s[i] / self.step.s[i];
                    if alpha.real_part() < max_x.real_part() {
                        max_x = alpha;
                    }
                }
                if self.step.t[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.t[i] / self.step.t[i];
                    if alpha.real_part() < max_x.real_part() {
                        max_x = alpha;
                    }
                }
                if self.step.z[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.z[i] / self.step.z[i];
                    if alpha.real_part() < max_z.real_part() {
                        max_z = alpha;
                    }
                }
                if self.step.zt[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.zt[i] / self.step.zt[i];
                    if alpha.real_part() < max_z.real_part() {
                        max_z = alpha;
                    }
                }
            }
        }

        if self.nwcon > 0 && self.flags.sparse_inequality {
            for i in 0..self.nwcon {
                if self.step.zw[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.zw[i] / self.step.zw[i];
                    if alpha.real_part() < max_z.real_part() {
                        max_z = alpha;
                    }
                }
                if self.step.sw[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.sw[i] / self.step.sw[i];
                    if alpha.real_part() < max_x.real_part() {
                        max_x = alpha;
                    }
                }
            }
        }

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.step.zl[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.zl[i] / self.step.zl[i];
                    if alpha.real_part() < max_z.real_part() {
                        max_z = alpha;
                    }
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.step.zu[i].real_part() < T::zero() {
                    let alpha = -tau * self.vars.zu[i] / self.step.zu[i];
                    if alpha.real_part() < max_z.real_part() {
                        max_z = alpha;
                    }
                }
            }
        }

        let mut buf = [max_x, max_z];
        self.comm.allreduce_min(&mut buf);
        (buf[0], buf[1])
    }

    /// Scale the step by the fraction-to-boundary lengths.  Caps the
    /// primal/dual ratio at 100 and equalizes the lengths if the
    /// complementarity would grow by more than 10x (always equalized for
    /// inexact-Newton steps).  Returns whether equalization fired and
    /// the chosen `(alpha_x, alpha_z)`.
    pub(crate) fn scale_kkt_step(
        &mut self,
        tau: T,
        comp: T,
        inexact_newton_step: bool,
    ) -> (bool, T, T) {
        let (mut alpha_x, mut alpha_z) = self.compute_max_step(tau);

        let mut ceq_step = false;
        if !inexact_newton_step {
            let max_bnd: T = (100.0).as_T();
            if alpha_x.real_part() > alpha_z.real_part() {
                if alpha_x.real_part() > (max_bnd * alpha_z).real_part() {
                    alpha_x = max_bnd * alpha_z;
                } else if alpha_x.real_part() < (alpha_z / max_bnd).real_part() {
                    alpha_x = alpha_z / max_bnd;
                }
            } else if alpha_z.real_part() > (max_bnd * alpha_x).real_part() {
                alpha_z = max_bnd * alpha_x;
            } else if alpha_z.real_part() < (alpha_x / max_bnd).real_part() {
                alpha_z = alpha_x / max_bnd;
            }

            // if the complementarity grows at the scaled step, fall back
            // to equal primal/dual lengths
            let comp_new = self.compute_comp_step(alpha_x, alpha_z);
            if comp_new.real_part() > (<f64 as AsFloatT<T>>::as_T(&10.0) * comp).real_part() {
                ceq_step = true;
                if alpha_x.real_part() > alpha_z.real_part() {
                    alpha_x = alpha_z;
                } else {
                    alpha_z = alpha_x;
                }
            }
        } else if alpha_x.real_part() > alpha_z.real_part() {
            alpha_x = alpha_z;
        } else {
            alpha_z = alpha_x;
        }

        self.step.x.scale(alpha_x);
        if self.nwcon > 0 {
            self.step.zw.scale(alpha_z);
            if self.flags.sparse_inequality {
                self.step.sw.scale(alpha_x);
            }
        }
        if self.flags.use_lower {
            self.step.zl.scale(alpha_z);
        }
        if self.flags.use_upper {
            self.step.zu.scale(alpha_z);
        }
        self.step.z.scale(alpha_z);
        if self.flags.dense_inequality {
            self.step.s.scale(alpha_x);
            self.step.t.scale(alpha_x);
            self.step.zt.scale(alpha_z);
        }

        (ceq_step, alpha_x, alpha_z)
    }

    // ---------------------------------
    // step application and quasi-Newton update
    // ---------------------------------

    /// Apply the step at length `alpha`, re-evaluate the problem and
    /// update the quasi-Newton approximation with the scaled secant pair.
    pub(crate) fn compute_step_and_update(
        &mut self,
        alpha: T,
        eval_obj_con: bool,
        perform_qn_update: bool,
    ) -> Result<Option<QnUpdateKind>, SolverError> {
        let prec = self.settings.design_precision;

        if self.nwcon > 0 {
            apply_clipped_step(
                &mut self.vars.zw,
                alpha,
                &self.step.zw,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
            if self.flags.sparse_inequality {
                apply_clipped_step(
                    &mut self.vars.sw,
                    alpha,
                    &self.step.sw,
                    StepBound::Scalar(T::zero()),
                    StepBound::None,
                    prec,
                );
            }
        }
        if self.flags.use_lower {
            apply_clipped_step(
                &mut self.vars.zl,
                alpha,
                &self.step.zl,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
        }
        if self.flags.use_upper {
            apply_clipped_step(
                &mut self.vars.zu,
                alpha,
                &self.step.zu,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
        }

        apply_clipped_step(
            &mut self.vars.z,
            alpha,
            &self.step.z,
            StepBound::Scalar(T::zero()),
            StepBound::None,
            prec,
        );
        if self.flags.dense_inequality {
            apply_clipped_step(
                &mut self.vars.s,
                alpha,
                &self.step.s,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
            apply_clipped_step(
                &mut self.vars.t,
                alpha,
                &self.step.t,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
            apply_clipped_step(
                &mut self.vars.zt,
                alpha,
                &self.step.zt,
                StepBound::Scalar(T::zero()),
                StepBound::None,
                prec,
            );
        }

        // negative Lagrangian gradient with the old first-order data and
        // the new multiplier estimates
        let do_secant = self.qn.is_some()
            && perform_qn_update
            && self.settings.use_quasi_newton_update;
        if do_secant {
            self.y_qn.copy_from(&self.data.g);
            self.y_qn.negate();
            for i in 0..self.ncon {
                self.y_qn.axpy(self.vars.z[i], &self.data.Ac[i]);
            }
            if self.nwcon > 0 {
                self.prob.add_sparse_jacobian_transpose(
                    T::one(),
                    &self.vars.x,
                    &self.vars.zw,
                    &mut self.y_qn,
                );
            }
        }

        // the design update comes after the multiplier update so the
        // sparse Jacobian above is evaluated at the old point
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
        apply_clipped_step(&mut self.vars.x, alpha, &self.step.x, lower, upper, prec);

        if eval_obj_con {
            self.data.fobj = self
                .prob
                .eval_obj_con(&self.vars.x, &mut self.data.c)
                .map_err(SolverError::Callback)?;
            self.info.neval += 1;
        }

        self.prob
            .eval_obj_con_gradient(&self.vars.x, &mut self.data.g, &mut self.data.Ac)
            .map_err(SolverError::Callback)?;
        self.info.ngeval += 1;

        if do_secant {
            self.s_qn.copy_from(&self.step.x);
            self.s_qn.scale(alpha);

            self.y_qn.axpy(T::one(), &self.data.g);
            for i in 0..self.ncon {
                self.y_qn.axpy(-self.vars.z[i], &self.data.Ac[i]);
            }
            if self.nwcon > 0 {
                self.prob.add_sparse_jacobian_transpose(
                    -T::one(),
                    &self.vars.x,
                    &self.vars.zw,
                    &mut self.y_qn,
                );
            }

            self.prob
                .compute_quasi_newton_update_correction(&mut self.s_qn, &mut self.y_qn);
            let kind = self.qn.as_mut().unwrap().update(
                &self.vars.x,
                &self.vars.z,
                &self.vars.zw,
                &self.s_qn,
                &self.y_qn,
            );
            return Ok(Some(kind));
        } else if self.qn.is_some() && perform_qn_update {
            let qn = self.qn.as_mut().unwrap();
            qn.update_estimates(&self.vars.x, &self.vars.z, &self.vars.zw);
        }

        Ok(None)
    }

    // ---------------------------------
    // starting point strategies
    // ---------------------------------

    /// Least-squares estimate of the dense constraint multipliers:
    /// solve `(Ac Acᵀ) z = Ac (g − zl + zu)` and keep the result when it
    /// lies in a reasonable range.
    pub(crate) fn init_least_squares_multipliers(&mut self) {
        self.vars.zl.set(T::one());
        self.vars.zu.set(T::one());
        self.vars.zw.set(T::one());
        self.vars.sw.set(T::one());
        self.vars.z.set(T::one());
        self.vars.s.set(T::one());
        self.vars.zt.set(T::one());
        self.vars.t.set(T::one());

        let mbv = self.settings.max_bound_val;
        for i in 0..self.nvars {
            if !self.data.has_lb(i, mbv) {
                self.vars.zl[i] = T::zero();
            }
            if !self.data.has_ub(i, mbv) {
                self.vars.zu[i] = T::zero();
            }
        }
        if self.ncon == 0 {
            return;
        }

        // rhs = Ac*(g - zl + zu)
        self.y_qn.copy_from(&self.data.g);
        self.y_qn.axpy(-T::one(), &self.vars.zl);
        self.y_qn.axpy(T::one(), &self.vars.zu);

        let ncon = self.ncon;
        let mut lsq = vec![T::zero(); ncon * ncon + ncon];
        {
            let (amat, rhs) = lsq.split_at_mut(ncon * ncon);
            for i in 0..ncon {
                rhs[i] = self.data.Ac[i].dot(&self.y_qn);
                for j in 0..ncon {
                    amat[i + j * ncon] = self.data.Ac[i].dot(&self.data.Ac[j]);
                }
            }
        }
        self.comm.allreduce_sum(&mut lsq);
        let (amat, rhs) = lsq.split_at_mut(ncon * ncon);

        let mut lu = LuFactor::new(ncon);
        if lu.factor(amat, ncon).is_ok() {
            lu.solve(rhs);
            for i in 0..ncon {
                let zi = rhs[i].real_part();
                let keep = if self.flags.dense_inequality {
                    zi >= <f64 as AsFloatT<T>>::as_T(&0.01).real_part() && zi <= self.penalty_gamma[i].real_part()
                } else {
                    zi >= (-self.penalty_gamma[i]).real_part()
                        && zi <= self.penalty_gamma[i].real_part()
                };
                self.vars.z[i] = if keep { rhs[i] } else { T::one() };
            }
        }
    }

    /// Affine-step initialization: one μ = 0 step, with multipliers set
    /// to the absolute values of the result, floored at
    /// `start_affine_multiplier_min` (only where a bound exists; absent
    /// bounds keep their multipliers at exactly zero).
    pub(crate) fn init_affine_step_multipliers(&mut self) -> Result<(), SolverError> {
        let mbv = self.settings.max_bound_val;
        for i in 0..self.nvars {
            if !self.data.has_lb(i, mbv) {
                self.vars.zl[i] = T::zero();
            }
            if !self.data.has_ub(i, mbv) {
                self.vars.zu[i] = T::zero();
            }
        }

        self.compute_kkt_res(T::zero());

        let use_qn = !(self.settings.sequential_linear_method
            || self.qn.is_none()
            || !self.settings.use_qn_gmres_precon);
        self.setup_kkt(use_qn)?;
        self.compute_kkt_step();

        let floor = self.settings.start_affine_multiplier_min;
        let affine = |v: T, p: T| -> T {
            let val = (v + p).real_part().abs();
            if val.real_part() > floor.real_part() {
                val
            } else {
                floor
            }
        };

        if self.flags.dense_inequality {
            for i in 0..self.ncon {
                self.vars.z[i] = affine(self.vars.z[i], self.step.z[i]);
                self.vars.s[i] = affine(self.vars.s[i], self.step.s[i]);
                self.vars.t[i] = affine(self.vars.t[i], self.step.t[i]);
                self.vars.zt[i] = affine(self.vars.zt[i], self.step.zt[i]);
            }
        } else {
            for i in 0..self.ncon {
                self.vars.z[i] = affine(self.vars.z[i], self.step.z[i]);
            }
        }

        for i in 0..self.nwcon {
            self.vars.zw[i] = affine(self.vars.zw[i], self.step.zw[i]);
            if self.flags.sparse_inequality {
                self.vars.sw[i] = affine(self.vars.sw[i], self.step.sw[i]);
            }
        }

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    self.vars.zl[i] = affine(self.vars.zl[i], self.step.zl[i]);
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    self.vars.zu[i] = affine(self.vars.zu[i], self.step.zu[i]);
                }
            }
        }

        self.barrier_param = self.compute_comp();
        Ok(())
    }

    // ---------------------------------
    // the outer major-iteration loop
    // ---------------------------------

    /// Run the optimization, optionally checkpointing the iterate to
    /// `checkpoint` at the output frequency.
    pub fn optimize(&mut self, checkpoint: Option<&Path>) -> Result<SolverStatus, SolverError> {
        let mut checkpoint: Option<PathBuf> = checkpoint.map(Path::to_path_buf);

        if self.settings.gradient_check_frequency.is_some() {
            let step = self.settings.gradient_check_step;
            let use_hvec = self.settings.use_hvec_product;
            self.prob.check_gradients(step, &self.vars.x, use_hvec);
        }

        self.info.reset();
        self.timers.reset();
        self.timers.start("optimize");

        // with no quasi-Newton approximation the method degenerates to
        // sequential linear steps
        let sequential_linear = self.settings.sequential_linear_method || self.qn.is_none();

        self.init_and_check_design_and_bounds();
        self.print_option_summary().ok();

        self.data.fobj = self
            .prob
            .eval_obj_con(&self.vars.x, &mut self.data.c)
            .map_err(SolverError::Callback)?;
        self.info.neval += 1;
        self.prob
            .eval_obj_con_gradient(&self.vars.x, &mut self.data.g, &mut self.data.Ac)
            .map_err(SolverError::Callback)?;
        self.info.ngeval += 1;

        match self.settings.starting_point_strategy {
            StartingPointStrategy::AffineStep => self.init_affine_step_multipliers()?,
            StartingPointStrategy::LeastSquares => self.init_least_squares_multipliers(),
            StartingPointStrategy::None => {}
        }

        if self.qn.is_some() && !self.settings.use_quasi_newton_update {
            let qn = self.qn.as_mut().unwrap();
            qn.update_estimates(&self.vars.x, &self.vars.z, &self.vars.zw);
        }

        let mut fobj_prev = T::zero();
        let mut res_norm_prev = T::zero();
        let mut step_norm = T::zero();

        // two consecutive line searches without merit improvement signal
        // that the current barrier problem cannot be improved
        let mut no_merit_improvement = false;
        let mut line_search_test = 0u32;
        let mut line_search_failed = false;

        let mut status = SolverStatus::MaxIterations;

        for k in 0..self.settings.max_major_iters {
            self.info.major_iters = k;

            if self.qn.is_some()
                && !sequential_linear
                && k > 0
                && k % self.settings.hessian_reset_freq == 0
                && self.settings.use_quasi_newton_update
            {
                self.qn.as_mut().unwrap().reset();
                self.info.push_event("resetH");
            }

            if self.settings.write_output_frequency > 0
                && k % self.settings.write_output_frequency == 0
            {
                if let Some(path) = checkpoint.as_ref() {
                    // a failed checkpoint disables further attempts
                    if let Err(e) = self.write_solution_file(path) {
                        if self.comm.is_root() {
                            eprintln!("paripm: checkpoint write failed: {e}");
                        }
                        checkpoint = None;
                    }
                }
                self.prob.write_output(k, &self.vars.x);
            }

            if let Some(freq) = self.settings.gradient_check_frequency {
                if k > 0 && freq > 0 && k % freq == 0 {
                    let step = self.settings.gradient_check_step;
                    let use_hvec = self.settings.use_hvec_product;
                    self.prob.check_gradients(step, &self.vars.x, use_hvec);
                }
            }

            let rel_function_test = self.info.alpha_x_prev == T::one()
                && self.info.alpha_z_prev == T::one()
                && (self.data.fobj - fobj_prev).real_part().abs().real_part()
                    < (self.settings.rel_func_tol * fobj_prev.real_part().abs()).real_part();

            if no_merit_improvement {
                line_search_test += 1;
            } else {
                line_search_test = 0;
            }

            let comp = self.compute_comp();
            self.info.comp = comp;

            // barrier strategy: decide mu and compute the residuals
            let mut norms;
            match self.settings.barrier_strategy {
                BarrierStrategy::Monotone => {
                    norms = self.compute_kkt_res(self.barrier_param);
                    if k == 0 {
                        res_norm_prev = norms.max();
                    }

                    let barrier_converged = k > 0
                        && (norms.max().real_part()
                            < (<f64 as AsFloatT<T>>::as_T(&10.0) * self.barrier_param).real_part()
                            || rel_function_test
                            || line_search_test >= 2);
                    if self.broadcast_flag(barrier_converged) {
                        // mu <- min(frac*mu, mu^power), floored near the
                        // final tolerance
                        let mu_frac = self.settings.monotone_barrier_fraction * self.barrier_param;
                        let mu_pow = T::powf(
                            self.barrier_param,
                            self.settings.monotone_barrier_power,
                        );
                        let mut new_mu = if mu_pow.real_part() < mu_frac.real_part() {
                            mu_pow
                        } else {
                            mu_frac
                        };
                        let floor = (0.09999).as_T() * self.settings.abs_res_tol;
                        if new_mu.real_part() < (<f64 as AsFloatT<T>>::as_T(&0.1) * self.settings.abs_res_tol).real_part()
                        {
                            new_mu = floor;
                        }

                        norms = self.compute_kkt_res(new_mu);
                        self.rho_penalty = self.settings.min_rho_penalty_search;
                        self.barrier_param = new_mu;
                    }
                }
                BarrierStrategy::Mehrotra => {
                    norms = self.compute_kkt_res(self.barrier_param);
                    if k == 0 {
                        res_norm_prev = norms.max();
                    }
                }
                BarrierStrategy::ComplementarityFraction => {
                    let mut mu = self.settings.monotone_barrier_fraction * comp;
                    let floor: T = <f64 as AsFloatT<T>>::as_T(&0.1) * self.settings.abs_res_tol;
                    if mu.real_part() < floor.real_part() {
                        mu = floor;
                    }
                    self.barrier_param = mu;
                    norms = self.compute_kkt_res(mu);
                    if k == 0 {
                        res_norm_prev = norms.max();
                    }
                }
            }

            self.info.max_prime = norms.prime;
            self.info.max_dual = norms.dual;
            self.info.max_infeas = norms.infeas;
            self.info.res_norm = norms.max();

            if k % 10 == 0 || self.settings.output_level > 0 {
                self.print_iter_header().ok();
            }
            // the event codes describe what happened on the previous
            // iteration's step; clear them once printed
            self.print_iter_line(k).ok();
            self.info.events.clear();

            // convergence: the barrier parameter must have reached its
            // floor and the residual (or a stagnation test) must pass
            let step_small = self.settings.abs_step_tol.real_part() > T::zero().real_part()
                && k > 0
                && step_norm.real_part() < self.settings.abs_step_tol.real_part();
            let converged = k > 0
                && self.barrier_param.real_part()
                    <= (<f64 as AsFloatT<T>>::as_T(&0.1) * self.settings.abs_res_tol).real_part()
                && (norms.max().real_part() < self.settings.abs_res_tol.real_part()
                    || rel_function_test
                    || step_small
                    || line_search_test >= 2);
            if self.broadcast_flag(converged) {
                status = if rel_function_test {
                    SolverStatus::SolvedRelFunc
                } else if line_search_test >= 2 {
                    SolverStatus::NoImprovement
                } else {
                    SolverStatus::Solved
                };
                break;
            }

            // inexact-Newton step with exact Hessian-vector products
            let mut gmres_iters = 0i32;
            let mut inexact_newton_step = false;

            if self.settings.use_hvec_product {
                let ratio = norms.max() / res_norm_prev;
                let gmres_rtol = self.settings.eisenstat_walker_gamma
                    * T::powf(ratio, self.settings.eisenstat_walker_alpha);
                let nk = self.settings.nk_switch_tol.real_part();

                if norms.prime.real_part() < nk
                    && norms.dual.real_part() < nk
                    && norms.infeas.real_part() < nk
                    && gmres_rtol.real_part() < self.settings.max_gmres_rtol.real_part()
                {
                    let use_qn = !(sequential_linear || !self.settings.use_qn_gmres_precon);
                    self.setup_kkt(use_qn)?;
                    gmres_iters =
                        self.compute_gmres_step(gmres_rtol, self.settings.gmres_atol, use_qn)?;

                    if self.settings.abs_step_tol.real_part() > T::zero().real_part() {
                        step_norm = self.compute_step_norm();
                    }

                    if gmres_iters < 0 {
                        // the Krylov iteration destroyed the residuals
                        // without producing a usable step
                        self.print_note("gmres step failed").ok();
                        self.compute_kkt_res(self.barrier_param);
                    } else {
                        inexact_newton_step = true;
                    }
                }
            }

            fobj_prev = self.data.fobj;
            res_norm_prev = norms.max();

            let mut seq_linear_step = false;

            if !inexact_newton_step {
                let mut use_qn = true;
                if sequential_linear
                    || (line_search_failed && !self.settings.use_quasi_newton_update)
                {
                    use_qn = false;
                    seq_linear_step = true;
                } else if self.settings.use_diag_hessian {
                    use_qn = false;
                    self.prob
                        .eval_hessian_diag(
                            &self.vars.x,
                            &self.vars.z,
                            &self.vars.zw,
                            &mut self.hdiag,
                        )
                        .map_err(SolverError::Callback)?;
                }

                if self.settings.barrier_strategy == BarrierStrategy::Mehrotra {
                    // affine probing residual
                    self.compute_kkt_res(T::zero());
                }

                timeit! {self.timers => "kkt factor"; {
                    self.setup_kkt(use_qn)?
                }};
                timeit! {self.timers => "kkt solve"; {
                    self.compute_kkt_step()
                }};

                if self.settings.abs_step_tol.real_part() > T::zero().real_part() {
                    step_norm = self.compute_step_norm();
                }

                if self.settings.barrier_strategy == BarrierStrategy::Mehrotra {
                    // probe the affine step right up to the boundary
                    let (max_x, max_z) = self.compute_max_step(T::one());
                    let comp_affine = self.compute_comp_step(max_x, max_z);

                    let s1 = comp_affine / comp;
                    let sigma = s1 * s1 * s1;

                    let mut mu = sigma * comp;
                    let floor: T = <f64 as AsFloatT<T>>::as_T(&0.09999) * self.settings.abs_res_tol;
                    if mu.real_part() < floor.real_part() {
                        mu = floor;
                    }
                    self.barrier_param = mu;

                    self.compute_kkt_res(mu);
                    self.compute_kkt_step();
                }
            }

            if let Some(freq) = self.settings.major_iter_step_check {
                if freq > 0 && k % freq == 0 {
                    self.check_kkt_step(k, inexact_newton_step);
                }
            }

            // fraction-to-boundary parameter grows towards 1 as mu drops
            let mut tau = self.settings.min_fraction_to_boundary;
            let tau_mu = T::one() - self.barrier_param;
            if tau_mu.real_part() >= tau.real_part() {
                tau = tau_mu;
            }

            let (mut ceq_step, mut alpha_x, mut alpha_z) =
                self.scale_kkt_step(tau, comp, inexact_newton_step);

            let mut alpha = T::one();
            let mut line_fail = LineSearchFlags::FAILURE;
            let mut update_kind = None;
            let mut line_search_skipped = false;
            no_merit_improvement = false;

            if self.settings.use_line_search {
                let (mut m0, mut dm0) = self.eval_merit_init_deriv(alpha_x);
                self.info.dm0_prev = dm0;

                if dm0.real_part() >= T::zero().real_part()
                    && dm0.real_part() <= self.settings.function_precision.real_part()
                {
                    // flat to function precision: accept the full step
                    line_search_skipped = true;
                    update_kind = self.compute_step_and_update(alpha, true, true)?;

                    // record when the objective did not move either
                    let diff = (self.data.fobj - fobj_prev).real_part().abs();
                    if diff.real_part() <= self.settings.function_precision.real_part() {
                        line_fail = LineSearchFlags::NO_IMPROVEMENT;
                    } else {
                        line_fail = LineSearchFlags::NONE;
                    }
                } else {
                    if dm0.real_part() >= T::zero().real_part() {
                        // ascent direction: rebuild the step without the
                        // quasi-Newton approximation
                        seq_linear_step = true;
                        inexact_newton_step = false;

                        self.compute_kkt_res(self.barrier_param);
                        self.setup_kkt(false)?;
                        self.compute_kkt_step();

                        let scaled = self.scale_kkt_step(tau, comp, inexact_newton_step);
                        (ceq_step, alpha_x, alpha_z) = scaled;

                        let (m0_new, dm0_new) = self.eval_merit_init_deriv(alpha_x);
                        m0 = m0_new;
                        dm0 = dm0_new;
                        self.info.dm0_prev = dm0;
                    }

                    if let Some(freq) = self.settings.major_iter_step_check {
                        if freq > 0 && k % freq == 0 {
                            let eps = self.settings.merit_func_check_epsilon;
                            self.check_merit_func_gradient(eps);
                        }
                    }

                    if dm0.real_part() >= T::zero().real_part() {
                        line_fail = LineSearchFlags::FAILURE;
                    } else {
                        let px_norm = self.global_norm_inf(true);
                        let mut alpha_min = T::one();
                        if px_norm.real_part() != T::zero().real_part() {
                            alpha_min = self.settings.function_precision / px_norm;
                        }
                        if alpha_min.real_part() > (0.5).as_T().real_part() {
                            alpha_min = (0.5).as_T();
                        }

                        line_fail = timeit! {self.timers => "line search"; {
                            self.line_search(alpha_min, &mut alpha, m0, dm0)
                        }};

                        if !line_fail.contains(LineSearchFlags::FAILURE) {
                            // the line search already evaluated the
                            // objective at the accepted point
                            update_kind = self.compute_step_and_update(alpha, false, true)?;
                        }
                    }
                }
            } else {
                update_kind = self.compute_step_and_update(alpha, true, true)?;
                line_fail = LineSearchFlags::NONE;
            }

            no_merit_improvement = line_fail.contains(LineSearchFlags::NO_IMPROVEMENT)
                || line_fail.contains(LineSearchFlags::MIN_STEP)
                || line_fail.contains(LineSearchFlags::FAILURE);
            line_search_failed = line_fail.contains(LineSearchFlags::FAILURE);

            self.info.alpha_prev = alpha;
            self.info.alpha_x_prev = alpha_x;
            self.info.alpha_z_prev = alpha_z;

            if line_search_failed && self.qn.is_some() && self.settings.use_quasi_newton_update {
                self.qn.as_mut().unwrap().reset();
            }

            // event codes for the next iteration line
            if gmres_iters != 0 {
                self.info.push_event(&format!("iNK{}", gmres_iters));
            }
            match update_kind {
                Some(QnUpdateKind::Damped) => self.info.push_event("dampH"),
                Some(QnUpdateKind::Skipped) => self.info.push_event("skipH"),
                _ => {}
            }
            if line_fail.contains(LineSearchFlags::FAILURE) {
                self.info.push_event("LFail");
            }
            if line_fail.contains(LineSearchFlags::MIN_STEP) {
                self.info.push_event("LMnStp");
            }
            if line_fail.contains(LineSearchFlags::MAX_ITERS) {
                self.info.push_event("LMxItr");
            }
            if line_fail.contains(LineSearchFlags::NO_IMPROVEMENT) {
                self.info.push_event("LNoImprv");
            }
            if seq_linear_step {
                self.info.push_event("SLP");
            }
            if line_search_skipped {
                self.info.push_event("LSkip");
            }
            if ceq_step {
                self.info.push_event("cmpEq");
            }
        }

        self.timers.stop("optimize");
        self.info.status = status;
        self.print_footer(status).ok();

        Ok(status)
    }

    /// Broadcast a root-rank decision so every rank takes the same branch.
    pub(crate) fn broadcast_flag(&self, flag: bool) -> bool {
        let mut buf = [if flag { T::one() } else { T::zero() }];
        self.comm.broadcast_root(&mut buf);
        buf[0].real_part() > <f64 as AsFloatT<T>>::as_T(&0.5).real_part()
    }

    /// Global infinity norm of the design step (or design residual when
    /// `of_step` is false).
    pub(crate) fn global_norm_inf(&self, of_step: bool) -> T {
        let v = if of_step { &self.step.x } else { &self.res.x };
        let mut buf = [v.norm_inf()];
        self.comm.allreduce_max(&mut buf);
        buf[0]
    }
}

/// A bound for the clipped step update.
pub(crate) enum StepBound<'a, T> {
    None,
    Scalar(T),
    Slice(&'a [T]),
}

/// `x += alpha*p`, clipped so the result stays at least `precision`
/// inside the given bounds.
pub(crate) fn apply_clipped_step<T: FloatT>(
    x: &mut [T],
    alpha: T,
    p: &[T],
    lower: StepBound<T>,
    upper: StepBound<T>,
    precision: T,
) {
    for (xi, pi) in x.iter_mut().zip(p) {
        *xi += alpha * *pi;
    }
    match lower {
        StepBound::None => {}
        StepBound::Scalar(lb) => {
            for xi in x.iter_mut() {
                if xi.real_part() <= (lb + precision).real_part() {
                    *xi = lb + precision;
                }
            }
        }
        StepBound::Slice(lb) => {
            for (xi, &lbi) in x.iter_mut().zip(lb) {
                if xi.real_part() <= (lbi + precision).real_part() {
                    *xi = lbi + precision;
                }
            }
        }
    }
    match upper {
        StepBound::None => {}
        StepBound::Scalar(ub) => {
            for xi in x.iter_mut() {
                if (*xi + precision).real_part() >= ub.real_part() {
                    *xi = ub - precision;
                }
            }
        }
        StepBound::Slice(ub) => {
            for (xi, &ubi) in x.iter_mut().zip(ub) {
                if (*xi + precision).real_part() >= ubi.real_part() {
                    *xi = ubi - precision;
                }
            }
        }
    }
}
