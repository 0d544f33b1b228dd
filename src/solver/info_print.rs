use std::io::Write;

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

macro_rules! root_out {
    ($self:ident) => {{
        if !$self.comm.is_root() || !$self.settings.verbose {
            return std::io::Result::Ok(());
        }
        match $self.out.as_mut() {
            Some(out) => out,
            None => return std::io::Result::Ok(()),
        }
    }};
}

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// One-time summary of the configuration, printed at the start of the
    /// solve on the root rank.
    pub(crate) fn print_option_summary(&mut self) -> std::io::Result<()> {
        let total_vars = self.ranges.total_vars();
        let total_wcon = self.ranges.total_wcon();
        let qn_size = match (&self.qn, self.settings.sequential_linear_method) {
            (Some(qn), false) => qn.max_subspace_size(),
            _ => 0,
        };
        let set = self.settings.clone();
        let ncon = self.ncon;

        let out = root_out!(self);

        writeln!(out, "paripm: parameter values")?;
        writeln!(out, "{:<30} {:>15}", "total variables", total_vars)?;
        writeln!(out, "{:<30} {:>15}", "constraints", ncon)?;
        writeln!(out, "{:<30} {:>15}", "sparse constraints", total_wcon)?;
        writeln!(out, "{:<30} {:>15}", "max_qn_subspace", qn_size)?;
        writeln!(out, "{:<30} {:>15}", "norm_type", format!("{:?}", set.norm_type))?;
        writeln!(
            out,
            "{:<30} {:>15}",
            "barrier_strategy",
            format!("{:?}", set.barrier_strategy)
        )?;
        writeln!(
            out,
            "{:<30} {:>15}",
            "starting_point_strategy",
            format!("{:?}", set.starting_point_strategy)
        )?;
        writeln!(out, "{:<30} {:>15}", "max_major_iters", set.max_major_iters)?;
        writeln!(out, "{:<30} {:>15e}", "penalty_gamma", set.penalty_gamma)?;
        writeln!(out, "{:<30} {:>15e}", "barrier_param", set.barrier_param)?;
        writeln!(out, "{:<30} {:>15e}", "abs_res_tol", set.abs_res_tol)?;
        writeln!(out, "{:<30} {:>15e}", "rel_func_tol", set.rel_func_tol)?;
        writeln!(out, "{:<30} {:>15}", "use_line_search", set.use_line_search)?;
        writeln!(
            out,
            "{:<30} {:>15}",
            "use_backtracking_alpha", set.use_backtracking_alpha
        )?;
        writeln!(out, "{:<30} {:>15}", "max_line_iters", set.max_line_iters)?;
        writeln!(
            out,
            "{:<30} {:>15e}",
            "penalty_descent_fraction", set.penalty_descent_fraction
        )?;
        writeln!(out, "{:<30} {:>15e}", "armijo_constant", set.armijo_constant)?;
        writeln!(
            out,
            "{:<30} {:>15e}",
            "monotone_barrier_fraction", set.monotone_barrier_fraction
        )?;
        writeln!(
            out,
            "{:<30} {:>15e}",
            "monotone_barrier_power", set.monotone_barrier_power
        )?;
        writeln!(
            out,
            "{:<30} {:>15e}",
            "rel_bound_barrier", set.rel_bound_barrier
        )?;
        writeln!(
            out,
            "{:<30} {:>15e}",
            "min_fraction_to_boundary", set.min_fraction_to_boundary
        )?;
        writeln!(
            out,
            "{:<30} {:>15}",
            "sequential_linear_method", set.sequential_linear_method
        )?;
        writeln!(
            out,
            "{:<30} {:>15}",
            "use_quasi_newton_update", set.use_quasi_newton_update
        )?;
        writeln!(out, "{:<30} {:>15e}", "qn_sigma", set.qn_sigma)?;
        writeln!(out, "{:<30} {:>15}", "use_hvec_product", set.use_hvec_product)?;
        writeln!(out, "{:<30} {:>15}", "use_diag_hessian", set.use_diag_hessian)?;
        if set.use_hvec_product {
            writeln!(
                out,
                "{:<30} {:>15}",
                "use_qn_gmres_precon", set.use_qn_gmres_precon
            )?;
            writeln!(out, "{:<30} {:>15e}", "nk_switch_tol", set.nk_switch_tol)?;
            writeln!(
                out,
                "{:<30} {:>15e}",
                "eisenstat_walker_alpha", set.eisenstat_walker_alpha
            )?;
            writeln!(
                out,
                "{:<30} {:>15e}",
                "eisenstat_walker_gamma", set.eisenstat_walker_gamma
            )?;
            writeln!(
                out,
                "{:<30} {:>15}",
                "gmres_subspace_size", set.gmres_subspace_size
            )?;
            writeln!(out, "{:<30} {:>15e}", "max_gmres_rtol", set.max_gmres_rtol)?;
            writeln!(out, "{:<30} {:>15e}", "gmres_atol", set.gmres_atol)?;
        }
        out.flush()
    }

    pub(crate) fn print_iter_header(&mut self) -> std::io::Result<()> {
        let out = root_out!(self);
        writeln!(
            out,
            "\n{:>4} {:>4} {:>4} {:>4} {:>7} {:>7} {:>7} {:>12} {:>7} {:>7} {:>7} {:>7} {:>7} {:>8} {:>7} info",
            "iter", "nobj", "ngrd", "nhvc", "alpha", "alphx", "alphz",
            "fobj", "|opt|", "|infes|", "|dual|", "mu", "comp", "dmerit", "rho"
        )
    }

    pub(crate) fn print_iter_line(&mut self, k: u32) -> std::io::Result<()> {
        let info = self.info.clone();
        let mu = self.barrier_param;
        let rho = self.rho_penalty;
        let fobj = self.data.fobj;

        let out = root_out!(self);
        if k == 0 {
            writeln!(
                out,
                "{:>4} {:>4} {:>4} {:>4} {:>7} {:>7} {:>7} {:>12.5e} {:>7.1e} {:>7.1e} {:>7.1e} {:>7.1e} {:>7.1e} {:>8} {:>7} {}",
                k, info.neval, info.ngeval, info.nhvec, "--", "--", "--",
                fobj, info.max_prime, info.max_infeas, info.max_dual,
                mu, info.comp, "--", "--", info.events
            )?;
        } else {
            writeln!(
                out,
                "{:>4} {:>4} {:>4} {:>4} {:>7.1e} {:>7.1e} {:>7.1e} {:>12.5e} {:>7.1e} {:>7.1e} {:>7.1e} {:>7.1e} {:>7.1e} {:>8.1e} {:>7.1e} {}",
                k, info.neval, info.ngeval, info.nhvec,
                info.alpha_prev, info.alpha_x_prev, info.alpha_z_prev,
                fobj, info.max_prime, info.max_infeas, info.max_dual,
                mu, info.comp, info.dm0_prev, rho, info.events
            )?;
        }
        out.flush()
    }

    pub(crate) fn print_footer(&mut self, status: SolverStatus) -> std::io::Result<()> {
        let elapsed = self.timers.elapsed("optimize");
        let totals: Vec<(&'static str, std::time::Duration)> = self.timers.totals().collect();

        let out = root_out!(self);
        writeln!(out)?;
        match status {
            SolverStatus::Solved => {
                writeln!(out, "paripm: successfully converged to requested tolerance")?
            }
            SolverStatus::SolvedRelFunc => {
                writeln!(out, "paripm: successfully converged on relative function test")?
            }
            SolverStatus::NoImprovement => writeln!(
                out,
                "paripm warning: current point could not be improved; no merit \
                 function decrease in two consecutive iterations"
            )?,
            _ => writeln!(out, "paripm: terminated with status = {}", status)?,
        }
        writeln!(out, "solve time = {:?}", elapsed)?;
        for (name, t) in totals {
            if name != "optimize" {
                writeln!(out, "  {name} = {t:?}")?;
            }
        }
        out.flush()
    }

    pub(crate) fn print_note(&mut self, note: &str) -> std::io::Result<()> {
        let out = root_out!(self);
        writeln!(out, "      {:>9}", note)
    }

    pub(crate) fn print_line_search_start(
        &mut self,
        m0: T,
        dm0: T,
        px_norm: T,
        alpha_min: T,
    ) -> std::io::Result<()> {
        if self.settings.output_level == 0 {
            return Ok(());
        }
        let out = root_out!(self);
        writeln!(
            out,
            "{:>5} {:>7} {:>25} {:>12} {:>12} {:>12}",
            "iter", "alpha", "merit", "dmerit", "||px||", "min(alpha)"
        )?;
        writeln!(
            out,
            "{:>5} {:>7} {:>25.16e} {:>12.5e} {:>12.5e} {:>12.5e}",
            0, " ", m0, dm0, px_norm, alpha_min
        )
    }

    pub(crate) fn print_line_search_iter(
        &mut self,
        j: u32,
        alpha: T,
        merit: T,
        dmerit: T,
    ) -> std::io::Result<()> {
        if self.settings.output_level == 0 {
            return Ok(());
        }
        let out = root_out!(self);
        writeln!(
            out,
            "{:>5} {:>7.1e} {:>25.16e} {:>12.5e}",
            j, alpha, merit, dmerit
        )
    }

    pub(crate) fn print_merit_check(&mut self, fd: T, dm0: T) -> std::io::Result<()> {
        let out = root_out!(self);
        writeln!(out, "Merit function derivative check:")?;
        writeln!(out, "finite-difference: {:>12.5e}  analytic: {:>12.5e}", fd, dm0)
    }

    pub(crate) fn print_check_header(&mut self, iteration: u32) -> std::io::Result<()> {
        let out = root_out!(self);
        writeln!(out, "\nResidual step check for iteration {}:", iteration)
    }

    pub(crate) fn print_check(&mut self, label: &str, val: T) -> std::io::Result<()> {
        let out = root_out!(self);
        writeln!(out, "max |{}|: {:>10.4e}", label, val)
    }

    pub(crate) fn print_gmres_start(&mut self, rtol: T) -> std::io::Result<()> {
        if self.settings.output_level == 0 {
            return Ok(());
        }
        let nhvec = self.info.nhvec;
        let out = root_out!(self);
        writeln!(
            out,
            "{:>5} {:>4} {:>4} {:>7} {:>7} {:>8} {:>8} gmres rtol: {:>7.1e}",
            "gmres", "nhvc", "iter", "res", "rel", "fproj", "cproj", rtol
        )?;
        writeln!(out, "      {:>4} {:>4}", nhvec, 0)
    }

    pub(crate) fn print_gmres_iter(
        &mut self,
        iter: usize,
        res: T,
        rel: T,
        fpr: T,
        cpr: T,
    ) -> std::io::Result<()> {
        if self.settings.output_level == 0 {
            return Ok(());
        }
        let nhvec = self.info.nhvec;
        let out = root_out!(self);
        writeln!(
            out,
            "      {:>4} {:>4} {:>7.1e} {:>7.1e} {:>8.1e} {:>8.1e}",
            nhvec,
            iter,
            res.real_part().abs(),
            rel.real_part().abs(),
            fpr,
            cpr
        )?;
        out.flush()
    }

    pub(crate) fn print_gmres_final(&mut self, fpr: T, cpr: T) -> std::io::Result<()> {
        if self.settings.output_level == 0 {
            return Ok(());
        }
        let out = root_out!(self);
        writeln!(
            out,
            "      {:>9} {:>7} {:>7} {:>8.1e} {:>8.1e}",
            "final", " ", " ", fpr, cpr
        )?;
        out.flush()
    }
}
