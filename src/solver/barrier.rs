use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    /// Average complementarity over the bound products (scaled by 1/η)
    /// and the dense slack pairs.  Reduced on the root and broadcast.
    pub(crate) fn compute_comp(&mut self) -> T {
        let mbv = self.settings.max_bound_val;

        let mut product = T::zero();
        let mut count = T::zero();

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    product += self.vars.zl[i] * (self.vars.x[i] - self.data.lb[i]);
                    count += T::one();
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    product += self.vars.zu[i] * (self.data.ub[i] - self.vars.x[i]);
                    count += T::one();
                }
            }
        }
        product = product / self.settings.rel_bound_barrier;

        let mut buf = [product, count];
        self.comm.reduce_sum_root(&mut buf);

        let mut comp = [T::zero()];
        if self.comm.is_root() {
            let (mut product, mut count) = (buf[0], buf[1]);
            if self.flags.dense_inequality {
                for i in 0..self.ncon {
                    product += self.vars.s[i] * self.vars.z[i]
                        + self.vars.t[i] * self.vars.zt[i];
                    count += (2.0).as_T();
                }
            }
            if count != T::zero() {
                comp[0] = product / count;
            }
        }
        self.comm.broadcast_root(&mut comp);
        comp[0]
    }

    /// Average complementarity at the trial point
    /// `(x + alpha_x·px, z + alpha_z·pz, ...)`.  Reduced on the root and
    /// broadcast.
    pub(crate) fn compute_comp_step(&mut self, alpha_x: T, alpha_z: T) -> T {
        let mbv = self.settings.max_bound_val;

        let mut product = T::zero();
        let mut count = T::zero();

        if self.flags.use_lower {
            for i in 0..self.nvars {
                if self.data.has_lb(i, mbv) {
                    let xnew = self.vars.x[i] + alpha_x * self.step.x[i];
                    product += (self.vars.zl[i] + alpha_z * self.step.zl[i])
                        * (xnew - self.data.lb[i]);
                    count += T::one();
                }
            }
        }
        if self.flags.use_upper {
            for i in 0..self.nvars {
                if self.data.has_ub(i, mbv) {
                    let xnew = self.vars.x[i] + alpha_x * self.step.x[i];
                    product += (self.vars.zu[i] + alpha_z * self.step.zu[i])
                        * (self.data.ub[i] - xnew);
                    count += T::one();
                }
            }
        }
        product = product / self.settings.rel_bound_barrier;

        let mut buf = [product, count];
        self.comm.reduce_sum_root(&mut buf);

        let mut comp = [T::zero()];
        if self.comm.is_root() {
            let (mut product, mut count) = (buf[0], buf[1]);
            if self.flags.dense_inequality {
                for i in 0..self.ncon {
                    product += (self.vars.s[i] + alpha_x * self.step.s[i])
                        * (self.vars.z[i] + alpha_z * self.step.z[i])
                        + (self.vars.t[i] + alpha_x * self.step.t[i])
                            * (self.vars.zt[i] + alpha_z * self.step.zt[i]);
                    count += (2.0).as_T();
                }
            }
            if count != T::zero() {
                comp[0] = product / count;
            }
        }
        self.comm.broadcast_root(&mut comp);
        comp[0]
    }
}
