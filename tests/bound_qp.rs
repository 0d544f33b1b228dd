#![allow(non_snake_case)]

use paripm::solver::*;

/// Separable QP with bound constraints only:
///
///   minimize ((x0 - 2)^2 + (x1 + 3)^2) / 2,   0 <= x <= 5
///
/// The unconstrained minimizer (2, -3) is clipped by the lower bound in
/// the second coordinate, so x* = (2, 0) with zl = (0, 3).
struct BoundQp {
    /// upper bound used for the second variable; set beyond the maximum
    /// bound value to test the absent-bound path
    ub1: f64,
}

impl Problem<f64> for BoundQp {
    fn problem_sizes(&self) -> ProblemSizes {
        ProblemSizes {
            nvars: 2,
            ncon: 0,
            nwcon: 0,
            nwblock: 0,
        }
    }

    fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
        x.copy_from_slice(&[1.0, 1.0]);
        lb.copy_from_slice(&[0.0, 0.0]);
        ub.copy_from_slice(&[5.0, self.ub1]);
    }

    fn eval_obj_con(&mut self, x: &[f64], _con: &mut [f64]) -> Result<f64, EvalError> {
        Ok(0.5 * ((x[0] - 2.0).powi(2) + (x[1] + 3.0).powi(2)))
    }

    fn eval_obj_con_gradient(
        &mut self,
        x: &[f64],
        g: &mut [f64],
        _ac: &mut [Vec<f64>],
    ) -> Result<(), EvalError> {
        g.copy_from_slice(&[x[0] - 2.0, x[1] + 3.0]);
        Ok(())
    }
}

fn settings() -> SolverSettings<f64> {
    SolverSettingsBuilder::default()
        .abs_res_tol(1e-7)
        .verbose(false)
        .build()
        .unwrap()
}

#[test]
fn test_bound_only_qp() {
    let mut prob = BoundQp { ub1: 5.0 };
    let mut solver = InteriorPoint::new(&mut prob, settings());
    let status = solver.optimize(None).unwrap();
    assert_ne!(status, SolverStatus::MaxIterations);

    // with no dense constraints the multiplier system is skipped entirely
    let x = solver.x();
    assert!((x[0] - 2.0).abs() < 1e-4, "x = {x:?}");
    assert!(x[1].abs() < 1e-4, "x = {x:?}");

    let (zl, zu) = solver.bound_multipliers();
    assert!(zl[0].abs() < 1e-3);
    assert!((zl[1] - 3.0).abs() < 1e-3);
    assert!(zu[0].abs() < 1e-3 && zu[1].abs() < 1e-3);

    assert!(solver.info().major_iters < 30);
}

#[test]
fn test_bound_beyond_max_bound_val_is_ignored() {
    // ub1 above max_bound_val: the bound never enters the barrier and
    // its multiplier stays exactly zero
    let mut prob = BoundQp { ub1: 1e21 };
    let mut solver = InteriorPoint::new(&mut prob, settings());
    solver.optimize(None).unwrap();

    let x = solver.x();
    assert!((x[0] - 2.0).abs() < 1e-4);
    assert!(x[1].abs() < 1e-4);

    let (_, zu) = solver.bound_multipliers();
    assert_eq!(zu[1], 0.0);
}
