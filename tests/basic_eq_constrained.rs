#![allow(non_snake_case)]

use paripm::solver::*;

/// Equality-constrained projection:
///
///   minimize ||x||^2 / 2   s.t.  x0 + x1 + x2 = 1
///
/// with no variable bounds.  The solution is x* = (1/3, 1/3, 1/3) with
/// multiplier z = 1/3.
struct EqualityCon;

impl Problem<f64> for EqualityCon {
    fn problem_sizes(&self) -> ProblemSizes {
        ProblemSizes {
            nvars: 3,
            ncon: 1,
            nwcon: 0,
            nwblock: 0,
        }
    }

    fn is_dense_inequality(&self) -> bool {
        false
    }
    fn use_lower_bounds(&self) -> bool {
        false
    }
    fn use_upper_bounds(&self) -> bool {
        false
    }

    fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
        x.copy_from_slice(&[0.5, -0.5, 2.0]);
        lb.iter_mut().for_each(|v| *v = -1e30);
        ub.iter_mut().for_each(|v| *v = 1e30);
    }

    fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
        con[0] = x[0] + x[1] + x[2] - 1.0;
        Ok(0.5 * x.iter().map(|v| v * v).sum::<f64>())
    }

    fn eval_obj_con_gradient(
        &mut self,
        x: &[f64],
        g: &mut [f64],
        ac: &mut [Vec<f64>],
    ) -> Result<(), EvalError> {
        g.copy_from_slice(x);
        ac[0].copy_from_slice(&[1.0, 1.0, 1.0]);
        Ok(())
    }

    fn eval_hvec_product(
        &mut self,
        _x: &[f64],
        _z: &[f64],
        _zw: &[f64],
        p: &[f64],
        out: &mut [f64],
    ) -> Result<(), EvalError> {
        // the Lagrangian Hessian is the identity
        out.copy_from_slice(p);
        Ok(())
    }
}

#[test]
fn test_equality_constrained() {
    let mut prob = EqualityCon;
    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-7)
        .verbose(false)
        .build()
        .unwrap();
    let mut solver = InteriorPoint::new(&mut prob, settings);
    let status = solver.optimize(None).unwrap();
    assert_ne!(status, SolverStatus::MaxIterations);

    let x = solver.x();
    for xi in x {
        assert!((xi - 1.0 / 3.0).abs() < 1e-6, "x = {x:?}");
    }
    assert!((solver.dense_multipliers()[0] - 1.0 / 3.0).abs() < 1e-6);
    assert!(solver.info().res_norm < 1e-6);
}

#[test]
fn test_equality_constrained_gmres() {
    // inexact-Newton path: exact Hessian-vector products through GMRES
    // preconditioned by the quasi-Newton KKT solve
    let mut prob = EqualityCon;
    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-8)
        .use_hvec_product(true)
        .nk_switch_tol(1e-2)
        .gmres_subspace_size(25)
        .verbose(false)
        .build()
        .unwrap();
    let mut solver = InteriorPoint::new(&mut prob, settings);
    let status = solver.optimize(None).unwrap();
    assert_ne!(status, SolverStatus::MaxIterations);

    let x = solver.x();
    for xi in x {
        assert!((xi - 1.0 / 3.0).abs() < 1e-6, "x = {x:?}");
    }
    assert!(solver.info().res_norm < 1e-7);
    assert!(
        solver.info().nhvec < 50,
        "too many Hessian-vector products: {}",
        solver.info().nhvec
    );
}

#[test]
fn test_equality_constrained_lsr1() {
    let mut prob = EqualityCon;
    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-7)
        .qn_type(QuasiNewtonType::Sr1)
        .verbose(false)
        .build()
        .unwrap();
    let mut solver = InteriorPoint::new(&mut prob, settings);
    solver.optimize(None).unwrap();
    for xi in solver.x() {
        assert!((xi - 1.0 / 3.0).abs() < 1e-5);
    }
}

