#![allow(non_snake_case)]

use paripm::solver::*;

/// Sellar-style analytic problem:
///
///   minimize  x1^2 + x0 + x2 + exp(-x3)
///   s.t.      x0 + x1 >= 1
///             (0, 0, -1, -1) <= x <= (10, 10, 3.16, 24)
///
/// The dense constraint is active at the optimum with multiplier z = 1,
/// which fixes x0 = x1 = 1/2; x2 rides its lower bound.  The x3
/// direction is barrier-flat (the objective decays like exp(-x3)), so
/// its converged value is set by the final barrier parameter rather
/// than the upper bound and is only asserted loosely.
struct Sellar {
    x0: [f64; 4],
}

impl Default for Sellar {
    fn default() -> Self {
        Self {
            x0: [2.0, 1.0, 0.0, 0.0],
        }
    }
}

impl Problem<f64> for Sellar {
    fn problem_sizes(&self) -> ProblemSizes {
        ProblemSizes {
            nvars: 4,
            ncon: 1,
            nwcon: 0,
            nwblock: 0,
        }
    }

    fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
        x.copy_from_slice(&self.x0);
        lb.copy_from_slice(&[0.0, 0.0, -1.0, -1.0]);
        ub.copy_from_slice(&[10.0, 10.0, 3.16, 24.0]);
    }

    fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
        con[0] = x[0] + x[1] - 1.0;
        Ok(x[1] * x[1] + x[0] + x[2] + (-x[3]).exp())
    }

    fn eval_obj_con_gradient(
        &mut self,
        x: &[f64],
        g: &mut [f64],
        ac: &mut [Vec<f64>],
    ) -> Result<(), EvalError> {
        g.copy_from_slice(&[1.0, 2.0 * x[1], 1.0, -(-x[3]).exp()]);
        ac[0].copy_from_slice(&[1.0, 1.0, 0.0, 0.0]);
        Ok(())
    }
}

fn solve_sellar(settings: SolverSettings<f64>, x0: [f64; 4]) -> (Vec<f64>, f64, f64, u32, f64) {
    let mut prob = Sellar { x0 };
    let mut solver = InteriorPoint::new(&mut prob, settings);
    let status = solver.optimize(None).unwrap();
    assert_ne!(status, SolverStatus::MaxIterations);

    let x = solver.x().to_vec();
    let z = solver.dense_multipliers()[0];
    let res = solver.info().res_norm;
    let iters = solver.info().major_iters;
    let mu = solver.barrier_param();
    let _ = solver.objective();
    (x, z, res, iters, mu)
}

fn default_settings() -> SolverSettings<f64> {
    SolverSettingsBuilder::default()
        .abs_res_tol(1e-6)
        .verbose(false)
        .build()
        .unwrap()
}

#[test]
fn test_sellar() {
    let (x, z, res, iters, _) = solve_sellar(default_settings(), [2.0, 1.0, 0.0, 0.0]);

    assert!(res < 1e-5, "KKT residual too large: {res}");
    assert!(iters < 80, "too many iterations: {iters}");

    assert!((x[0] - 0.5).abs() < 1e-3, "x = {x:?}");
    assert!((x[1] - 0.5).abs() < 1e-3, "x = {x:?}");
    assert!((x[2] + 1.0).abs() < 1e-3, "x = {x:?}");
    assert!(x[3] > 12.0, "x = {x:?}");
    assert!((z - 1.0).abs() < 1e-2, "z = {z}");

    let fobj = x[1] * x[1] + x[0] + x[2] + (-x[3]).exp();
    assert!((fobj + 0.25).abs() < 1e-3, "objective = {fobj}");
}

#[test]
fn test_sellar_affine_start() {
    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-6)
        .starting_point_strategy(StartingPointStrategy::AffineStep)
        .verbose(false)
        .build()
        .unwrap();
    let (x, _, res, iters, _) = solve_sellar(settings, [2.0, 1.0, 0.0, 0.0]);

    assert!(res < 1e-5);
    assert!(iters < 80);
    assert!((x[0] - 0.5).abs() < 1e-3 && (x[1] - 0.5).abs() < 1e-3);
}

#[test]
fn test_sellar_runs_are_bit_identical() {
    // the step computation is deterministic: two identical solves agree
    // to the last bit
    let (x1, _, _, _, mu1) = solve_sellar(default_settings(), [2.0, 1.0, 0.0, 0.0]);
    let (x2, _, _, _, mu2) = solve_sellar(default_settings(), [2.0, 1.0, 0.0, 0.0]);
    assert_eq!(x1, x2);
    assert_eq!(mu1, mu2);
}

#[test]
fn test_sellar_mehrotra_matches_monotone() {
    // a crude LCG stands in for random starts so the test is repeatable
    let mut seed: u64 = 0x9e3779b97f4a7c15;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 11) as f64 / (1u64 << 53) as f64
    };

    let lb = [0.0, 0.0, -1.0, -1.0];
    let ub = [10.0, 10.0, 3.16, 24.0];

    let mut mehrotra_ever_leq = false;
    for _ in 0..3 {
        let mut x0 = [0.0; 4];
        for i in 0..4 {
            x0[i] = lb[i] + (ub[i] - lb[i]) * next();
        }

        let (xm, _, _, iters_mono, _) = solve_sellar(default_settings(), x0);

        let settings = SolverSettingsBuilder::default()
            .abs_res_tol(1e-6)
            .barrier_strategy(BarrierStrategy::Mehrotra)
            .verbose(false)
            .build()
            .unwrap();
        let (xp, _, _, iters_mehrotra, _) = solve_sellar(settings, x0);

        // x3 is barrier-flat, so only the determined coordinates are
        // compared between the two strategies
        for (a, b) in xm.iter().zip(&xp).take(3) {
            assert!((a - b).abs() < 1e-4, "monotone {xm:?} vs mehrotra {xp:?}");
        }
        if iters_mehrotra <= iters_mono {
            mehrotra_ever_leq = true;
        }
    }
    assert!(mehrotra_ever_leq);
}

#[test]
fn test_sellar_comp_fraction_barrier() {
    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-6)
        .barrier_strategy(BarrierStrategy::ComplementarityFraction)
        .verbose(false)
        .build()
        .unwrap();
    let (x, _, res, _, _) = solve_sellar(settings, [2.0, 1.0, 0.0, 0.0]);
    assert!(res < 1e-5);
    assert!((x[0] - 0.5).abs() < 1e-3 && (x[1] - 0.5).abs() < 1e-3);
}
