#![allow(non_snake_case)]

use paripm::solver::*;

struct Quadratic;

impl Problem<f64> for Quadratic {
    fn problem_sizes(&self) -> ProblemSizes {
        ProblemSizes {
            nvars: 3,
            ncon: 1,
            nwcon: 0,
            nwblock: 0,
        }
    }

    fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
        x.copy_from_slice(&[1.0, 1.0, 1.0]);
        lb.iter_mut().for_each(|v| *v = 0.0);
        ub.iter_mut().for_each(|v| *v = 10.0);
    }

    fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
        con[0] = x[0] + x[1] + x[2] - 1.0;
        Ok(0.5 * x.iter().map(|v| (v - 2.0) * (v - 2.0)).sum::<f64>())
    }

    fn eval_obj_con_gradient(
        &mut self,
        x: &[f64],
        g: &mut [f64],
        ac: &mut [Vec<f64>],
    ) -> Result<(), EvalError> {
        for i in 0..3 {
            g[i] = x[i] - 2.0;
        }
        ac[0].copy_from_slice(&[1.0, 1.0, 1.0]);
        Ok(())
    }
}

fn settings() -> SolverSettings<f64> {
    SolverSettingsBuilder::default()
        .abs_res_tol(1e-6)
        .max_major_iters(40)
        .verbose(false)
        .build()
        .unwrap()
}

#[test]
fn test_solution_file_round_trip() {
    let dir = std::env::temp_dir();
    let path = dir.join("paripm_solution_file_round_trip.dat");

    let (x, z, mu);
    {
        let mut prob = Quadratic;
        let mut solver = InteriorPoint::new(&mut prob, settings());
        solver.optimize(Some(path.as_path())).unwrap();
        // final state written explicitly; the in-loop checkpoints only
        // cover every write_output_frequency iterations
        solver.write_solution_file(&path).unwrap();
        x = solver.x().to_vec();
        z = solver.dense_multipliers().to_vec();
        mu = solver.barrier_param();
    }

    // restore into a fresh solver
    let mut prob = Quadratic;
    let mut solver = InteriorPoint::new(&mut prob, settings());
    solver.read_solution_file(&path).unwrap();

    assert_eq!(solver.x(), &x[..]);
    assert_eq!(solver.dense_multipliers(), &z[..]);
    assert_eq!(solver.barrier_param(), mu);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_solution_file_size_mismatch() {
    let dir = std::env::temp_dir();
    let path = dir.join("paripm_solution_file_mismatch.dat");

    {
        let mut prob = Quadratic;
        let mut solver = InteriorPoint::new(&mut prob, settings());
        solver.write_solution_file(&path).unwrap();
    }

    // a problem with different sizes must refuse the file
    struct Smaller;
    impl Problem<f64> for Smaller {
        fn problem_sizes(&self) -> ProblemSizes {
            ProblemSizes {
                nvars: 2,
                ncon: 1,
                nwcon: 0,
                nwblock: 0,
            }
        }
        fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
            x.iter_mut().for_each(|v| *v = 1.0);
            lb.iter_mut().for_each(|v| *v = 0.0);
            ub.iter_mut().for_each(|v| *v = 10.0);
        }
        fn eval_obj_con(&mut self, x: &[f64], con: &mut [f64]) -> Result<f64, EvalError> {
            con[0] = x[0] + x[1];
            Ok(0.0)
        }
        fn eval_obj_con_gradient(
            &mut self,
            _x: &[f64],
            g: &mut [f64],
            ac: &mut [Vec<f64>],
        ) -> Result<(), EvalError> {
            g.iter_mut().for_each(|v| *v = 0.0);
            ac[0].copy_from_slice(&[1.0, 1.0]);
            Ok(())
        }
    }

    let mut prob = Smaller;
    let mut solver = InteriorPoint::new(&mut prob, settings());
    assert!(solver.read_solution_file(&path).is_err());

    std::fs::remove_file(&path).ok();
}
