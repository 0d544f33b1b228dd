#![allow(non_snake_case)]

use paripm::solver::*;

/// Projection with block-structured sparse equality constraints:
///
///   minimize ||x - a||^2 / 2   s.t.  x[2i] + x[2i+1] = 1  for i = 0, 1
///
/// The rows of the sparse Jacobian are orthogonal, so the inner-product
/// matrix is diagonal (block size one).  Each pair projects
/// independently: x[2i] = a[2i] + lambda_i with the multiplier
/// zw_i = lambda_i = (1 - a[2i] - a[2i+1]) / 2.
struct SparseProjection {
    a: [f64; 4],
}

impl SparseProjection {
    fn solution(&self) -> ([f64; 4], [f64; 2]) {
        let mut x = [0.0; 4];
        let mut zw = [0.0; 2];
        for i in 0..2 {
            let lambda = (1.0 - self.a[2 * i] - self.a[2 * i + 1]) / 2.0;
            x[2 * i] = self.a[2 * i] + lambda;
            x[2 * i + 1] = self.a[2 * i + 1] + lambda;
            zw[i] = lambda;
        }
        (x, zw)
    }
}

impl Problem<f64> for SparseProjection {
    fn problem_sizes(&self) -> ProblemSizes {
        ProblemSizes {
            nvars: 4,
            ncon: 0,
            nwcon: 2,
            nwblock: 1,
        }
    }

    fn is_sparse_inequality(&self) -> bool {
        false
    }
    fn use_lower_bounds(&self) -> bool {
        false
    }
    fn use_upper_bounds(&self) -> bool {
        false
    }

    fn vars_and_bounds(&self, x: &mut [f64], lb: &mut [f64], ub: &mut [f64]) {
        x.copy_from_slice(&[0.0; 4]);
        lb.iter_mut().for_each(|v| *v = -1e30);
        ub.iter_mut().for_each(|v| *v = 1e30);
    }

    fn eval_obj_con(&mut self, x: &[f64], _con: &mut [f64]) -> Result<f64, EvalError> {
        Ok(0.5
            * x.iter()
                .zip(&self.a)
                .map(|(xi, ai)| (xi - ai) * (xi - ai))
                .sum::<f64>())
    }

    fn eval_obj_con_gradient(
        &mut self,
        x: &[f64],
        g: &mut [f64],
        _ac: &mut [Vec<f64>],
    ) -> Result<(), EvalError> {
        for i in 0..4 {
            g[i] = x[i] - self.a[i];
        }
        Ok(())
    }

    fn eval_sparse_con(&mut self, x: &[f64], con: &mut [f64]) {
        for i in 0..2 {
            con[i] = x[2 * i] + x[2 * i + 1] - 1.0;
        }
    }

    fn add_sparse_jacobian(&mut self, alpha: f64, _x: &[f64], px: &[f64], out: &mut [f64]) {
        for i in 0..2 {
            out[i] += alpha * (px[2 * i] + px[2 * i + 1]);
        }
    }

    fn add_sparse_jacobian_transpose(
        &mut self,
        alpha: f64,
        _x: &[f64],
        zw: &[f64],
        out: &mut [f64],
    ) {
        for i in 0..2 {
            out[2 * i] += alpha * zw[i];
            out[2 * i + 1] += alpha * zw[i];
        }
    }

    fn add_sparse_inner_product(
        &mut self,
        alpha: f64,
        _x: &[f64],
        cdiag: &[f64],
        cw: &mut [f64],
    ) {
        // Aw diag(c) Aw^T is diagonal for these orthogonal rows
        for i in 0..2 {
            cw[i] += alpha * (cdiag[2 * i] + cdiag[2 * i + 1]);
        }
    }
}

#[test]
fn test_sparse_equality_projection() {
    // the data keeps both multipliers positive, inside the cone the
    // solver maintains for every multiplier
    let mut prob = SparseProjection {
        a: [0.2, 0.1, -0.5, 0.4],
    };
    let (xref, zwref) = prob.solution();

    let settings = SolverSettingsBuilder::default()
        .abs_res_tol(1e-7)
        .verbose(false)
        .build()
        .unwrap();
    let mut solver = InteriorPoint::new(&mut prob, settings);
    let status = solver.optimize(None).unwrap();
    assert_ne!(status, SolverStatus::MaxIterations);

    let x = solver.x();
    for (xi, xr) in x.iter().zip(&xref) {
        assert!((xi - xr).abs() < 1e-6, "x = {x:?}, expected {xref:?}");
    }

    let (zw, _) = solver.sparse_multipliers();
    for (zi, zr) in zw.iter().zip(&zwref) {
        assert!((zi - zr).abs() < 1e-6, "zw = {zw:?}, expected {zwref:?}");
    }
}
