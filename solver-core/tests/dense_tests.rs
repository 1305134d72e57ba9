//! Dense Cholesky, symmetric matvec and Schur-complement constraints.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use solver_core::linalg::cholesky::{self, DENSE_DIMENSION_MISMATCH, DENSE_NOT_POSITIVE_DEFINITE};
use solver_core::{multiply_add, BackendKind, ConstraintSchur, DenseCholesky, DirectSolver, SymmetricCsr};

/// Row-major SPD matrix `M Mᵀ + n I`.
fn random_spd_dense(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let m: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let mut s = 0.0;
            for k in 0..n {
                s += m[i * n + k] * m[j * n + k];
            }
            a[i * n + j] = s + if i == j { n as f64 } else { 0.0 };
        }
    }
    a
}

fn dense_mul(n: usize, a: &[f64], x: &[f64]) -> Vec<f64> {
    (0..n)
        .map(|i| (0..n).map(|j| a[i * n + j] * x[j]).sum())
        .collect()
}

#[test]
fn test_identity_factor_solve_returns_rhs() {
    let n = 5;
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        a[i * n + i] = 1.0;
    }
    cholesky::factor(n, &mut a).unwrap();
    let mut b = vec![1.0, -2.0, 3.0, -4.0, 5.0];
    let expected = b.clone();
    cholesky::solve(n, 1, &a, &mut b).unwrap();
    assert_eq!(b, expected);
}

#[test]
fn test_non_spd_factor_fails() {
    // Indefinite: eigenvalues 3 and -1
    let mut a = vec![1.0, 2.0, 2.0, 1.0];
    let err = cholesky::factor(2, &mut a).unwrap_err();
    assert_eq!(err.status_code(), DENSE_NOT_POSITIVE_DEFINITE);
    assert!(err.status_code() > 0);

    let err = cholesky::factor(3, &mut a).unwrap_err();
    assert_eq!(err.status_code(), DENSE_DIMENSION_MISMATCH);
    assert!(err.status_code() < 0);
}

#[test]
fn test_random_spd_multiple_rhs() {
    let n = 8;
    let nrhs = 3;
    let a = random_spd_dense(n, 5);
    let chol = DenseCholesky::new(n, a.clone()).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let b: Vec<f64> = (0..n * nrhs).map(|_| rng.gen_range(-5.0..5.0)).collect();
    let mut x = b.clone();
    chol.solve_in_place(nrhs, &mut x).unwrap();

    for col in 0..nrhs {
        let xc: Vec<f64> = (0..n).map(|i| x[i * nrhs + col]).collect();
        let ax = dense_mul(n, &a, &xc);
        for i in 0..n {
            let r = ax[i] - b[i * nrhs + col];
            assert!(r.abs() < 1e-10, "column {} row {}: residual {}", col, i, r);
        }
    }
}

#[test]
fn test_upper_factor_reconstructs_matrix() {
    let n = 4;
    let a = random_spd_dense(n, 9);
    let chol = DenseCholesky::new(n, a.clone()).unwrap();
    let u = chol.factor();

    // A = UᵀU using only the upper triangle of U
    for i in 0..n {
        for j in i..n {
            let s: f64 = (0..=i).map(|k| u[k * n + i] * u[k * n + j]).sum();
            assert!((s - a[i * n + j]).abs() < 1e-10, "A[{}][{}] = {}, UᵀU gives {}", i, j, a[i * n + j], s);
        }
    }
}

#[test]
fn test_symv_matches_dense_product() {
    let n = 6;
    let mut a = random_spd_dense(n, 13);
    let full = a.clone();
    // Scribble over the strictly-lower part; it must not be read.
    for i in 1..n {
        for j in 0..i {
            a[i * n + j] = f64::NAN;
        }
    }
    let x: Vec<f64> = (0..n).map(|i| i as f64 - 2.5).collect();
    let mut y = vec![1.0; n];
    multiply_add(&mut y, n, 2.0, &a, &x, -1.0).unwrap();

    let ax = dense_mul(n, &full, &x);
    for i in 0..n {
        let expected = 2.0 * ax[i] - 1.0;
        assert!((y[i] - expected).abs() < 1e-10, "y[{}] = {}, expected {}", i, y[i], expected);
    }
}

#[test]
fn test_schur_constraints_on_sparse_factorization() {
    // 1D chain Laplacian plus identity, two soft constraints.
    let n = 6;
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 3.0));
        if i + 1 < n {
            t.push((i, i + 1, -1.0));
        }
    }
    let k = SymmetricCsr::from_triplets(n, t);
    let mut solver = DirectSolver::with_backend(BackendKind::Native);
    solver.analyze(&k.view()).unwrap();
    solver.factorize(&k.view()).unwrap();

    let mut c = vec![0.0; 2 * n];
    c[0] = 1.0; // x0
    c[n + 3] = 1.0; // x3
    c[n + 4] = -1.0; // - x4
    let compliance = [0.0, 1e-2];
    let schur = ConstraintSchur::new(&mut solver, &c, &compliance).unwrap();

    let b = vec![1.0; n];
    let g = [0.5, 0.0];
    let mut x = vec![0.0; n];
    let lambda = schur.solve(&mut solver, &b, &g, &mut x).unwrap();

    // K x + C λ = b and Cᵀx - D λ = g
    let kx = k.mul_vec(&x).unwrap();
    for i in 0..n {
        let c_lambda = c[i] * lambda[0] + c[n + i] * lambda[1];
        assert!((kx[i] + c_lambda - b[i]).abs() < 1e-9, "row {} unbalanced", i);
    }
    assert!((x[0] - 0.5).abs() < 1e-9, "x0 = {}", x[0]);
    let soft = x[3] - x[4] - compliance[1] * lambda[1];
    assert!((soft - g[1]).abs() < 1e-9, "soft constraint residual {}", soft - g[1]);

    assert!(schur.constraint_energy(&lambda).unwrap() >= 0.0);
}
