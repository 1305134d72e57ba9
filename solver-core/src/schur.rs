//! Point constraints via a dense Schur complement.
//!
//! Given a factored sparse system `K` and `k` constraints `Cᵀx = g`, the
//! saddle-point system
//!
//! ```text
//! [ K   C ] [x]   [b]
//! [ Cᵀ -D ] [λ] = [g]
//! ```
//!
//! is solved without refactoring `K`:
//!
//! ```text
//! W = K⁻¹ C
//! S = Cᵀ W + D
//! λ = S⁻¹ (Cᵀ K⁻¹ b - g)
//! x = K⁻¹ b - W λ
//! ```
//!
//! `S` is small and dense and goes through [`DenseCholesky`]. When it is
//! not positive definite the caller should fall back to refactoring the
//! augmented system. `W` and `S` belong to one factorization of `K`; after a
//! refactorization, re-analysis or release they must be rebuilt.

use thiserror::Error;

use crate::direct::DirectSolver;
use crate::error::SolverError;
use crate::linalg::cholesky::{DenseCholesky, DenseError};
use crate::linalg::symv;
use crate::phase::Phase;

#[derive(Debug, Error)]
pub enum SchurError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("Schur complement: {0}")]
    Dense(#[from] DenseError),
}

/// Constraint set bound to one factorization of `K`.
///
/// Constraint gradients are stored column by column: entries
/// `j*n .. (j+1)*n` hold column `j` of `C`.
#[derive(Debug, Clone)]
pub struct ConstraintSchur {
    n: usize,
    k: usize,
    constraints: Vec<f64>,
    /// `K⁻¹ C`, same layout as `constraints`.
    w: Vec<f64>,
    /// `Cᵀ W + D`, row-major k×k, both triangles filled.
    schur: Vec<f64>,
    chol: DenseCholesky,
    /// Solver generation `w` was computed under.
    generation: u64,
}

impl ConstraintSchur {
    /// Build the Schur complement for `constraints` using the factorization
    /// currently held by `solver`.
    ///
    /// `compliance` has one entry per constraint (0 for a hard constraint).
    pub fn new(
        solver: &mut DirectSolver,
        constraints: &[f64],
        compliance: &[f64],
    ) -> Result<Self, SchurError> {
        Phase::Solve.check(solver.state())?;
        let n = solver.dimension().unwrap_or(0);
        let k = compliance.len();
        if constraints.len() != n * k {
            return Err(SolverError::DimensionMismatch {
                expected: n * k,
                actual: constraints.len(),
            }
            .into());
        }

        let mut w = vec![0.0; n * k];
        for (c_j, w_j) in constraints.chunks_exact(n).zip(w.chunks_exact_mut(n)) {
            solver.solve(c_j, w_j)?;
        }

        let mut schur = vec![0.0; k * k];
        for i in 0..k {
            let c_i = &constraints[i * n..(i + 1) * n];
            for j in i..k {
                let s = dot(c_i, &w[j * n..(j + 1) * n]);
                schur[i * k + j] = s;
                schur[j * k + i] = s;
            }
            schur[i * k + i] += compliance[i];
        }

        let chol = DenseCholesky::new(k, schur.clone())?;
        tracing::debug!(n, k, "constraint Schur complement factored");

        Ok(Self {
            n,
            k,
            constraints: constraints.to_vec(),
            w,
            schur,
            chol,
            generation: solver.generation(),
        })
    }

    pub fn num_constraints(&self) -> usize {
        self.k
    }

    /// Row-major `Cᵀ K⁻¹ C + D`.
    pub fn schur_matrix(&self) -> &[f64] {
        &self.schur
    }

    /// Solve the constrained system for load `b` and targets `g`.
    ///
    /// Writes `x` and returns the multipliers `λ`.
    pub fn solve(
        &self,
        solver: &mut DirectSolver,
        b: &[f64],
        g: &[f64],
        x: &mut [f64],
    ) -> Result<Vec<f64>, SchurError> {
        if solver.generation() != self.generation {
            return Err(SolverError::StaleFactorization {
                built: self.generation,
                current: solver.generation(),
            }
            .into());
        }
        if g.len() != self.k {
            return Err(SolverError::DimensionMismatch {
                expected: self.k,
                actual: g.len(),
            }
            .into());
        }
        for len in [b.len(), x.len()] {
            if len < self.n {
                return Err(SolverError::DimensionMismatch {
                    expected: self.n,
                    actual: len,
                }
                .into());
            }
        }
        solver.solve(b, x)?;
        let x = &mut x[..self.n];

        let mut lambda: Vec<f64> = self
            .constraints
            .chunks_exact(self.n)
            .zip(g)
            .map(|(c_j, g_j)| dot(c_j, x) - g_j)
            .collect();
        self.chol.solve_in_place(1, &mut lambda)?;

        for (w_j, l_j) in self.w.chunks_exact(self.n).zip(&lambda) {
            for (xi, wi) in x.iter_mut().zip(w_j) {
                *xi -= l_j * wi;
            }
        }
        Ok(lambda)
    }

    /// `½ λᵀ S λ`
    pub fn constraint_energy(&self, lambda: &[f64]) -> Result<f64, DenseError> {
        let mut s_lambda = vec![0.0; self.k];
        symv::multiply_add(&mut s_lambda, self.k, 1.0, &self.schur, lambda, 0.0)?;
        Ok(0.5 * dot(lambda, &s_lambda))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
