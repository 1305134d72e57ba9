//! Dense Cholesky for small Schur-complement systems.
//!
//! Matrices are n×n row-major with the upper-triangular convention:
//! `A = UᵀU` and `U` overwrites the upper triangle, the strictly-lower part
//! is never touched. nalgebra is column-major, so a row-major buffer is read
//! directly as a column-major matrix: its *lower* triangle is the caller's
//! upper one (and `L = Uᵀ`). Nothing is transposed in memory.
//!
//! Everything is generic over nalgebra's `RealField`, so `f32` and `f64`
//! buffers share one code path.

use nalgebra::{Cholesky, ComplexField, DMatrix, Dyn, RealField};
use thiserror::Error;

/// Status returned when the matrix is not positive definite.
pub const DENSE_NOT_POSITIVE_DEFINITE: i32 = 1;
/// Status returned on inconsistent sizes.
pub const DENSE_DIMENSION_MISMATCH: i32 = -1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DenseError {
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("dimension mismatch: expected {expected} entries, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl DenseError {
    pub fn status_code(&self) -> i32 {
        match self {
            DenseError::NotPositiveDefinite => DENSE_NOT_POSITIVE_DEFINITE,
            DenseError::DimensionMismatch { .. } => DENSE_DIMENSION_MISMATCH,
        }
    }
}

fn check_len(len: usize, expected: usize) -> Result<(), DenseError> {
    if len < expected {
        return Err(DenseError::DimensionMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Factor the row-major `n×n` matrix in place.
///
/// On failure `matrix` is left as it was.
pub fn factor<T: RealField + Copy>(n: usize, matrix: &mut [T]) -> Result<(), DenseError> {
    check_len(matrix.len(), n * n)?;
    let a = &mut matrix[..n * n];

    // Upper triangle row-major == lower triangle column-major.
    for col in 0..n {
        if a[col * n + col..(col + 1) * n].iter().any(|v| !ComplexField::is_finite(v)) {
            return Err(DenseError::NotPositiveDefinite);
        }
    }

    let chol = Cholesky::new(DMatrix::from_column_slice(n, n, a))
        .ok_or(DenseError::NotPositiveDefinite)?;
    let l = chol.l_dirty();
    for col in 0..n {
        for row in col..n {
            a[col * n + row] = l[(row, col)];
        }
    }
    Ok(())
}

/// Solve `UᵀU X = B` for a row-major `n×nrhs` block `rhs`, overwritten with `X`.
///
/// `factored` must come from [`factor`].
pub fn solve<T: RealField + Copy>(
    n: usize,
    nrhs: usize,
    factored: &[T],
    rhs: &mut [T],
) -> Result<(), DenseError> {
    check_len(factored.len(), n * n)?;
    check_len(rhs.len(), n * nrhs)?;
    if n == 0 || nrhs == 0 {
        return Ok(());
    }

    // solve_mut only reads the lower triangle, so the caller's strictly-lower
    // entries in `factored` are harmless.
    let chol: Cholesky<T, Dyn> =
        Cholesky::pack_dirty(DMatrix::from_column_slice(n, n, &factored[..n * n]));
    let mut b = DMatrix::from_row_slice(n, nrhs, &rhs[..n * nrhs]);
    chol.solve_mut(&mut b);

    for i in 0..n {
        for j in 0..nrhs {
            rhs[i * nrhs + j] = b[(i, j)];
        }
    }
    Ok(())
}

/// Owned Cholesky factor of a dense SPD matrix.
#[derive(Debug, Clone)]
pub struct DenseCholesky<T = f64> {
    n: usize,
    factor: Vec<T>,
}

impl<T: RealField + Copy> DenseCholesky<T> {
    /// Factor a row-major `n×n` SPD matrix (upper triangle referenced).
    pub fn new(n: usize, mut matrix: Vec<T>) -> Result<Self, DenseError> {
        factor(n, &mut matrix)?;
        matrix.truncate(n * n);
        Ok(Self { n, factor: matrix })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Row-major buffer whose upper triangle holds `U`.
    pub fn factor(&self) -> &[T] {
        &self.factor
    }

    /// Solve in place for a row-major `n×nrhs` block.
    pub fn solve_in_place(&self, nrhs: usize, rhs: &mut [T]) -> Result<(), DenseError> {
        solve(self.n, nrhs, &self.factor, rhs)
    }
}
