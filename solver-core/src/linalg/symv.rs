//! Symmetric dense matrix-vector product.

use nalgebra::{DMatrixView, DVectorView, DVectorViewMut, RealField};

use super::cholesky::DenseError;

/// `result := alpha * A * x + beta * result`.
///
/// `a` is n×n row-major and only its upper triangle is referenced. When
/// `beta == 0` the prior contents of `result` are not read, so NaN garbage
/// there does not propagate.
pub fn multiply_add<T: RealField + Copy>(
    result: &mut [T],
    n: usize,
    alpha: T,
    a: &[T],
    x: &[T],
    beta: T,
) -> Result<(), DenseError> {
    for (len, expected) in [(a.len(), n * n), (x.len(), n), (result.len(), n)] {
        if len < expected {
            return Err(DenseError::DimensionMismatch {
                expected,
                actual: len,
            });
        }
    }
    if n == 0 {
        return Ok(());
    }

    // Row-major upper == column-major lower, which is what sygemv reads.
    let a = DMatrixView::from_slice(&a[..n * n], n, n);
    let x = DVectorView::from_slice(&x[..n], n);
    let mut y = DVectorViewMut::from_slice(&mut result[..n], n);
    if beta == nalgebra::zero::<T>() {
        y.fill(nalgebra::zero());
    }
    y.sygemv(alpha, &a, &x, beta);
    Ok(())
}
