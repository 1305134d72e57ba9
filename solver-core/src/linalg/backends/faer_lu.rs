//! faer sparse LU back-end.
//!
//! faer's LU works on the general (unsymmetric) matrix, so the stored upper
//! triangle is mirrored into a full CSC pattern. The symbolic LU is computed
//! once per analysis and reused by every numeric factorization.

use std::sync::OnceLock;

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::{SparseColMatRef, SymbolicSparseColMatRef};
use faer::{MatMut, Par};

use crate::linalg::backend::{BackendError, SparseBackend};
use crate::linalg::sparse::{MirroredPattern, SymmetricPattern};
use crate::settings::BackendKind;

pub struct FaerLuBackend {
    n: usize,
    full: Option<MirroredPattern>,
    symbolic: Option<SymbolicLu<usize>>,
    lu: Option<Lu<usize, f64>>,
    full_values: Vec<f64>,
}

/// Thread count applied to faer's global parallelism, set at most once.
static PARALLELISM: OnceLock<usize> = OnceLock::new();

/// Configure faer's process-wide parallelism from the first explicit request.
///
/// `threads`: 0 keeps faer's default, 1 runs sequentially. Later requests for
/// a different count are ignored with a warning. Returns the count in effect,
/// or `None` if nothing was configured yet.
pub fn configure_parallelism(threads: usize) -> Option<usize> {
    if threads == 0 {
        return PARALLELISM.get().copied();
    }
    let applied = *PARALLELISM.get_or_init(|| {
        match threads {
            1 => faer::set_global_parallelism(Par::Seq),
            t => faer::set_global_parallelism(Par::rayon(t)),
        }
        tracing::info!(threads, "faer parallelism configured");
        threads
    });
    if applied != threads {
        tracing::warn!(
            requested = threads,
            applied,
            "faer parallelism is process-wide and already configured; request ignored"
        );
    }
    Some(applied)
}

impl FaerLuBackend {
    /// `threads` is forwarded to [`configure_parallelism`].
    pub fn new(threads: usize) -> Self {
        configure_parallelism(threads);
        Self {
            n: 0,
            full: None,
            symbolic: None,
            lu: None,
            full_values: Vec::new(),
        }
    }
}

impl SparseBackend for FaerLuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FaerLu
    }

    fn analyze(&mut self, pattern: &SymmetricPattern) -> Result<(), BackendError> {
        let n = pattern.n();
        let full = pattern.mirrored();
        let structure =
            SymbolicSparseColMatRef::new_checked(n, n, full.col_ptr(), None, full.row_idx());
        let symbolic = SymbolicLu::try_new(structure)
            .map_err(|e| BackendError::Message(format!("faer symbolic LU failed: {:?}", e)))?;

        tracing::debug!(n, nnz = full.nnz(), "faer LU symbolic analysis");
        self.n = n;
        self.full = Some(full);
        self.symbolic = Some(symbolic);
        self.lu = None;
        Ok(())
    }

    fn factorize(&mut self, pattern: &SymmetricPattern, values: &[f64]) -> Result<(), BackendError> {
        let (full, symbolic) = match (&self.full, &self.symbolic) {
            (Some(f), Some(s)) => (f, s),
            _ => {
                return Err(BackendError::Message(
                    "numeric factorization before analysis".into(),
                ))
            }
        };
        if pattern.n() != self.n || values.len() != pattern.nnz() {
            return Err(BackendError::Message(
                "matrix does not match the analyzed pattern".into(),
            ));
        }

        full.fill_values(values, &mut self.full_values);
        let structure =
            SymbolicSparseColMatRef::new_checked(self.n, self.n, full.col_ptr(), None, full.row_idx());
        let mat = SparseColMatRef::new(structure, &self.full_values);

        self.lu = None;
        let lu = Lu::try_new_with_symbolic(symbolic.clone(), mat)
            .map_err(|e| BackendError::Message(format!("faer LU factorization failed: {:?}", e)))?;
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError> {
        let lu = self.lu.as_ref().ok_or(BackendError::NotFactored)?;
        if rhs.len() < self.n || sol.len() < self.n {
            return Err(BackendError::Message("vector shorter than system dimension".into()));
        }
        let sol = &mut sol[..self.n];
        sol.copy_from_slice(&rhs[..self.n]);
        lu.solve_in_place(MatMut::from_column_major_slice_mut(sol, self.n, 1));
        Ok(())
    }

    fn release(&mut self) {
        self.n = 0;
        self.full = None;
        self.symbolic = None;
        self.lu = None;
        self.full_values = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::SymmetricCsr;
    use crate::settings::TriangleStorage;

    #[test]
    fn test_faer_lu_solves_indefinite() {
        // [[1, 2], [2, -1]]
        let m = SymmetricCsr::from_triplets(2, vec![(0, 0, 1.0), (0, 1, 2.0), (1, 1, -1.0)]);
        let pattern = SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap();
        let mut vals = Vec::new();
        pattern.assemble(&m.values, 0.0, &mut vals);

        let mut backend = FaerLuBackend::new(1);
        backend.analyze(&pattern).unwrap();
        backend.factorize(&pattern, &vals).unwrap();

        let b = [5.0, 0.0];
        let mut x = [0.0; 2];
        backend.solve(&b, &mut x).unwrap();
        // x = [1, 2]
        assert!((x[0] - 1.0).abs() < 1e-12, "x[0] = {}", x[0]);
        assert!((x[1] - 2.0).abs() < 1e-12, "x[1] = {}", x[1]);
        assert!(!backend.supports_substitution());
    }

    #[test]
    fn test_parallelism_is_configured_once() {
        let first = configure_parallelism(1);
        let second = configure_parallelism(3);
        assert!(first.is_some());
        assert_eq!(first, second);
        // 0 only reports.
        assert_eq!(configure_parallelism(0), first);
    }
}
