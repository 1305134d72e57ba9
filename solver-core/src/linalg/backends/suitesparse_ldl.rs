use sprs_suitesparse_ldl::{LdlNumeric, LdlSymbolic};

use crate::linalg::backend::{BackendError, SparseBackend};
use crate::linalg::ordering::Ordering;
use crate::linalg::sparse::{MirroredPattern, SymmetricPattern};
use crate::settings::{BackendKind, FillOrdering};

/// SuiteSparse LDL through `sprs_suitesparse_ldl`.
///
/// With a permutation, LDL reads whole columns of `A`, so the matrix is
/// handed over with both triangles stored.
pub struct SuiteSparseLdlBackend {
    ordering_kind: FillOrdering,
    n: usize,
    full: Option<MirroredPattern>,
    symbolic: Option<LdlSymbolic>,
    numeric: Option<LdlNumeric>,
    full_values: Vec<f64>,
}

impl SuiteSparseLdlBackend {
    pub fn new(ordering_kind: FillOrdering) -> Self {
        Self {
            ordering_kind,
            n: 0,
            full: None,
            symbolic: None,
            numeric: None,
            full_values: Vec::new(),
        }
    }
}

impl SparseBackend for SuiteSparseLdlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SuiteSparse
    }

    fn analyze(&mut self, pattern: &SymmetricPattern) -> Result<(), BackendError> {
        let ordering = Ordering::compute(pattern, self.ordering_kind);
        let full = pattern.mirrored();
        let structure = full.to_csc(vec![1.0; full.nnz()]);

        self.symbolic = Some(LdlSymbolic::new_perm(
            structure.view(),
            ordering.to_sprs(),
            sprs::CheckPerm,
        ));
        tracing::debug!(n = pattern.n(), nnz = full.nnz(), "SuiteSparse LDL symbolic analysis");

        self.n = pattern.n();
        self.full = Some(full);
        self.numeric = None;
        Ok(())
    }

    fn factorize(&mut self, pattern: &SymmetricPattern, values: &[f64]) -> Result<(), BackendError> {
        let full = self
            .full
            .as_ref()
            .ok_or_else(|| BackendError::Message("numeric factorization before analysis".into()))?;
        if pattern.n() != self.n || values.len() != pattern.nnz() {
            return Err(BackendError::Message(
                "matrix does not match the analyzed pattern".into(),
            ));
        }
        full.fill_values(values, &mut self.full_values);
        let mat = full.to_csc(std::mem::take(&mut self.full_values));

        let result = if let Some(numeric) = self.numeric.as_mut() {
            numeric
                .update(mat.view())
                .map_err(|e| BackendError::Message(format!("SuiteSparse LDL update failed: {}", e)))
        } else {
            let symbolic = self
                .symbolic
                .clone()
                .ok_or_else(|| BackendError::Message("symbolic factorization missing".into()))?;
            symbolic
                .factor(mat.view())
                .map(|numeric| self.numeric = Some(numeric))
                .map_err(|e| BackendError::Message(format!("SuiteSparse LDL factor failed: {}", e)))
        };
        if result.is_err() {
            // A failed update leaves a partial factor behind.
            self.numeric = None;
        }

        let (_, _, data) = mat.into_raw_storage();
        self.full_values = data;
        result
    }

    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError> {
        let numeric = self.numeric.as_ref().ok_or(BackendError::NotFactored)?;
        if rhs.len() < self.n || sol.len() < self.n {
            return Err(BackendError::Message("vector shorter than system dimension".into()));
        }
        let rhs_vec: Vec<f64> = rhs[..self.n].to_vec();
        let x = numeric.solve(&rhs_vec);
        sol[..self.n].copy_from_slice(&x);
        Ok(())
    }

    fn release(&mut self) {
        self.n = 0;
        self.full = None;
        self.symbolic = None;
        self.numeric = None;
        self.full_values = Vec::new();
    }
}
