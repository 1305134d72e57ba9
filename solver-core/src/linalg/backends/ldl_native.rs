//! Native sparse LDLᵀ back-end.
//!
//! Factors `P A Pᵀ = L D Lᵀ` with the `ldl` crate, where `P` comes from the
//! configured fill ordering. Because `L` and `D` are held explicitly, this
//! back-end runs the forward, diagonal and backward substitutions as separate
//! steps instead of emulating them.
//!
//! Indefinite matrices are accepted as long as no pivot is exactly zero.

use crate::linalg::backend::{BackendError, SparseBackend};
use crate::linalg::ordering::{Ordering, PermutedPattern};
use crate::linalg::sparse::SymmetricPattern;
use crate::phase::Substitution;
use crate::settings::{BackendKind, FillOrdering};

pub struct NativeLdlBackend {
    ordering_kind: FillOrdering,

    n: usize,

    /// Present after symbolic analysis.
    symbolic: Option<LdlSymbolic>,

    /// Present after a successful numeric factorization.
    factor: Option<LdlFactorData>,

    /// Permuted CSC values
    a_x_work: Vec<f64>,

    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,
}

struct LdlSymbolic {
    ordering: Ordering,
    permuted: PermutedPattern,
    etree: Vec<Option<usize>>,
    l_nz: Vec<usize>,
    nnz_l: usize,
}

/// `L` in CSC form plus `D`.
struct LdlFactorData {
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,
}

impl NativeLdlBackend {
    pub fn new(ordering_kind: FillOrdering) -> Self {
        Self {
            ordering_kind,
            n: 0,
            symbolic: None,
            factor: None,
            a_x_work: Vec::new(),
            bwork: Vec::new(),
            iwork: Vec::new(),
            fwork: Vec::new(),
        }
    }

    /// Diagonal `D` of the most recent factorization, in permuted order.
    pub fn d_values(&self) -> Option<&[f64]> {
        self.factor.as_ref().map(|f| f.d.as_slice())
    }

    /// Stored entries of `L` (excluding the unit diagonal).
    pub fn factor_nnz(&self) -> Option<usize> {
        self.symbolic.as_ref().map(|s| s.nnz_l)
    }

    fn factored(&self) -> Result<(&LdlSymbolic, &LdlFactorData), BackendError> {
        match (&self.symbolic, &self.factor) {
            (Some(s), Some(f)) => Ok((s, f)),
            _ => Err(BackendError::NotFactored),
        }
    }

    fn check_len(&self, input: &[f64], output: &[f64]) -> Result<(), BackendError> {
        if input.len() < self.n || output.len() < self.n {
            return Err(BackendError::Message(format!(
                "vector length {} / {} shorter than system dimension {}",
                input.len(),
                output.len(),
                self.n
            )));
        }
        Ok(())
    }
}

impl SparseBackend for NativeLdlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn analyze(&mut self, pattern: &SymmetricPattern) -> Result<(), BackendError> {
        let n = pattern.n();
        let ordering = Ordering::compute(pattern, self.ordering_kind);
        let permuted = ordering.permute(pattern);

        let mut work = vec![0usize; n];
        let mut l_nz = vec![0usize; n];
        let mut etree = vec![None; n];
        let nnz_l = ldl::etree(
            n,
            &permuted.col_ptr,
            &permuted.row_idx,
            &mut work,
            &mut l_nz,
            &mut etree,
        )
        .map_err(|code| {
            BackendError::Message(format!("elimination tree construction failed (code {})", code))
        })?;

        tracing::debug!(
            n,
            nnz_a = pattern.nnz(),
            nnz_l,
            identity_ordering = ordering.is_identity(),
            "native LDL symbolic analysis"
        );

        self.n = n;
        self.symbolic = Some(LdlSymbolic {
            ordering,
            permuted,
            etree,
            l_nz,
            nnz_l,
        });
        self.factor = None;
        self.bwork = vec![ldl::Marker::Unused; n];
        self.iwork = vec![0; 3 * n];
        self.fwork = vec![0.0; n];
        Ok(())
    }

    fn factorize(&mut self, pattern: &SymmetricPattern, values: &[f64]) -> Result<(), BackendError> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or_else(|| BackendError::Message("numeric factorization before analysis".into()))?;
        if pattern.n() != self.n || values.len() != pattern.nnz() {
            return Err(BackendError::Message(format!(
                "matrix does not match the analyzed pattern (n = {}, nnz = {})",
                pattern.n(),
                values.len()
            )));
        }

        symbolic.permuted.permute_values(values, &mut self.a_x_work);

        let n = self.n;
        let nnz_l = symbolic.nnz_l;
        let mut f = self.factor.take().unwrap_or_else(|| LdlFactorData {
            l_p: Vec::new(),
            l_i: Vec::new(),
            l_x: Vec::new(),
            d: Vec::new(),
            d_inv: Vec::new(),
        });
        f.l_p.resize(n + 1, 0);
        f.l_i.resize(nnz_l, 0);
        f.l_x.resize(nnz_l, 0.0);
        f.d.resize(n, 0.0);
        f.d_inv.resize(n, 0.0);

        // ldl expects clean markers
        self.bwork.fill(ldl::Marker::Unused);
        self.iwork.fill(0);
        self.fwork.fill(0.0);

        let result = ldl::factor(
            n,
            &symbolic.permuted.col_ptr,
            &symbolic.permuted.row_idx,
            &self.a_x_work,
            &mut f.l_p,
            &mut f.l_i,
            &mut f.l_x,
            &mut f.d,
            &mut f.d_inv,
            &symbolic.l_nz,
            &symbolic.etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        );

        match result {
            Ok(positive) => {
                tracing::debug!(n, positive_pivots = positive, "native LDL factorization");
                self.factor = Some(f);
                Ok(())
            }
            Err(_) => {
                let column = f.d.iter().position(|&d| d == 0.0).unwrap_or(0);
                let column = symbolic.ordering.perm().get(column).copied().unwrap_or(column);
                Err(BackendError::ZeroPivot { column })
            }
        }
    }

    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError> {
        let (symbolic, f) = self.factored()?;
        self.check_len(rhs, sol)?;

        let mut x = vec![0.0; self.n];
        symbolic.ordering.gather(rhs, &mut x);
        ldl::solve(self.n, &f.l_p, &f.l_i, &f.l_x, &f.d_inv, &mut x);
        symbolic.ordering.scatter(&x, sol);
        Ok(())
    }

    fn supports_substitution(&self) -> bool {
        true
    }

    fn substitute(
        &self,
        step: Substitution,
        input: &[f64],
        output: &mut [f64],
    ) -> Result<(), BackendError> {
        let (symbolic, f) = self.factored()?;
        self.check_len(input, output)?;

        let mut x = vec![0.0; self.n];
        symbolic.ordering.gather(input, &mut x);
        match step {
            Substitution::Forward => ldl::lsolve(self.n, &f.l_p, &f.l_i, &f.l_x, &mut x),
            Substitution::Diagonal => {
                for (xi, di) in x.iter_mut().zip(&f.d_inv) {
                    *xi *= di;
                }
            }
            Substitution::Backward => ldl::ltsolve(self.n, &f.l_p, &f.l_i, &f.l_x, &mut x),
        }
        symbolic.ordering.scatter(&x, output);
        Ok(())
    }

    fn release(&mut self) {
        self.n = 0;
        self.symbolic = None;
        self.factor = None;
        self.a_x_work = Vec::new();
        self.bwork = Vec::new();
        self.iwork = Vec::new();
        self.fwork = Vec::new();
    }
}
