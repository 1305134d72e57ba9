use crate::linalg::backend::{BackendError, SparseBackend};
use crate::linalg::sparse::SymmetricPattern;
use crate::settings::BackendKind;

/// Stand-in used when the selected back-end is not in this build.
///
/// Every numerical phase fails with the stored diagnostic; release succeeds.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: String) -> Self {
        Self { reason }
    }

    fn fail(&self) -> BackendError {
        tracing::error!("{}", self.reason);
        BackendError::Unavailable(self.reason.clone())
    }
}

impl SparseBackend for UnavailableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Unavailable
    }

    fn analyze(&mut self, _pattern: &SymmetricPattern) -> Result<(), BackendError> {
        Err(self.fail())
    }

    fn factorize(&mut self, _pattern: &SymmetricPattern, _values: &[f64]) -> Result<(), BackendError> {
        Err(self.fail())
    }

    fn solve(&self, _rhs: &[f64], _sol: &mut [f64]) -> Result<(), BackendError> {
        Err(self.fail())
    }

    fn release(&mut self) {}
}
