//! Numerical back-end abstraction.
//!
//! A back-end owns whatever the underlying factorization library needs
//! (orderings, symbolic analysis, factors). The solver context drives it
//! through [`SparseBackend`] and never looks inside.

use thiserror::Error;

use super::backends;
use super::sparse::SymmetricPattern;
use crate::phase::Substitution;
use crate::settings::{BackendKind, SolverSettings};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Message(String),

    /// The requested back-end is not part of this build.
    #[error("back-end unavailable: {0}")]
    Unavailable(String),

    #[error("{0} is not supported by this back-end")]
    Unsupported(&'static str),

    #[error("zero pivot in column {column}")]
    ZeroPivot { column: usize },

    #[error("no numeric factorization available")]
    NotFactored,
}

/// Sparse symmetric factorization behind the phase protocol.
///
/// All matrices arrive as the validated upper-triangular CSC pattern plus
/// values already scattered into CSC order with the diagonal shift applied.
pub trait SparseBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Symbolic analysis of the pattern.
    fn analyze(&mut self, pattern: &SymmetricPattern) -> Result<(), BackendError>;

    /// Numeric factorization. `values` follow `pattern`'s CSC order.
    fn factorize(&mut self, pattern: &SymmetricPattern, values: &[f64]) -> Result<(), BackendError>;

    /// Solve `A x = rhs`.
    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError>;

    /// Whether [`substitute`](Self::substitute) runs real split steps.
    fn supports_substitution(&self) -> bool {
        false
    }

    /// One step of `L D Lᵀ x = b`, in the caller's ordering.
    fn substitute(
        &self,
        _step: Substitution,
        _input: &[f64],
        _output: &mut [f64],
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("split substitution"))
    }

    /// Drop all factorization state.
    fn release(&mut self);
}

/// Build the back-end selected in `settings`.
///
/// A kind that was not compiled in yields the unavailable stub, which fails
/// every phase with a message naming the missing feature.
pub fn create_backend(settings: &SolverSettings) -> Box<dyn SparseBackend> {
    let kind = settings.backend;
    if !kind.is_compiled() {
        let reason = match kind.feature() {
            Some(feature) => format!("'{}' requires the `{}` feature", kind, feature),
            None => format!("'{}' is not compiled in", kind),
        };
        tracing::warn!(backend = %kind, "{}", reason);
        return Box::new(backends::UnavailableBackend::new(reason));
    }

    tracing::info!(backend = %kind, "creating solver back-end");
    match kind {
        BackendKind::Native => Box::new(backends::NativeLdlBackend::new(settings.ordering)),
        #[cfg(feature = "suitesparse-ldl")]
        BackendKind::SuiteSparse => Box::new(backends::SuiteSparseLdlBackend::new(settings.ordering)),
        #[cfg(feature = "faer")]
        BackendKind::FaerLu => Box::new(backends::FaerLuBackend::new(settings.threads)),
        _ => Box::new(backends::UnavailableBackend::new(
            "no numerical back-end selected".to_string(),
        )),
    }
}
