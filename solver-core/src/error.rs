//! Error types and status codes.
//!
//! Every failure in the core is a value. The phase-protocol boundary maps
//! these onto integer status codes (0 = success), which callers treat as
//! opaque beyond success/failure.

use thiserror::Error;

use crate::linalg::backend::BackendError;
use crate::linalg::sparse::PatternError;
use crate::phase::{FactorizationState, Phase};

/// Status code returned on success.
pub const STATUS_OK: i32 = 0;
/// Inconsistent input: bad pattern, bad dimension, missing values.
pub const STATUS_INVALID_INPUT: i32 = -1;
/// A phase was issued before its prerequisite.
pub const STATUS_PHASE_ORDER: i32 = -2;
/// Symbolic analysis failed inside the back-end.
pub const STATUS_SYMBOLIC_FAILED: i32 = -3;
/// Numeric factorization failed (zero pivot, not factorizable).
pub const STATUS_NUMERIC_FAILED: i32 = -4;
/// The solve produced non-finite values; the output was zeroed.
pub const STATUS_NON_FINITE: i32 = -5;
/// Unknown phase code.
pub const STATUS_UNSUPPORTED_PHASE: i32 = -6;
/// A different sparsity pattern was supplied without an intervening release.
pub const STATUS_PATTERN_CHANGED: i32 = -7;
/// No numerical back-end is available in this build.
pub const STATUS_UNAVAILABLE: i32 = -8;
/// The back-end rejected the solve call itself.
pub const STATUS_SOLVE_FAILED: i32 = -9;

/// Errors raised by [`DirectSolver`](crate::DirectSolver).
#[derive(Debug, Error)]
pub enum SolverError {
    /// Structural problem with the supplied CSR arrays.
    #[error("invalid sparsity pattern: {0}")]
    Pattern(#[from] PatternError),

    /// Phase issued in a state that does not satisfy its prerequisite.
    #[error("phase {phase} requires {required}, solver is {current}")]
    PhaseOrder {
        /// Offending phase.
        phase: Phase,
        /// State the phase needs.
        required: &'static str,
        /// State the solver was in.
        current: FactorizationState,
    },

    /// Integer phase code outside the protocol.
    #[error("unsupported phase code {0}")]
    UnsupportedPhase(i32),

    /// Symbolic or numeric phase called with a pattern other than the
    /// analyzed one.
    #[error("sparsity pattern differs from the analyzed pattern; release (phase -1) first")]
    PatternChanged,

    /// An object derived from an earlier factorization was used after the
    /// solver was refactored, re-analyzed or released.
    #[error("factorization {built} is stale; solver is at factorization {current}")]
    StaleFactorization {
        /// Generation the object was built against.
        built: u64,
        /// Current solver generation.
        current: u64,
    },

    /// Vector length does not match the system dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// The numeric phase was called without matrix values.
    #[error("matrix values missing: expected {expected} entries, got {actual}")]
    MissingValues {
        /// Entries required by the pattern.
        expected: usize,
        /// Entries supplied.
        actual: usize,
    },

    /// Non-finite entries were found in a computed solution.
    #[error("solution contains {count} non-finite entries; output zeroed")]
    NonFiniteSolution {
        /// Number of NaN/Inf entries found.
        count: usize,
    },

    /// Failure inside the numerical back-end.
    #[error("{stage} failed: {source}")]
    Backend {
        /// Which step of the protocol failed.
        stage: Stage,
        /// Underlying back-end error.
        #[source]
        source: BackendError,
    },
}

/// Protocol step used to classify back-end failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Symbolic,
    Numeric,
    Solve,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Symbolic => write!(f, "symbolic factorization"),
            Stage::Numeric => write!(f, "numeric factorization"),
            Stage::Solve => write!(f, "solve"),
        }
    }
}

impl SolverError {
    pub(crate) fn backend(stage: Stage, source: BackendError) -> Self {
        SolverError::Backend { stage, source }
    }

    /// Integer status reported at the phase-protocol boundary.
    pub fn status_code(&self) -> i32 {
        match self {
            SolverError::Pattern(_)
            | SolverError::DimensionMismatch { .. }
            | SolverError::MissingValues { .. } => STATUS_INVALID_INPUT,
            SolverError::PhaseOrder { .. } | SolverError::StaleFactorization { .. } => {
                STATUS_PHASE_ORDER
            }
            SolverError::UnsupportedPhase(_) => STATUS_UNSUPPORTED_PHASE,
            SolverError::PatternChanged => STATUS_PATTERN_CHANGED,
            SolverError::NonFiniteSolution { .. } => STATUS_NON_FINITE,
            SolverError::Backend { source: BackendError::Unavailable(_), .. } => STATUS_UNAVAILABLE,
            SolverError::Backend { stage, .. } => match stage {
                Stage::Symbolic => STATUS_SYMBOLIC_FAILED,
                Stage::Numeric => STATUS_NUMERIC_FAILED,
                Stage::Solve => STATUS_SOLVE_FAILED,
            },
        }
    }
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;
