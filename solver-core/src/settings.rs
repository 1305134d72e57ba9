//! Solver configuration and back-end selection.
//!
//! The numerical back-end is chosen once, when a
//! [`DirectSolver`](crate::DirectSolver) is built from a [`SolverSettings`],
//! and stays bound to that context for its whole life.

use std::fmt;
use std::str::FromStr;

/// Diagonal shift applied before each numeric factorization unless overridden.
pub const DEFAULT_REGULARIZATION: f64 = 1e-12;

/// Numerical back-end behind the phase protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Pure-Rust sparse LDLᵀ with split forward/diagonal/backward substitution.
    Native,
    /// SuiteSparse LDL (feature `suitesparse-ldl`).
    SuiteSparse,
    /// faer sparse LU (feature `faer`).
    FaerLu,
    /// Stub that fails every phase with a diagnostic.
    Unavailable,
}

impl BackendKind {
    /// Every selectable kind, in preference order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Native,
        BackendKind::SuiteSparse,
        BackendKind::FaerLu,
        BackendKind::Unavailable,
    ];

    /// Whether this back-end was compiled into the current build.
    pub fn is_compiled(self) -> bool {
        match self {
            BackendKind::Native | BackendKind::Unavailable => true,
            BackendKind::SuiteSparse => cfg!(feature = "suitesparse-ldl"),
            BackendKind::FaerLu => cfg!(feature = "faer"),
        }
    }

    /// Cargo feature that enables this back-end, if any.
    pub fn feature(self) -> Option<&'static str> {
        match self {
            BackendKind::SuiteSparse => Some("suitesparse-ldl"),
            BackendKind::FaerLu => Some("faer"),
            BackendKind::Native | BackendKind::Unavailable => None,
        }
    }

    /// Back-ends that actually factor matrices in this build.
    pub fn compiled() -> Vec<BackendKind> {
        Self::ALL
            .into_iter()
            .filter(|k| *k != BackendKind::Unavailable && k.is_compiled())
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::SuiteSparse => "suitesparse",
            BackendKind::FaerLu => "faer-lu",
            BackendKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "ldl" => Ok(BackendKind::Native),
            "suitesparse" | "suitesparse-ldl" | "umfpack" => Ok(BackendKind::SuiteSparse),
            "faer" | "faer-lu" | "lu" => Ok(BackendKind::FaerLu),
            "unavailable" | "none" => Ok(BackendKind::Unavailable),
            other => Err(format!("unknown solver back-end '{}'", other)),
        }
    }
}

/// Fill-reducing ordering applied during symbolic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOrdering {
    /// Keep the caller's ordering.
    Natural,
    /// Reverse Cuthill–McKee bandwidth reduction.
    ReverseCuthillMcKee,
}

impl FromStr for FillOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "natural" | "none" => Ok(FillOrdering::Natural),
            "rcm" | "reverse-cuthill-mckee" => Ok(FillOrdering::ReverseCuthillMcKee),
            other => Err(format!("unknown ordering '{}'", other)),
        }
    }
}

/// Which triangle(s) of the symmetric matrix the caller supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleStorage {
    /// Upper triangle including the diagonal; lower entries are an error.
    Upper,
    /// Both triangles; entries below the diagonal are ignored.
    Full,
}

/// Solver settings and parameters.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Back-end bound to each new solver context.
    pub backend: BackendKind,

    /// Constant added to every diagonal entry before numeric factorization.
    pub regularization: f64,

    /// Fill-reducing ordering for the LDLᵀ back-ends.
    pub ordering: FillOrdering,

    /// Storage convention of incoming matrices.
    pub storage: TriangleStorage,

    /// Worker threads for the faer back-end (0 = all cores, 1 = sequential).
    pub threads: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        // SKINFLAP_SOLVER_BACKEND=native|suitesparse|faer|unavailable
        let backend = std::env::var("SKINFLAP_SOLVER_BACKEND")
            .ok()
            .and_then(|s| s.parse::<BackendKind>().ok())
            .unwrap_or(BackendKind::Native);

        let regularization = std::env::var("SKINFLAP_SOLVER_REG")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(DEFAULT_REGULARIZATION);

        let ordering = std::env::var("SKINFLAP_SOLVER_ORDERING")
            .ok()
            .and_then(|s| s.parse::<FillOrdering>().ok())
            .unwrap_or(FillOrdering::ReverseCuthillMcKee);

        let threads = std::env::var("SKINFLAP_SOLVER_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);

        Self {
            backend,
            regularization,
            ordering,
            storage: TriangleStorage::Upper,
            threads,
        }
    }
}

impl SolverSettings {
    /// Default settings bound to a specific back-end.
    pub fn with_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(format!(
                "regularization must be finite and non-negative, got {}",
                self.regularization
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_parse() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
        }
        assert_eq!("UMFPACK".parse::<BackendKind>().unwrap(), BackendKind::SuiteSparse);
        assert!("pardiso-mkl".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_native_always_compiled() {
        assert!(BackendKind::Native.is_compiled());
        assert!(BackendKind::compiled().contains(&BackendKind::Native));
        assert!(!BackendKind::compiled().contains(&BackendKind::Unavailable));
    }

    #[test]
    fn test_validate_rejects_negative_regularization() {
        let settings = SolverSettings {
            regularization: -1.0,
            ..SolverSettings::with_backend(BackendKind::Native)
        };
        assert!(settings.validate().is_err());

        let settings = SolverSettings {
            regularization: f64::NAN,
            ..SolverSettings::with_backend(BackendKind::Native)
        };
        assert!(settings.validate().is_err());
    }
}
