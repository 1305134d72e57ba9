//! Phase protocol and factorization state machine.
//!
//! The integer codes (11, 22, 33, 331, 332, 333, -1) exist only at the
//! translation boundary; everything past [`Phase::from_code`] works with the
//! tagged enum and the single transition guard [`Phase::check`].

use std::fmt;

use crate::error::{SolverError, SolverResult};

/// Lifecycle of one factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactorizationState {
    /// Nothing analyzed; no back-end resources held.
    #[default]
    Empty,
    /// Pattern analyzed (ordering, elimination tree).
    SymbolicReady,
    /// Values factored; solves allowed.
    NumericReady,
    /// A forward substitution (phase 331) is pending completion.
    SolveCached,
}

impl fmt::Display for FactorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactorizationState::Empty => "Empty",
            FactorizationState::SymbolicReady => "SymbolicReady",
            FactorizationState::NumericReady => "NumericReady",
            FactorizationState::SolveCached => "SolveCached",
        };
        f.write_str(s)
    }
}

/// One step of a triangular solve `L D Lᵀ x = b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// `L z = b`
    Forward,
    /// `D y = z`
    Diagonal,
    /// `Lᵀ x = y`
    Backward,
}

/// Phase of the direct-solver protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Symbolic,
    Numeric,
    Solve,
    Substitute(Substitution),
    Release,
}

impl Phase {
    pub const SYMBOLIC: i32 = 11;
    pub const NUMERIC: i32 = 22;
    pub const SOLVE: i32 = 33;
    pub const FORWARD: i32 = 331;
    pub const DIAGONAL: i32 = 332;
    pub const BACKWARD: i32 = 333;
    pub const RELEASE: i32 = -1;

    /// Translate an integer phase code.
    pub fn from_code(code: i32) -> SolverResult<Self> {
        match code {
            Self::SYMBOLIC => Ok(Phase::Symbolic),
            Self::NUMERIC => Ok(Phase::Numeric),
            Self::SOLVE => Ok(Phase::Solve),
            Self::FORWARD => Ok(Phase::Substitute(Substitution::Forward)),
            Self::DIAGONAL => Ok(Phase::Substitute(Substitution::Diagonal)),
            Self::BACKWARD => Ok(Phase::Substitute(Substitution::Backward)),
            Self::RELEASE => Ok(Phase::Release),
            other => Err(SolverError::UnsupportedPhase(other)),
        }
    }

    /// Integer code of this phase.
    pub fn code(self) -> i32 {
        match self {
            Phase::Symbolic => Self::SYMBOLIC,
            Phase::Numeric => Self::NUMERIC,
            Phase::Solve => Self::SOLVE,
            Phase::Substitute(Substitution::Forward) => Self::FORWARD,
            Phase::Substitute(Substitution::Diagonal) => Self::DIAGONAL,
            Phase::Substitute(Substitution::Backward) => Self::BACKWARD,
            Phase::Release => Self::RELEASE,
        }
    }

    /// Verify that this phase may run from `state`.
    ///
    /// Only ordering is checked here; pattern identity is checked by the
    /// solver context because it needs the arrays.
    pub fn check(self, state: FactorizationState) -> SolverResult<()> {
        use FactorizationState::*;

        let required = match self {
            Phase::Symbolic | Phase::Release => return Ok(()),
            Phase::Numeric => match state {
                SymbolicReady | NumericReady | SolveCached => return Ok(()),
                Empty => "SymbolicReady",
            },
            Phase::Solve | Phase::Substitute(Substitution::Forward) => match state {
                NumericReady | SolveCached => return Ok(()),
                Empty | SymbolicReady => "NumericReady",
            },
            Phase::Substitute(_) => match state {
                SolveCached => return Ok(()),
                Empty | SymbolicReady | NumericReady => "SolveCached (phase 331 first)",
            },
        };

        Err(SolverError::PhaseOrder {
            phase: self,
            required,
            current: state,
        })
    }

    /// State after this phase completes successfully from `state`.
    pub fn next_state(self, state: FactorizationState) -> FactorizationState {
        use FactorizationState::*;

        match self {
            Phase::Symbolic => SymbolicReady,
            Phase::Numeric => NumericReady,
            Phase::Solve => state,
            Phase::Substitute(Substitution::Forward) | Phase::Substitute(Substitution::Diagonal) => {
                SolveCached
            }
            Phase::Substitute(Substitution::Backward) => NumericReady,
            Phase::Release => Empty,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FactorizationState::*;

    #[test]
    fn test_phase_codes_roundtrip() {
        for code in [11, 22, 33, 331, 332, 333, -1] {
            assert_eq!(Phase::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_unknown_phase_code() {
        for code in [0, 12, 13, 23, 334, -2, 44] {
            assert!(matches!(
                Phase::from_code(code),
                Err(SolverError::UnsupportedPhase(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_numeric_requires_symbolic() {
        assert!(Phase::Numeric.check(Empty).is_err());
        assert!(Phase::Numeric.check(SymbolicReady).is_ok());
        assert!(Phase::Numeric.check(NumericReady).is_ok());
    }

    #[test]
    fn test_solve_requires_numeric() {
        assert!(Phase::Solve.check(Empty).is_err());
        assert!(Phase::Solve.check(SymbolicReady).is_err());
        assert!(Phase::Solve.check(NumericReady).is_ok());
        assert!(Phase::Solve.check(SolveCached).is_ok());
    }

    #[test]
    fn test_sub_phases_follow_forward() {
        let diag = Phase::Substitute(Substitution::Diagonal);
        let back = Phase::Substitute(Substitution::Backward);
        assert!(diag.check(NumericReady).is_err());
        assert!(back.check(NumericReady).is_err());
        assert!(back.check(SolveCached).is_ok());
        assert_eq!(back.next_state(SolveCached), NumericReady);
    }

    #[test]
    fn test_release_always_allowed() {
        for state in [Empty, SymbolicReady, NumericReady, SolveCached] {
            assert!(Phase::Release.check(state).is_ok());
            assert_eq!(Phase::Release.next_state(state), Empty);
        }
    }
}
