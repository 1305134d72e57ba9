//! Sparse direct solver context.
//!
//! [`DirectSolver`] owns one back-end and one factorization. It is driven
//! either through the typed methods or through [`DirectSolver::execute`],
//! which speaks the integer phase protocol:
//!
//! | code | phase |
//! |------|-------|
//! | 11   | symbolic analysis |
//! | 22   | numeric factorization |
//! | 33   | solve |
//! | 331 / 332 / 333 | forward / diagonal / backward substitution |
//! | -1   | release |
//!
//! Back-ends that cannot split the substitution emulate the sub-phases:
//! 331 solves and caches the result, 332 returns the cache, 333 returns the
//! cache and drops it.

use tracing::{debug, info, warn};

use crate::error::{SolverError, SolverResult, Stage, STATUS_NON_FINITE, STATUS_OK};
use crate::linalg::backend::{create_backend, SparseBackend};
use crate::linalg::sparse::{CsrIndex, SparseSystem, SymmetricPattern};
use crate::phase::{FactorizationState, Phase, Substitution};
use crate::settings::{BackendKind, SolverSettings, DEFAULT_REGULARIZATION};

/// One factorization context bound to one back-end.
pub struct DirectSolver {
    settings: SolverSettings,
    backend: Box<dyn SparseBackend>,
    state: FactorizationState,

    /// Private normalized copy of the analyzed pattern.
    pattern: Option<SymmetricPattern>,

    /// CSC values with the diagonal shift applied.
    assembled: Vec<f64>,

    /// Emulated forward substitution result (331), for back-ends that only
    /// solve in one piece.
    cached: Option<Vec<f64>>,

    /// Bumped whenever the held factorization changes or goes away.
    generation: u64,
}

impl DirectSolver {
    /// Create a context with the back-end chosen in `settings`.
    ///
    /// An invalid regularization falls back to the default with a warning.
    pub fn new(mut settings: SolverSettings) -> Self {
        if let Err(msg) = settings.validate() {
            warn!("{}; using {:e}", msg, DEFAULT_REGULARIZATION);
            settings.regularization = DEFAULT_REGULARIZATION;
        }
        let backend = create_backend(&settings);
        Self {
            settings,
            backend,
            state: FactorizationState::Empty,
            pattern: None,
            assembled: Vec::new(),
            cached: None,
            generation: 0,
        }
    }

    pub fn with_backend(kind: BackendKind) -> Self {
        Self::new(SolverSettings::with_backend(kind))
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn state(&self) -> FactorizationState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Dimension of the analyzed system, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.pattern.as_ref().map(|p| p.n())
    }

    /// Identifies the current factorization. Phases 11, 22 and -1 change it,
    /// solves do not.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether sub-phases 331/332/333 run as real split substitutions.
    pub fn supports_substitution(&self) -> bool {
        self.backend.supports_substitution()
    }

    /// Phase 11: analyze the sparsity pattern of `system`.
    pub fn analyze<I: CsrIndex>(&mut self, system: &SparseSystem<'_, I>) -> SolverResult<()> {
        Phase::Symbolic.check(self.state)?;
        if let Some(current) = &self.pattern {
            if !current.matches(system)? {
                return Err(SolverError::PatternChanged);
            }
        }

        let pattern = SymmetricPattern::analyze(system, self.settings.storage)?;
        self.generation += 1;
        if let Err(e) = self.backend.analyze(&pattern) {
            self.release();
            return Err(SolverError::backend(Stage::Symbolic, e));
        }

        info!(
            backend = %self.backend.kind(),
            n = pattern.n(),
            nnz = pattern.nnz(),
            "symbolic analysis complete"
        );
        self.pattern = Some(pattern);
        self.cached = None;
        self.state = Phase::Symbolic.next_state(self.state);
        Ok(())
    }

    /// Phase 22: factor the current values under the analyzed pattern.
    pub fn factorize<I: CsrIndex>(&mut self, system: &SparseSystem<'_, I>) -> SolverResult<()> {
        Phase::Numeric.check(self.state)?;
        let pattern = self
            .pattern
            .as_ref()
            .ok_or(SolverError::PhaseOrder {
                phase: Phase::Numeric,
                required: "SymbolicReady",
                current: self.state,
            })?;
        if !pattern.matches(system)? {
            return Err(SolverError::PatternChanged);
        }
        let values = system.values();
        if values.len() < pattern.source_nnz() {
            return Err(SolverError::MissingValues {
                expected: pattern.source_nnz(),
                actual: values.len(),
            });
        }

        pattern.assemble(values, self.settings.regularization, &mut self.assembled);
        self.cached = None;
        self.generation += 1;

        match self.backend.factorize(pattern, &self.assembled) {
            Ok(()) => {
                debug!(n = pattern.n(), "numeric factorization complete");
                self.state = Phase::Numeric.next_state(self.state);
                Ok(())
            }
            Err(e) => {
                // The analysis is still valid; only the factor is gone.
                self.state = FactorizationState::SymbolicReady;
                Err(SolverError::backend(Stage::Numeric, e))
            }
        }
    }

    /// Phase 33: solve `A x = rhs`.
    pub fn solve(&mut self, rhs: &[f64], solution: &mut [f64]) -> SolverResult<()> {
        Phase::Solve.check(self.state)?;
        let n = self.check_vectors(rhs, solution)?;

        self.backend
            .solve(&rhs[..n], &mut solution[..n])
            .map_err(|e| SolverError::backend(Stage::Solve, e))?;
        scan_finite(&mut solution[..n])?;
        debug!(n, "solve complete");
        Ok(())
    }

    /// Phases 331/332/333.
    pub fn substitute(
        &mut self,
        step: Substitution,
        rhs: &[f64],
        solution: &mut [f64],
    ) -> SolverResult<()> {
        let phase = Phase::Substitute(step);
        phase.check(self.state)?;
        let n = self.check_vectors(rhs, solution)?;

        let result = if self.backend.supports_substitution() {
            self.backend
                .substitute(step, &rhs[..n], &mut solution[..n])
                .map_err(|e| SolverError::backend(Stage::Solve, e))
                .and_then(|()| scan_finite(&mut solution[..n]))
        } else {
            self.emulate_substitution(step, &rhs[..n], &mut solution[..n])
        };

        match result {
            Ok(()) => {
                debug!(phase = %phase, "substitution step complete");
                self.state = phase.next_state(self.state);
                Ok(())
            }
            Err(e) => {
                // A broken chain has to restart at 331.
                self.cached = None;
                self.state = FactorizationState::NumericReady;
                Err(e)
            }
        }
    }

    fn emulate_substitution(
        &mut self,
        step: Substitution,
        rhs: &[f64],
        solution: &mut [f64],
    ) -> SolverResult<()> {
        match step {
            Substitution::Forward => {
                // Always re-solve, even if a previous 331 left a cache.
                self.cached = None;
                self.backend
                    .solve(rhs, solution)
                    .map_err(|e| SolverError::backend(Stage::Solve, e))?;
                scan_finite(solution)?;
                self.cached = Some(solution.to_vec());
            }
            Substitution::Diagonal => {
                let cached = self.cached.as_ref().ok_or(SolverError::PhaseOrder {
                    phase: Phase::Substitute(step),
                    required: "SolveCached (phase 331 first)",
                    current: self.state,
                })?;
                solution.copy_from_slice(cached);
            }
            Substitution::Backward => {
                let cached = self.cached.take().ok_or(SolverError::PhaseOrder {
                    phase: Phase::Substitute(step),
                    required: "SolveCached (phase 331 first)",
                    current: self.state,
                })?;
                solution.copy_from_slice(&cached);
            }
        }
        Ok(())
    }

    /// Phase -1: drop every back-end resource. Idempotent.
    pub fn release(&mut self) {
        if self.state != FactorizationState::Empty {
            debug!(backend = %self.backend.kind(), "releasing factorization");
            self.generation += 1;
        }
        self.backend.release();
        self.pattern = None;
        self.assembled = Vec::new();
        self.cached = None;
        self.state = FactorizationState::Empty;
    }

    /// Integer phase protocol.
    ///
    /// `values`, `row_ptr` and `col_idx` describe the CSR matrix (phases 11
    /// and 22); `rhs` and `solution` are used by the solve phases. Arguments a
    /// phase does not need may be empty. Returns 0 on success and a negative
    /// status from [`crate::error`] otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn execute<I: CsrIndex>(
        &mut self,
        phase: i32,
        n: usize,
        values: &[f64],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[f64],
        solution: &mut [f64],
    ) -> i32 {
        match self.run(phase, n, values, row_ptr, col_idx, rhs, solution) {
            Ok(()) => STATUS_OK,
            Err(e) => {
                warn!(phase, state = %self.state, error = %e, "solver phase failed");
                e.status_code()
            }
        }
    }

    /// Single-precision form of [`execute`](Self::execute).
    ///
    /// Values and right-hand side are widened to `f64` on private copies and
    /// the solution is narrowed back. A solution that does not fit in `f32`
    /// is zeroed and reported as non-finite.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_f32<I: CsrIndex>(
        &mut self,
        phase: i32,
        n: usize,
        values: &[f32],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[f32],
        solution: &mut [f32],
    ) -> i32 {
        let values: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
        let rhs: Vec<f64> = rhs.iter().map(|&v| f64::from(v)).collect();
        let mut wide = vec![0.0; solution.len()];

        let status = self.execute(phase, n, &values, row_ptr, col_idx, &rhs, &mut wide);
        match status {
            STATUS_OK => {}
            // Already zeroed on the f64 side.
            STATUS_NON_FINITE => {
                solution.fill(0.0);
                return status;
            }
            _ => return status,
        }

        for (s, &w) in solution.iter_mut().zip(&wide) {
            *s = w as f32;
        }
        let overflow = solution.iter().filter(|v| !v.is_finite()).count();
        if overflow > 0 {
            solution.fill(0.0);
            warn!(count = overflow, "solution overflows single precision; output zeroed");
            if matches!(Phase::from_code(phase), Ok(Phase::Substitute(_))) {
                self.cached = None;
                self.state = FactorizationState::NumericReady;
            }
            return SolverError::NonFiniteSolution { count: overflow }.status_code();
        }
        STATUS_OK
    }

    #[allow(clippy::too_many_arguments)]
    fn run<I: CsrIndex>(
        &mut self,
        code: i32,
        n: usize,
        values: &[f64],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[f64],
        solution: &mut [f64],
    ) -> SolverResult<()> {
        let phase = Phase::from_code(code)?;
        debug!(phase = code, n, state = %self.state, "executing phase");
        match phase {
            Phase::Symbolic => self.analyze(&SparseSystem::new(n, row_ptr, col_idx, values)),
            Phase::Numeric => self.factorize(&SparseSystem::new(n, row_ptr, col_idx, values)),
            Phase::Solve | Phase::Substitute(_) => {
                phase.check(self.state)?;
                if let Some(dim) = self.dimension() {
                    if n != dim {
                        return Err(SolverError::DimensionMismatch {
                            expected: dim,
                            actual: n,
                        });
                    }
                }
                match phase {
                    Phase::Substitute(step) => self.substitute(step, rhs, solution),
                    _ => self.solve(rhs, solution),
                }
            }
            Phase::Release => {
                self.release();
                Ok(())
            }
        }
    }

    fn check_vectors(&self, rhs: &[f64], solution: &[f64]) -> SolverResult<usize> {
        let n = self.dimension().unwrap_or(0);
        for len in [rhs.len(), solution.len()] {
            if len < n {
                return Err(SolverError::DimensionMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }
        Ok(n)
    }
}

impl Drop for DirectSolver {
    fn drop(&mut self) {
        self.release();
    }
}

/// Zero `x` and fail if any entry is NaN or infinite.
fn scan_finite(x: &mut [f64]) -> SolverResult<()> {
    let count = x.iter().filter(|v| !v.is_finite()).count();
    if count > 0 {
        x.fill(0.0);
        warn!(count, "non-finite solution entries; output zeroed");
        return Err(SolverError::NonFiniteSolution { count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{STATUS_INVALID_INPUT, STATUS_PATTERN_CHANGED, STATUS_PHASE_ORDER};
    use crate::linalg::sparse::SymmetricCsr;

    fn solver() -> DirectSolver {
        DirectSolver::with_backend(BackendKind::Native)
    }

    #[test]
    fn test_state_walks_through_protocol() {
        let m = SymmetricCsr::diagonal(&[1.0, 2.0, 3.0]);
        let mut s = solver();
        assert_eq!(s.state(), FactorizationState::Empty);
        s.analyze(&m.view()).unwrap();
        assert_eq!(s.state(), FactorizationState::SymbolicReady);
        s.factorize(&m.view()).unwrap();
        assert_eq!(s.state(), FactorizationState::NumericReady);

        let mut x = [0.0; 3];
        s.solve(&[1.0, 2.0, 3.0], &mut x).unwrap();
        s.substitute(Substitution::Forward, &[1.0, 2.0, 3.0], &mut x).unwrap();
        assert_eq!(s.state(), FactorizationState::SolveCached);
        s.release();
        assert_eq!(s.state(), FactorizationState::Empty);
        assert_eq!(s.dimension(), None);
    }

    #[test]
    fn test_failed_factorization_keeps_analysis() {
        // Zero matrix with zero shift cannot be factored.
        let m = SymmetricCsr::diagonal(&[0.0, 0.0]);
        let mut s = DirectSolver::new(SolverSettings {
            regularization: 0.0,
            ..SolverSettings::with_backend(BackendKind::Native)
        });
        s.analyze(&m.view()).unwrap();
        assert!(s.factorize(&m.view()).is_err());
        assert_eq!(s.state(), FactorizationState::SymbolicReady);
    }

    #[test]
    fn test_non_finite_solution_zeroed() {
        let m = SymmetricCsr::diagonal(&[0.5, 0.5]);
        let mut s = solver();
        s.analyze(&m.view()).unwrap();
        s.factorize(&m.view()).unwrap();

        let mut x = [7.0, 7.0];
        let err = s.solve(&[f64::MAX, 1.0], &mut x).unwrap_err();
        assert_eq!(err.status_code(), STATUS_NON_FINITE);
        assert_eq!(x, [0.0, 0.0]);
        // Context stays usable.
        s.solve(&[1.0, 1.0], &mut x).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_execute_reports_status_codes() {
        let m = SymmetricCsr::identity(2);
        let other = SymmetricCsr::from_triplets(2, vec![(0, 0, 1.0), (0, 1, 0.5), (1, 1, 1.0)]);
        let mut s = solver();
        let mut x = [0.0; 2];

        let status = s.execute(22, 2, &m.values, &m.row_ptr, &m.col_idx, &[], &mut []);
        assert_eq!(status, STATUS_PHASE_ORDER);

        assert_eq!(s.execute(11, 2, &[], &m.row_ptr, &m.col_idx, &[], &mut []), STATUS_OK);
        let status = s.execute(11, 2, &[], &other.row_ptr, &other.col_idx, &[], &mut []);
        assert_eq!(status, STATUS_PATTERN_CHANGED);

        assert_eq!(s.execute(22, 2, &m.values, &m.row_ptr, &m.col_idx, &[], &mut []), STATUS_OK);
        let empty: [i64; 0] = [];
        assert_eq!(s.execute(33, 2, &[], &empty, &empty, &[3.0, 4.0], &mut x), STATUS_OK);
        assert!((x[0] - 3.0).abs() < 1e-9 && (x[1] - 4.0).abs() < 1e-9, "x = {:?}", x);
    }

    #[test]
    fn test_malformed_pattern_is_input_error_not_pattern_change() {
        let m = SymmetricCsr::diagonal(&[1.0, 2.0, 3.0]);
        let mut s = solver();
        assert_eq!(s.execute(11, 3, &[], &m.row_ptr, &m.col_idx, &[], &mut []), STATUS_OK);

        let bad_cols = [0i64, 1, 9];
        let status = s.execute(22, 3, &m.values, &m.row_ptr, &bad_cols, &[], &mut []);
        assert_eq!(status, STATUS_INVALID_INPUT);
        let status = s.execute(11, 3, &[], &m.row_ptr, &bad_cols, &[], &mut []);
        assert_eq!(status, STATUS_INVALID_INPUT);
        assert_eq!(s.state(), FactorizationState::SymbolicReady);
    }

    #[test]
    fn test_generation_tracks_factorization_changes() {
        let m = SymmetricCsr::diagonal(&[1.0, 2.0]);
        let mut s = solver();
        let g0 = s.generation();
        s.analyze(&m.view()).unwrap();
        s.factorize(&m.view()).unwrap();
        let g1 = s.generation();
        assert!(g1 > g0);

        let mut x = [0.0; 2];
        s.solve(&[1.0, 1.0], &mut x).unwrap();
        s.substitute(Substitution::Forward, &[1.0, 1.0], &mut x).unwrap();
        assert_eq!(s.generation(), g1);

        s.factorize(&m.view()).unwrap();
        let g2 = s.generation();
        assert!(g2 > g1);
        s.release();
        assert!(s.generation() > g2);
        let g3 = s.generation();
        s.release();
        assert_eq!(s.generation(), g3);
    }

    #[test]
    fn test_single_precision_protocol() {
        let m = SymmetricCsr::diagonal(&[1.0, 2.0, 4.0]);
        let values: Vec<f32> = m.values.iter().map(|&v| v as f32).collect();
        let mut s = solver();
        let mut x = [0.0f32; 3];

        assert_eq!(s.execute_f32(11, 3, &[], &m.row_ptr, &m.col_idx, &[], &mut []), STATUS_OK);
        assert_eq!(s.execute_f32(22, 3, &values, &m.row_ptr, &m.col_idx, &[], &mut []), STATUS_OK);
        let empty: [i64; 0] = [];
        assert_eq!(s.execute_f32(33, 3, &[], &empty, &empty, &[1.0, 2.0, 4.0], &mut x), STATUS_OK);
        for xi in x {
            assert!((xi - 1.0).abs() < 1e-5, "x = {:?}", x);
        }

        // D⁻¹ step: 1e30 / 1e-10 fits in f64 but not in f32.
        let tiny = SymmetricCsr::diagonal(&[1e-10]);
        let mut t = DirectSolver::new(SolverSettings {
            regularization: 0.0,
            ..SolverSettings::with_backend(BackendKind::Native)
        });
        let tiny_values = [1e-10f32];
        assert_eq!(t.execute_f32(11, 1, &[], &tiny.row_ptr, &tiny.col_idx, &[], &mut []), STATUS_OK);
        assert_eq!(t.execute_f32(22, 1, &tiny_values, &tiny.row_ptr, &tiny.col_idx, &[], &mut []), STATUS_OK);
        let mut y = [5.0f32];
        assert_eq!(t.execute_f32(331, 1, &[], &empty, &empty, &[1e30], &mut y), STATUS_OK);
        assert_eq!(t.state(), FactorizationState::SolveCached);
        let z = y;
        let status = t.execute_f32(332, 1, &[], &empty, &empty, &z, &mut y);
        assert_eq!(status, STATUS_NON_FINITE);
        assert_eq!(y, [0.0]);
        assert_eq!(t.state(), FactorizationState::NumericReady);
    }
}
