//! C ABI for the skinflap solver.
//!
//! This crate provides a stable C interface so the host simulator can drive
//! the phase protocol, the dense Cholesky and the symmetric matvec. Solver
//! contexts are opaque heap objects; every function returns an integer
//! status (0 on success) and no panic crosses the boundary.

#![warn(missing_docs)]
#![allow(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

use nalgebra::RealField;

use solver_core::linalg::cholesky::{self, DENSE_DIMENSION_MISMATCH};
use solver_core::linalg::sparse::CsrIndex;
use solver_core::{
    multiply_add, BackendKind, DirectSolver, FactorizationState, Phase, SolverSettings,
    STATUS_INVALID_INPUT,
};

/// Status returned when a Rust panic was caught at the boundary.
pub const STATUS_INTERNAL_ERROR: i32 = -10;

/// Opaque solver context.
pub struct SkinflapSolver {
    inner: DirectSolver,
}

fn backend_from_code(code: i32) -> Option<BackendKind> {
    match code {
        1 => Some(BackendKind::Native),
        2 => Some(BackendKind::SuiteSparse),
        3 => Some(BackendKind::FaerLu),
        4 => Some(BackendKind::Unavailable),
        _ => None,
    }
}

fn guarded<F: FnOnce() -> i32>(f: F) -> i32 {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        tracing::error!("panic caught at the C boundary");
        STATUS_INTERNAL_ERROR
    })
}

/// Borrow `len` elements, or an empty slice for a null pointer.
unsafe fn slice_or_empty<'a, T>(p: *const T, len: usize) -> &'a [T] {
    if p.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(p, len)
    }
}

/// Create a solver context.
///
/// `backend`: 0 = process default (`SKINFLAP_SOLVER_BACKEND`), 1 = native
/// LDLᵀ, 2 = SuiteSparse LDL, 3 = faer LU, 4 = unavailable stub.
/// A negative `regularization` keeps the configured default.
#[no_mangle]
pub extern "C" fn skinflap_solver_new(backend: i32, regularization: f64) -> *mut SkinflapSolver {
    let created = catch_unwind(|| {
        let mut settings = match backend_from_code(backend) {
            Some(kind) => SolverSettings::with_backend(kind),
            None => SolverSettings::default(),
        };
        if regularization >= 0.0 {
            settings.regularization = regularization;
        }
        Box::new(SkinflapSolver {
            inner: DirectSolver::new(settings),
        })
    });
    match created {
        Ok(solver) => Box::into_raw(solver),
        Err(_) => ptr::null_mut(),
    }
}

/// Release and free a solver context. Null is ignored.
///
/// # Safety
/// `solver` must come from [`skinflap_solver_new`] and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn skinflap_solver_free(solver: *mut SkinflapSolver) {
    if solver.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(solver))));
}

/// Current factorization state: 0 empty, 1 symbolic, 2 numeric, 3 solve
/// cached; -1 for a null context.
///
/// # Safety
/// `solver` must be null or a live context.
#[no_mangle]
pub unsafe extern "C" fn skinflap_solver_state(solver: *const SkinflapSolver) -> i32 {
    if solver.is_null() {
        return -1;
    }
    match (*solver).inner.state() {
        FactorizationState::Empty => 0,
        FactorizationState::SymbolicReady => 1,
        FactorizationState::NumericReady => 2,
        FactorizationState::SolveCached => 3,
    }
}

/// Floating-point types the phase protocol accepts across the boundary.
trait PhaseScalar: Copy {
    #[allow(clippy::too_many_arguments)]
    fn execute<I: CsrIndex>(
        solver: &mut DirectSolver,
        phase: i32,
        n: usize,
        values: &[Self],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[Self],
        solution: &mut [Self],
    ) -> i32;
}

impl PhaseScalar for f64 {
    fn execute<I: CsrIndex>(
        solver: &mut DirectSolver,
        phase: i32,
        n: usize,
        values: &[f64],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[f64],
        solution: &mut [f64],
    ) -> i32 {
        solver.execute(phase, n, values, row_ptr, col_idx, rhs, solution)
    }
}

impl PhaseScalar for f32 {
    fn execute<I: CsrIndex>(
        solver: &mut DirectSolver,
        phase: i32,
        n: usize,
        values: &[f32],
        row_ptr: &[I],
        col_idx: &[I],
        rhs: &[f32],
        solution: &mut [f32],
    ) -> i32 {
        solver.execute_f32(phase, n, values, row_ptr, col_idx, rhs, solution)
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn execute_raw<I: CsrIndex, T: PhaseScalar>(
    solver: *mut SkinflapSolver,
    phase: i32,
    n: i64,
    values: *const T,
    row_ptr: *const I,
    col_idx: *const I,
    rhs: *const T,
    solution: *mut T,
) -> i32 {
    if solver.is_null() || n < 0 {
        return STATUS_INVALID_INPUT;
    }
    let solver = &mut (*solver).inner;
    let n = n as usize;

    let needs_matrix = matches!(phase, Phase::SYMBOLIC | Phase::NUMERIC);
    let needs_vectors = matches!(
        phase,
        Phase::SOLVE | Phase::FORWARD | Phase::DIAGONAL | Phase::BACKWARD
    );

    let (row_ptr, col_idx, values) = if needs_matrix {
        if row_ptr.is_null() || col_idx.is_null() || n == 0 {
            return STATUS_INVALID_INPUT;
        }
        let row_ptr = slice::from_raw_parts(row_ptr, n + 1);
        let first: i64 = row_ptr[0].into();
        let last: i64 = row_ptr[n].into();
        if last < first || !(0..=1).contains(&first) {
            return STATUS_INVALID_INPUT;
        }
        let nnz = (last - first) as usize;
        let col_idx = slice::from_raw_parts(col_idx, nnz);
        let values = if phase == Phase::NUMERIC {
            if values.is_null() {
                return STATUS_INVALID_INPUT;
            }
            slice::from_raw_parts(values, nnz)
        } else {
            slice_or_empty(values, nnz)
        };
        (row_ptr, col_idx, values)
    } else {
        (&[][..], &[][..], &[][..])
    };

    if !needs_vectors {
        return T::execute(solver, phase, n, values, row_ptr, col_idx, &[], &mut []);
    }
    if rhs.is_null() || solution.is_null() {
        return STATUS_INVALID_INPUT;
    }
    // In-place solves pass the same buffer twice.
    if ptr::eq(rhs, solution) {
        let rhs = slice::from_raw_parts(rhs, n).to_vec();
        let solution = slice::from_raw_parts_mut(solution, n);
        T::execute(solver, phase, n, values, row_ptr, col_idx, &rhs, solution)
    } else {
        let rhs = slice::from_raw_parts(rhs, n);
        let solution = slice::from_raw_parts_mut(solution, n);
        T::execute(solver, phase, n, values, row_ptr, col_idx, rhs, solution)
    }
}

/// Run one phase with 32-bit CSR indices.
///
/// `values`, `row_ptr`, `col_idx` describe the matrix for phases 11 and 22
/// (`values` may be null for 11). `rhs` and `solution` hold `n` entries for
/// phases 33 and 331-333 and may alias. Other pointers may be null.
///
/// # Safety
/// Non-null pointers must be valid for the lengths implied by `n` and
/// `row_ptr[n]`.
#[no_mangle]
pub unsafe extern "C" fn skinflap_solver_execute(
    solver: *mut SkinflapSolver,
    phase: i32,
    n: i32,
    values: *const f64,
    row_ptr: *const i32,
    col_idx: *const i32,
    rhs: *const f64,
    solution: *mut f64,
) -> i32 {
    guarded(|| execute_raw(solver, phase, n as i64, values, row_ptr, col_idx, rhs, solution))
}

/// Same as [`skinflap_solver_execute`] with 64-bit indices.
///
/// # Safety
/// See [`skinflap_solver_execute`].
#[no_mangle]
pub unsafe extern "C" fn skinflap_solver_execute_64(
    solver: *mut SkinflapSolver,
    phase: i32,
    n: i64,
    values: *const f64,
    row_ptr: *const i64,
    col_idx: *const i64,
    rhs: *const f64,
    solution: *mut f64,
) -> i32 {
    guarded(|| execute_raw(solver, phase, n, values, row_ptr, col_idx, rhs, solution))
}

/// Single-precision [`skinflap_solver_execute`]. The factorization itself
/// runs in double precision.
///
/// # Safety
/// See [`skinflap_solver_execute`].
#[no_mangle]
pub unsafe extern "C" fn skinflap_solver_execute_f32(
    solver: *mut SkinflapSolver,
    phase: i32,
    n: i32,
    values: *const f32,
    row_ptr: *const i32,
    col_idx: *const i32,
    rhs: *const f32,
    solution: *mut f32,
) -> i32 {
    guarded(|| execute_raw(solver, phase, n as i64, values, row_ptr, col_idx, rhs, solution))
}

unsafe fn dense_factor_raw<T: RealField + Copy>(n: i32, a: *mut T) -> i32 {
    if a.is_null() || n < 0 {
        return DENSE_DIMENSION_MISMATCH;
    }
    let n = n as usize;
    guarded(|| {
        let a = slice::from_raw_parts_mut(a, n * n);
        match cholesky::factor(n, a) {
            Ok(()) => 0,
            Err(e) => e.status_code(),
        }
    })
}

unsafe fn dense_solve_raw<T: RealField + Copy>(
    n: i32,
    nrhs: i32,
    factored: *const T,
    rhs: *mut T,
) -> i32 {
    if factored.is_null() || rhs.is_null() || n < 0 || nrhs < 0 {
        return DENSE_DIMENSION_MISMATCH;
    }
    let (n, nrhs) = (n as usize, nrhs as usize);
    guarded(|| {
        let factored = slice::from_raw_parts(factored, n * n);
        let rhs = slice::from_raw_parts_mut(rhs, n * nrhs);
        match cholesky::solve(n, nrhs, factored, rhs) {
            Ok(()) => 0,
            Err(e) => e.status_code(),
        }
    })
}

unsafe fn symv_raw<T: RealField + Copy>(
    result: *mut T,
    n: i32,
    alpha: T,
    a: *const T,
    x: *const T,
    beta: T,
) -> i32 {
    if result.is_null() || a.is_null() || x.is_null() || n < 0 {
        return DENSE_DIMENSION_MISMATCH;
    }
    let n = n as usize;
    guarded(|| {
        let a = slice::from_raw_parts(a, n * n);
        let x = slice::from_raw_parts(x, n);
        let result = slice::from_raw_parts_mut(result, n);
        match multiply_add(result, n, alpha, a, x, beta) {
            Ok(()) => 0,
            Err(e) => e.status_code(),
        }
    })
}

/// In-place dense Cholesky of a row-major `n×n` matrix (upper convention).
///
/// Returns 0, 1 if not positive definite, -1 on bad arguments.
///
/// # Safety
/// `a` must hold `n*n` doubles.
#[no_mangle]
pub unsafe extern "C" fn skinflap_dense_factor(n: i32, a: *mut f64) -> i32 {
    dense_factor_raw(n, a)
}

/// Single-precision [`skinflap_dense_factor`].
///
/// # Safety
/// `a` must hold `n*n` floats.
#[no_mangle]
pub unsafe extern "C" fn skinflap_dense_factor_f32(n: i32, a: *mut f32) -> i32 {
    dense_factor_raw(n, a)
}

/// Solve with a factor from [`skinflap_dense_factor`]; `rhs` is row-major
/// `n×nrhs` and is overwritten with the solution.
///
/// # Safety
/// `factored` must hold `n*n` doubles and `rhs` `n*nrhs`.
#[no_mangle]
pub unsafe extern "C" fn skinflap_dense_solve(
    n: i32,
    nrhs: i32,
    factored: *const f64,
    rhs: *mut f64,
) -> i32 {
    dense_solve_raw(n, nrhs, factored, rhs)
}

/// Single-precision [`skinflap_dense_solve`].
///
/// # Safety
/// `factored` must hold `n*n` floats and `rhs` `n*nrhs`.
#[no_mangle]
pub unsafe extern "C" fn skinflap_dense_solve_f32(
    n: i32,
    nrhs: i32,
    factored: *const f32,
    rhs: *mut f32,
) -> i32 {
    dense_solve_raw(n, nrhs, factored, rhs)
}

/// `result := alpha * A * x + beta * result` for a row-major symmetric `A`
/// (upper triangle referenced).
///
/// # Safety
/// `a` must hold `n*n` doubles; `x` and `result` `n` each.
#[no_mangle]
pub unsafe extern "C" fn skinflap_symv(
    result: *mut f64,
    n: i32,
    alpha: f64,
    a: *const f64,
    x: *const f64,
    beta: f64,
) -> i32 {
    symv_raw(result, n, alpha, a, x, beta)
}

/// Single-precision [`skinflap_symv`].
///
/// # Safety
/// `a` must hold `n*n` floats; `x` and `result` `n` each.
#[no_mangle]
pub unsafe extern "C" fn skinflap_symv_f32(
    result: *mut f32,
    n: i32,
    alpha: f32,
    a: *const f32,
    x: *const f32,
    beta: f32,
) -> i32 {
    symv_raw(result, n, alpha, a, x, beta)
}
