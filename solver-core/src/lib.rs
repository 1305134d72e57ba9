//! Skinflap solver core: a multi-backend sparse direct solver
//!
//! This library provides the linear-algebra core of an interactive tissue
//! simulator. Large sparse symmetric systems are factored once per topology
//! change and re-solved every simulation step through a fixed phase
//! protocol, whatever numerical back-end sits underneath:
//!
//! - **Phase 11**: symbolic analysis (fill-reducing ordering, elimination tree)
//! - **Phase 22**: numeric factorization, repeatable while the pattern holds
//! - **Phase 33**: solve, or **331/332/333** forward/diagonal/backward steps
//! - **Phase -1**: release
//!
//! Alongside the sparse solver sit a dense Cholesky for small
//! Schur-complement corrections and a symmetric dense matrix-vector product.
//!
//! # Back-ends
//!
//! - **Native**: sparse LDLᵀ from the `ldl` crate with real split substitution
//! - **SuiteSparse**: SuiteSparse LDL (feature `suitesparse-ldl`)
//! - **FaerLu**: faer sparse LU (feature `faer`, on by default)
//!
//! # Example
//!
//! ```
//! use solver_core::{DirectSolver, BackendKind, STATUS_OK};
//!
//! // diag(1, 2, 3, 4), upper triangle, 0-based CSR
//! let row_ptr = [0i32, 1, 2, 3, 4];
//! let col_idx = [0i32, 1, 2, 3];
//! let values = [1.0, 2.0, 3.0, 4.0];
//! let rhs = [1.0, 2.0, 3.0, 4.0];
//! let mut x = [0.0; 4];
//!
//! let mut solver = DirectSolver::with_backend(BackendKind::Native);
//! assert_eq!(solver.execute(11, 4, &values, &row_ptr, &col_idx, &[], &mut []), STATUS_OK);
//! assert_eq!(solver.execute(22, 4, &values, &row_ptr, &col_idx, &[], &mut []), STATUS_OK);
//! assert_eq!(solver.execute(33, 4, &[], &row_ptr, &col_idx, &rhs, &mut x), STATUS_OK);
//! assert!(x.iter().all(|xi| (xi - 1.0).abs() < 1e-9));
//! solver.execute(-1, 0, &[], &row_ptr, &col_idx, &[], &mut []);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod direct;
pub mod error;
pub mod linalg;
pub mod phase;
pub mod schur;
pub mod settings;

pub use direct::DirectSolver;
pub use error::*;
pub use linalg::cholesky::{DenseCholesky, DenseError};
pub use linalg::sparse::{SparseSystem, SymmetricCsr};
pub use linalg::symv::multiply_add;
pub use phase::{FactorizationState, Phase, Substitution};
pub use schur::{ConstraintSchur, SchurError};
pub use settings::{BackendKind, FillOrdering, SolverSettings, TriangleStorage};
