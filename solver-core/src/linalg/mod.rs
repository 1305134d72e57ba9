//! Linear algebra layer.
//!
//! Sparse pattern handling, orderings, factorization back-ends, and the
//! dense kernels used for Schur-complement corrections.

pub mod sparse;
pub mod ordering;
pub mod backend;
pub mod backends;
pub mod cholesky;
pub mod symv;
