//! Sparse matrix views and pattern normalization.
//!
//! Callers hand the solver a symmetric matrix in compressed sparse row form
//! with either 0- or 1-based indices. [`SparseSystem`] borrows those arrays
//! without copying or mutating them; [`SymmetricPattern`] is the private,
//! validated, 0-based upper-triangular CSC copy every back-end starts from.

use sprs::{CsMat, TriMat};
use thiserror::Error;

use crate::settings::TriangleStorage;

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Marker in [`SymmetricPattern::source_map`] for entries that are ignored.
pub const DROPPED: usize = usize::MAX;

/// Integer types accepted for row pointers and column indices.
pub trait CsrIndex: Copy + Into<i64> {}

impl<T: Copy + Into<i64>> CsrIndex for T {}

/// Structural problems in caller-supplied CSR arrays.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("system dimension must be positive")]
    EmptySystem,

    #[error("row pointer array has {actual} entries, need {expected}")]
    RowPointerLength { expected: usize, actual: usize },

    #[error("index base must be 0 or 1, row_ptr[0] = {0}")]
    InvalidBase(i64),

    #[error("row pointer decreases at row {row}")]
    RowPointerDecreasing { row: usize },

    #[error("index arrays hold {actual} entries, row pointers need {expected}")]
    IndexArrayTooShort { expected: usize, actual: usize },

    #[error("column index {col} in row {row} outside [{lo}, {hi}]")]
    ColumnOutOfRange { row: usize, col: i64, lo: i64, hi: i64 },

    #[error("column indices of row {row} are not strictly increasing")]
    UnsortedRow { row: usize },

    #[error("entry ({row}, {col}) lies below the diagonal of an upper-triangular matrix")]
    LowerTriangleEntry { row: usize, col: usize },
}

/// Borrowed view of a symmetric matrix in CSR form.
///
/// The index base is detected from `row_ptr[0]`. Nothing is validated until
/// the view is analyzed.
#[derive(Debug, Clone, Copy)]
pub struct SparseSystem<'a, I> {
    n: usize,
    row_ptr: &'a [I],
    col_idx: &'a [I],
    values: &'a [f64],
}

/// 0-based copies of the CSR structure.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedCsr {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl<'a, I: CsrIndex> SparseSystem<'a, I> {
    pub fn new(n: usize, row_ptr: &'a [I], col_idx: &'a [I], values: &'a [f64]) -> Self {
        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// View of the structure alone, for symbolic analysis.
    pub fn pattern(n: usize, row_ptr: &'a [I], col_idx: &'a [I]) -> Self {
        Self::new(n, row_ptr, col_idx, &[])
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    /// Index base (0 or 1) read from the first row pointer.
    pub fn index_base(&self) -> Result<i64, PatternError> {
        let first = self.row_ptr.first().copied().ok_or(PatternError::RowPointerLength {
            expected: self.n + 1,
            actual: 0,
        })?;
        match first.into() {
            b @ (0 | 1) => Ok(b),
            other => Err(PatternError::InvalidBase(other)),
        }
    }

    /// Number of stored entries according to the row pointers.
    pub fn nnz(&self) -> Result<usize, PatternError> {
        self.check_row_pointers().map(|(_, nnz)| nnz)
    }

    fn check_row_pointers(&self) -> Result<(i64, usize), PatternError> {
        if self.n == 0 {
            return Err(PatternError::EmptySystem);
        }
        if self.row_ptr.len() < self.n + 1 {
            return Err(PatternError::RowPointerLength {
                expected: self.n + 1,
                actual: self.row_ptr.len(),
            });
        }
        let base = self.index_base()?;
        for row in 0..self.n {
            if self.row_ptr[row + 1].into() < self.row_ptr[row].into() {
                return Err(PatternError::RowPointerDecreasing { row });
            }
        }
        let nnz = (self.row_ptr[self.n].into() - base) as usize;
        if self.col_idx.len() < nnz {
            return Err(PatternError::IndexArrayTooShort {
                expected: nnz,
                actual: self.col_idx.len(),
            });
        }
        Ok((base, nnz))
    }

    /// Validate the structure and produce 0-based copies.
    ///
    /// Never reads past `row_ptr[n]` or the end of `col_idx`.
    fn normalized(&self) -> Result<NormalizedCsr, PatternError> {
        let (base, nnz) = self.check_row_pointers()?;
        let n = self.n;
        let (lo, hi) = (base, n as i64 - 1 + base);

        let row_ptr: Vec<usize> = self.row_ptr[..=n]
            .iter()
            .map(|&p| (p.into() - base) as usize)
            .collect();

        let mut col_idx = Vec::with_capacity(nnz);
        for row in 0..n {
            let mut prev: Option<usize> = None;
            for k in row_ptr[row]..row_ptr[row + 1] {
                let raw = self.col_idx[k].into();
                if raw < lo || raw > hi {
                    return Err(PatternError::ColumnOutOfRange { row, col: raw, lo, hi });
                }
                let col = (raw - base) as usize;
                if prev.is_some_and(|p| col <= p) {
                    return Err(PatternError::UnsortedRow { row });
                }
                prev = Some(col);
                col_idx.push(col);
            }
        }

        Ok(NormalizedCsr { row_ptr, col_idx })
    }

    /// `y := alpha * A * x + beta * y` for the symmetric matrix in this view.
    ///
    /// With `Upper` storage each off-diagonal entry contributes twice. If
    /// `beta` is zero, `y` is not read.
    pub fn symmetric_multiply_add(
        &self,
        storage: TriangleStorage,
        alpha: f64,
        x: &[f64],
        beta: f64,
        y: &mut [f64],
    ) -> Result<(), PatternError> {
        let csr = self.normalized()?;
        let nnz = csr.col_idx.len();
        if x.len() < self.n || y.len() < self.n || self.values.len() < nnz {
            return Err(PatternError::IndexArrayTooShort {
                expected: nnz.max(self.n),
                actual: x.len().min(y.len()).min(self.values.len()),
            });
        }

        let y = &mut y[..self.n];
        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            y.iter_mut().for_each(|yi| *yi *= beta);
        }
        if alpha == 0.0 {
            return Ok(());
        }

        for row in 0..self.n {
            for k in csr.row_ptr[row]..csr.row_ptr[row + 1] {
                let col = csr.col_idx[k];
                let v = alpha * self.values[k];
                match storage {
                    TriangleStorage::Full => y[row] += v * x[col],
                    TriangleStorage::Upper => {
                        if col < row {
                            return Err(PatternError::LowerTriangleEntry { row, col });
                        }
                        y[row] += v * x[col];
                        if col != row {
                            y[col] += v * x[row];
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Validated upper-triangular CSC pattern owned by the solver.
///
/// Every column carries a structural diagonal entry (inserted when the caller
/// omitted it) so the diagonal shift always has a slot.
#[derive(Debug, Clone)]
pub struct SymmetricPattern {
    n: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    /// Caller entry k lands at `source_map[k]` of the CSC values, or is DROPPED.
    source_map: Vec<usize>,
    diag_positions: Vec<usize>,
    csr: NormalizedCsr,
}

impl SymmetricPattern {
    /// Validate `system` and build the private upper-triangular CSC pattern.
    pub fn analyze<I: CsrIndex>(
        system: &SparseSystem<'_, I>,
        storage: TriangleStorage,
    ) -> Result<Self, PatternError> {
        let csr = system.normalized()?;
        let n = system.n();
        let nnz_in = csr.col_idx.len();

        // Count entries per CSC column, one diagonal slot per column.
        let mut has_diag = vec![false; n];
        let mut counts = vec![0usize; n];
        for row in 0..n {
            for &col in &csr.col_idx[csr.row_ptr[row]..csr.row_ptr[row + 1]] {
                if col < row {
                    if storage == TriangleStorage::Upper {
                        return Err(PatternError::LowerTriangleEntry { row, col });
                    }
                    continue;
                }
                if col == row {
                    has_diag[row] = true;
                }
                counts[col] += 1;
            }
        }
        for (count, &diag) in counts.iter_mut().zip(&has_diag) {
            if !diag {
                *count += 1;
            }
        }

        let mut col_ptr = vec![0usize; n + 1];
        for j in 0..n {
            col_ptr[j + 1] = col_ptr[j] + counts[j];
        }

        // Rows are visited in increasing order, so each column comes out sorted
        // with its diagonal last.
        let mut next = col_ptr[..n].to_vec();
        let mut row_idx = vec![0usize; col_ptr[n]];
        let mut source_map = vec![DROPPED; nnz_in];
        let mut diag_positions = vec![0usize; n];
        for row in 0..n {
            for k in csr.row_ptr[row]..csr.row_ptr[row + 1] {
                let col = csr.col_idx[k];
                if col < row {
                    continue;
                }
                if col == row {
                    // Upper-triangular rows are sorted, so the diagonal comes
                    // first in the row; anything left of it was skipped above.
                    diag_positions[row] = next[col];
                }
                row_idx[next[col]] = row;
                source_map[k] = next[col];
                next[col] += 1;
            }
            if !has_diag[row] {
                diag_positions[row] = next[row];
                row_idx[next[row]] = row;
                next[row] += 1;
            }
        }

        Ok(Self {
            n,
            col_ptr,
            row_idx,
            source_map,
            diag_positions,
            csr,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Stored entries of the upper-triangular CSC pattern.
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    /// Entries expected in the caller's value array.
    pub fn source_nnz(&self) -> usize {
        self.source_map.len()
    }

    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    pub fn row_idx(&self) -> &[usize] {
        &self.row_idx
    }

    pub fn diag_positions(&self) -> &[usize] {
        &self.diag_positions
    }

    /// Whether `system` has exactly the structure this pattern was built from.
    ///
    /// Index base is ignored: the same pattern in 0- and 1-based form matches.
    /// A malformed `system` is an error, not a mismatch.
    pub fn matches<I: CsrIndex>(&self, system: &SparseSystem<'_, I>) -> Result<bool, PatternError> {
        let csr = system.normalized()?;
        Ok(system.n() == self.n && csr == self.csr)
    }

    /// Scatter caller values into CSC order and add `shift` to the diagonal.
    ///
    /// `values` must hold at least [`source_nnz`](Self::source_nnz) entries.
    pub fn assemble(&self, values: &[f64], shift: f64, out: &mut Vec<f64>) {
        out.clear();
        out.resize(self.nnz(), 0.0);
        for (&pos, &v) in self.source_map.iter().zip(values) {
            if pos != DROPPED {
                out[pos] += v;
            }
        }
        if shift != 0.0 {
            for &pos in &self.diag_positions {
                out[pos] += shift;
            }
        }
    }

    /// Upper-triangular CSC matrix carrying `values` (already assembled).
    pub fn to_csc(&self, values: Vec<f64>) -> SparseCsc {
        CsMat::new_csc(
            (self.n, self.n),
            self.col_ptr.clone(),
            self.row_idx.clone(),
            values,
        )
    }

    /// Structure of the full symmetric matrix (both triangles), for orderings.
    pub fn full_structure(&self) -> SparseCsc {
        let mut tri = TriMat::new((self.n, self.n));
        for col in 0..self.n {
            for &row in &self.row_idx[self.col_ptr[col]..self.col_ptr[col + 1]] {
                tri.add_triplet(row, col, 1.0);
                if row != col {
                    tri.add_triplet(col, row, 1.0);
                }
            }
        }
        tri.to_csc()
    }

    /// Iterate `(row, col, csc_position)` over the upper triangle.
    pub fn iter_upper(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.n).flat_map(move |col| {
            (self.col_ptr[col]..self.col_ptr[col + 1]).map(move |pos| (self.row_idx[pos], col, pos))
        })
    }

    /// Both triangles as a CSC pattern with sorted columns.
    pub fn mirrored(&self) -> MirroredPattern {
        let n = self.n;

        // Strict-lower part of column j is row j of the upper triangle.
        let mut lower_counts = vec![0usize; n];
        for (row, col, _) in self.iter_upper() {
            if row != col {
                lower_counts[row] += 1;
            }
        }

        let mut col_ptr = vec![0usize; n + 1];
        for j in 0..n {
            let upper = self.col_ptr[j + 1] - self.col_ptr[j];
            col_ptr[j + 1] = col_ptr[j] + upper + lower_counts[j];
        }

        let nnz = col_ptr[n];
        let mut row_idx = vec![0usize; nnz];
        let mut upper_pos = vec![0usize; nnz];

        let mut next: Vec<usize> = (0..n)
            .map(|j| col_ptr[j] + self.col_ptr[j + 1] - self.col_ptr[j])
            .collect();
        for j in 0..n {
            let base = col_ptr[j];
            for (offset, pos) in (self.col_ptr[j]..self.col_ptr[j + 1]).enumerate() {
                row_idx[base + offset] = self.row_idx[pos];
                upper_pos[base + offset] = pos;
            }
        }
        // Visiting columns in order appends lower rows in ascending order.
        for (row, col, pos) in self.iter_upper() {
            if row != col {
                let slot = next[row];
                row_idx[slot] = col;
                upper_pos[slot] = pos;
                next[row] += 1;
            }
        }

        MirroredPattern {
            n,
            col_ptr,
            row_idx,
            upper_pos,
        }
    }
}

/// Full symmetric CSC pattern expanded from a [`SymmetricPattern`].
#[derive(Debug, Clone)]
pub struct MirroredPattern {
    n: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    /// Position in the upper-triangular value array each entry copies from.
    upper_pos: Vec<usize>,
}

impl MirroredPattern {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    pub fn row_idx(&self) -> &[usize] {
        &self.row_idx
    }

    /// Expand assembled upper-triangular values onto both triangles.
    pub fn fill_values(&self, upper: &[f64], out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.upper_pos.iter().map(|&p| upper[p]));
    }

    pub fn to_csc(&self, values: Vec<f64>) -> SparseCsc {
        CsMat::new_csc(
            (self.n, self.n),
            self.col_ptr.clone(),
            self.row_idx.clone(),
            values,
        )
    }
}

/// Owned symmetric matrix in CSR form (upper triangle), 64-bit indices.
///
/// Convenience builder for callers and tests that do not already hold CSR
/// arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricCsr {
    pub n: usize,
    pub row_ptr: Vec<i64>,
    pub col_idx: Vec<i64>,
    pub values: Vec<f64>,
}

impl SymmetricCsr {
    /// Build from upper-triangle triplets `(i, j, v)` with `j >= i`.
    ///
    /// Duplicates are summed.
    pub fn from_triplets<T>(n: usize, triplets: T) -> Self
    where
        T: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut tri = TriMat::new((n, n));
        for (i, j, v) in triplets {
            assert!(j >= i, "Symmetric matrix must only contain upper triangle");
            tri.add_triplet(i, j, v);
        }
        let csr: CsMat<f64> = tri.to_csr();
        let indptr = csr.indptr();
        Self {
            n,
            row_ptr: indptr.raw_storage().iter().map(|&p| p as i64).collect(),
            col_idx: csr.indices().iter().map(|&c| c as i64).collect(),
            values: csr.data().to_vec(),
        }
    }

    /// Diagonal matrix.
    pub fn diagonal(diag: &[f64]) -> Self {
        Self::from_triplets(diag.len(), diag.iter().enumerate().map(|(i, &v)| (i, i, v)))
    }

    pub fn identity(n: usize) -> Self {
        Self::diagonal(&vec![1.0; n])
    }

    /// Same matrix with 1-based indices.
    pub fn one_based(&self) -> Self {
        Self {
            n: self.n,
            row_ptr: self.row_ptr.iter().map(|p| p + 1).collect(),
            col_idx: self.col_idx.iter().map(|c| c + 1).collect(),
            values: self.values.clone(),
        }
    }

    pub fn view(&self) -> SparseSystem<'_, i64> {
        SparseSystem::new(self.n, &self.row_ptr, &self.col_idx, &self.values)
    }

    /// `A x` for the symmetric matrix.
    pub fn mul_vec(&self, x: &[f64]) -> Result<Vec<f64>, PatternError> {
        let mut y = vec![0.0; self.n];
        self.view()
            .symmetric_multiply_add(TriangleStorage::Upper, 1.0, x, 0.0, &mut y)?;
        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiag_upper() -> SymmetricCsr {
        // [4 1 0; 1 4 1; 0 1 4]
        SymmetricCsr::from_triplets(
            3,
            vec![(0, 0, 4.0), (0, 1, 1.0), (1, 1, 4.0), (1, 2, 1.0), (2, 2, 4.0)],
        )
    }

    #[test]
    fn test_index_base_detection() {
        let m = tridiag_upper();
        assert_eq!(m.view().index_base().unwrap(), 0);
        let one = m.one_based();
        assert_eq!(one.view().index_base().unwrap(), 1);

        let bad = [2i32, 3, 4];
        let cols = [0i32, 1];
        let view = SparseSystem::pattern(2, &bad, &cols);
        assert_eq!(view.index_base(), Err(PatternError::InvalidBase(2)));
    }

    #[test]
    fn test_pattern_is_base_independent() {
        let m = tridiag_upper();
        let zero = SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap();
        let one_m = m.one_based();
        let one = SymmetricPattern::analyze(&one_m.view(), TriangleStorage::Upper).unwrap();
        assert_eq!(zero.col_ptr(), one.col_ptr());
        assert_eq!(zero.row_idx(), one.row_idx());
        assert!(zero.matches(&one_m.view()).unwrap());
    }

    #[test]
    fn test_column_out_of_range_reported() {
        let row_ptr = [0i32, 2, 3];
        let col_idx = [0i32, 5, 1];
        let values = [1.0, 2.0, 3.0];
        let view = SparseSystem::new(2, &row_ptr, &col_idx, &values);
        let err = SymmetricPattern::analyze(&view, TriangleStorage::Upper).unwrap_err();
        assert!(matches!(err, PatternError::ColumnOutOfRange { row: 0, col: 5, .. }));
    }

    #[test]
    fn test_short_index_array_reported() {
        // row_ptr claims 4 entries, col_idx only has 2
        let row_ptr = [0i64, 2, 4];
        let col_idx = [0i64, 1];
        let view = SparseSystem::pattern(2, &row_ptr, &col_idx);
        let err = SymmetricPattern::analyze(&view, TriangleStorage::Upper).unwrap_err();
        assert_eq!(err, PatternError::IndexArrayTooShort { expected: 4, actual: 2 });
    }

    #[test]
    fn test_unsorted_row_rejected() {
        let row_ptr = [0i32, 2, 3];
        let col_idx = [1i32, 0, 1];
        let view = SparseSystem::pattern(2, &row_ptr, &col_idx);
        let err = SymmetricPattern::analyze(&view, TriangleStorage::Full).unwrap_err();
        assert_eq!(err, PatternError::UnsortedRow { row: 0 });
    }

    #[test]
    fn test_lower_entry_rejected_for_upper_storage() {
        let row_ptr = [0i32, 1, 3];
        let col_idx = [0i32, 0, 1];
        let view = SparseSystem::pattern(2, &row_ptr, &col_idx);
        let err = SymmetricPattern::analyze(&view, TriangleStorage::Upper).unwrap_err();
        assert_eq!(err, PatternError::LowerTriangleEntry { row: 1, col: 0 });

        // Full storage keeps only the upper half.
        let full = SymmetricPattern::analyze(&view, TriangleStorage::Full).unwrap();
        assert_eq!(full.nnz(), 2);
    }

    #[test]
    fn test_missing_diagonal_inserted() {
        // [0 1; 1 2] with no stored (0,0)
        let m = SymmetricCsr::from_triplets(2, vec![(0, 1, 1.0), (1, 1, 2.0)]);
        let pattern = SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap();
        assert_eq!(pattern.nnz(), 3);

        let mut vals = Vec::new();
        pattern.assemble(&m.values, 0.5, &mut vals);
        let diag: Vec<f64> = pattern.diag_positions().iter().map(|&p| vals[p]).collect();
        assert_eq!(diag, vec![0.5, 2.5]);
    }

    #[test]
    fn test_assemble_places_values_in_csc_order() {
        let m = tridiag_upper();
        let pattern = SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap();
        let mut vals = Vec::new();
        pattern.assemble(&m.values, 0.0, &mut vals);

        let csc = pattern.to_csc(vals);
        for (&v, (row, col)) in csc.iter() {
            assert!(row <= col);
            let expected = if row == col { 4.0 } else { 1.0 };
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn test_symmetric_multiply_add() {
        let m = tridiag_upper();
        let x = [1.0, 2.0, 3.0];
        let mut y = [1.0, 1.0, 1.0];
        m.view()
            .symmetric_multiply_add(TriangleStorage::Upper, 1.0, &x, 2.0, &mut y)
            .unwrap();
        // A x = [6, 12, 14]
        assert_eq!(y, [8.0, 14.0, 16.0]);
    }

    #[test]
    fn test_mirrored_pattern_is_symmetric_and_sorted() {
        let m = tridiag_upper();
        let pattern = SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap();
        let full = pattern.mirrored();
        assert_eq!(full.nnz(), 7);

        let mut upper = Vec::new();
        pattern.assemble(&m.values, 0.0, &mut upper);
        let mut vals = Vec::new();
        full.fill_values(&upper, &mut vals);

        let csc = full.to_csc(vals);
        for col in 0..3 {
            let rows = &full.row_idx()[full.col_ptr()[col]..full.col_ptr()[col + 1]];
            assert!(rows.windows(2).all(|w| w[0] < w[1]), "column {} unsorted", col);
        }
        for (&v, (row, col)) in csc.iter() {
            assert_eq!(Some(&v), csc.get(col, row));
        }
    }

    #[test]
    fn test_matches_detects_pattern_change() {
        let a = tridiag_upper();
        let b = SymmetricCsr::from_triplets(3, vec![(0, 0, 4.0), (0, 2, 1.0), (1, 1, 4.0), (2, 2, 4.0)]);
        let pattern = SymmetricPattern::analyze(&a.view(), TriangleStorage::Upper).unwrap();
        assert!(pattern.matches(&a.view()).unwrap());
        assert!(!pattern.matches(&b.view()).unwrap());
    }

    #[test]
    fn test_matches_reports_malformed_system() {
        let a = tridiag_upper();
        let pattern = SymmetricPattern::analyze(&a.view(), TriangleStorage::Upper).unwrap();
        let mut bad = a.clone();
        bad.col_idx[4] = 9;
        assert!(matches!(
            pattern.matches(&bad.view()),
            Err(PatternError::ColumnOutOfRange { col: 9, .. })
        ));
    }

    #[test]
    fn test_mul_vec_rejects_broken_matrix() {
        let mut m = tridiag_upper();
        assert_eq!(m.mul_vec(&[1.0, 1.0, 1.0]).unwrap(), vec![5.0, 6.0, 5.0]);
        m.row_ptr.pop();
        assert!(m.mul_vec(&[1.0, 1.0, 1.0]).is_err());
    }
}
