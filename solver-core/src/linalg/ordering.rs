//! Fill-reducing orderings and symmetric permutation.

use sprs::PermOwned;

use super::sparse::SymmetricPattern;
use crate::settings::FillOrdering;

/// Symmetric permutation `P A Pᵀ`.
///
/// `perm[new] = old`, `iperm[old] = new`.
#[derive(Debug, Clone)]
pub struct Ordering {
    perm: Vec<usize>,
    iperm: Vec<usize>,
}

impl Ordering {
    pub fn identity(n: usize) -> Self {
        let perm: Vec<usize> = (0..n).collect();
        Self {
            iperm: perm.clone(),
            perm,
        }
    }

    /// Compute an ordering for `pattern`.
    pub fn compute(pattern: &SymmetricPattern, kind: FillOrdering) -> Self {
        match kind {
            FillOrdering::Natural => Self::identity(pattern.n()),
            FillOrdering::ReverseCuthillMcKee => {
                // RCM needs the adjacency of both triangles.
                let full = pattern.full_structure();
                let ordering = sprs::linalg::reverse_cuthill_mckee(full.view());
                let perm = ordering.perm.vec();
                let mut iperm = vec![0usize; perm.len()];
                for (new, &old) in perm.iter().enumerate() {
                    iperm[old] = new;
                }
                Self { perm, iperm }
            }
        }
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn iperm(&self) -> &[usize] {
        &self.iperm
    }

    pub fn is_identity(&self) -> bool {
        self.perm.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Owned sprs permutation, for back-ends that take one.
    pub fn to_sprs(&self) -> PermOwned {
        PermOwned::new(self.perm.clone())
    }

    /// `out[new] = x[perm[new]]`
    pub fn gather(&self, x: &[f64], out: &mut [f64]) {
        for (o, &old) in out.iter_mut().zip(&self.perm) {
            *o = x[old];
        }
    }

    /// `out[perm[new]] = x[new]`
    pub fn scatter(&self, x: &[f64], out: &mut [f64]) {
        for (&xi, &old) in x.iter().zip(&self.perm) {
            out[old] = xi;
        }
    }

    /// Apply the ordering to an upper-triangular pattern.
    pub fn permute(&self, pattern: &SymmetricPattern) -> PermutedPattern {
        let (col_ptr, row_idx, perm_map) =
            permute_symmetric(pattern.col_ptr(), pattern.row_idx(), &self.iperm);
        PermutedPattern {
            col_ptr,
            row_idx,
            perm_map,
        }
    }
}

/// Upper-triangular pattern of `P A Pᵀ`.
#[derive(Debug, Clone)]
pub struct PermutedPattern {
    pub col_ptr: Vec<usize>,
    pub row_idx: Vec<usize>,
    /// Original CSC position -> permuted CSC position.
    pub perm_map: Vec<usize>,
}

impl PermutedPattern {
    /// Move values from original CSC order into permuted order.
    pub fn permute_values(&self, values: &[f64], out: &mut Vec<f64>) {
        out.clear();
        out.resize(self.row_idx.len(), 0.0);
        for (&v, &dst) in values.iter().zip(&self.perm_map) {
            out[dst] = v;
        }
    }
}

/// Permute an upper-triangular CSC pattern by `iperm`, keeping the result
/// upper-triangular with rows sorted within each column.
pub fn permute_symmetric(
    colptr: &[usize],
    rowval: &[usize],
    iperm: &[usize],
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let n = colptr.len() - 1;
    let nnz = rowval.len();

    let upper = |orig_row: usize, orig_col: usize| {
        let (r, c) = (iperm[orig_row], iperm[orig_col]);
        if r <= c {
            (r, c)
        } else {
            (c, r)
        }
    };

    let mut col_counts = vec![0usize; n];
    for col in 0..n {
        for &row in &rowval[colptr[col]..colptr[col + 1]] {
            col_counts[upper(row, col).1] += 1;
        }
    }

    let mut new_colptr = vec![0usize; n + 1];
    for i in 0..n {
        new_colptr[i + 1] = new_colptr[i] + col_counts[i];
    }

    let mut new_rowval = vec![0usize; nnz];
    let mut perm_map = vec![0usize; nnz];
    let mut next = new_colptr[..n].to_vec();
    for col in 0..n {
        for idx in colptr[col]..colptr[col + 1] {
            let (nr, nc) = upper(rowval[idx], col);
            new_rowval[next[nc]] = nr;
            perm_map[idx] = next[nc];
            next[nc] += 1;
        }
    }

    // Sort each column by row, carrying the source positions along.
    let mut inv_map = vec![0usize; nnz];
    for (orig, &pos) in perm_map.iter().enumerate() {
        inv_map[pos] = orig;
    }
    let mut entries: Vec<(usize, usize)> = Vec::new();
    for c in 0..n {
        let (start, end) = (new_colptr[c], new_colptr[c + 1]);
        if end - start <= 1 {
            continue;
        }
        entries.clear();
        entries.extend((start..end).map(|i| (new_rowval[i], inv_map[i])));
        entries.sort_unstable_by_key(|&(row, _)| row);
        for (offset, &(row, orig)) in entries.iter().enumerate() {
            new_rowval[start + offset] = row;
            perm_map[orig] = start + offset;
        }
    }

    (new_colptr, new_rowval, perm_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::SymmetricCsr;
    use crate::settings::TriangleStorage;

    fn arrow(n: usize) -> SymmetricPattern {
        // Dense first row/column: the natural order fills in completely.
        let mut t = vec![(0, 0, n as f64)];
        for j in 1..n {
            t.push((0, j, 1.0));
            t.push((j, j, n as f64));
        }
        let m = SymmetricCsr::from_triplets(n, t);
        SymmetricPattern::analyze(&m.view(), TriangleStorage::Upper).unwrap()
    }

    #[test]
    fn test_rcm_is_a_permutation() {
        let pattern = arrow(6);
        let ord = Ordering::compute(&pattern, FillOrdering::ReverseCuthillMcKee);
        let mut seen = vec![false; 6];
        for &p in ord.perm() {
            assert!(!seen[p]);
            seen[p] = true;
        }
        for (old, &new) in ord.iperm().iter().enumerate() {
            assert_eq!(ord.perm()[new], old);
        }
    }

    #[test]
    fn test_permuted_pattern_stays_upper_and_sorted() {
        let pattern = arrow(5);
        let iperm = vec![4, 3, 2, 1, 0];
        let (colptr, rowval, map) = permute_symmetric(pattern.col_ptr(), pattern.row_idx(), &iperm);
        assert_eq!(rowval.len(), pattern.nnz());
        for c in 0..5 {
            let rows = &rowval[colptr[c]..colptr[c + 1]];
            assert!(rows.iter().all(|&r| r <= c));
            assert!(rows.windows(2).all(|w| w[0] < w[1]));
        }
        let mut hit = vec![false; map.len()];
        for &m in &map {
            assert!(!hit[m]);
            hit[m] = true;
        }
    }

    #[test]
    fn test_gather_scatter_inverse() {
        let pattern = arrow(4);
        let ord = Ordering::compute(&pattern, FillOrdering::ReverseCuthillMcKee);
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut px = [0.0; 4];
        let mut back = [0.0; 4];
        ord.gather(&x, &mut px);
        ord.scatter(&px, &mut back);
        assert_eq!(back, x);
    }
}
