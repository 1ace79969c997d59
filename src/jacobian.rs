//! Row-wise sparse constraint matrix.
//!
//! Each row maps point motions to one scalar constraint.  An entry is a
//! `(point, [f64; 3])` block: the row's coefficients on the x/y/z degrees of
//! freedom of that point.  The global solver view is a `sprs` CSR matrix
//! with `3 * num_points` columns (dof `3 * point + axis`).

use ndarray::{Array2, ArrayView2};
use sprs::{CsMat, TriMat};
use std::collections::BTreeMap;

/// One Jacobian block: coefficients on the x, y and z dofs of a point.
pub type Block = [f64; 3];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintMatrix {
    rows: BTreeMap<usize, Vec<(usize, Block)>>,
}

/// Append-only handle on one row of a [`ConstraintMatrix`].
#[derive(Debug)]
pub struct RowWriter<'a> {
    entries: &'a mut Vec<(usize, Block)>,
}

impl RowWriter<'_> {
    /// Add a block on `point`.  Repeated points are summed on conversion.
    pub fn add_col(&mut self, point: usize, block: Block) {
        self.entries.push((point, block));
    }
}

impl ConstraintMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open row `row` for writing.  The row exists from this point on, even
    /// if nothing is ever added to it.
    pub fn write_line(&mut self, row: usize) -> RowWriter<'_> {
        RowWriter {
            entries: self.rows.entry(row).or_default(),
        }
    }

    pub fn row(&self, row: usize) -> Option<&[(usize, Block)]> {
        self.rows.get(&row).map(Vec::as_slice)
    }

    /// Emitted rows in increasing order.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[(usize, Block)])> {
        self.rows.iter().map(|(&r, entries)| (r, entries.as_slice()))
    }

    /// Number of emitted rows (empty rows included).
    pub fn emitted_rows(&self) -> usize {
        self.rows.len()
    }

    /// One past the highest emitted row, 0 when empty.
    pub fn num_rows(&self) -> usize {
        self.rows.keys().next_back().map_or(0, |&r| r + 1)
    }

    /// Total number of point blocks.
    pub fn nnz_blocks(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Assemble the global CSR matrix (`num_rows × 3 * num_points`).
    ///
    /// Zero coefficients are dropped.  Blocks on points `>= num_points` are
    /// skipped: the body may have shrunk since the rows were written.
    pub fn to_csr(&self, num_points: usize) -> CsMat<f64> {
        let mut tri = TriMat::new((self.num_rows(), 3 * num_points));
        for (row, entries) in self.rows() {
            for &(point, block) in entries {
                if point >= num_points {
                    continue;
                }
                for (axis, &value) in block.iter().enumerate() {
                    if value != 0.0 {
                        tri.add_triplet(row, 3 * point + axis, value);
                    }
                }
            }
        }
        tri.to_csr()
    }

    /// Flatten into COO triplets `(row, dof, value)`, same filtering as
    /// [`to_csr`](Self::to_csr).
    pub fn triplets(&self, num_points: usize) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::with_capacity(3 * self.nnz_blocks());
        for (row, entries) in self.rows() {
            for &(point, block) in entries {
                if point >= num_points {
                    continue;
                }
                for (axis, &value) in block.iter().enumerate() {
                    if value != 0.0 {
                        out.push((row, 3 * point + axis, value));
                    }
                }
            }
        }
        out
    }

    /// Project a point motion (`n × 3`) onto the rows:  out = J · dx.
    ///
    /// `out` has `num_rows()` entries; rows that were never emitted stay 0.
    pub fn project(&self, motion: ArrayView2<f64>) -> Vec<f64> {
        let mut out = vec![0.0; self.num_rows()];
        for (row, entries) in self.rows() {
            let mut acc = 0.0;
            for &(point, block) in entries {
                if point >= motion.nrows() {
                    continue;
                }
                for axis in 0..3 {
                    acc += block[axis] * motion[[point, axis]];
                }
            }
            out[row] = acc;
        }
        out
    }

    /// Map row multipliers back to point forces:  out = Jᵀ · λ  (`n × 3`).
    ///
    /// Rows beyond `lambda.len()` contribute nothing.
    pub fn apply_transpose(&self, lambda: &[f64], num_points: usize) -> Array2<f64> {
        let mut out = Array2::zeros((num_points, 3));
        for (row, entries) in self.rows() {
            let Some(&l) = lambda.get(row) else { continue };
            for &(point, block) in entries {
                if point >= num_points {
                    continue;
                }
                for axis in 0..3 {
                    out[[point, axis]] += block[axis] * l;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn empty_rows_are_kept() {
        let mut m = ConstraintMatrix::new();
        m.write_line(2);
        assert_eq!(m.emitted_rows(), 1);
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.row(2), Some(&[][..]));
        assert_eq!(m.row(0), None);
    }

    #[test]
    fn csr_expands_blocks_to_dofs() {
        let mut m = ConstraintMatrix::new();
        m.write_line(0).add_col(1, [0.0, 1.0, 0.0]);
        {
            let mut row = m.write_line(1);
            row.add_col(0, [0.6, 0.0, 0.8]);
            row.add_col(5, [1.0, 0.0, 0.0]); // beyond the body
        }

        let csr = m.to_csr(2);
        assert_eq!(csr.shape(), (2, 6));
        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.get(0, 4), Some(&1.0));
        assert_eq!(csr.get(1, 0), Some(&0.6));
        assert_eq!(csr.get(1, 2), Some(&0.8));
    }

    #[test]
    fn repeated_points_are_summed() {
        let mut m = ConstraintMatrix::new();
        let mut row = m.write_line(0);
        row.add_col(0, [1.0, 0.0, 0.0]);
        row.add_col(0, [1.0, 0.0, 0.0]);

        let csr = m.to_csr(1);
        assert_eq!(csr.get(0, 0), Some(&2.0));
    }

    #[test]
    fn project_and_transpose_are_adjoint() {
        let mut m = ConstraintMatrix::new();
        m.write_line(0).add_col(0, [1.0, 0.0, 0.0]);
        m.write_line(1).add_col(1, [0.0, 0.0, 1.0]);

        let dx = array![[0.5, 2.0, 0.0], [0.0, 0.0, -1.0]];
        assert_eq!(m.project(dx.view()), vec![0.5, -1.0]);

        let f = m.apply_transpose(&[3.0, 4.0], 2);
        assert_eq!(f, array![[3.0, 0.0, 0.0], [0.0, 0.0, 4.0]]);
    }
}
