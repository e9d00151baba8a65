//! Small helpers over `nalgebra-sparse` CSR matrices.
//!
//! Discretized operators, Jacobians, and mass matrices are all CSR matrices.
//! These helpers cover the handful of structural operations the pipeline
//! needs (row scaling, stacking, block extraction) by going through COO
//! triplets, which sums duplicate entries on conversion.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Builds a CSR matrix from `(row, col, value)` triplets.
///
/// Duplicate entries are summed. Explicit zeros are dropped.
#[must_use]
pub fn from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (i, j, v) in triplets {
        #[allow(clippy::float_cmp)]
        if v != 0.0 {
            coo.push(i, j, v);
        }
    }
    CsrMatrix::from(&coo)
}

/// An `nrows × ncols` matrix with no stored entries.
#[must_use]
pub fn zeros(nrows: usize, ncols: usize) -> CsrMatrix<f64> {
    CsrMatrix::from(&CooMatrix::new(nrows, ncols))
}

/// A square diagonal matrix.
#[must_use]
pub fn diagonal(values: &[f64]) -> CsrMatrix<f64> {
    from_triplets(
        values.len(),
        values.len(),
        values.iter().enumerate().map(|(i, v)| (i, i, *v)),
    )
}

/// The main diagonal of a square matrix, zeros where nothing is stored.
#[must_use]
pub fn diagonal_of(matrix: &CsrMatrix<f64>) -> Vec<f64> {
    let mut diagonal = vec![0.0; matrix.nrows().min(matrix.ncols())];
    for (i, j, v) in matrix.triplet_iter() {
        if i == j {
            diagonal[i] += *v;
        }
    }
    diagonal
}

/// Computes `Σ αₖ Aₖ` for matrices that all have shape `nrows × ncols`.
#[must_use]
pub fn linear_combination(
    terms: &[(f64, &CsrMatrix<f64>)],
    nrows: usize,
    ncols: usize,
) -> CsrMatrix<f64> {
    from_triplets(
        nrows,
        ncols,
        terms.iter().flat_map(|(alpha, matrix)| {
            matrix.triplet_iter().map(move |(i, j, v)| (i, j, alpha * v))
        }),
    )
}

/// Sparse matrix-vector product `A · x`.
#[must_use]
pub fn mul_vec(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(matrix.nrows());
    for (i, row) in matrix.row_iter().enumerate() {
        out[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(j, v)| v * x[*j])
            .sum();
    }
    out
}

/// Sparse matrix-matrix product `A · B`.
#[must_use]
pub fn matmul(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for (i, row) in a.row_iter().enumerate() {
        for (k, a_ik) in row.col_indices().iter().zip(row.values()) {
            let b_row = b.row(*k);
            for (j, b_kj) in b_row.col_indices().iter().zip(b_row.values()) {
                triplets.push((i, *j, a_ik * b_kj));
            }
        }
    }
    from_triplets(a.nrows(), b.ncols(), triplets)
}

/// Multiplies row `i` of the matrix by `scale[i]`, i.e. `diag(scale) · A`.
#[must_use]
pub fn scale_rows(matrix: &CsrMatrix<f64>, scale: &[f64]) -> CsrMatrix<f64> {
    from_triplets(
        matrix.nrows(),
        matrix.ncols(),
        matrix.triplet_iter().map(|(i, j, v)| (i, j, v * scale[i])),
    )
}

/// Repeats the single row of a `1 × n` matrix `rows` times.
#[must_use]
pub fn repeat_row(matrix: &CsrMatrix<f64>, rows: usize) -> CsrMatrix<f64> {
    debug_assert_eq!(matrix.nrows(), 1);
    from_triplets(
        rows,
        matrix.ncols(),
        (0..rows).flat_map(|i| matrix.triplet_iter().map(move |(_, j, v)| (i, j, *v))),
    )
}

/// Stacks matrices with the same column count on top of each other.
#[must_use]
pub fn vstack(blocks: &[CsrMatrix<f64>], ncols: usize) -> CsrMatrix<f64> {
    let nrows = blocks.iter().map(CsrMatrix::nrows).sum();
    let mut offset = 0;
    let mut triplets = Vec::new();
    for block in blocks {
        triplets.extend(block.triplet_iter().map(|(i, j, v)| (i + offset, j, *v)));
        offset += block.nrows();
    }
    from_triplets(nrows, ncols, triplets)
}

/// Extracts the block at the given rows and columns.
///
/// Output row `a` corresponds to `rows[a]`, output column `b` to `cols[b]`.
#[must_use]
pub fn submatrix(matrix: &CsrMatrix<f64>, rows: &[usize], cols: &[usize]) -> CsrMatrix<f64> {
    let mut col_map = vec![None; matrix.ncols()];
    for (b, col) in cols.iter().enumerate() {
        col_map[*col] = Some(b);
    }
    let mut triplets = Vec::new();
    for (a, row_index) in rows.iter().enumerate() {
        let row = matrix.row(*row_index);
        for (j, v) in row.col_indices().iter().zip(row.values()) {
            if let Some(b) = col_map[*j] {
                triplets.push((a, b, *v));
            }
        }
    }
    from_triplets(rows.len(), cols.len(), triplets)
}

/// Converts to a dense matrix.
#[must_use]
pub fn to_dense(matrix: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(matrix.nrows(), matrix.ncols());
    for (i, j, v) in matrix.triplet_iter() {
        dense[(i, j)] += *v;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn sample() -> CsrMatrix<f64> {
        // [1 2 0]
        // [0 3 4]
        from_triplets(2, 3, [(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0), (1, 2, 4.0)])
    }

    #[test]
    fn triplets_sum_duplicates_and_drop_zeros() {
        let m = from_triplets(2, 2, [(0, 0, 1.0), (0, 0, 2.0), (1, 1, 0.0)]);
        assert_eq!(m.nnz(), 1);
        assert_relative_eq!(to_dense(&m)[(0, 0)], 3.0);
    }

    #[test]
    fn matrix_vector_product() {
        let y = mul_vec(&sample(), &DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_relative_eq!(y[0], 3.0);
        assert_relative_eq!(y[1], 7.0);
    }

    #[test]
    fn matrix_matrix_product_matches_dense() {
        let a = sample();
        let b = from_triplets(3, 2, [(0, 0, 1.0), (1, 1, 1.0), (2, 0, -1.0)]);

        let sparse = to_dense(&matmul(&a, &b));
        let dense = to_dense(&a) * to_dense(&b);

        assert_relative_eq!(sparse, dense);
    }

    #[test]
    fn row_scaling_and_repetition() {
        let scaled = to_dense(&scale_rows(&sample(), &[2.0, -1.0]));
        assert_relative_eq!(scaled[(0, 1)], 4.0);
        assert_relative_eq!(scaled[(1, 2)], -4.0);

        let row = from_triplets(1, 3, [(0, 2, 5.0)]);
        let repeated = to_dense(&repeat_row(&row, 3));
        assert_eq!(repeated.nrows(), 3);
        assert_relative_eq!(repeated[(2, 2)], 5.0);
    }

    #[test]
    fn stacking_and_blocks() {
        let stacked = vstack(&[sample(), from_triplets(1, 3, [(0, 0, 9.0)])], 3);
        assert_eq!(stacked.nrows(), 3);
        assert_relative_eq!(to_dense(&stacked)[(2, 0)], 9.0);

        let block = to_dense(&submatrix(&sample(), &[1], &[2, 1]));
        assert_relative_eq!(block[(0, 0)], 4.0);
        assert_relative_eq!(block[(0, 1)], 3.0);
    }

    #[test]
    fn linear_combination_and_diagonal() {
        let eye = diagonal(&[1.0, 1.0]);
        let m = from_triplets(2, 2, [(0, 1, 1.0)]);
        let combo = linear_combination(&[(2.0, &eye), (-1.0, &m)], 2, 2);

        assert_eq!(diagonal_of(&combo), vec![2.0, 2.0]);
        assert_relative_eq!(to_dense(&combo)[(0, 1)], -1.0);
    }
}
