//! Rectangular maximum-weight one-to-one assignment (Kuhn–Munkres).

use crate::scoring::ScoreMatrix;

/// Optimal (source, dest) pairs over a score matrix.
///
/// Maximizes the summed score with every row and column used at most once.
/// Only pairs with a strictly positive score are returned, sorted by source
/// index. The matrix is negated into a cost matrix and padded to square with
/// zero-cost dummies, so rectangular input needs no special casing.
pub fn solve(matrix: &ScoreMatrix) -> Vec<(usize, usize)> {
    let rows = matrix.rows();
    let cols = matrix.cols();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let n = rows.max(cols);
    let columns = hungarian(n, |i, j| -matrix.get(i, j));

    let mut pairs: Vec<(usize, usize)> = columns
        .iter()
        .enumerate()
        .filter_map(|(col, row)| row.map(|row| (row, col)))
        .filter(|&(row, col)| row < rows && col < cols && matrix.get(row, col) > 0.0)
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Sum of the scores of the given pairs.
pub fn total_score(matrix: &ScoreMatrix, pairs: &[(usize, usize)]) -> f64 {
    pairs.iter().map(|&(r, c)| matrix.get(r, c)).sum()
}

/// Minimum-cost perfect matching on an n×n cost function. Returns, for each
/// column, the row matched to it.
///
/// Potentials `u` (rows) and `v` (columns) with a shortest augmenting path
/// per row; O(n³). Index 0 of every buffer is the virtual start column.
#[allow(clippy::indexing_slicing)] // every index is in 0..=n and every buffer has n + 1 slots
fn hungarian(n: usize, cost: impl Fn(usize, usize) -> f64) -> Vec<Option<usize>> {
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    // p[j]: row (1-based) matched to column j; 0 = free.
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    p.iter().skip(1).map(|&row| row.checked_sub(1)).collect()
}
