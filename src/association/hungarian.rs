//! Hungarian (Munkres) algorithm for optimal assignment.
//!
//! Operates on a square cost matrix and finds the minimum-cost perfect
//! matching. Rectangular and gated problems are handled by the caller
//! ([`super::matcher`]), which pads components to square with a bound
//! value before solving.

use nalgebra::DMatrix;

/// Tolerance for exact-zero tests after repeated row/column subtractions.
const ZERO_EPSILON: f64 = 1e-9;

const NONE: u8 = 0;
const STARRED: u8 = 1;
const PRIMED: u8 = 2;

/// Solve the square assignment problem, minimizing total cost.
///
/// Returns the column assigned to each row.
pub fn solve(costs: &DMatrix<f64>) -> Vec<usize> {
    let n = costs.nrows();
    debug_assert_eq!(n, costs.ncols());

    if n == 0 {
        return Vec::new();
    }

    let mut costs = costs.clone();
    let mut marks: DMatrix<u8> = DMatrix::from_element(n, n, NONE);
    let mut row_cover = vec![false; n];
    let mut col_cover = vec![false; n];

    step1(&mut costs);
    step2(&costs, &mut marks, &mut row_cover, &mut col_cover);

    let mut step_num = 3;
    let mut z_r = 0;
    let mut z_c = 0;

    loop {
        match step_num {
            3 => {
                step_num = step3(&marks, &mut col_cover);
            }
            4 => {
                let (next, r, c) = step4(&costs, &mut marks, &mut row_cover, &mut col_cover);
                step_num = next;
                z_r = r;
                z_c = c;
            }
            5 => {
                step_num = step5(&mut marks, z_r, z_c, &mut row_cover, &mut col_cover);
            }
            6 => {
                step_num = step6(&mut costs, &row_cover, &col_cover);
            }
            _ => break,
        }
    }

    (0..n)
        .map(|i| {
            (0..n)
                .find(|&j| marks[(i, j)] == STARRED)
                .unwrap_or(usize::MAX)
        })
        .collect()
}

/// Subtract the minimum of each row.
fn step1(costs: &mut DMatrix<f64>) {
    let n = costs.nrows();

    for i in 0..n {
        let row_min = costs.row(i).iter().cloned().fold(f64::INFINITY, f64::min);
        for j in 0..n {
            costs[(i, j)] -= row_min;
        }
    }
}

/// Star a zero in every row/column that does not have one yet.
fn step2(
    costs: &DMatrix<f64>,
    marks: &mut DMatrix<u8>,
    row_cover: &mut [bool],
    col_cover: &mut [bool],
) {
    let n = costs.nrows();

    for i in 0..n {
        for j in 0..n {
            if costs[(i, j)].abs() <= ZERO_EPSILON && !row_cover[i] && !col_cover[j] {
                marks[(i, j)] = STARRED;
                row_cover[i] = true;
                col_cover[j] = true;
            }
        }
    }

    row_cover.fill(false);
    col_cover.fill(false);
}

/// Cover every column containing a starred zero; done when all are covered.
fn step3(marks: &DMatrix<u8>, col_cover: &mut [bool]) -> usize {
    let n = marks.nrows();

    for j in 0..n {
        for i in 0..n {
            if marks[(i, j)] == STARRED {
                col_cover[j] = true;
                break;
            }
        }
    }

    if col_cover.iter().filter(|&&c| c).count() == n {
        7
    } else {
        4
    }
}

/// Prime uncovered zeros until none remain or an augmenting path starts.
fn step4(
    costs: &DMatrix<f64>,
    marks: &mut DMatrix<u8>,
    row_cover: &mut [bool],
    col_cover: &mut [bool],
) -> (usize, usize, usize) {
    let n = costs.nrows();

    loop {
        let uncovered_zero = (0..n)
            .filter(|&i| !row_cover[i])
            .find_map(|i| {
                (0..n)
                    .find(|&j| !col_cover[j] && costs[(i, j)].abs() <= ZERO_EPSILON)
                    .map(|j| (i, j))
            });

        let (row, col) = match uncovered_zero {
            None => return (6, 0, 0),
            Some(pair) => pair,
        };

        marks[(row, col)] = PRIMED;

        match (0..n).find(|&j| marks[(row, j)] == STARRED) {
            Some(star_col) => {
                row_cover[row] = true;
                col_cover[star_col] = false;
            }
            None => return (5, row, col),
        }
    }
}

/// Augment the matching along the alternating star/prime path.
fn step5(
    marks: &mut DMatrix<u8>,
    z_r: usize,
    z_c: usize,
    row_cover: &mut [bool],
    col_cover: &mut [bool],
) -> usize {
    let n = marks.nrows();
    let mut path = vec![(z_r, z_c)];

    loop {
        let last_col = path[path.len() - 1].1;

        let star_row = (0..n).find(|&i| marks[(i, last_col)] == STARRED);
        let star_row = match star_row {
            Some(r) => r,
            None => break,
        };
        path.push((star_row, last_col));

        // A primed zero always exists in the row of a starred zero on the path
        if let Some(prime_col) = (0..n).find(|&j| marks[(star_row, j)] == PRIMED) {
            path.push((star_row, prime_col));
        } else {
            break;
        }
    }

    // Unstar the starred zeros on the path, star the primed ones
    for &(i, j) in &path {
        marks[(i, j)] = if marks[(i, j)] == STARRED {
            NONE
        } else {
            STARRED
        };
    }

    row_cover.fill(false);
    col_cover.fill(false);

    for mark in marks.iter_mut() {
        if *mark == PRIMED {
            *mark = NONE;
        }
    }

    3
}

/// Shift the smallest uncovered value out of the uncovered region.
fn step6(costs: &mut DMatrix<f64>, row_cover: &[bool], col_cover: &[bool]) -> usize {
    let n = costs.nrows();

    let mut min_value = f64::INFINITY;
    for i in 0..n {
        if row_cover[i] {
            continue;
        }
        for j in 0..n {
            if !col_cover[j] {
                min_value = min_value.min(costs[(i, j)]);
            }
        }
    }

    for i in 0..n {
        if row_cover[i] {
            for j in 0..n {
                costs[(i, j)] += min_value;
            }
        }
    }
    for j in 0..n {
        if !col_cover[j] {
            for i in 0..n {
                costs[(i, j)] -= min_value;
            }
        }
    }

    4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_cost(costs: &DMatrix<f64>, assignment: &[usize]) -> f64 {
        assignment
            .iter()
            .enumerate()
            .map(|(i, &j)| costs[(i, j)])
            .sum()
    }

    #[test]
    fn test_identity_preference() {
        let costs = DMatrix::from_row_slice(
            3,
            3,
            &[
                1.0, 10.0, 10.0, //
                10.0, 1.0, 10.0, //
                10.0, 10.0, 1.0,
            ],
        );

        assert_eq!(solve(&costs), vec![0, 1, 2]);
    }

    #[test]
    fn test_permutation_is_found() {
        let costs = DMatrix::from_row_slice(
            3,
            3,
            &[
                10.0, 10.0, 1.0, //
                1.0, 10.0, 10.0, //
                10.0, 1.0, 10.0,
            ],
        );

        assert_eq!(solve(&costs), vec![2, 0, 1]);
    }

    #[test]
    fn test_optimal_total_cost() {
        // The greedy diagonal (1 + 4 + 9 = 14) is beaten by 3 + 4 + 3 = 10
        let costs = DMatrix::from_row_slice(
            3,
            3,
            &[
                1.0, 2.0, 3.0, //
                2.0, 4.0, 6.0, //
                3.0, 6.0, 9.0,
            ],
        );

        let assignment = solve(&costs);

        // Valid permutation
        let mut seen = vec![false; 3];
        for &j in &assignment {
            assert!(!seen[j]);
            seen[j] = true;
        }

        assert!((total_cost(&costs, &assignment) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_element() {
        let costs = DMatrix::from_row_slice(1, 1, &[5.0]);
        assert_eq!(solve(&costs), vec![0]);
    }

    #[test]
    fn test_requires_augmenting_path() {
        // Forces the star/prime alternating path machinery
        let costs = DMatrix::from_row_slice(
            4,
            4,
            &[
                4.0, 1.0, 3.0, 2.0, //
                2.0, 0.0, 5.0, 3.0, //
                3.0, 2.0, 2.0, 1.0, //
                1.0, 3.0, 3.0, 4.0,
            ],
        );

        let assignment = solve(&costs);
        let mut seen = vec![false; 4];
        for &j in &assignment {
            assert!(!seen[j]);
            seen[j] = true;
        }

        // Optimum for this matrix is 5 (columns 3, 1, 2, 0)
        let best: f64 = total_cost(&costs, &assignment);
        assert!(best <= 5.0 + 1e-9);
    }
}
