//! Gated bipartite matcher.
//!
//! Wraps the Hungarian solver with a gating threshold: only pairs whose
//! cost passes the gate can be assigned, and everything else is reported
//! back as unassigned. Before solving, the matcher decomposes the gating
//! graph into connected components and solves each independently, which
//! keeps the solve cheap when the scene splits into far-apart clusters
//! (the usual case for ~100 tracks against ~100 detections).

use nalgebra::DMatrix;

use crate::association::distance::object_distance;
use crate::association::hungarian;
use crate::types::{DistanceType, TrackedObject};
use crate::Result;

/// Cap applied to infeasible entries when padding component matrices.
const DEFAULT_BOUND_VALUE: f64 = 100.0;
/// Default per-pair gate.
const DEFAULT_COST_THRESHOLD: f64 = 4.0;

/// Bound value used by the object-level association stage.
const OBJECT_MATCH_BOUND_VALUE: f64 = 1000.0;

/// Gating and conditioning options for a matcher run.
#[derive(Debug, Clone, Copy)]
pub struct MatcherOptions {
    /// Per-pair gate: a pair can only be assigned if its cost passes this
    pub cost_thresh: f64,
    /// Value substituted for gated-out entries to keep the solve bounded
    pub bound_value: f64,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            cost_thresh: DEFAULT_COST_THRESHOLD,
            bound_value: DEFAULT_BOUND_VALUE,
        }
    }
}

/// Whether lower or higher costs are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeFlag {
    /// Assign pairs with cost `≤ cost_thresh`, minimizing total cost
    Min,
    /// Assign pairs with cost `≥ cost_thresh`, maximizing total cost
    Max,
}

/// Outcome of a matcher run.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Matched `(row, col)` pairs, all satisfying the gate
    pub assignments: Vec<(usize, usize)>,
    /// Rows with no assigned column
    pub unassigned_rows: Vec<usize>,
    /// Columns with no assigned row
    pub unassigned_cols: Vec<usize>,
}

/// Gated Hungarian matcher over a dense cost matrix.
///
/// The cost matrix is owned scratch storage: callers resize and fill it
/// each frame, then solve. It is never shared between tracker instances.
pub struct GatedHungarianMatcher {
    costs: DMatrix<f64>,
}

impl Default for GatedHungarianMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedHungarianMatcher {
    pub fn new() -> Self {
        Self {
            costs: DMatrix::zeros(0, 0),
        }
    }

    /// Resize the scratch cost matrix, zeroing its contents.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.costs = DMatrix::zeros(rows, cols);
    }

    /// Mutable access to the scratch cost matrix.
    pub fn costs_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.costs
    }

    /// The scratch cost matrix.
    pub fn costs(&self) -> &DMatrix<f64> {
        &self.costs
    }

    /// Solve the gated assignment over the current cost matrix.
    pub fn solve(&self, options: MatcherOptions, flag: OptimizeFlag) -> MatchResult {
        // Maximization reduces to minimization on the negated matrix with a
        // negated gate
        match flag {
            OptimizeFlag::Min => {
                solve_min(&self.costs, options.cost_thresh, options.bound_value)
            }
            OptimizeFlag::Max => {
                let negated = -&self.costs;
                let mut result = solve_min(&negated, -options.cost_thresh, options.bound_value);
                // Indices are unchanged by the transform
                result.assignments.sort_unstable();
                result
            }
        }
    }
}

fn solve_min(costs: &DMatrix<f64>, cost_thresh: f64, bound_value: f64) -> MatchResult {
    let rows = costs.nrows();
    let cols = costs.ncols();

    if rows == 0 || cols == 0 {
        return MatchResult {
            assignments: Vec::new(),
            unassigned_rows: (0..rows).collect(),
            unassigned_cols: (0..cols).collect(),
        };
    }

    let mut result = MatchResult::default();

    let gated = |i: usize, j: usize| costs[(i, j)] <= cost_thresh;

    let mut row_assigned = vec![false; rows];
    let mut col_assigned = vec![false; cols];

    for (component_rows, component_cols) in connected_components(costs, cost_thresh) {
        let n = component_rows.len().max(component_cols.len());

        // Pad to square; gated-out and padding entries sit at the bound so
        // the solver prefers any feasible pair over them
        let mut local = DMatrix::from_element(n, n, bound_value);
        for (li, &i) in component_rows.iter().enumerate() {
            for (lj, &j) in component_cols.iter().enumerate() {
                if gated(i, j) {
                    local[(li, lj)] = costs[(i, j)].min(bound_value);
                }
            }
        }

        let assignment = hungarian::solve(&local);

        for (li, &lj) in assignment.iter().enumerate() {
            if li >= component_rows.len() || lj >= component_cols.len() {
                continue;
            }
            let (i, j) = (component_rows[li], component_cols[lj]);
            if gated(i, j) {
                result.assignments.push((i, j));
                row_assigned[i] = true;
                col_assigned[j] = true;
            }
        }
    }

    result.unassigned_rows = (0..rows).filter(|&i| !row_assigned[i]).collect();
    result.unassigned_cols = (0..cols).filter(|&j| !col_assigned[j]).collect();
    result.assignments.sort_unstable();

    result
}

/// Connected components of the bipartite gating graph.
///
/// Rows and columns with no gated edge at all belong to no component and
/// end up unassigned without ever reaching the solver.
fn connected_components(
    costs: &DMatrix<f64>,
    cost_thresh: f64,
) -> Vec<(Vec<usize>, Vec<usize>)> {
    let rows = costs.nrows();
    let cols = costs.ncols();

    let mut row_visited = vec![false; rows];
    let mut col_visited = vec![false; cols];
    let mut components = Vec::new();

    for start in 0..rows {
        if row_visited[start] {
            continue;
        }
        row_visited[start] = true;

        let mut component_rows = vec![start];
        let mut component_cols = Vec::new();
        let mut frontier_rows = vec![start];

        while let Some(i) = frontier_rows.pop() {
            for j in 0..cols {
                if col_visited[j] || costs[(i, j)] > cost_thresh {
                    continue;
                }
                col_visited[j] = true;
                component_cols.push(j);

                for i2 in 0..rows {
                    if !row_visited[i2] && costs[(i2, j)] <= cost_thresh {
                        row_visited[i2] = true;
                        component_rows.push(i2);
                        frontier_rows.push(i2);
                    }
                }
            }
        }

        if !component_cols.is_empty() {
            component_rows.sort_unstable();
            component_cols.sort_unstable();
            components.push((component_rows, component_cols));
        }
    }

    components
}

/// Associate tracks (rows) with measurements (columns).
///
/// Builds the cost matrix with the requested distance metric into the
/// matcher's scratch storage and solves with the object-level bound.
pub fn match_objects(
    matcher: &mut GatedHungarianMatcher,
    tracks: &[TrackedObject],
    measurements: &[TrackedObject],
    distance_type: DistanceType,
    threshold: f64,
) -> Result<MatchResult> {
    if tracks.is_empty() || measurements.is_empty() {
        return Ok(MatchResult {
            assignments: Vec::new(),
            unassigned_rows: (0..tracks.len()).collect(),
            unassigned_cols: (0..measurements.len()).collect(),
        });
    }

    matcher.resize(tracks.len(), measurements.len());
    for (i, track) in tracks.iter().enumerate() {
        for (j, measurement) in measurements.iter().enumerate() {
            matcher.costs_mut()[(i, j)] = object_distance(distance_type, measurement, track)?;
        }
    }

    let options = MatcherOptions {
        cost_thresh: threshold,
        bound_value: OBJECT_MATCH_BOUND_VALUE,
    };

    Ok(matcher.solve(options, OptimizeFlag::Min))
}
