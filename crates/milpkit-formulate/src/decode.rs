//! Reading solutions back into tours, routes, paths and quantity tables.
//!
//! Decoding is a pure read of the [`Solution`]: the same solution always
//! decodes to the same result.

use log::warn;
use milpkit_solver::{Model, Solution, SolutionStatus, VariableRef};

use crate::error::DecodeError;
use crate::patterns::ArcVars;

/// Arc values above this are treated as selected
pub const ARC_THRESHOLD: f64 = 0.5;

/// Flow and allocation values below this are reported as zero
pub const FLOW_EPSILON: f64 = 1e-6;

/// Checks the solution belongs to `model` and carries usable values
pub(crate) fn assignment<'a>(model: &Model, solution: &'a Solution) -> Result<&'a [f64], DecodeError> {
    if solution.model_id() != model.id() {
        return Err(DecodeError::ModelMismatch);
    }
    match solution.status {
        SolutionStatus::Optimal => {}
        SolutionStatus::TimeLimitReached if solution.has_values() => {
            warn!(
                "decoding '{}' from an incumbent that is not proven optimal ({:?})",
                model.name(),
                solution.status
            );
        }
        SolutionStatus::TimeLimitReached | SolutionStatus::Infeasible => {
            return Err(DecodeError::SolverInfeasible);
        }
        SolutionStatus::Unbounded => return Err(DecodeError::SolverUnbounded),
        SolutionStatus::Error => {
            return Err(DecodeError::SolverFailed(
                solution.message.clone().unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
    }
    solution
        .values()
        .ok_or_else(|| DecodeError::SolverFailed("solution has no variable values".to_string()))
}

fn value_of(values: &[f64], var: VariableRef) -> f64 {
    values.get(var.index()).copied().unwrap_or(0.0)
}

/// Selected successor of every node position, derived from arc values
#[derive(Debug, Clone)]
pub(crate) struct Successors {
    next: Vec<Option<usize>>,
}

impl Successors {
    /// Picks the unique outgoing arc above [`ARC_THRESHOLD`] for each node.
    /// Among several, the largest value wins; an exact tie is an error.
    pub fn from_arcs(arcs: &ArcVars, values: &[f64], route: &str) -> Result<Self, DecodeError> {
        let mut next = Vec::with_capacity(arcs.size());
        for i in 0..arcs.size() {
            let mut candidates: Vec<(usize, f64)> = (0..arcs.size())
                .filter_map(|j| arcs.get(i, j).map(|v| (j, value_of(values, v))))
                .filter(|&(_, value)| value > ARC_THRESHOLD)
                .collect();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

            match candidates.as_slice() {
                [] => next.push(None),
                [(j, _)] => next.push(Some(*j)),
                [(j, first), (_, second), ..] => {
                    if first == second {
                        let tied = candidates
                            .iter()
                            .filter(|(_, v)| v == first)
                            .map(|&(k, _)| arcs.labels()[k])
                            .collect();
                        return Err(DecodeError::AmbiguousArcSelection {
                            route: route.to_string(),
                            from: arcs.labels()[i],
                            candidates: tied,
                        });
                    }
                    warn!(
                        "{}: node {} has {} selected arcs, following the largest",
                        route,
                        arcs.labels()[i],
                        candidates.len()
                    );
                    next.push(Some(*j));
                }
            }
        }
        Ok(Self { next })
    }

    /// Number of nodes with a selected successor
    pub fn selected(&self) -> usize {
        self.next.iter().flatten().count()
    }

    /// Follows successors from `start` until returning to it. Returns the
    /// visited positions starting with `start`.
    pub fn closed_walk(&self, start: usize, labels: &[usize], route: &str) -> Result<Vec<usize>, DecodeError> {
        let incomplete = |reason: String| DecodeError::IncompleteTour {
            route: route.to_string(),
            reason,
        };

        let mut visited = vec![false; self.next.len()];
        let mut stops = vec![start];
        visited[start] = true;
        let mut current = start;
        loop {
            let next = self.next[current]
                .ok_or_else(|| incomplete(format!("no selected arc leaves node {}", labels[current])))?;
            if next == start {
                return Ok(stops);
            }
            if visited[next] {
                return Err(incomplete(format!(
                    "node {} is revisited before returning to {}",
                    labels[next], labels[start]
                )));
            }
            visited[next] = true;
            stops.push(next);
            current = next;
        }
    }

    /// Follows successors from `source` to `sink`
    pub fn open_walk(&self, source: usize, sink: usize, labels: &[usize]) -> Result<Vec<usize>, DecodeError> {
        let mut visited = vec![false; self.next.len()];
        let mut stops = vec![source];
        visited[source] = true;
        let mut current = source;
        while current != sink {
            let next = self.next[current].ok_or_else(|| {
                DecodeError::IncompletePath(format!("no selected arc leaves node {}", labels[current]))
            })?;
            if visited[next] {
                return Err(DecodeError::IncompletePath(format!("node {} is revisited", labels[next])));
            }
            visited[next] = true;
            stops.push(next);
            current = next;
        }
        Ok(stops)
    }
}

/// A closed walk starting and ending at its first stop
#[derive(Debug, Clone, PartialEq)]
pub struct Tour {
    stops: Vec<usize>,
    cost: f64,
}

impl Tour {
    pub(crate) fn new(stops: Vec<usize>, cost: f64) -> Self {
        Self { stops, cost }
    }

    /// The node the tour starts from and returns to
    pub fn depot(&self) -> usize {
        self.stops[0]
    }

    /// Visited nodes in order, starting with the depot (which is not repeated)
    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Number of arcs including the closing one back to the depot
    pub fn num_arcs(&self) -> usize {
        self.stops.len()
    }

    /// Arcs in travel order, ending with the return to the depot
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.stops.len();
        (0..n).map(move |k| (self.stops[k], self.stops[(k + 1) % n]))
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }
}

/// The tour of one agent in a multi-agent partition
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRoute {
    pub agent: usize,
    pub tour: Tour,
}

/// Per-agent tours sharing a depot, each other node visited exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePartition {
    routes: Vec<AgentRoute>,
}

impl RoutePartition {
    pub(crate) fn new(routes: Vec<AgentRoute>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[AgentRoute] {
        &self.routes
    }

    pub fn route(&self, agent: usize) -> Option<&Tour> {
        self.routes.iter().find(|r| r.agent == agent).map(|r| &r.tour)
    }

    pub fn total_cost(&self) -> f64 {
        self.routes.iter().map(|r| r.tour.cost()).sum()
    }

    /// Every non-depot node in visit order, agent by agent
    pub fn visited_nodes(&self) -> Vec<usize> {
        self.routes
            .iter()
            .flat_map(|r| r.tour.stops().iter().skip(1).copied())
            .collect()
    }
}

/// A simple path from a source to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    nodes: Vec<usize>,
    cost: f64,
}

impl Path {
    pub(crate) fn new(nodes: Vec<usize>, cost: f64) -> Self {
        Self { nodes, cost }
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.nodes.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }
}

/// Non-negative quantities indexed by (row label, column label), such as
/// (origin, destination) flows or (resource, carrier) allocations
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMatrix {
    rows: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
}

impl QuantityMatrix {
    /// Reads one variable per cell (`None` cells are zero), clamping values
    /// below [`FLOW_EPSILON`] to zero
    pub(crate) fn extract(
        rows: &[usize],
        columns: &[usize],
        vars: &[Option<VariableRef>],
        values: &[f64],
    ) -> Self {
        let values = vars
            .iter()
            .map(|var| match var {
                Some(v) => {
                    let value = value_of(values, *v);
                    if value < FLOW_EPSILON { 0.0 } else { value }
                }
                None => 0.0,
            })
            .collect();
        Self {
            rows: rows.to_vec(),
            columns: columns.to_vec(),
            values,
        }
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        let r = self.rows.iter().position(|&l| l == row)?;
        let c = self.columns.iter().position(|&l| l == column)?;
        Some(self.values[r * self.columns.len() + c])
    }

    pub fn row_total(&self, row: usize) -> Option<f64> {
        let r = self.rows.iter().position(|&l| l == row)?;
        let width = self.columns.len();
        Some(self.values[r * width..(r + 1) * width].iter().sum())
    }

    pub fn column_total(&self, column: usize) -> Option<f64> {
        let c = self.columns.iter().position(|&l| l == column)?;
        let width = self.columns.len();
        Some((0..self.rows.len()).map(|r| self.values[r * width + c]).sum())
    }

    /// Non-zero cells as `(row, column, value)`
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let width = self.columns.len();
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(move |(k, &v)| (self.rows[k / width], self.columns[k % width], v))
    }
}

#[cfg(test)]
mod tests {
    use milpkit_solver::Domain;

    use super::*;

    fn ring(n: usize, extra: &[(usize, usize, f64)]) -> (Model, ArcVars, Vec<f64>) {
        let mut model = Model::new("ring");
        let labels: Vec<usize> = (0..n).collect();
        let arcs = ArcVars::add(&mut model, "x", &labels, None, Domain::Binary, |_, _| true).unwrap();
        let mut values = vec![0.0; model.num_variables()];
        for i in 0..n {
            values[arcs.get(i, (i + 1) % n).unwrap().index()] = 1.0;
        }
        for &(i, j, v) in extra {
            values[arcs.get(i, j).unwrap().index()] = v;
        }
        (model, arcs, values)
    }

    #[test]
    fn test_closed_walk() {
        let (_, arcs, values) = ring(4, &[]);
        let succ = Successors::from_arcs(&arcs, &values, "tour").unwrap();
        assert_eq!(succ.selected(), 4);
        assert_eq!(succ.closed_walk(2, arcs.labels(), "tour").unwrap(), vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_larger_value_wins() {
        let (_, arcs, mut values) = ring(4, &[(0, 2, 0.6)]);
        values[arcs.get(0, 1).unwrap().index()] = 0.9;
        let succ = Successors::from_arcs(&arcs, &values, "tour").unwrap();
        assert_eq!(succ.closed_walk(0, arcs.labels(), "tour").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let (_, arcs, mut values) = ring(4, &[(0, 2, 0.7)]);
        values[arcs.get(0, 1).unwrap().index()] = 0.7;
        match Successors::from_arcs(&arcs, &values, "tour") {
            Err(DecodeError::AmbiguousArcSelection { from, candidates, .. }) => {
                assert_eq!(from, 0);
                assert_eq!(candidates, vec![1, 2]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_subtour_detected() {
        // 0 -> 1 -> 0 and 2 -> 3 -> 2
        let (_, arcs, mut values) = ring(4, &[]);
        values.iter_mut().for_each(|v| *v = 0.0);
        for (i, j) in [(0, 1), (1, 0), (2, 3), (3, 2)] {
            values[arcs.get(i, j).unwrap().index()] = 1.0;
        }
        let succ = Successors::from_arcs(&arcs, &values, "tour").unwrap();
        let walk = succ.closed_walk(0, arcs.labels(), "tour").unwrap();
        assert_eq!(walk, vec![0, 1]);
        assert_eq!(succ.selected(), 4);
    }

    #[test]
    fn test_dead_end() {
        let (_, arcs, mut values) = ring(3, &[]);
        values[arcs.get(1, 2).unwrap().index()] = 0.2;
        let succ = Successors::from_arcs(&arcs, &values, "tour").unwrap();
        assert!(matches!(
            succ.closed_walk(0, arcs.labels(), "tour"),
            Err(DecodeError::IncompleteTour { .. })
        ));
    }

    #[test]
    fn test_status_gate() {
        let model = Model::new("gate");
        let other = Model::new("other");

        let solution = Solution::optimal(other.id(), vec![], 0.0);
        assert_eq!(assignment(&model, &solution), Err(DecodeError::ModelMismatch));

        let solution = Solution::infeasible(model.id());
        assert_eq!(assignment(&model, &solution), Err(DecodeError::SolverInfeasible));

        let solution = Solution::time_limit_reached(model.id(), None);
        assert_eq!(assignment(&model, &solution), Err(DecodeError::SolverInfeasible));

        let solution = Solution::time_limit_reached(model.id(), Some((vec![], 1.0)));
        assert!(assignment(&model, &solution).is_ok());

        let solution = Solution::error(model.id(), "boom");
        assert_eq!(
            assignment(&model, &solution),
            Err(DecodeError::SolverFailed("boom".to_string()))
        );
    }

    #[test]
    fn test_quantity_matrix_clamps() {
        let mut model = Model::new("flows");
        let a = model.add_variable("x", &[1, 1], Domain::Continuous, Default::default()).unwrap();
        let b = model.add_variable("x", &[1, 2], Domain::Continuous, Default::default()).unwrap();
        let values = vec![4e-7, 3.0];
        let matrix = QuantityMatrix::extract(&[1], &[1, 2, 3], &[Some(a), Some(b), None], &values);
        assert_eq!(matrix.get(1, 1), Some(0.0));
        assert_eq!(matrix.row_total(1), Some(3.0));
        assert_eq!(matrix.column_total(3), Some(0.0));
        assert_eq!(matrix.nonzero().collect::<Vec<_>>(), vec![(1, 2, 3.0)]);
    }
}
