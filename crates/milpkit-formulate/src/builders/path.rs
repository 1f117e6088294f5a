use log::debug;
use milpkit_solver::{Domain, Model, ModelError, Sense, SolveOptions, Solution, SolverGateway, Term};

use crate::decode::{self, Path, Successors};
use crate::error::{DecodeError, FormulateError};
use crate::patterns::{self, ArcVars};
use crate::tables::ArcCosts;

/// Cheapest simple path through a sparse arc set as a unit-flow problem
#[derive(Debug)]
pub struct PathFormulation {
    model: Model,
    arcs: ArcVars,
    source: usize,
    sink: usize,
    costs: ArcCosts,
}

/// Arcs entering the source or leaving the sink carry no useful flow and are
/// left out of the model.
pub fn build_path(costs: &ArcCosts, source: usize, sink: usize) -> Result<PathFormulation, FormulateError> {
    let labels = costs.nodes();
    let position = |label: usize, role: &str| {
        labels
            .iter()
            .position(|&l| l == label)
            .ok_or_else(|| FormulateError::invalid(format!("{} {} is not a node of the arc table", role, label)))
    };
    let s = position(source, "source")?;
    let t = position(sink, "sink")?;
    if s == t {
        return Err(FormulateError::invalid(format!("source and sink are both node {}", source)));
    }

    let mut model = Model::new("path");
    let arcs = ArcVars::add(&mut model, "x", labels, None, Domain::Binary, |i, j| {
        j != s && i != t && costs.contains(labels[i], labels[j])
    })?;

    let terms: Vec<Term> = arcs
        .proper_arcs()
        .filter_map(|(i, j, x)| costs.cost(labels[i], labels[j]).map(|c| (c, x)))
        .collect();
    model.set_objective(Sense::Minimize, terms)?;
    patterns::unit_flow(&mut model, &arcs, s, t)?;

    debug!(
        "path model: {} nodes, {} of {} arcs usable, {} -> {}",
        labels.len(),
        arcs.proper_arcs().count(),
        costs.len(),
        source,
        sink
    );

    Ok(PathFormulation {
        model,
        arcs,
        source: s,
        sink: t,
        costs: costs.clone(),
    })
}

impl PathFormulation {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn arcs(&self) -> &ArcVars {
        &self.arcs
    }

    pub fn source(&self) -> usize {
        self.arcs.labels()[self.source]
    }

    pub fn sink(&self) -> usize {
        self.arcs.labels()[self.sink]
    }

    pub fn solve(&mut self, gateway: &dyn SolverGateway, options: &SolveOptions) -> Result<Solution, ModelError> {
        self.model.solve(gateway, options)
    }

    /// Follows selected arcs from the source to the sink. Selected arcs off
    /// that path (disconnected cycles) are an error.
    pub fn decode(&self, solution: &Solution) -> Result<Path, DecodeError> {
        let values = decode::assignment(&self.model, solution)?;
        let labels = self.arcs.labels();
        let successors = Successors::from_arcs(&self.arcs, values, "path")?;
        let walk = successors.open_walk(self.source, self.sink, labels)?;

        let on_path = walk.len() - 1;
        if successors.selected() != on_path {
            return Err(DecodeError::IncompletePath(format!(
                "{} selected arcs lie off the path from {} to {}",
                successors.selected() - on_path,
                self.source(),
                self.sink()
            )));
        }

        let nodes: Vec<usize> = walk.iter().map(|&p| labels[p]).collect();
        let cost = nodes
            .windows(2)
            .map(|w| self.costs.cost(w[0], w[1]).unwrap_or(0.0))
            .sum();
        Ok(Path::new(nodes, cost))
    }
}

#[cfg(test)]
mod tests {
    use milpkit_solver::{MicroLp, SolutionStatus};

    use super::*;

    /// 1 -> 2 -> 4 costs 5, 1 -> 3 -> 4 costs 4, 1 -> 4 costs 7
    fn diamond() -> ArcCosts {
        ArcCosts::new(
            vec![1, 2, 3, 4],
            [
                (1, 2, 2.0),
                (2, 4, 3.0),
                (1, 3, 1.0),
                (3, 4, 3.0),
                (1, 4, 7.0),
                (2, 1, 2.0),
                (4, 3, 3.0),
                (2, 3, 1.0),
                (3, 2, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_terminal_arcs_excluded() {
        let f = build_path(&diamond(), 1, 4).unwrap();
        assert!(f.arcs().arc(2, 1).is_none());
        assert!(f.arcs().arc(4, 3).is_none());
        assert!(f.arcs().arc(2, 3).is_some());
        assert_eq!(f.model().family("origin").count(), 1);
        assert_eq!(f.model().family("destination").count(), 1);
        assert_eq!(f.model().family("flow").count(), 2);
    }

    #[test]
    fn test_cheapest_path() {
        let mut f = build_path(&diamond(), 1, 4).unwrap();
        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, SolutionStatus::Optimal);

        let path = f.decode(&solution).unwrap();
        assert_eq!(path.nodes(), &[1, 3, 4]);
        assert!((path.cost() - 4.0).abs() < 1e-9);
        assert_eq!(path.arcs().collect::<Vec<_>>(), vec![(1, 3), (3, 4)]);
    }

    #[test]
    fn test_unreachable_sink() {
        let costs = ArcCosts::new(vec![1, 2, 3, 4], [(1, 2, 1.0), (2, 1, 1.0), (3, 4, 1.0)]).unwrap();
        let mut f = build_path(&costs, 1, 4).unwrap();
        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert_eq!(f.decode(&solution), Err(DecodeError::SolverInfeasible));
    }

    #[test]
    fn test_detached_cycle_rejected() {
        let f = build_path(&diamond(), 1, 4).unwrap();
        let mut values = vec![0.0; f.model().num_variables()];
        for (i, j) in [(1, 4), (2, 3), (3, 2)] {
            values[f.arcs().arc(i, j).unwrap().index()] = 1.0;
        }
        let solution = Solution::optimal(f.model().id(), values, 7.0);
        assert!(matches!(f.decode(&solution), Err(DecodeError::IncompletePath(_))));
    }

    #[test]
    fn test_bad_terminals() {
        assert!(build_path(&diamond(), 1, 1).is_err());
        assert!(build_path(&diamond(), 9, 4).is_err());
    }
}
