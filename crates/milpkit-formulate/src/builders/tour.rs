use log::debug;
use milpkit_solver::{Domain, Model, ModelError, Sense, SolveOptions, Solution, SolverGateway, Term};

use crate::decode::{self, Successors, Tour};
use crate::error::{DecodeError, FormulateError};
use crate::patterns::{self, ArcVars, OrderVars};
use crate::tables::CostMatrix;

/// Options for the single-vehicle tour model
#[derive(Debug, Clone)]
pub struct TourOptions {
    /// Node label the tour is anchored on; the first label when `None`
    pub depot: Option<usize>,
    /// Domain of the MTZ order variables
    pub order_domain: Domain,
}

impl Default for TourOptions {
    fn default() -> Self {
        Self {
            depot: None,
            order_domain: Domain::Continuous,
        }
    }
}

/// Single-vehicle TSP with MTZ subtour elimination
#[derive(Debug)]
pub struct TourFormulation {
    model: Model,
    arcs: ArcVars,
    order: OrderVars,
    depot: usize,
    costs: CostMatrix,
}

pub fn build_tour(costs: &CostMatrix, options: &TourOptions) -> Result<TourFormulation, FormulateError> {
    let n = costs.size();
    if n < 2 {
        return Err(FormulateError::invalid("a tour needs at least two nodes"));
    }
    let depot = resolve_depot(costs, options.depot)?;
    let labels = costs.labels();

    let mut model = Model::new("tour");
    let arcs = ArcVars::add(&mut model, "x", labels, None, Domain::Binary, |_, _| true)?;
    let order = OrderVars::add(&mut model, "u", labels, None, options.order_domain)?;

    let terms: Vec<Term> = arc_cost_terms(&arcs, costs).collect();
    model.set_objective(Sense::Minimize, terms)?;

    patterns::assignment(&mut model, &arcs)?;
    forbid_missing_arcs(&mut model, &arcs, costs)?;
    patterns::mtz(&mut model, &arcs, &order, depot)?;

    debug!(
        "tour model: {} nodes, depot {}, {} variables, {} constraints",
        n,
        labels[depot],
        model.num_variables(),
        model.num_constraints()
    );

    Ok(TourFormulation {
        model,
        arcs,
        order,
        depot,
        costs: costs.clone(),
    })
}

impl TourFormulation {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn arcs(&self) -> &ArcVars {
        &self.arcs
    }

    pub fn order(&self) -> &OrderVars {
        &self.order
    }

    pub fn depot(&self) -> usize {
        self.costs.labels()[self.depot]
    }

    pub fn solve(&mut self, gateway: &dyn SolverGateway, options: &SolveOptions) -> Result<Solution, ModelError> {
        self.model.solve(gateway, options)
    }

    /// Follows the selected arcs from the depot. Every node must be visited
    /// exactly once before the walk closes.
    pub fn decode(&self, solution: &Solution) -> Result<Tour, DecodeError> {
        let values = decode::assignment(&self.model, solution)?;
        let labels = self.arcs.labels();
        let successors = Successors::from_arcs(&self.arcs, values, "tour")?;
        let walk = successors.closed_walk(self.depot, labels, "tour")?;

        if walk.len() != labels.len() {
            return Err(DecodeError::IncompleteTour {
                route: "tour".to_string(),
                reason: format!(
                    "closed after {} of {} nodes; {} nodes lie on other subtours",
                    walk.len(),
                    labels.len(),
                    successors.selected() - walk.len()
                ),
            });
        }

        Ok(tour_from_walk(&walk, &self.costs))
    }
}

pub(crate) fn resolve_depot(costs: &CostMatrix, depot: Option<usize>) -> Result<usize, FormulateError> {
    match depot {
        None => Ok(0),
        Some(label) => costs
            .position(label)
            .ok_or_else(|| FormulateError::invalid(format!("depot {} is not a node of the cost matrix", label))),
    }
}

/// `cost[i,j] * x[i,j]` for every allowed arc
pub(crate) fn arc_cost_terms<'a>(arcs: &'a ArcVars, costs: &'a CostMatrix) -> impl Iterator<Item = Term> + 'a {
    arcs.proper_arcs()
        .filter_map(|(i, j, x)| costs.cost(i, j).map(|c| (c, x)))
}

/// Fixes arcs without a cost to zero
pub(crate) fn forbid_missing_arcs(model: &mut Model, arcs: &ArcVars, costs: &CostMatrix) -> Result<(), ModelError> {
    let labels = arcs.labels();
    for (i, j, x) in arcs.proper_arcs() {
        if costs.cost(i, j).is_none() {
            let mut index = vec![labels[i], labels[j]];
            index.extend(arcs.agent());
            patterns::fix_zero(model, "forbidden_arc", &index, x)?;
        }
    }
    Ok(())
}

pub(crate) fn tour_from_walk(walk: &[usize], costs: &CostMatrix) -> Tour {
    let n = walk.len();
    let cost = (0..n)
        .map(|k| costs.cost(walk[k], walk[(k + 1) % n]).unwrap_or(0.0))
        .sum();
    let stops = walk.iter().map(|&p| costs.labels()[p]).collect();
    Tour::new(stops, cost)
}

#[cfg(test)]
mod tests {
    use milpkit_solver::{MicroLp, SolutionStatus};

    use super::*;

    fn five_nodes() -> CostMatrix {
        let rows = vec![
            vec![0.0, 3.0, 4.0, 2.0, 7.0],
            vec![3.0, 0.0, 4.0, 6.0, 3.0],
            vec![4.0, 4.0, 0.0, 5.0, 8.0],
            vec![2.0, 6.0, 5.0, 0.0, 6.0],
            vec![7.0, 3.0, 8.0, 6.0, 0.0],
        ];
        let labels = vec![1, 2, 3, 4, 5];
        CostMatrix::new(labels, rows.into_iter().map(|r| r.into_iter().map(Some).collect()).collect()).unwrap()
    }

    /// x values for the given arcs, u values by node label
    fn assignment_for(f: &TourFormulation, arcs: &[(usize, usize)], order: &[(usize, f64)]) -> Vec<f64> {
        let mut values = vec![0.0; f.model().num_variables()];
        for &(i, j) in arcs {
            values[f.arcs().arc(i, j).unwrap().index()] = 1.0;
        }
        for &(label, u) in order {
            let pos = f.costs.position(label).unwrap();
            values[f.order().get(pos).index()] = u;
        }
        values
    }

    #[test]
    fn test_mtz_rejects_two_subtours() {
        let f = build_tour(&five_nodes(), &TourOptions::default()).unwrap();
        let arcs = [(1, 2), (2, 3), (3, 1), (4, 5), (5, 4)];

        // No choice of order values within bounds admits the 4 <-> 5 cycle
        for u2 in 1..=4 {
            for u3 in 1..=4 {
                for u4 in 1..=4 {
                    for u5 in 1..=4 {
                        let order = [(1, 1.0), (2, u2 as f64), (3, u3 as f64), (4, u4 as f64), (5, u5 as f64)];
                        let values = assignment_for(&f, &arcs, &order);
                        let violations = f.model().violations(&values, 1e-9);
                        assert!(
                            violations.iter().any(|v| v.family == "subtour_elimination"),
                            "subtours admitted with u = {:?}",
                            order
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_mtz_admits_full_tour() {
        let f = build_tour(&five_nodes(), &TourOptions::default()).unwrap();
        let arcs = [(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)];
        let order = [(1, 1.0), (2, 1.0), (3, 2.0), (4, 3.0), (5, 4.0)];
        let values = assignment_for(&f, &arcs, &order);
        let violations = f.model().violations(&values, 1e-9);
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_solve_and_decode() {
        let mut f = build_tour(&five_nodes(), &TourOptions::default()).unwrap();
        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, SolutionStatus::Optimal);

        let tour = f.decode(&solution).unwrap();
        assert_eq!(tour.depot(), 1);
        assert_eq!(tour.len(), 5);
        assert!((tour.cost() - 19.0).abs() < 1e-9);
        assert!((solution.objective_value.unwrap() - 19.0).abs() < 1e-6);

        let mut visited = tour.stops().to_vec();
        visited.sort();
        assert_eq!(visited, vec![1, 2, 3, 4, 5]);

        // Decoding is a pure read
        assert_eq!(f.decode(&solution).unwrap(), tour);
    }

    #[test]
    fn test_custom_depot() {
        let options = TourOptions {
            depot: Some(3),
            order_domain: Domain::Integer,
        };
        let mut f = build_tour(&five_nodes(), &options).unwrap();
        assert!(f.model().family("subtour_elimination").all(|c| !c.indices.contains(&3)));

        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        let tour = f.decode(&solution).unwrap();
        assert_eq!(tour.depot(), 3);
        assert!((tour.cost() - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_depot() {
        let options = TourOptions {
            depot: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            build_tour(&five_nodes(), &options),
            Err(FormulateError::InvalidProblemData(_))
        ));
    }

    #[test]
    fn test_decode_rejects_subtours() {
        let f = build_tour(&five_nodes(), &TourOptions::default()).unwrap();
        let values = assignment_for(&f, &[(1, 2), (2, 3), (3, 1), (4, 5), (5, 4)], &[]);
        let solution = Solution::optimal(f.model().id(), values, 0.0);
        match f.decode(&solution) {
            Err(DecodeError::IncompleteTour { reason, .. }) => assert!(reason.contains("3 of 5")),
            other => panic!("expected incomplete tour, got {:?}", other),
        }
    }

    #[test]
    fn test_forbidden_arc_fixed() {
        let mut costs = five_nodes();
        costs.forbid(1, 4).unwrap();
        let mut f = build_tour(&costs, &TourOptions::default()).unwrap();
        assert_eq!(f.model().family("forbidden_arc").count(), 1);

        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        let tour = f.decode(&solution).unwrap();
        assert!(tour.arcs().all(|arc| arc != (1, 4)));
    }
}
