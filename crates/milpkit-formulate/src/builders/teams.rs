use std::collections::BTreeMap;

use log::debug;
use milpkit_solver::{Domain, Model, ModelError, Relation, Sense, SolveOptions, Solution, SolverGateway, Term};

use super::tour::{arc_cost_terms, forbid_missing_arcs, resolve_depot, tour_from_walk};
use crate::decode::{self, AgentRoute, RoutePartition, Successors};
use crate::error::{DecodeError, FormulateError};
use crate::patterns::{self, ArcVars, Bound, OrderVars};
use crate::tables::CostMatrix;

/// Options for the multi-team routing model
#[derive(Debug, Clone)]
pub struct TeamOptions {
    /// Number of teams, labelled `1..=teams`
    pub teams: usize,
    /// Shared depot label; the first label when `None`
    pub depot: Option<usize>,
    /// Bound on the number of arcs each team travels. Defaults to
    /// `[n/k - 1, n/k + 1]` with integer division over all `n` nodes.
    pub balance: Option<Bound>,
    /// Domain of the MTZ order variables
    pub order_domain: Domain,
}

impl TeamOptions {
    pub fn new(teams: usize) -> Self {
        Self {
            teams,
            depot: None,
            balance: None,
            order_domain: Domain::Continuous,
        }
    }

    pub fn with_depot(mut self, depot: usize) -> Self {
        self.depot = Some(depot);
        self
    }

    pub fn with_balance(mut self, balance: Bound) -> Self {
        self.balance = Some(balance);
        self
    }
}

/// The default load-balancing window for `nodes` nodes shared by `teams`
pub fn balance_window(nodes: usize, teams: usize) -> Bound {
    let share = nodes / teams;
    Bound::Between(share.saturating_sub(1) as f64, (share + 1) as f64)
}

/// Several teams leaving from and returning to a shared depot, every other
/// node visited by exactly one team
#[derive(Debug)]
pub struct TeamFormulation {
    model: Model,
    arcs: Vec<ArcVars>,
    depot: usize,
    balance: Bound,
    costs: CostMatrix,
}

pub fn build_teams(costs: &CostMatrix, options: &TeamOptions) -> Result<TeamFormulation, FormulateError> {
    let n = costs.size();
    let k = options.teams;
    if k == 0 {
        return Err(FormulateError::invalid("at least one team is required"));
    }
    if n < k + 1 {
        return Err(FormulateError::invalid(format!(
            "{} teams need at least {} non-depot nodes, the matrix has {}",
            k,
            k,
            n.saturating_sub(1)
        )));
    }
    let depot = resolve_depot(costs, options.depot)?;
    let balance = options.balance.unwrap_or_else(|| balance_window(n, k));
    let labels = costs.labels();

    let mut model = Model::new("teams");
    let mut team_arcs = Vec::with_capacity(k);
    let mut objective: Vec<Term> = Vec::new();

    for team in 1..=k {
        let arcs = ArcVars::add(&mut model, "x", labels, Some(team), Domain::Binary, |_, _| true)?;
        let order = OrderVars::add(&mut model, "u", labels, Some(team), options.order_domain)?;
        objective.extend(arc_cost_terms(&arcs, costs));

        patterns::depot_degree(&mut model, &arcs, depot)?;
        patterns::no_self_loops(&mut model, &arcs)?;
        patterns::flow_conservation(&mut model, &arcs, |i| i != depot)?;
        forbid_missing_arcs(&mut model, &arcs, costs)?;

        let travelled: Vec<Term> = arcs.proper_arcs().map(|(_, _, x)| (1.0, x)).collect();
        patterns::bounded(&mut model, "balance", &[team], travelled, balance)?;

        patterns::mtz(&mut model, &arcs, &order, depot)?;
        team_arcs.push(arcs);
    }

    model.set_objective(Sense::Minimize, objective)?;
    visit_once(&mut model, &team_arcs, depot)?;

    debug!(
        "teams model: {} nodes, {} teams, balance {:?}, {} variables, {} constraints",
        n,
        k,
        balance,
        model.num_variables(),
        model.num_constraints()
    );

    Ok(TeamFormulation {
        model,
        arcs: team_arcs,
        depot,
        balance,
        costs: costs.clone(),
    })
}

/// Every node but the depot is entered exactly once across all teams
fn visit_once(model: &mut Model, team_arcs: &[ArcVars], depot: usize) -> Result<(), ModelError> {
    let Some(first) = team_arcs.first() else {
        return Ok(());
    };
    for j in (0..first.size()).filter(|&j| j != depot) {
        let terms: Vec<Term> = team_arcs
            .iter()
            .flat_map(|arcs| arcs.incoming(j).map(|(_, x)| (1.0, x)))
            .collect();
        model.add_constraint("visit", &[first.labels()[j]], Relation::Eq, terms, 1.0)?;
    }
    Ok(())
}

impl TeamFormulation {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn teams(&self) -> usize {
        self.arcs.len()
    }

    /// Arc variables of `team` (1-based)
    pub fn team_arcs(&self, team: usize) -> Option<&ArcVars> {
        team.checked_sub(1).and_then(|t| self.arcs.get(t))
    }

    pub fn depot(&self) -> usize {
        self.costs.labels()[self.depot]
    }

    pub fn balance(&self) -> Bound {
        self.balance
    }

    pub fn solve(&mut self, gateway: &dyn SolverGateway, options: &SolveOptions) -> Result<Solution, ModelError> {
        self.model.solve(gateway, options)
    }

    /// Reconstructs each team's tour from the depot, then checks that the
    /// tours partition the non-depot nodes.
    pub fn decode(&self, solution: &Solution) -> Result<RoutePartition, DecodeError> {
        let values = decode::assignment(&self.model, solution)?;
        let labels = self.costs.labels();

        let mut routes = Vec::with_capacity(self.arcs.len());
        for arcs in &self.arcs {
            let team = arcs.agent().unwrap_or_default();
            let route = format!("route of team {}", team);
            let successors = Successors::from_arcs(arcs, values, &route)?;
            let walk = successors.closed_walk(self.depot, labels, &route)?;

            if successors.selected() != walk.len() {
                return Err(DecodeError::IncompleteTour {
                    route,
                    reason: format!(
                        "{} selected arcs lie off the tour through the depot",
                        successors.selected() - walk.len()
                    ),
                });
            }

            routes.push(AgentRoute {
                agent: team,
                tour: tour_from_walk(&walk, &self.costs),
            });
        }

        let partition = RoutePartition::new(routes);
        check_partition(&partition, labels, self.depot)?;
        Ok(partition)
    }
}

fn check_partition(partition: &RoutePartition, labels: &[usize], depot: usize) -> Result<(), DecodeError> {
    let mut visits: BTreeMap<usize, usize> = labels
        .iter()
        .enumerate()
        .filter(|&(p, _)| p != depot)
        .map(|(_, &l)| (l, 0))
        .collect();
    for node in partition.visited_nodes() {
        *visits.entry(node).or_default() += 1;
    }
    match visits.into_iter().find(|&(_, count)| count != 1) {
        Some((node, visits)) => Err(DecodeError::PartitionConsistency { node, visits }),
        None => Ok(()),
    }
}
