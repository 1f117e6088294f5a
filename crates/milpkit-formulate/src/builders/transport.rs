use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use milpkit_solver::{Bounds, Domain, Model, ModelError, Sense, SolveOptions, Solution, SolverGateway, Term, VariableRef};

use crate::decode::{self, QuantityMatrix};
use crate::error::{DecodeError, FormulateError};
use crate::patterns::{self, Bound};
use crate::tables::check_quantity;

/// Unit cost of shipping from an origin to a destination
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArcCost {
    pub from: usize,
    pub to: usize,
    pub cost: f64,
}

/// A transportation instance. Every (origin, destination) pair needs a cost
/// or must be listed as forbidden.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportProblem {
    /// Supply available at each origin
    pub supply: BTreeMap<usize, f64>,
    /// Demand that must be met exactly at each destination
    pub demand: BTreeMap<usize, f64>,
    pub costs: Vec<ArcCost>,
    /// Pairs whose flow is forced to zero
    #[cfg_attr(feature = "serde", serde(default))]
    pub forbidden: Vec<(usize, usize)>,
}

impl TransportProblem {
    pub fn total_supply(&self) -> f64 {
        self.supply.values().sum()
    }

    pub fn total_demand(&self) -> f64 {
        self.demand.values().sum()
    }

    fn validate(&self) -> Result<HashMap<(usize, usize), f64>, FormulateError> {
        if self.supply.is_empty() || self.demand.is_empty() {
            return Err(FormulateError::invalid("transportation needs at least one origin and one destination"));
        }
        for (o, s) in &self.supply {
            check_quantity(*s, || format!("supply[{}]", o))?;
        }
        for (d, q) in &self.demand {
            check_quantity(*q, || format!("demand[{}]", d))?;
        }

        let mut costs = HashMap::new();
        for arc in &self.costs {
            self.check_pair(arc.from, arc.to, "cost")?;
            check_quantity(arc.cost, || format!("cost[{},{}]", arc.from, arc.to))?;
            if costs.insert((arc.from, arc.to), arc.cost).is_some() {
                return Err(FormulateError::invalid(format!("cost[{},{}] is listed twice", arc.from, arc.to)));
            }
        }
        for &(o, d) in &self.forbidden {
            self.check_pair(o, d, "forbidden arc")?;
        }

        let forbidden: BTreeSet<(usize, usize)> = self.forbidden.iter().copied().collect();
        for &o in self.supply.keys() {
            for &d in self.demand.keys() {
                if !costs.contains_key(&(o, d)) && !forbidden.contains(&(o, d)) {
                    return Err(FormulateError::invalid(format!(
                        "cost[{},{}] is missing and the arc is not forbidden",
                        o, d
                    )));
                }
            }
        }
        Ok(costs)
    }

    fn check_pair(&self, o: usize, d: usize, what: &str) -> Result<(), FormulateError> {
        if !self.supply.contains_key(&o) {
            return Err(FormulateError::invalid(format!("{} ({}, {}): {} is not an origin", what, o, d, o)));
        }
        if !self.demand.contains_key(&d) {
            return Err(FormulateError::invalid(format!(
                "{} ({}, {}): {} is not a destination",
                what, o, d, d
            )));
        }
        Ok(())
    }
}

/// Minimum-cost transportation from origins with limited supply to
/// destinations with exact demand
#[derive(Debug)]
pub struct TransportFormulation {
    model: Model,
    origins: Vec<usize>,
    destinations: Vec<usize>,
    /// Row-major by (origin, destination)
    flows: Vec<Option<VariableRef>>,
    costs: HashMap<(usize, usize), f64>,
}

/// Decoded flows and their cost
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPlan {
    pub flows: QuantityMatrix,
    pub cost: f64,
}

pub fn build_transport(problem: &TransportProblem) -> Result<TransportFormulation, FormulateError> {
    let costs = problem.validate()?;
    let origins: Vec<usize> = problem.supply.keys().copied().collect();
    let destinations: Vec<usize> = problem.demand.keys().copied().collect();
    let forbidden: BTreeSet<(usize, usize)> = problem.forbidden.iter().copied().collect();

    let mut model = Model::new("transport");
    let mut flows = Vec::with_capacity(origins.len() * destinations.len());
    let mut objective: Vec<Term> = Vec::new();
    for &o in &origins {
        for &d in &destinations {
            let x = model.add_variable("x", &[o, d], Domain::Continuous, Bounds::default())?;
            if forbidden.contains(&(o, d)) {
                patterns::fix_zero(&mut model, "forbidden_arc", &[o, d], x)?;
            } else if let Some(&c) = costs.get(&(o, d)) {
                objective.push((c, x));
            }
            flows.push(Some(x));
        }
    }
    model.set_objective(Sense::Minimize, objective)?;

    let width = destinations.len();
    for (r, &o) in origins.iter().enumerate() {
        let terms: Vec<Term> = flows[r * width..(r + 1) * width]
            .iter()
            .flatten()
            .map(|&x| (1.0, x))
            .collect();
        patterns::bounded(&mut model, "supply", &[o], terms, Bound::AtMost(problem.supply[&o]))?;
    }
    for (c, &d) in destinations.iter().enumerate() {
        let terms: Vec<Term> = (0..origins.len())
            .filter_map(|r| flows[r * width + c])
            .map(|x| (1.0, x))
            .collect();
        patterns::bounded(&mut model, "demand", &[d], terms, Bound::Exactly(problem.demand[&d]))?;
    }

    debug!(
        "transport model: {} origins, {} destinations, {} forbidden arcs",
        origins.len(),
        destinations.len(),
        forbidden.len()
    );

    Ok(TransportFormulation {
        model,
        origins,
        destinations,
        flows,
        costs,
    })
}

impl TransportFormulation {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn flow_var(&self, origin: usize, destination: usize) -> Option<VariableRef> {
        let r = self.origins.iter().position(|&o| o == origin)?;
        let c = self.destinations.iter().position(|&d| d == destination)?;
        self.flows[r * self.destinations.len() + c]
    }

    pub fn solve(&mut self, gateway: &dyn SolverGateway, options: &SolveOptions) -> Result<Solution, ModelError> {
        self.model.solve(gateway, options)
    }

    pub fn decode(&self, solution: &Solution) -> Result<FlowPlan, DecodeError> {
        let values = decode::assignment(&self.model, solution)?;
        let flows = QuantityMatrix::extract(&self.origins, &self.destinations, &self.flows, values);
        let cost = flows
            .nonzero()
            .map(|(o, d, q)| q * self.costs.get(&(o, d)).copied().unwrap_or(0.0))
            .sum();
        Ok(FlowPlan { flows, cost })
    }
}
