use std::collections::{BTreeSet, HashMap};

use log::debug;
use milpkit_solver::{
    Bounds, Domain, Model, ModelError, Relation, Sense, SolveOptions, Solution, SolverGateway, Term, VariableRef,
};

use crate::decode::{self, QuantityMatrix};
use crate::error::{DecodeError, FormulateError};
use crate::patterns::{self, Bound};
use crate::tables::{check_quantity, check_unique};

/// A resource that can be loaded onto carriers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Resource {
    pub id: usize,
    /// Value per unit loaded
    pub value: f64,
    /// Weight per unit
    pub weight: f64,
    /// Volume per unit
    pub volume: f64,
    /// Units available across all carriers
    pub available: f64,
    /// Only whole units may be loaded
    #[cfg_attr(feature = "serde", serde(default))]
    pub indivisible: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Carrier {
    pub id: usize,
    pub weight_capacity: f64,
    pub volume_capacity: f64,
}

/// A knapsack-style allocation instance
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationProblem {
    pub resources: Vec<Resource>,
    pub carriers: Vec<Carrier>,
    /// (resource, carrier) pairs that may not be loaded
    #[cfg_attr(feature = "serde", serde(default))]
    pub forbidden: Vec<(usize, usize)>,
    /// Resource pairs that may not share a carrier
    #[cfg_attr(feature = "serde", serde(default))]
    pub incompatible: Vec<(usize, usize)>,
}

impl AllocationProblem {
    fn validate(&self) -> Result<(), FormulateError> {
        if self.resources.is_empty() || self.carriers.is_empty() {
            return Err(FormulateError::invalid("allocation needs at least one resource and one carrier"));
        }
        let resource_ids: Vec<usize> = self.resources.iter().map(|r| r.id).collect();
        let carrier_ids: Vec<usize> = self.carriers.iter().map(|c| c.id).collect();
        check_unique(&resource_ids, "resource table")?;
        check_unique(&carrier_ids, "carrier table")?;

        for r in &self.resources {
            check_quantity(r.value, || format!("value[{}]", r.id))?;
            check_quantity(r.weight, || format!("weight[{}]", r.id))?;
            check_quantity(r.volume, || format!("volume[{}]", r.id))?;
            check_quantity(r.available, || format!("available[{}]", r.id))?;
        }
        for c in &self.carriers {
            check_quantity(c.weight_capacity, || format!("weight_capacity[{}]", c.id))?;
            check_quantity(c.volume_capacity, || format!("volume_capacity[{}]", c.id))?;
        }

        for &(r, a) in &self.forbidden {
            if !resource_ids.contains(&r) || !carrier_ids.contains(&a) {
                return Err(FormulateError::invalid(format!(
                    "forbidden pair ({}, {}) references an unknown resource or carrier",
                    r, a
                )));
            }
        }
        for &(r1, r2) in &self.incompatible {
            if r1 == r2 {
                return Err(FormulateError::invalid(format!("resource {} is listed as incompatible with itself", r1)));
            }
            if !resource_ids.contains(&r1) || !resource_ids.contains(&r2) {
                return Err(FormulateError::invalid(format!(
                    "incompatible pair ({}, {}) references an unknown resource",
                    r1, r2
                )));
            }
        }
        Ok(())
    }
}

/// Value-maximizing allocation of resources to capacity-limited carriers
#[derive(Debug)]
pub struct AllocationFormulation {
    model: Model,
    resources: Vec<usize>,
    carriers: Vec<usize>,
    /// Row-major by (resource, carrier)
    quantities: Vec<Option<VariableRef>>,
    values: HashMap<usize, f64>,
}

/// Decoded allocation and its total value
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub quantities: QuantityMatrix,
    pub value: f64,
}

pub fn build_allocation(problem: &AllocationProblem) -> Result<AllocationFormulation, FormulateError> {
    problem.validate()?;
    let forbidden: BTreeSet<(usize, usize)> = problem.forbidden.iter().copied().collect();
    let exclusive: BTreeSet<usize> = problem.incompatible.iter().flat_map(|&(a, b)| [a, b]).collect();

    let mut model = Model::new("allocation");
    let mut quantities = Vec::with_capacity(problem.resources.len() * problem.carriers.len());
    let mut indicators: HashMap<(usize, usize), VariableRef> = HashMap::new();
    let mut objective: Vec<Term> = Vec::new();

    for r in &problem.resources {
        let domain = if r.indivisible { Domain::Integer } else { Domain::Continuous };
        for c in &problem.carriers {
            let x = model.add_variable("x", &[r.id, c.id], domain, Bounds::default())?;
            objective.push((r.value, x));
            if forbidden.contains(&(r.id, c.id)) {
                patterns::fix_zero(&mut model, "forbidden", &[r.id, c.id], x)?;
            }
            if exclusive.contains(&r.id) {
                let y = model.add_variable("y", &[r.id, c.id], Domain::Binary, Bounds::default())?;
                model.add_constraint(
                    "link",
                    &[r.id, c.id],
                    Relation::Le,
                    vec![(1.0, x), (-r.available, y)],
                    0.0,
                )?;
                indicators.insert((r.id, c.id), y);
            }
            quantities.push(Some(x));
        }
    }
    model.set_objective(Sense::Maximize, objective)?;

    let width = problem.carriers.len();
    for (k, c) in problem.carriers.iter().enumerate() {
        let loaded: Vec<(&Resource, VariableRef)> = problem
            .resources
            .iter()
            .enumerate()
            .filter_map(|(r, res)| quantities[r * width + k].map(|x| (res, x)))
            .collect();
        let weight: Vec<Term> = loaded.iter().map(|&(res, x)| (res.weight, x)).collect();
        patterns::bounded(&mut model, "weight_capacity", &[c.id], weight, Bound::AtMost(c.weight_capacity))?;
        let volume: Vec<Term> = loaded.iter().map(|&(res, x)| (res.volume, x)).collect();
        patterns::bounded(&mut model, "volume_capacity", &[c.id], volume, Bound::AtMost(c.volume_capacity))?;
    }
    for (r, res) in problem.resources.iter().enumerate() {
        let terms: Vec<Term> = quantities[r * width..(r + 1) * width]
            .iter()
            .flatten()
            .map(|&x| (1.0, x))
            .collect();
        patterns::bounded(&mut model, "availability", &[res.id], terms, Bound::AtMost(res.available))?;
    }

    let pairs: BTreeSet<(usize, usize)> = problem
        .incompatible
        .iter()
        .map(|&(a, b)| (a.min(b), a.max(b)))
        .collect();
    for &(r1, r2) in &pairs {
        for c in &problem.carriers {
            if let (Some(&y1), Some(&y2)) = (indicators.get(&(r1, c.id)), indicators.get(&(r2, c.id))) {
                model.add_constraint("incompatible", &[r1, r2, c.id], Relation::Le, vec![(1.0, y1), (1.0, y2)], 1.0)?;
            }
        }
    }

    debug!(
        "allocation model: {} resources, {} carriers, {} forbidden pairs, {} incompatible pairs",
        problem.resources.len(),
        problem.carriers.len(),
        forbidden.len(),
        pairs.len()
    );

    Ok(AllocationFormulation {
        model,
        resources: problem.resources.iter().map(|r| r.id).collect(),
        carriers: problem.carriers.iter().map(|c| c.id).collect(),
        quantities,
        values: problem.resources.iter().map(|r| (r.id, r.value)).collect(),
    })
}

impl AllocationFormulation {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn quantity_var(&self, resource: usize, carrier: usize) -> Option<VariableRef> {
        let r = self.resources.iter().position(|&id| id == resource)?;
        let c = self.carriers.iter().position(|&id| id == carrier)?;
        self.quantities[r * self.carriers.len() + c]
    }

    pub fn solve(&mut self, gateway: &dyn SolverGateway, options: &SolveOptions) -> Result<Solution, ModelError> {
        self.model.solve(gateway, options)
    }

    pub fn decode(&self, solution: &Solution) -> Result<AllocationPlan, DecodeError> {
        let values = decode::assignment(&self.model, solution)?;
        let quantities = QuantityMatrix::extract(&self.resources, &self.carriers, &self.quantities, values);
        let value = quantities
            .nonzero()
            .map(|(r, _, q)| q * self.values.get(&r).copied().unwrap_or(0.0))
            .sum();
        Ok(AllocationPlan { quantities, value })
    }
}

#[cfg(test)]
mod tests {
    use milpkit_solver::{MicroLp, SolutionStatus};

    use super::*;

    fn problem() -> AllocationProblem {
        AllocationProblem {
            resources: vec![
                Resource {
                    id: 1,
                    value: 10.0,
                    weight: 2.0,
                    volume: 1.0,
                    available: 10.0,
                    indivisible: false,
                },
                Resource {
                    id: 2,
                    value: 6.0,
                    weight: 1.0,
                    volume: 2.0,
                    available: 10.0,
                    indivisible: false,
                },
            ],
            carriers: vec![Carrier {
                id: 1,
                weight_capacity: 10.0,
                volume_capacity: 10.0,
            }],
            ..Default::default()
        }
    }

    fn solve(problem: &AllocationProblem) -> AllocationPlan {
        let mut f = build_allocation(problem).unwrap();
        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, SolutionStatus::Optimal);
        f.decode(&solution).unwrap()
    }

    #[test]
    fn test_families() {
        let mut p = problem();
        p.incompatible.push((2, 1));
        let f = build_allocation(&p).unwrap();
        assert_eq!(f.model().family("weight_capacity").count(), 1);
        assert_eq!(f.model().family("volume_capacity").count(), 1);
        assert_eq!(f.model().family("availability").count(), 2);
        assert_eq!(f.model().family("link").count(), 2);
        let incompatible: Vec<_> = f.model().family("incompatible").collect();
        assert_eq!(incompatible.len(), 1);
        assert_eq!(incompatible[0].indices, vec![1, 2, 1]);
    }

    #[test]
    fn test_divisible_optimum() {
        let plan = solve(&problem());
        assert!((plan.value - 160.0 / 3.0).abs() < 1e-6);
        assert!((plan.quantities.get(1, 1).unwrap() - 10.0 / 3.0).abs() < 1e-6);
        assert!((plan.quantities.get(2, 1).unwrap() - 10.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_indivisible_resource() {
        let mut p = problem();
        p.resources[0].indivisible = true;
        let plan = solve(&p);
        assert!((plan.value - 52.0).abs() < 1e-6);
        assert!((plan.quantities.get(1, 1).unwrap() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_forbidden_pair() {
        let mut p = problem();
        p.forbidden.push((2, 1));
        let mut f = build_allocation(&p).unwrap();
        let solution = f.solve(&MicroLp::new(), &SolveOptions::default()).unwrap();
        let plan = f.decode(&solution).unwrap();
        assert!((plan.value - 50.0).abs() < 1e-6);
        assert_eq!(plan.quantities.get(2, 1), Some(0.0));

        let blocked = f.quantity_var(2, 1).unwrap();
        assert!(solution.value(blocked).unwrap().abs() < 1e-9);
        assert!(f.model().family("forbidden").any(|c| c.terms == vec![(1.0, blocked)]));
        assert_eq!(f.quantity_var(2, 9), None);
    }

    #[test]
    fn test_invalid_data() {
        let mut p = problem();
        p.resources[1].available = -1.0;
        assert!(matches!(
            build_allocation(&p),
            Err(FormulateError::InvalidProblemData(_))
        ));

        let mut p = problem();
        p.incompatible.push((1, 1));
        assert!(build_allocation(&p).is_err());

        let mut p = problem();
        p.forbidden.push((1, 7));
        assert!(build_allocation(&p).is_err());
    }
}
