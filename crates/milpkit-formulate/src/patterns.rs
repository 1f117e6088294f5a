//! Reusable constraint-generation blocks shared by the problem builders.
//!
//! Every block takes the bound values it needs as parameters, so a scenario
//! with different data is a rebuild with different arguments.

use milpkit_solver::{Bounds, Domain, Model, ModelError, Relation, Term, VariableRef};

/// Arc variables `name[i,j]` (or `name[i,j,k]` for agent `k`) over a node
/// set, addressed by node position.
#[derive(Debug, Clone)]
pub struct ArcVars {
    labels: Vec<usize>,
    agent: Option<usize>,
    vars: Vec<Option<VariableRef>>,
}

impl ArcVars {
    /// Declares a variable for every ordered pair of positions accepted by
    /// `valid`. Self-loops are included when `valid` accepts them.
    pub fn add(
        model: &mut Model,
        name: &str,
        labels: &[usize],
        agent: Option<usize>,
        domain: Domain,
        valid: impl Fn(usize, usize) -> bool,
    ) -> Result<Self, ModelError> {
        let n = labels.len();
        let mut vars = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                if !valid(i, j) {
                    vars.push(None);
                    continue;
                }
                let indices = with_agent(&[labels[i], labels[j]], agent);
                vars.push(Some(model.add_variable(name, &indices, domain, Bounds::default())?));
            }
        }
        Ok(Self {
            labels: labels.to_vec(),
            agent,
            vars,
        })
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn agent(&self) -> Option<usize> {
        self.agent
    }

    pub fn get(&self, i: usize, j: usize) -> Option<VariableRef> {
        self.vars[i * self.size() + j]
    }

    /// Variable for the arc between two node labels
    pub fn arc(&self, from: usize, to: usize) -> Option<VariableRef> {
        let i = self.labels.iter().position(|&l| l == from)?;
        let j = self.labels.iter().position(|&l| l == to)?;
        self.get(i, j)
    }

    /// Arcs leaving position `i`, excluding the self-loop
    pub fn outgoing(&self, i: usize) -> impl Iterator<Item = (usize, VariableRef)> + '_ {
        (0..self.size())
            .filter(move |&j| j != i)
            .filter_map(move |j| self.get(i, j).map(|v| (j, v)))
    }

    /// Arcs entering position `j`, excluding the self-loop
    pub fn incoming(&self, j: usize) -> impl Iterator<Item = (usize, VariableRef)> + '_ {
        (0..self.size())
            .filter(move |&i| i != j)
            .filter_map(move |i| self.get(i, j).map(|v| (i, v)))
    }

    /// Every declared arc except self-loops
    pub fn proper_arcs(&self) -> impl Iterator<Item = (usize, usize, VariableRef)> + '_ {
        (0..self.size()).flat_map(move |i| self.outgoing(i).map(move |(j, v)| (i, j, v)))
    }

    fn index(&self, labels: &[usize]) -> Vec<usize> {
        with_agent(labels, self.agent)
    }
}

/// MTZ order variables `name[i]` (or `name[i,k]`) bounded in `[1, n-1]`
#[derive(Debug, Clone)]
pub struct OrderVars {
    vars: Vec<VariableRef>,
}

impl OrderVars {
    pub fn add(
        model: &mut Model,
        name: &str,
        labels: &[usize],
        agent: Option<usize>,
        domain: Domain,
    ) -> Result<Self, ModelError> {
        let upper = labels.len().saturating_sub(1).max(1) as f64;
        let vars = labels
            .iter()
            .map(|&label| {
                model.add_variable(name, &with_agent(&[label], agent), domain, Bounds::between(1.0, upper))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { vars })
    }

    pub fn get(&self, i: usize) -> VariableRef {
        self.vars[i]
    }
}

/// A bound on a linear expression, supplied as data
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Bound {
    AtMost(f64),
    AtLeast(f64),
    Exactly(f64),
    Between(f64, f64),
}

impl Bound {
    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        match *self {
            Bound::AtMost(u) => value <= u + tolerance,
            Bound::AtLeast(l) => value >= l - tolerance,
            Bound::Exactly(v) => (value - v).abs() <= tolerance,
            Bound::Between(l, u) => value >= l - tolerance && value <= u + tolerance,
        }
    }
}

pub(crate) fn with_agent(indices: &[usize], agent: Option<usize>) -> Vec<usize> {
    let mut out = indices.to_vec();
    out.extend(agent);
    out
}

/// Exactly one arc leaves and one arc enters every node, and no node loops
/// to itself.
pub fn assignment(model: &mut Model, arcs: &ArcVars) -> Result<(), ModelError> {
    for i in 0..arcs.size() {
        let index = arcs.index(&[arcs.labels[i]]);
        let out: Vec<Term> = arcs.outgoing(i).map(|(_, v)| (1.0, v)).collect();
        model.add_constraint("outbound", &index, Relation::Eq, out, 1.0)?;
        let inc: Vec<Term> = arcs.incoming(i).map(|(_, v)| (1.0, v)).collect();
        model.add_constraint("inbound", &index, Relation::Eq, inc, 1.0)?;
    }
    no_self_loops(model, arcs)
}

/// `x[i,i] = 0` for every declared self-loop
pub fn no_self_loops(model: &mut Model, arcs: &ArcVars) -> Result<(), ModelError> {
    for i in 0..arcs.size() {
        if let Some(var) = arcs.get(i, i) {
            let index = arcs.index(&[arcs.labels[i]]);
            model.add_constraint("no_self_loop", &index, Relation::Eq, vec![(1.0, var)], 0.0)?;
        }
    }
    Ok(())
}

/// One departure from and one return to `depot` for the agent owning `arcs`
pub fn depot_degree(model: &mut Model, arcs: &ArcVars, depot: usize) -> Result<(), ModelError> {
    let index = arcs.index(&[]);
    let out: Vec<Term> = arcs.outgoing(depot).map(|(_, v)| (1.0, v)).collect();
    model.add_constraint("depart", &index, Relation::Eq, out, 1.0)?;
    let inc: Vec<Term> = arcs.incoming(depot).map(|(_, v)| (1.0, v)).collect();
    model.add_constraint("return", &index, Relation::Eq, inc, 1.0)
}

/// Miller-Tucker-Zemlin subtour elimination anchored on `depot`:
/// `u[i] - u[j] + n x[i,j] <= n - 1` for every arc with `i != j` where
/// neither end is the depot.
pub fn mtz(model: &mut Model, arcs: &ArcVars, order: &OrderVars, depot: usize) -> Result<(), ModelError> {
    let n = arcs.size() as f64;
    let mut generated = 0;
    for (i, j, x) in arcs.proper_arcs() {
        if i == depot || j == depot {
            continue;
        }
        let index = arcs.index(&[arcs.labels[i], arcs.labels[j]]);
        let terms = vec![(1.0, order.get(i)), (-1.0, order.get(j)), (n, x)];
        model.add_constraint("subtour_elimination", &index, Relation::Le, terms, n - 1.0)?;
        generated += 1;
    }
    log::debug!("generated {} subtour elimination constraints", generated);
    Ok(())
}

/// `sum_j x[i,j] - sum_j x[j,i] = 0` at every position for which `conserve`
/// holds
pub fn flow_conservation(
    model: &mut Model,
    arcs: &ArcVars,
    conserve: impl Fn(usize) -> bool,
) -> Result<(), ModelError> {
    for i in (0..arcs.size()).filter(|&i| conserve(i)) {
        let mut terms: Vec<Term> = arcs.outgoing(i).map(|(_, v)| (1.0, v)).collect();
        terms.extend(arcs.incoming(i).map(|(_, v)| (-1.0, v)));
        let index = arcs.index(&[arcs.labels[i]]);
        model.add_constraint("flow", &index, Relation::Eq, terms, 0.0)?;
    }
    Ok(())
}

/// Unit flow out of `source` and into `sink`; every other node conserves flow
pub fn unit_flow(model: &mut Model, arcs: &ArcVars, source: usize, sink: usize) -> Result<(), ModelError> {
    let index = arcs.index(&[]);
    let out: Vec<Term> = arcs.outgoing(source).map(|(_, v)| (1.0, v)).collect();
    model.add_constraint("origin", &index, Relation::Eq, out, 1.0)?;
    let inc: Vec<Term> = arcs.incoming(sink).map(|(_, v)| (1.0, v)).collect();
    model.add_constraint("destination", &index, Relation::Eq, inc, 1.0)?;
    flow_conservation(model, arcs, |i| i != source && i != sink)
}

/// Bounds a weighted sum. A [`Bound::Between`] emits `{family}_min` and
/// `{family}_max` members.
pub fn bounded(
    model: &mut Model,
    family: &str,
    indices: &[usize],
    terms: Vec<Term>,
    bound: Bound,
) -> Result<(), ModelError> {
    match bound {
        Bound::AtMost(u) => model.add_constraint(family, indices, Relation::Le, terms, u),
        Bound::AtLeast(l) => model.add_constraint(family, indices, Relation::Ge, terms, l),
        Bound::Exactly(v) => model.add_constraint(family, indices, Relation::Eq, terms, v),
        Bound::Between(l, u) => {
            model.add_constraint(format!("{}_min", family), indices, Relation::Ge, terms.clone(), l)?;
            model.add_constraint(format!("{}_max", family), indices, Relation::Le, terms, u)
        }
    }
}

/// Fixes a variable to zero
pub fn fix_zero(model: &mut Model, family: &str, indices: &[usize], var: VariableRef) -> Result<(), ModelError> {
    model.add_constraint(family, indices, Relation::Eq, vec![(1.0, var)], 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtz_skips_depot_and_diagonal() {
        let mut model = Model::new("mtz");
        let labels = [1, 2, 3, 4];
        let arcs = ArcVars::add(&mut model, "x", &labels, None, Domain::Binary, |_, _| true).unwrap();
        let order = OrderVars::add(&mut model, "u", &labels, None, Domain::Continuous).unwrap();
        // Depot at position 1, i.e. node 2
        mtz(&mut model, &arcs, &order, 1).unwrap();

        // Ordered pairs among {1, 3, 4}
        let members: Vec<&Vec<usize>> = model.family("subtour_elimination").map(|c| &c.indices).collect();
        assert_eq!(members.len(), 6);
        assert!(members.iter().all(|idx| !idx.contains(&2)));
        assert!(members.iter().all(|idx| idx[0] != idx[1]));

        let c = model.family("subtour_elimination").next().unwrap();
        assert_eq!(c.rhs, 3.0);
        assert!(c.terms.iter().any(|&(coef, _)| coef == 4.0));
    }

    #[test]
    fn test_order_bounds() {
        let mut model = Model::new("order");
        let order = OrderVars::add(&mut model, "u", &[0, 1, 2, 3, 4], Some(2), Domain::Integer).unwrap();
        let u = model.get(order.get(3)).unwrap();
        assert_eq!(u.indices, vec![3, 2]);
        assert_eq!(u.lower(), 1.0);
        assert_eq!(u.upper(), Some(4.0));
    }

    #[test]
    fn test_assignment_families() {
        let mut model = Model::new("assign");
        let arcs = ArcVars::add(&mut model, "x", &[0, 1, 2], Some(1), Domain::Binary, |_, _| true).unwrap();
        assignment(&mut model, &arcs).unwrap();
        assert_eq!(model.family("outbound").count(), 3);
        assert_eq!(model.family("inbound").count(), 3);
        assert_eq!(model.family("no_self_loop").count(), 3);
        let out = model.family("outbound").next().unwrap();
        assert_eq!(out.indices, vec![0, 1]);
        assert_eq!(out.terms.len(), 2);
    }

    #[test]
    fn test_bounded_between() {
        let mut model = Model::new("window");
        let x = model.add_variable("x", &[], Domain::Integer, Bounds::default()).unwrap();
        bounded(&mut model, "balance", &[1], vec![(1.0, x)], Bound::Between(2.0, 4.0)).unwrap();
        assert_eq!(model.family("balance_min").next().unwrap().rhs, 2.0);
        assert_eq!(model.family("balance_max").next().unwrap().rhs, 4.0);
        assert!(Bound::Between(2.0, 4.0).contains(4.0, 0.0));
        assert!(!Bound::Between(2.0, 4.0).contains(1.0, 0.5));
    }
}
