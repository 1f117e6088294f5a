use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::error::ModelError;
use crate::gateway::{SolveOptions, SolverGateway};
use crate::solution::{ConstraintViolation, Solution};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

/// Handle to a variable declared in a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableRef {
    model: ModelId,
    index: usize,
}

impl VariableRef {
    /// Column of this variable in the model's value vectors
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn model(&self) -> ModelId {
        self.model
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Domain {
    /// 0 or 1
    Binary,
    /// Non-negative integer
    Integer,
    /// Non-negative real
    Continuous,
}

impl Domain {
    pub fn is_integral(&self) -> bool {
        matches!(self, Domain::Binary | Domain::Integer)
    }
}

/// Declared bounds of a variable. Every domain is non-negative, so the
/// lower bound defaults to zero and the upper bound to none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: None,
        }
    }
}

impl Bounds {
    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    pub fn at_most(upper: f64) -> Self {
        Self {
            lower: 0.0,
            upper: Some(upper),
        }
    }
}

/// A decision variable identified by `name[indices]`
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub indices: Vec<usize>,
    pub domain: Domain,
    pub bounds: Bounds,
}

impl Variable {
    /// Lower bound after intersecting with the domain
    pub fn lower(&self) -> f64 {
        self.bounds.lower.max(0.0)
    }

    /// Upper bound after intersecting with the domain
    pub fn upper(&self) -> Option<f64> {
        match (self.domain, self.bounds.upper) {
            (Domain::Binary, Some(u)) => Some(u.min(1.0)),
            (Domain::Binary, None) => Some(1.0),
            (_, upper) => upper,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, IndexLabel(&self.indices))
    }
}

/// Formats an index tuple as `[i,j,k]`, or nothing for a scalar
pub struct IndexLabel<'a>(pub &'a [usize]);

impl fmt::Display for IndexLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "[")?;
        for (n, i) in self.0.iter().enumerate() {
            if n > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", i)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Le => "<=",
            Relation::Ge => ">=",
            Relation::Eq => "=",
        })
    }
}

/// A `coefficient * variable` term
pub type Term = (f64, VariableRef);

#[derive(Debug, Clone)]
pub struct Objective {
    pub sense: Sense,
    pub terms: Vec<Term>,
}

impl Objective {
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        evaluate(&self.terms, values)
    }
}

/// One member of an indexed constraint family: `sum(terms) relation rhs`
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Family name shared by every member generated from the same rule
    pub family: String,
    /// Index of this member within the family
    pub indices: Vec<usize>,
    pub relation: Relation,
    pub terms: Vec<Term>,
    pub rhs: f64,
}

impl Constraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        evaluate(&self.terms, values)
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.family, IndexLabel(&self.indices))
    }
}

fn evaluate(terms: &[Term], values: &[f64]) -> f64 {
    terms
        .iter()
        .map(|(coef, var)| coef * values.get(var.index).copied().unwrap_or(0.0))
        .sum()
}

/// An owned MILP/LP instance: variables, objective and constraint families.
///
/// A model is solved at most once. Scenarios that differ in data are built
/// as separate models rather than by mutating a solved one.
#[derive(Debug)]
pub struct Model {
    id: ModelId,
    name: String,
    variables: Vec<Variable>,
    lookup: HashMap<(String, Vec<usize>), usize>,
    objective: Option<Objective>,
    constraints: Vec<Constraint>,
    family_indices: HashMap<String, HashSet<Vec<usize>>>,
    solved: bool,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            variables: Vec::new(),
            lookup: HashMap::new(),
            objective: None,
            constraints: Vec::new(),
            family_indices: HashMap::new(),
            solved: false,
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        indices: &[usize],
        domain: Domain,
        bounds: Bounds,
    ) -> Result<VariableRef, ModelError> {
        let variable = Variable {
            name: name.into(),
            indices: indices.to_vec(),
            domain,
            bounds,
        };
        if bounds.lower.is_nan() || bounds.lower < 0.0 || bounds.lower.is_infinite() {
            return Err(ModelError::InvalidBounds {
                variable: variable.to_string(),
                reason: format!("lower bound {} must be finite and non-negative", bounds.lower),
            });
        }
        if bounds.upper.is_some_and(|u| u.is_nan()) {
            return Err(ModelError::InvalidBounds {
                variable: variable.to_string(),
                reason: "upper bound is NaN".to_string(),
            });
        }

        let key = (variable.name.clone(), variable.indices.clone());
        if self.lookup.contains_key(&key) {
            return Err(ModelError::DuplicateVariable(variable.to_string()));
        }

        let index = self.variables.len();
        self.lookup.insert(key, index);
        self.variables.push(variable);
        Ok(VariableRef {
            model: self.id,
            index,
        })
    }

    /// Looks up a declared variable by name and index tuple
    pub fn variable(&self, name: &str, indices: &[usize]) -> Option<VariableRef> {
        self.lookup
            .get(&(name.to_string(), indices.to_vec()))
            .map(|&index| VariableRef {
                model: self.id,
                index,
            })
    }

    pub fn get(&self, var: VariableRef) -> Option<&Variable> {
        if var.model != self.id {
            return None;
        }
        self.variables.get(var.index)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn set_objective(&mut self, sense: Sense, terms: Vec<Term>) -> Result<(), ModelError> {
        if terms.is_empty() {
            return Err(ModelError::EmptyObjective);
        }
        self.objective = Some(Objective { sense, terms });
        Ok(())
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn add_constraint(
        &mut self,
        family: impl Into<String>,
        indices: &[usize],
        relation: Relation,
        terms: Vec<Term>,
        rhs: f64,
    ) -> Result<(), ModelError> {
        let family = family.into();
        let seen = self.family_indices.entry(family.clone()).or_default();
        if !seen.insert(indices.to_vec()) {
            return Err(ModelError::DuplicateConstraintIndex {
                family,
                indices: IndexLabel(indices).to_string(),
            });
        }
        self.constraints.push(Constraint {
            family,
            indices: indices.to_vec(),
            relation,
            terms,
            rhs,
        });
        Ok(())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Constraints generated under `family`
    pub fn family<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Constraint> + 'a {
        self.constraints.iter().filter(move |c| c.family == family)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Checks that every term references a variable of this model, and runs a
    /// best-effort static check on variable bounds. This is not a feasibility
    /// proof.
    pub fn validate(&self) -> Result<(), ModelError> {
        let objective = self.objective.as_ref().ok_or(ModelError::EmptyObjective)?;
        self.check_terms("objective", &objective.terms)?;
        for constraint in &self.constraints {
            self.check_terms(&constraint.label(), &constraint.terms)?;
        }

        for variable in &self.variables {
            let lower = variable.lower();
            let Some(upper) = variable.upper() else {
                continue;
            };
            if lower > upper {
                return Err(ModelError::EmptyFeasibleRegionHint {
                    variable: variable.to_string(),
                    reason: format!("lower bound {} exceeds upper bound {}", lower, upper),
                });
            }
            if variable.domain.is_integral() && lower.ceil() > upper.floor() {
                return Err(ModelError::EmptyFeasibleRegionHint {
                    variable: variable.to_string(),
                    reason: format!("no integer lies in [{}, {}]", lower, upper),
                });
            }
        }

        Ok(())
    }

    fn check_terms(&self, label: &str, terms: &[Term]) -> Result<(), ModelError> {
        for (_, var) in terms {
            if var.model != self.id || var.index >= self.variables.len() {
                return Err(ModelError::DanglingVariableReference {
                    constraint: label.to_string(),
                    variable: var.index,
                });
            }
        }
        Ok(())
    }

    /// Evaluates every constraint and variable bound against `values`
    /// (indexed by [`VariableRef::index`]) and returns the violated ones,
    /// worst first.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &self.constraints {
            let lhs = c.lhs(values);
            let amount = match c.relation {
                Relation::Le => lhs - c.rhs,
                Relation::Ge => c.rhs - lhs,
                Relation::Eq => (lhs - c.rhs).abs(),
            };
            if amount > tolerance {
                let description = match c.relation {
                    Relation::Le => format!("{} exceeds maximum of {:.2} by {:.2}", c.label(), c.rhs, amount),
                    Relation::Ge => format!("{} is below minimum of {:.2} by {:.2}", c.label(), c.rhs, amount),
                    Relation::Eq => format!("{} requires exactly {:.2} but got {:.2}", c.label(), c.rhs, lhs),
                };
                violations.push(ConstraintViolation {
                    family: c.family.clone(),
                    indices: c.indices.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount: amount,
                    description,
                });
            }
        }

        for (j, variable) in self.variables.iter().enumerate() {
            let value = values.get(j).copied().unwrap_or(0.0);
            let lower = variable.lower();
            if value < lower - tolerance {
                violations.push(ConstraintViolation {
                    family: "bounds".to_string(),
                    indices: vec![j],
                    required: lower,
                    actual: value,
                    violation_amount: lower - value,
                    description: format!("{} is below its lower bound {:.2}", variable, lower),
                });
            }
            if let Some(upper) = variable.upper() {
                if value > upper + tolerance {
                    violations.push(ConstraintViolation {
                        family: "bounds".to_string(),
                        indices: vec![j],
                        required: upper,
                        actual: value,
                        violation_amount: value - upper,
                        description: format!("{} exceeds its upper bound {:.2}", variable, upper),
                    });
                }
            }
        }

        violations.sort_by(|a, b| {
            b.violation_amount
                .partial_cmp(&a.violation_amount)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        violations
    }

    /// Validates the model and hands it to `gateway`. A model can be solved
    /// only once.
    pub fn solve(
        &mut self,
        gateway: &dyn SolverGateway,
        options: &SolveOptions,
    ) -> Result<Solution, ModelError> {
        if self.solved {
            return Err(ModelError::AlreadySolved(self.name.clone()));
        }
        self.validate()?;
        self.solved = true;

        debug!(
            "solving model '{}' with {} variables and {} constraints",
            self.name,
            self.variables.len(),
            self.constraints.len()
        );
        Ok(gateway.solve(self, options))
    }
}
