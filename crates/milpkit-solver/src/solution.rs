use crate::model::{ModelId, VariableRef};

/// The result of solving a [`Model`](crate::Model)
#[derive(Debug, Clone)]
pub struct Solution {
    model: ModelId,
    /// Solution status
    pub status: SolutionStatus,
    /// Objective value of the returned assignment, if there is one
    pub objective_value: Option<f64>,
    /// Value for each variable, indexed by [`VariableRef::index`]
    values: Option<Vec<f64>>,
    /// Human readable detail for non-optimal statuses
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The relaxation is unbounded
    Unbounded,
    /// The time limit expired; the best incumbent is returned if one exists
    TimeLimitReached,
    /// Solver encountered an error
    Error,
}

impl Solution {
    pub fn optimal(model: ModelId, values: Vec<f64>, objective_value: f64) -> Self {
        Self {
            model,
            status: SolutionStatus::Optimal,
            objective_value: Some(objective_value),
            values: Some(values),
            message: None,
        }
    }

    pub fn infeasible(model: ModelId) -> Self {
        Self::without_values(model, SolutionStatus::Infeasible)
    }

    pub fn unbounded(model: ModelId) -> Self {
        Self::without_values(model, SolutionStatus::Unbounded)
    }

    pub fn error(model: ModelId, message: impl Into<String>) -> Self {
        let mut solution = Self::without_values(model, SolutionStatus::Error);
        solution.message = Some(message.into());
        solution
    }

    /// A solve stopped by its time limit, carrying the incumbent if any
    pub fn time_limit_reached(model: ModelId, incumbent: Option<(Vec<f64>, f64)>) -> Self {
        match incumbent {
            Some((values, objective_value)) => Self {
                model,
                status: SolutionStatus::TimeLimitReached,
                objective_value: Some(objective_value),
                values: Some(values),
                message: None,
            },
            None => Self::without_values(model, SolutionStatus::TimeLimitReached),
        }
    }

    fn without_values(model: ModelId, status: SolutionStatus) -> Self {
        Self {
            model,
            status,
            objective_value: None,
            values: None,
            message: None,
        }
    }

    pub fn model_id(&self) -> ModelId {
        self.model
    }

    /// Whether the solution carries a variable assignment
    pub fn has_values(&self) -> bool {
        self.values.is_some()
    }

    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    /// Value of `var`, or `None` if unset or from another model
    pub fn value(&self, var: VariableRef) -> Option<f64> {
        if var.model() != self.model {
            return None;
        }
        self.values.as_ref()?.get(var.index()).copied()
    }
}

/// A constraint or bound not satisfied by an assignment
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint family (or `bounds` for a variable bound)
    pub family: String,
    /// Index of the violated member within its family
    pub indices: Vec<usize>,
    /// Required value (the RHS)
    pub required: f64,
    /// Actual left-hand side value
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human readable description
    pub description: String,
}
