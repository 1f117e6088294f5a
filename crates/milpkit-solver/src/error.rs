use thiserror::Error;

/// Formulation errors detected while building or validating a [`Model`](crate::Model)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Duplicate variable: {0}")]
    DuplicateVariable(String),
    #[error("Objective has no terms")]
    EmptyObjective,
    #[error("Duplicate index {indices} in constraint family '{family}'")]
    DuplicateConstraintIndex { family: String, indices: String },
    #[error("Constraint {constraint} references variable #{variable} which is not declared in this model")]
    DanglingVariableReference { constraint: String, variable: usize },
    #[error("Variable {variable} admits no value: {reason}")]
    EmptyFeasibleRegionHint { variable: String, reason: String },
    #[error("Invalid bounds for variable {variable}: {reason}")]
    InvalidBounds { variable: String, reason: String },
    #[error("Model '{0}' was already solved; build a new model for a new scenario")]
    AlreadySolved(String),
}
