use milpkit_solver::ModelError;
use thiserror::Error;

/// Errors raised while turning problem data into a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulateError {
    #[error("Invalid problem data: {0}")]
    InvalidProblemData(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl FormulateError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        FormulateError::InvalidProblemData(message.into())
    }
}

/// Errors raised while reading a solution back into domain objects.
///
/// The structural variants indicate a formulation defect or numerical
/// tolerance problem and are never papered over.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Solver proved the model infeasible")]
    SolverInfeasible,
    #[error("Model relaxation is unbounded")]
    SolverUnbounded,
    #[error("Solver failed: {0}")]
    SolverFailed(String),
    #[error("Solution was produced for a different model")]
    ModelMismatch,
    #[error("Incomplete {route}: {reason}")]
    IncompleteTour { route: String, reason: String },
    #[error("Ambiguous arc selection in {route}: node {from} has tied outgoing arcs to {candidates:?}")]
    AmbiguousArcSelection {
        route: String,
        from: usize,
        candidates: Vec<usize>,
    },
    #[error("Node {node} is visited by {visits} routes, expected exactly one")]
    PartitionConsistency { node: usize, visits: usize },
    #[error("Incomplete path: {0}")]
    IncompletePath(String),
}
