mod backend;
mod error;
mod gateway;
mod model;
mod solution;

pub use backend::MicroLp;
pub use error::ModelError;
pub use gateway::{SolveOptions, SolverGateway};
pub use model::{
    Bounds, Constraint, Domain, IndexLabel, Model, ModelId, Objective, Relation, Sense, Term, Variable,
    VariableRef,
};
pub use solution::{ConstraintViolation, Solution, SolutionStatus};
