pub mod builders;
pub mod decode;
pub mod error;
pub mod patterns;
pub mod tables;

pub use builders::*;
pub use decode::{ARC_THRESHOLD, AgentRoute, FLOW_EPSILON, Path, QuantityMatrix, RoutePartition, Tour};
pub use error::{DecodeError, FormulateError};
pub use patterns::{ArcVars, Bound, OrderVars};
pub use tables::{ArcCosts, Coordinates, CostMatrix};
