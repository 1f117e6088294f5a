mod allocation;
mod path;
mod teams;
mod tour;
mod transport;

pub use allocation::{AllocationFormulation, AllocationPlan, AllocationProblem, Carrier, Resource, build_allocation};
pub use path::{PathFormulation, build_path};
pub use teams::{TeamFormulation, TeamOptions, balance_window, build_teams};
pub use tour::{TourFormulation, TourOptions, build_tour};
pub use transport::{ArcCost, FlowPlan, TransportFormulation, TransportProblem, build_transport};
