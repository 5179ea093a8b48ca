pub mod medium;
pub mod node;
pub mod resource;
pub mod scheduler;
pub mod simulation;

pub use medium::{Medium, ReceiveHandler};
pub use node::{NodeContext, NodeRuntime, NodeShared};
pub use resource::{Resource, ResourceGuard};
pub use scheduler::Scheduler;
pub use simulation::Simulation;
