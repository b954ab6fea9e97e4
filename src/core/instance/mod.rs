pub mod manager;
pub mod model;
pub mod registry;

pub use manager::{InstanceManager, InstanceSummary, NewInstance};
pub use model::{Instance, Mod};
pub use registry::{check_consistency, InstanceRegistry};
