pub mod provisioner;
pub mod registry;

pub use provisioner::{provision, Aggregator, Entity, Population};
pub use registry::{Node, Topology};
