pub mod arrival;
pub mod poisson;

pub use arrival::{access_request, schedule_cycle, CycleBaseline};
pub use poisson::PoissonArrivals;
