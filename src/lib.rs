pub mod config;
pub mod error;
pub mod external;
pub mod metrics;
pub mod quorum;
pub mod scheduler;
pub mod tools;
pub mod topology;
pub mod workflow;

#[cfg(test)]
pub mod tests;

pub use config::{BenchmarkConfig, EnvironmentConfig};
pub use error::{HarnessError, HarnessResult};
pub use tools::Harness;
