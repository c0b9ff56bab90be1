pub mod engine;
pub mod fanout;
pub mod preflight;
pub mod refresh;
pub mod retry;
pub mod stage;

pub use engine::{run_workflow, WorkflowParams};
pub use stage::{RunOutcome, Stage, Timeline, WorkflowRun};
