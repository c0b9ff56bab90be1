//! Error taxonomy for the workflow engine.
//!
//! Provisioning and driver code report failures through `anyhow` since any
//! error there is fatal to a test iteration. Everything below the
//! `WorkflowRun` boundary uses [`HarnessError`] so a failure can be logged with
//! its stage and turned into a sentinel row.

use std::time::Duration;
use thiserror::Error;

use crate::workflow::stage::Stage;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport-level failure talking to a collaborator.
    #[error("{service} call `{operation}` failed: {reason}")]
    Collaborator {
        service: &'static str,
        operation: &'static str,
        reason: String,
    },

    /// Collaborator answered, but not with a success status.
    #[error("{service} call `{operation}` returned status {status}")]
    Rejected {
        service: &'static str,
        operation: &'static str,
        status: u16,
    },

    #[error("`{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("key fragments failed integrity check after {attempts} attempts: {detail}")]
    IntegrityFailure { attempts: usize, detail: String },

    #[error("cannot select {requested} distinct nodes out of {available}")]
    QuorumTooLarge { requested: usize, available: usize },

    #[error("no access request id for entity {entity}")]
    MissingRequestId { entity: usize },

    #[error("{failed} of {total} node calls failed during {stage}")]
    FanOut {
        stage: Stage,
        failed: usize,
        total: usize,
    },

    #[error("ledger: {0}")]
    Ledger(String),
}

impl HarnessError {
    pub fn collaborator(
        service: &'static str,
        operation: &'static str,
        reason: impl ToString,
    ) -> Self {
        HarnessError::Collaborator {
            service,
            operation,
            reason: reason.to_string(),
        }
    }
}
