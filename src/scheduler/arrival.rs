//! Per-cycle batched access request.
//!
//! Every cycle waits its sampled delay and then submits one access request
//! covering the whole population. The resulting [`CycleBaseline`] carries the
//! first two stamps of every run in that cycle.

use log::{error, info};
use std::time::Duration;

use super::poisson::PoissonArrivals;
use crate::config::{access_parameters, ACCESS_REASONS, DATA_ID};
use crate::error::{HarnessError, HarnessResult};
use crate::external::types::AccessRequest;
use crate::external::Ledger;
use crate::topology::provisioner::{Aggregator, Entity};
use crate::workflow::fanout::with_timeout;
use crate::workflow::stage::{Stage, Timeline};

/// Outcome of a cycle's batched request, shared by all runs of the cycle.
#[derive(Debug, Clone)]
pub struct CycleBaseline {
    pub cycle: u32,
    /// Sampled delay the cycle waited before submitting.
    pub waited: Duration,
    /// Holds `RequestSubmitted` and, on success, `RequestCompleted`.
    pub timeline: Timeline,
    /// One request id per entity, in population order. `None` when the batch
    /// request failed.
    pub request_ids: Option<Vec<String>>,
}

impl CycleBaseline {
    pub fn is_skipped(&self) -> bool {
        !self.timeline.get(Stage::RequestCompleted).is_reached()
    }

    pub fn request_id(&self, entity: usize) -> HarnessResult<&str> {
        self.request_ids
            .as_ref()
            .and_then(|ids| ids.get(entity))
            .map(String::as_str)
            .ok_or(HarnessError::MissingRequestId { entity })
    }
}

/// `0x`-prefixed hex of an ASCII string, as contract calls expect it.
pub fn ascii_to_hex(s: &str) -> String {
    format!("0x{}", hex::encode(s))
}

/// The batched request for every entity of the population.
pub fn access_request(aggregator: &Aggregator, entities: &[Entity]) -> AccessRequest {
    AccessRequest {
        data_ids: entities.iter().map(|_| ascii_to_hex(DATA_ID)).collect(),
        contract_addresses: entities.iter().map(|e| e.contract.address.clone()).collect(),
        signer_addresses: vec![aggregator.signer_account.clone()],
        reasons: ascii_to_hex(ACCESS_REASONS),
        parameters: access_parameters(),
    }
}

/// Waits the cycle's sampled delay, then submits the batched request.
///
/// Never fails: a rejected or timed out request leaves `RequestCompleted`
/// unstamped, which makes every run of the cycle a skip.
pub async fn schedule_cycle(
    cycle: u32,
    arrivals: &PoissonArrivals,
    ledger: &dyn Ledger,
    aggregator: &Aggregator,
    entities: &[Entity],
    call_timeout: Duration,
) -> CycleBaseline {
    let waited = arrivals.sample_delay(cycle);
    tokio::time::sleep(waited).await;

    let mut timeline = Timeline::new();
    timeline.complete(Stage::RequestSubmitted);

    let request = access_request(aggregator, entities);
    let submitted = match aggregator.contract() {
        Ok(contract) => {
            with_timeout(
                "requestAccessToData",
                call_timeout,
                ledger.request_access_to_data(contract, &request),
            )
            .await
        }
        Err(e) => Err(e),
    };

    let request_ids = match submitted {
        Ok(receipt) => {
            timeline.complete(Stage::RequestCompleted);
            info!(
                "Cycle {} request access completed after {:?} delay, aggregation {}",
                cycle, waited, receipt.aggregation_id
            );
            Some(receipt.request_ids)
        }
        Err(e) => {
            error!("Cycle {} request access failed, skipping its runs: {}", cycle, e);
            None
        }
    };

    CycleBaseline {
        cycle,
        waited,
        timeline,
        request_ids,
    }
}
