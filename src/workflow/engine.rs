//! The per-entity, per-cycle access workflow.
//!
//! A run walks the stages in order: grant access, distribute key fragments,
//! generate re-encryption fragments, sign and retrieve a quorum of
//! fragments, refresh the delegated key. The first failing stage ends the
//! run. Failures never leave this module; they are logged and folded into
//! the returned [`WorkflowRun`].

use log::{debug, error};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

use super::fanout::{fan_out_join, settle, with_timeout};
use super::refresh::RefreshCeremony;
use super::retry::{retry_until_valid, validate_fragments};
use super::stage::{RunOutcome, Stage, WorkflowRun};
use crate::config::{BenchmarkConfig, DATA_ID, KFRAG_SIZE, SIGNATURE_CHALLENGE};
use crate::error::{HarnessError, HarnessResult};
use crate::external::types::{
    FragmentAccessRequest, GenerateFragmentRequest, KeyFragmentsRequest, SignRequest, StoreKeyFragmentRequest,
};
use crate::quorum::{pick_distinct, pick_one};
use crate::scheduler::arrival::CycleBaseline;
use crate::topology::provisioner::{Aggregator, Entity};
use crate::topology::registry::Topology;

/// Fixed inputs of every run in an iteration.
#[derive(Debug, Clone)]
pub struct WorkflowParams {
    pub threshold: usize,
    pub node_count: usize,
    pub kfrag_size: usize,
    pub max_kfrag_attempts: usize,
    pub call_timeout: Duration,
    /// `None` disables the key-refresh stage.
    pub key_refresh: Option<RefreshCeremony>,
    /// Makes node selection reproducible when set.
    pub seed: Option<u64>,
}

impl WorkflowParams {
    pub fn from_config(config: &BenchmarkConfig, call_timeout: Duration) -> HarnessResult<Self> {
        let key_refresh = if config.key_refresh {
            Some(RefreshCeremony::reference(config.threshold)?)
        } else {
            None
        };
        Ok(Self {
            threshold: config.threshold,
            node_count: config.node_count,
            kfrag_size: KFRAG_SIZE,
            max_kfrag_attempts: config.max_kfrag_attempts,
            call_timeout,
            key_refresh,
            seed: None,
        })
    }

    fn rng_for(&self, entity: usize, cycle: u32) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (u64::from(cycle) << 32) ^ entity as u64),
            None => StdRng::from_entropy(),
        }
    }
}

type StageFailure = (Stage, HarnessError);

fn at(stage: Stage) -> impl FnOnce(HarnessError) -> StageFailure {
    move |e| (stage, e)
}

/// Runs one entity's workflow for the cycle described by `baseline`.
pub async fn run_workflow(
    topology: &Topology,
    aggregator: &Aggregator,
    entity: &Entity,
    baseline: &CycleBaseline,
    params: &WorkflowParams,
) -> WorkflowRun {
    let mut run = WorkflowRun::new(entity.index, baseline.cycle, baseline.timeline.clone());
    if baseline.is_skipped() {
        debug!("Bob {} cycle {} skipped, batch request failed", entity.index, baseline.cycle);
        run.outcome = RunOutcome::Skipped;
        return run;
    }

    let mut rng = params.rng_for(entity.index, baseline.cycle);
    if let Err((stage, e)) = drive(topology, aggregator, entity, baseline, params, &mut run, &mut rng).await {
        error!("Bob {} cycle {} failed at {}: {}", entity.index, baseline.cycle, stage, e);
        run.outcome = RunOutcome::Failed {
            stage,
            reason: e.to_string(),
        };
    }
    run
}

async fn drive(
    topology: &Topology,
    aggregator: &Aggregator,
    entity: &Entity,
    baseline: &CycleBaseline,
    params: &WorkflowParams,
    run: &mut WorkflowRun,
    rng: &mut StdRng,
) -> Result<(), StageFailure> {
    let timeout = params.call_timeout;

    // Grant access
    let request_id = baseline.request_id(entity.index).map_err(at(Stage::AccessGranted))?;
    with_timeout(
        "grantAccessRequest",
        timeout,
        topology.ledger().grant_access_request(&entity.contract, request_id),
    )
    .await
    .map_err(at(Stage::AccessGranted))?;
    run.timeline.complete(Stage::AccessGranted);

    // Distribute key fragments; per-node latencies include the split
    let stage = Stage::KeyFragmentsDistributed;
    let stage_started = Instant::now();
    let split_node = pick_one(params.node_count, rng).map_err(at(stage))?;
    let auth = topology.node(split_node).auth.as_ref();
    let split_request = KeyFragmentsRequest {
        sender: entity.keypair.clone(),
        signer: entity.signer.clone(),
        receiver: aggregator.keypair.pk.clone(),
        threshold: params.threshold,
        node_count: params.node_count,
    };
    let split_request = &split_request;
    let produced = retry_until_valid(
        params.max_kfrag_attempts,
        move |_| with_timeout("generateKeyFragments", timeout, auth.generate_key_fragments(split_request)),
        |resp| validate_fragments(&resp.kfrags, params.node_count, params.kfrag_size),
    )
    .await;
    if let Err(HarnessError::IntegrityFailure { attempts, .. }) = &produced {
        run.kfrag_attempts = *attempts;
    }
    let (split, attempts) = produced.map_err(at(stage))?;
    run.kfrag_attempts = attempts;

    let kfrags = &split.kfrags;
    let outcomes = fan_out_join(0..params.node_count, "storeKeyFragment", timeout, stage_started, |node| {
        let broker = topology.node(node).broker.clone();
        let request = StoreKeyFragmentRequest {
            sender: entity.keypair.pk.clone(),
            receiver: aggregator.keypair.pk.clone(),
            kfrag: kfrags[node].clone(),
        };
        async move { broker.store_key_fragment(&request).await }
    })
    .await;
    let (latencies, stored) = settle(stage, outcomes);
    run.store_kfrag_latencies = latencies;
    stored.map_err(at(stage))?;
    run.timeline.complete(stage);

    // Generate re-encryption fragments
    let stage = Stage::ReencryptionFragmentsGenerated;
    let stage_started = Instant::now();
    let generate_request = GenerateFragmentRequest {
        sender: entity.keypair.pk.clone(),
        signer: entity.signer.pk.clone(),
        data_id: DATA_ID.to_string(),
        receiver: aggregator.keypair.pk.clone(),
    };
    let generate_request = &generate_request;
    let outcomes = fan_out_join(0..params.node_count, "generateReencryptionFragment", timeout, stage_started, |node| {
        let broker = topology.node(node).broker.clone();
        async move { broker.generate_reencryption_fragment(generate_request).await }
    })
    .await;
    let (latencies, generated) = settle(stage, outcomes);
    run.generate_cfrag_latencies = latencies;
    generated.map_err(at(stage))?;
    run.timeline.complete(stage);

    // Signature, then quorum retrieval; both count towards the same interval
    let stage = Stage::QuorumFragmentsRetrieved;
    let stage_started = Instant::now();
    let sign_node = pick_one(params.node_count, rng).map_err(at(stage))?;
    let signed = with_timeout(
        "sign",
        timeout,
        topology.node(sign_node).auth.sign(&SignRequest {
            signer: aggregator.signer.clone(),
            data: SIGNATURE_CHALLENGE.to_string(),
        }),
    )
    .await
    .map_err(at(stage))?;

    let quorum = pick_distinct(params.threshold, params.node_count, rng).map_err(at(stage))?;
    let access_request = FragmentAccessRequest {
        address: entity.contract.address.clone(),
        data_id: DATA_ID.to_string(),
        sender: entity.keypair.pk.clone(),
        signer: aggregator.signer.pk.clone(),
        signature: signed.signature,
        receiver: aggregator.keypair.pk.clone(),
    };
    let access_request = &access_request;
    let outcomes = fan_out_join(quorum, "getReencryptionFragment", timeout, stage_started, |node| {
        let broker = topology.node(node).broker.clone();
        async move { broker.get_reencryption_fragment(access_request).await }
    })
    .await;
    let (latencies, retrieved) = settle(stage, outcomes);
    run.retrieve_cfrag_latencies = latencies;
    retrieved.map_err(at(stage))?;
    run.timeline.complete(stage);

    // Key refresh
    if let Some(ceremony) = &params.key_refresh {
        let stage = Stage::KeyRefreshed;
        let refresh_node = pick_one(params.node_count, rng).map_err(at(stage))?;
        let session_id = RefreshCeremony::session_id(baseline.cycle, entity.index, rng);
        ceremony
            .run(topology.node(refresh_node).auth.as_ref(), session_id, timeout)
            .await
            .map_err(at(stage))?;
        run.timeline.complete(stage);
    }

    Ok(())
}
