//! Identity and contract setup for one test iteration.
//!
//! Provisioning runs once per iteration, before any cycle is scheduled. Any
//! failure here is fatal to the iteration, so errors are reported with
//! `anyhow` context and never retried.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::registry::Topology;
use crate::config::{BenchmarkConfig, DATA_ID, PLAINTEXT};
use crate::error::{HarnessError, HarnessResult};
use crate::external::types::{ContractHandle, EncryptRequest, Keypair, StoreCapsuleRequest};
use crate::metrics::recorder::ResultRecorder;
use crate::workflow::fanout::{fan_out_join, with_timeout};

/// The data requester acting on behalf of the whole population.
#[derive(Debug, Clone)]
pub struct Aggregator {
    pub account: String,
    pub keypair: Keypair,
    pub signer: Keypair,
    /// Ledger address derived from the signer's secret key.
    pub signer_account: String,
    contract: Option<ContractHandle>,
}

impl Aggregator {
    pub fn new(account: String, keypair: Keypair, signer: Keypair, signer_account: String) -> Self {
        Self {
            account,
            keypair,
            signer,
            signer_account,
            contract: None,
        }
    }

    pub fn attach_contract(&mut self, contract: ContractHandle) {
        self.contract = Some(contract);
    }

    pub fn contract(&self) -> HarnessResult<&ContractHandle> {
        self.contract
            .as_ref()
            .ok_or_else(|| HarnessError::Ledger("aggregator contract not deployed".into()))
    }
}

/// One data owner ("bob") of the population.
#[derive(Debug, Clone)]
pub struct Entity {
    pub index: usize,
    pub account: String,
    pub keypair: Keypair,
    pub signer: Keypair,
    pub contract: ContractHandle,
}

/// Everything provisioning produces; owned by the iteration that built it.
pub struct Population {
    pub aggregator: Aggregator,
    pub entities: Vec<Entity>,
    pub recorder: ResultRecorder,
}

/// `<output>/<entity count>/<threshold>/<timestamp>`
pub fn run_directory(output: &Path, entity_count: usize, threshold: usize, timestamp: &str) -> PathBuf {
    output
        .join(entity_count.to_string())
        .join(threshold.to_string())
        .join(timestamp)
}

pub async fn provision(
    topology: &Topology,
    config: &BenchmarkConfig,
    funding_wei: u128,
    call_timeout: Duration,
) -> Result<Population> {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let dir = run_directory(&config.output_dir, config.entity_count, config.threshold, &timestamp);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create result directory {}", dir.display()))?;
    info!("Writing results to {}", dir.display());

    let ledger = topology.ledger();
    let accounts = ledger
        .accounts(config.entity_count + 1)
        .await
        .context("Failed to fetch ledger accounts")?;

    let aggregator_account = accounts
        .first()
        .ok_or_else(|| anyhow!("No ledger account for the aggregator"))?;
    let aggregator = provision_aggregator(topology, aggregator_account, call_timeout)
        .await
        .context("Failed to provision the aggregator")?;

    let mut entities = Vec::with_capacity(config.entity_count);
    for index in 0..config.entity_count {
        let account = accounts
            .get(index + 1)
            .ok_or_else(|| anyhow!("No ledger account for entity {}", index))?;
        let entity = provision_entity(
            topology,
            &aggregator,
            index,
            account,
            config.node_count,
            funding_wei,
            call_timeout,
        )
        .await
        .with_context(|| format!("Failed to provision entity {}", index))?;
        entities.push(entity);
    }

    let recorder = ResultRecorder::create(&dir, config.entity_count)
        .with_context(|| format!("Failed to create result logs in {}", dir.display()))?;

    info!(
        "Provisioned aggregator {} and {} entities over {} nodes",
        aggregator.account,
        entities.len(),
        config.node_count
    );
    Ok(Population {
        aggregator,
        entities,
        recorder,
    })
}

async fn provision_aggregator(topology: &Topology, account: &str, call_timeout: Duration) -> HarnessResult<Aggregator> {
    let coordinator = topology.coordinator();
    let ledger = topology.ledger();

    let keypair = with_timeout("requestKeypair", call_timeout, coordinator.request_keypair()).await?;
    let signer = with_timeout("requestSigner", call_timeout, coordinator.request_signer()).await?;
    let signer_account = with_timeout("deriveAddress", call_timeout, ledger.derive_address(&signer.sk)).await?;

    let mut aggregator = Aggregator::new(account.to_string(), keypair, signer, signer_account);
    let contract = with_timeout("deployAggregator", call_timeout, ledger.deploy_aggregator_contract(account)).await?;
    debug!("Aggregator contract deployed at {}", contract.address);
    aggregator.attach_contract(contract);
    Ok(aggregator)
}

async fn provision_entity(
    topology: &Topology,
    aggregator: &Aggregator,
    index: usize,
    account: &str,
    node_count: usize,
    funding_wei: u128,
    call_timeout: Duration,
) -> Result<Entity> {
    let coordinator = topology.coordinator();
    let ledger = topology.ledger();

    let keypair = with_timeout("requestKeypair", call_timeout, coordinator.request_keypair()).await?;
    let signer = with_timeout("requestSigner", call_timeout, coordinator.request_signer()).await?;

    with_timeout(
        "transfer",
        call_timeout,
        ledger.transfer(&aggregator.account, account, funding_wei),
    )
    .await?;
    let contract = with_timeout("deployAccessContract", call_timeout, ledger.deploy_access_contract(account)).await?;

    let encrypted = with_timeout(
        "encrypt",
        call_timeout,
        coordinator.encrypt(&EncryptRequest {
            plaintext: PLAINTEXT.to_string(),
            pk: keypair.pk.clone(),
        }),
    )
    .await?;

    let request = StoreCapsuleRequest {
        sender: keypair.pk.clone(),
        data_id: DATA_ID.to_string(),
        capsule: encrypted.capsule,
    };
    let outcomes = fan_out_join(0..node_count, "storeCapsule", call_timeout, Instant::now(), |node| {
        let broker = topology.node(node).broker.clone();
        let request = &request;
        async move { broker.store_capsule(request).await }
    })
    .await;
    let mut missing = Vec::new();
    for outcome in outcomes {
        if let Err(e) = outcome.result {
            warn!("storeCapsule: entity {} node {} failed: {}", index, outcome.node, e);
            missing.push(outcome.node);
        }
    }
    if !missing.is_empty() {
        return Err(anyhow!("Capsule was not stored on nodes {:?}", missing));
    }

    debug!("Entity {} ready, contract {}", index, contract.address);
    Ok(Entity {
        index,
        account: account.to_string(),
        keypair,
        signer,
        contract,
    })
}
