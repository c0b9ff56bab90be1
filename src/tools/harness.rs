// tools/harness.rs

//! Benchmark driver for the PRE access workflow
//!
//! Runs `test_runs` iterations. Each iteration provisions a fresh population,
//! optionally runs the preflight check, then schedules every cycle
//! concurrently; inside a cycle every entity runs its workflow concurrently.
//! Rows go to the per-entity CSV logs as runs finish; the iteration summary
//! and the raw fan-out latencies are written next to them at the end.
//!
//! # Usage Example
//!
//! ```bash
//! cargo run --release -- --bobs 10 --threshold 2 --nodes 4 --cycles 20 --lambda 1500
//! ```

use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use log::{error, info};
use std::time::Duration;

use crate::config::BenchmarkConfig;
use crate::metrics::performance::IterationSummary;
use crate::scheduler::arrival::schedule_cycle;
use crate::scheduler::poisson::PoissonArrivals;
use crate::topology::provisioner::{provision, Population};
use crate::topology::registry::Topology;
use crate::workflow::engine::{run_workflow, WorkflowParams};
use crate::workflow::preflight::preflight;

pub const FANOUT_FILE: &str = "fanout_latencies.json";
pub const SUMMARY_FILE: &str = "summary.json";

pub struct Harness {
    config: BenchmarkConfig,
    topology: Topology,
    params: WorkflowParams,
    funding_wei: u128,
    seed: Option<u64>,
}

impl Harness {
    pub fn new(config: BenchmarkConfig, topology: Topology, funding_wei: u128, call_timeout: Duration) -> Result<Self> {
        config.validate()?;
        if config.node_count > topology.node_count() {
            return Err(anyhow!(
                "{} nodes requested but only {} endpoints are configured",
                config.node_count,
                topology.node_count()
            ));
        }
        let params = WorkflowParams::from_config(&config, call_timeout)?;
        Ok(Self {
            config,
            topology,
            params,
            funding_wei,
            seed: None,
        })
    }

    /// Makes arrival delays and node selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.params.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Runs every iteration and closes the ledger connection afterwards.
    ///
    /// A failed iteration is logged and the next one starts; the summaries
    /// of the iterations that finished are returned.
    pub async fn run(&self) -> Vec<IterationSummary> {
        let mut summaries = Vec::with_capacity(self.config.test_runs);
        for iteration in 0..self.config.test_runs {
            tokio::time::sleep(self.config.warmup).await;
            match self.run_iteration(iteration).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!("Test iteration {} aborted: {:#}", iteration, e),
            }
        }
        self.topology.ledger().close().await;
        summaries
    }

    pub async fn run_iteration(&self, iteration: usize) -> Result<IterationSummary> {
        info!(
            "Iteration {}: {} bobs, threshold {}, {} nodes, {} cycles, lambda {} ms",
            iteration,
            self.config.entity_count,
            self.config.threshold,
            self.config.node_count,
            self.config.cycles,
            self.config.lambda_ms
        );

        let population = provision(&self.topology, &self.config, self.funding_wei, self.params.call_timeout)
            .await
            .context("Provisioning failed")?;

        if self.config.preflight {
            preflight(&self.topology, &population, &self.params)
                .await
                .context("Preflight check failed")?;
        }

        tokio::time::sleep(self.config.settle).await;

        let arrivals = match self.seed {
            Some(seed) => PoissonArrivals::seeded(self.config.lambda_ms, seed.wrapping_add(iteration as u64)),
            None => PoissonArrivals::new(self.config.lambda_ms),
        };
        run_cycles(&self.topology, &population, &arrivals, &self.params, self.config.cycles).await;

        let recorder = &population.recorder;
        recorder.flush().context("Failed to flush result logs")?;

        let name = format!(
            "bobs{}_t{}_n{}_iter{}",
            self.config.entity_count, self.config.threshold, self.config.node_count, iteration
        );
        let mut summary = recorder.storage().summarize(&name);
        summary
            .add_config("bobs", &self.config.entity_count.to_string())
            .add_config("threshold", &self.config.threshold.to_string())
            .add_config("nodes", &self.config.node_count.to_string())
            .add_config("cycles", &self.config.cycles.to_string())
            .add_config("lambda_ms", &self.config.lambda_ms.to_string())
            .add_config("key_refresh", &self.config.key_refresh.to_string())
            .end();
        summary.print_summary();

        let dir = recorder.dir();
        recorder
            .storage()
            .save_fanout_json_file(&dir.join(FANOUT_FILE))
            .context("Failed to save fan-out latencies")?;
        recorder
            .storage()
            .save_summary_json_file(&summary, &dir.join(SUMMARY_FILE))
            .context("Failed to save iteration summary")?;
        info!("Iteration {} results saved to {}", iteration, dir.display());

        Ok(summary)
    }
}

/// Schedules all `cycles` concurrently and records every run as it ends.
pub async fn run_cycles(
    topology: &Topology,
    population: &Population,
    arrivals: &PoissonArrivals,
    params: &WorkflowParams,
    cycles: u32,
) {
    let cycle_futures = (0..cycles).map(|cycle| async move {
        let baseline = schedule_cycle(
            cycle,
            arrivals,
            topology.ledger(),
            &population.aggregator,
            &population.entities,
            params.call_timeout,
        )
        .await;

        let baseline = &baseline;
        let runs = population.entities.iter().map(|entity| async move {
            let run = run_workflow(topology, &population.aggregator, entity, baseline, params).await;
            if let Err(e) = population.recorder.append(&run) {
                error!("Bob {} cycle {}: failed to record run: {}", run.entity, run.cycle, e);
            }
        });
        join_all(runs).await;
    });
    join_all(cycle_futures).await;
}
