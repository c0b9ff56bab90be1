//! Latency statistics aggregated over the runs of one test iteration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use super::recorder::interval_ms;
use crate::workflow::stage::{NodeLatency, RunOutcome, WorkflowRun};

/// Stores statistics for one timed operation (an interval or a node call).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OperationStats {
    /// Number of successful measurements.
    pub count: u32,
    /// Number of times the operation was attempted but did not complete.
    pub failures: u32,
    pub total_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl OperationStats {
    pub fn record(&mut self, duration_ms: u64) {
        self.count += 1;
        self.total_duration_ms += duration_ms;
        if self.count == 1 {
            self.min_duration_ms = duration_ms;
            self.max_duration_ms = duration_ms;
        } else {
            self.min_duration_ms = self.min_duration_ms.min(duration_ms);
            self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.count as f64
        }
    }
}

/// Summary of one test iteration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IterationSummary {
    /// Name identifying the run (e.g. "bobs10_t2_n4_iter1").
    pub name: String,
    #[serde(skip)]
    start_time: Option<Instant>,
    total_duration_ms: Option<u64>,
    /// Parameters the iteration ran with.
    pub configuration: HashMap<String, String>,
    pub runs_completed: u32,
    pub runs_failed: u32,
    pub runs_skipped: u32,
    /// Failed runs keyed by the stage they failed at.
    pub failures_by_stage: BTreeMap<String, u32>,
    /// Inter-stage intervals keyed by column name.
    pub interval_stats: BTreeMap<String, OperationStats>,
    /// Per-node fan-out calls keyed by "<interval>/node-<i>".
    pub node_stats: BTreeMap<String, OperationStats>,
}

impl IterationSummary {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn add_config(&mut self, key: &str, value: &str) -> &mut Self {
        self.configuration.insert(key.to_string(), value.to_string());
        self
    }

    pub fn record_run(&mut self, run: &WorkflowRun) -> &mut Self {
        match &run.outcome {
            RunOutcome::Completed => self.runs_completed += 1,
            RunOutcome::Skipped => self.runs_skipped += 1,
            RunOutcome::Failed { stage, .. } => {
                self.runs_failed += 1;
                *self.failures_by_stage.entry(stage.to_string()).or_default() += 1;
            }
        }

        if let RunOutcome::Skipped = run.outcome {
            return self;
        }

        for (stage, interval) in run.timeline.intervals() {
            let stats = self.interval_stats.entry(stage.interval_name().to_string()).or_default();
            match interval {
                Some(_) => stats.record(interval_ms(interval) as u64),
                None => stats.record_failure(),
            }
        }

        self.record_nodes("distribute_kfrags", &run.store_kfrag_latencies);
        self.record_nodes("generate_cfrags", &run.generate_cfrag_latencies);
        self.record_nodes("retrieve_cfrags", &run.retrieve_cfrag_latencies);
        self
    }

    fn record_nodes(&mut self, interval: &str, latencies: &[NodeLatency]) {
        for latency in latencies {
            let stats = self
                .node_stats
                .entry(format!("{}/node-{}", interval, latency.node))
                .or_default();
            match latency.elapsed {
                Some(d) => stats.record(d.as_millis() as u64),
                None => stats.record_failure(),
            }
        }
    }

    pub fn runs_total(&self) -> u32 {
        self.runs_completed + self.runs_failed + self.runs_skipped
    }

    pub fn end(&mut self) -> &mut Self {
        if self.total_duration_ms.is_none() {
            if let Some(start) = self.start_time {
                self.total_duration_ms = Some(start.elapsed().as_millis() as u64);
            }
        }
        self
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.total_duration_ms
    }

    pub fn to_json(&self) -> serde_json::Value {
        let with_average = |stats: &BTreeMap<String, OperationStats>| -> serde_json::Map<String, serde_json::Value> {
            stats
                .iter()
                .map(|(name, s)| {
                    (
                        name.clone(),
                        serde_json::json!({
                            "count": s.count,
                            "failures": s.failures,
                            "total_duration_ms": s.total_duration_ms,
                            "min_duration_ms": s.min_duration_ms,
                            "max_duration_ms": s.max_duration_ms,
                            "average_duration_ms": s.average_duration_ms(),
                        }),
                    )
                })
                .collect()
        };

        serde_json::json!({
            "name": self.name,
            "total_duration_ms": self.duration_ms(),
            "configuration": self.configuration,
            "runs_total": self.runs_total(),
            "runs_completed": self.runs_completed,
            "runs_failed": self.runs_failed,
            "runs_skipped": self.runs_skipped,
            "failures_by_stage": self.failures_by_stage,
            "interval_stats": with_average(&self.interval_stats),
            "node_stats": with_average(&self.node_stats),
        })
    }

    pub fn print_summary(&self) {
        println!("\n--- Benchmark Iteration Summary ---");
        println!("Run:             {}", self.name);
        if let Some(d) = self.duration_ms() {
            println!("Total Duration:  {} ms", d);
        }
        println!(
            "Runs:            {} ({} completed, {} failed, {} skipped)",
            self.runs_total(),
            self.runs_completed,
            self.runs_failed,
            self.runs_skipped
        );

        if !self.interval_stats.is_empty() {
            println!("\nStage Intervals:");
            for (name, stats) in &self.interval_stats {
                println!("  - {}", name);
                println!("      Count:          {}", stats.count);
                println!("      Not Reached:    {}", stats.failures);
                println!("      Avg Time:       {:.3} ms", stats.average_duration_ms());
                println!("      Min Time:       {} ms", stats.min_duration_ms);
                println!("      Max Time:       {} ms", stats.max_duration_ms);
            }
        }

        if !self.failures_by_stage.is_empty() {
            println!("\nFailures:");
            for (stage, count) in &self.failures_by_stage {
                println!("  {}: {}", stage, count);
            }
        }

        if !self.configuration.is_empty() {
            println!("\nConfiguration:");
            let mut keys: Vec<_> = self.configuration.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = self.configuration.get(key) {
                    println!("  {}: {}", key, value);
                }
            }
        }
        println!("----------------------------------\n");
    }
}
