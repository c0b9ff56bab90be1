use anyhow::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::performance::IterationSummary;
use super::recorder::interval_ms;
use crate::workflow::stage::{NodeLatency, RunOutcome, WorkflowRun};

/// In-memory collection of the finished runs of one iteration.
#[derive(Debug, Clone, Default)]
pub struct RunStorage {
    runs: Arc<Mutex<Vec<WorkflowRun>>>,
}

impl RunStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&self, run: WorkflowRun) {
        match self.runs.lock() {
            Ok(mut runs) => runs.push(run),
            Err(poisoned) => poisoned.into_inner().push(run),
        }
    }

    pub fn get_all_runs(&self) -> Vec<WorkflowRun> {
        match self.runs.lock() {
            Ok(runs) => runs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.get_all_runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregates every stored run into a summary named `name`.
    pub fn summarize(&self, name: &str) -> IterationSummary {
        let mut summary = IterationSummary::new(name);
        for run in self.get_all_runs() {
            summary.record_run(&run);
        }
        summary
    }

    fn latencies_json(latencies: &[NodeLatency]) -> serde_json::Value {
        latencies
            .iter()
            .map(|l| serde_json::json!({ "node": l.node, "elapsed_ms": interval_ms(l.elapsed) }))
            .collect()
    }

    /// Raw per-node fan-out latencies of every run, sorted by entity then cycle.
    pub fn fanout_json(&self) -> serde_json::Value {
        let mut runs = self.get_all_runs();
        runs.sort_by_key(|r| (r.entity, r.cycle));
        runs.iter()
            .map(|run| {
                let (outcome, failed_stage, reason) = match &run.outcome {
                    RunOutcome::Completed => ("completed", None, None),
                    RunOutcome::Skipped => ("skipped", None, None),
                    RunOutcome::Failed { stage, reason } => ("failed", Some(stage.to_string()), Some(reason.clone())),
                };
                serde_json::json!({
                    "entity": run.entity,
                    "cycle": run.cycle,
                    "outcome": outcome,
                    "failed_stage": failed_stage,
                    "reason": reason,
                    "kfrag_attempts": run.kfrag_attempts,
                    "distribute_kfrags": Self::latencies_json(&run.store_kfrag_latencies),
                    "generate_cfrags": Self::latencies_json(&run.generate_cfrag_latencies),
                    "retrieve_cfrags": Self::latencies_json(&run.retrieve_cfrag_latencies),
                })
            })
            .collect()
    }

    pub fn save_fanout_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.fanout_json())?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn save_summary_json_file(&self, summary: &IterationSummary, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&summary.to_json())?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::stage::{Stage, Timeline};
    use std::time::Duration;

    #[test]
    fn fanout_json_reports_failed_nodes_as_sentinel() {
        let storage = RunStorage::new();
        let mut run = WorkflowRun::new(2, 3, Timeline::new());
        run.generate_cfrag_latencies = vec![
            NodeLatency { node: 0, elapsed: Some(Duration::from_millis(7)) },
            NodeLatency { node: 1, elapsed: None },
        ];
        run.outcome = RunOutcome::Failed {
            stage: Stage::ReencryptionFragmentsGenerated,
            reason: "node 1 down".into(),
        };
        storage.add_run(run);

        let json = storage.fanout_json();
        assert_eq!(json[0]["entity"], 2);
        assert_eq!(json[0]["outcome"], "failed");
        assert_eq!(json[0]["generate_cfrags"][0]["elapsed_ms"], 7);
        assert_eq!(json[0]["generate_cfrags"][1]["elapsed_ms"], -1);
        assert_eq!(storage.summarize("t").runs_failed, 1);
    }
}
