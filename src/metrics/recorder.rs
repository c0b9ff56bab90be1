//! Per-entity result logs.
//!
//! Every entity owns one CSV file, `bob-<i>.csv`, with one row per cycle:
//! the cycle index followed by the six inter-stage intervals in
//! milliseconds, `-1` for an interval whose stages were not both reached.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::storage::RunStorage;
use crate::workflow::stage::{NodeLatency, Stage, WorkflowRun};

/// Value written for an interval that was not reached.
pub const NOT_REACHED: i64 = -1;

pub fn csv_header() -> String {
    let mut header = String::from("cycle");
    for stage in &Stage::ALL[1..] {
        header.push(',');
        header.push_str(stage.interval_name());
    }
    header
}

pub fn interval_ms(interval: Option<Duration>) -> i64 {
    interval.map_or(NOT_REACHED, |d| d.as_millis() as i64)
}

/// CSV row of one run, without the trailing newline.
pub fn format_row(run: &WorkflowRun) -> String {
    let mut row = run.cycle.to_string();
    for (_, interval) in run.timeline.intervals() {
        row.push(',');
        row.push_str(&interval_ms(interval).to_string());
    }
    row
}

fn format_latencies(latencies: &[NodeLatency]) -> String {
    let parts: Vec<String> = latencies.iter().map(|l| interval_ms(l.elapsed).to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub fn entity_log_path(dir: &Path, entity: usize) -> PathBuf {
    dir.join(format!("bob-{}.csv", entity))
}

struct EntityLog {
    path: PathBuf,
    file: Mutex<File>,
}

/// Appends runs to the per-entity logs and keeps them for the iteration
/// summary.
pub struct ResultRecorder {
    dir: PathBuf,
    logs: Vec<EntityLog>,
    storage: RunStorage,
}

impl ResultRecorder {
    /// Creates one log per entity in `dir`, each starting with the header row.
    pub fn create(dir: &Path, entity_count: usize) -> io::Result<Self> {
        let header = csv_header();
        let mut logs = Vec::with_capacity(entity_count);
        for entity in 0..entity_count {
            let path = entity_log_path(dir, entity);
            let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
            writeln!(file, "{}", header)?;
            logs.push(EntityLog {
                path,
                file: Mutex::new(file),
            });
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            logs,
            storage: RunStorage::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, entity: usize) -> Option<&Path> {
        self.logs.get(entity).map(|l| l.path.as_path())
    }

    pub fn storage(&self) -> &RunStorage {
        &self.storage
    }

    /// Writes the run's row to its entity's log. The whole row is written
    /// under that log's lock, so rows from concurrent cycles never interleave.
    pub fn append(&self, run: &WorkflowRun) -> io::Result<()> {
        let log = self.logs.get(run.entity).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no result log for entity {}", run.entity))
        })?;
        let row = format_row(run);

        log::info!(
            "Bob {} cycle {}, results: {} kfrags {} cfrags {} quorum {}",
            run.entity,
            run.cycle,
            row.splitn(2, ',').nth(1).unwrap_or(""),
            format_latencies(&run.store_kfrag_latencies),
            format_latencies(&run.generate_cfrag_latencies),
            format_latencies(&run.retrieve_cfrag_latencies),
        );

        {
            let mut file = log
                .file
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "result log lock poisoned"))?;
            let mut line = row;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }

        self.storage.add_run(run.clone());
        Ok(())
    }

    /// Flushes every log to disk.
    pub fn flush(&self) -> io::Result<()> {
        for log in &self.logs {
            let mut file = log
                .file
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "result log lock poisoned"))?;
            file.flush()?;
        }
        Ok(())
    }
}
