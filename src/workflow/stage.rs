//! Stage boundaries of one workflow run and the timeline that records them.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Stage boundaries in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RequestSubmitted,
    RequestCompleted,
    AccessGranted,
    KeyFragmentsDistributed,
    ReencryptionFragmentsGenerated,
    QuorumFragmentsRetrieved,
    KeyRefreshed,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::RequestSubmitted,
        Stage::RequestCompleted,
        Stage::AccessGranted,
        Stage::KeyFragmentsDistributed,
        Stage::ReencryptionFragmentsGenerated,
        Stage::QuorumFragmentsRetrieved,
        Stage::KeyRefreshed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    /// Column name of the interval that ends at this stage.
    pub fn interval_name(self) -> &'static str {
        match self {
            Stage::RequestSubmitted => "start",
            Stage::RequestCompleted => "request_access",
            Stage::AccessGranted => "grant_access",
            Stage::KeyFragmentsDistributed => "distribute_kfrags",
            Stage::ReencryptionFragmentsGenerated => "generate_cfrags",
            Stage::QuorumFragmentsRetrieved => "retrieve_cfrags",
            Stage::KeyRefreshed => "key_refresh",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RequestSubmitted => "RequestSubmitted",
            Stage::RequestCompleted => "RequestAccess",
            Stage::AccessGranted => "GrantAccess",
            Stage::KeyFragmentsDistributed => "DistributeKeyFragments",
            Stage::ReencryptionFragmentsGenerated => "GenerateReencryptionFragments",
            Stage::QuorumFragmentsRetrieved => "RetrieveQuorumFragments",
            Stage::KeyRefreshed => "KeyRefresh",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStamp {
    NotReached,
    CompletedAt(Instant),
}

impl StageStamp {
    pub fn instant(&self) -> Option<Instant> {
        match self {
            StageStamp::NotReached => None,
            StageStamp::CompletedAt(at) => Some(*at),
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, StageStamp::CompletedAt(_))
    }
}

impl Default for StageStamp {
    fn default() -> Self {
        StageStamp::NotReached
    }
}

/// Stamps of every stage boundary of one run.
///
/// A stage can only be stamped once its predecessor has been, and never
/// earlier than its predecessor, so reached stamps always form a
/// non-decreasing prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    stamps: [StageStamp; 7],
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> StageStamp {
        self.stamps[stage.index()]
    }

    /// Records `stage` as completed at `at`. Returns `false` and leaves the
    /// timeline untouched when the previous stage was not reached.
    pub fn complete_at(&mut self, stage: Stage, at: Instant) -> bool {
        let floor = match stage.previous() {
            None => None,
            Some(prev) => match self.get(prev) {
                StageStamp::NotReached => return false,
                StageStamp::CompletedAt(prev_at) => Some(prev_at),
            },
        };
        let at = floor.map_or(at, |f| at.max(f));
        self.stamps[stage.index()] = StageStamp::CompletedAt(at);
        true
    }

    pub fn complete(&mut self, stage: Stage) -> bool {
        self.complete_at(stage, Instant::now())
    }

    /// Last stage that was reached, if any.
    pub fn last_reached(&self) -> Option<Stage> {
        Stage::ALL.iter().rev().copied().find(|s| self.get(*s).is_reached())
    }

    /// Durations of the six intervals `t(i) - t(i-1)`, `None` wherever either
    /// end was not reached.
    pub fn intervals(&self) -> Vec<(Stage, Option<Duration>)> {
        Stage::ALL
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                let elapsed = match (self.get(from), self.get(to)) {
                    (StageStamp::CompletedAt(a), StageStamp::CompletedAt(b)) => Some(b.duration_since(a)),
                    _ => None,
                };
                (to, elapsed)
            })
            .collect()
    }

    pub fn stamps(&self) -> &[StageStamp; 7] {
        &self.stamps
    }
}

/// Round trip of one node call inside a fan-out stage, measured from the
/// start of the stage. `None` when the call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLatency {
    pub node: usize,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The cycle's batched access request failed; nothing was attempted.
    Skipped,
    Failed { stage: Stage, reason: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Everything measured for one (entity, cycle) pair.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub entity: usize,
    pub cycle: u32,
    pub timeline: Timeline,
    pub store_kfrag_latencies: Vec<NodeLatency>,
    pub generate_cfrag_latencies: Vec<NodeLatency>,
    pub retrieve_cfrag_latencies: Vec<NodeLatency>,
    /// Key split requests needed before a valid set was returned.
    pub kfrag_attempts: usize,
    pub outcome: RunOutcome,
}

impl WorkflowRun {
    pub fn new(entity: usize, cycle: u32, timeline: Timeline) -> Self {
        Self {
            entity,
            cycle,
            timeline,
            store_kfrag_latencies: Vec::new(),
            generate_cfrag_latencies: Vec::new(),
            retrieve_cfrag_latencies: Vec::new(),
            kfrag_attempts: 0,
            outcome: RunOutcome::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_need_their_predecessor() {
        let mut timeline = Timeline::new();
        assert!(!timeline.complete(Stage::AccessGranted));
        assert!(timeline.complete(Stage::RequestSubmitted));
        assert!(!timeline.complete(Stage::AccessGranted));
        assert!(timeline.complete(Stage::RequestCompleted));
        assert!(timeline.complete(Stage::AccessGranted));
        assert_eq!(timeline.last_reached(), Some(Stage::AccessGranted));
        assert_eq!(timeline.get(Stage::KeyRefreshed), StageStamp::NotReached);
    }

    #[test]
    fn stamps_never_go_backwards() {
        let start = Instant::now();
        let later = start + Duration::from_millis(50);
        let mut timeline = Timeline::new();
        timeline.complete_at(Stage::RequestSubmitted, later);
        timeline.complete_at(Stage::RequestCompleted, start);
        assert_eq!(timeline.get(Stage::RequestCompleted).instant(), Some(later));
    }

    #[test]
    fn intervals_stop_at_first_gap() {
        let t0 = Instant::now();
        let mut timeline = Timeline::new();
        timeline.complete_at(Stage::RequestSubmitted, t0);
        timeline.complete_at(Stage::RequestCompleted, t0 + Duration::from_millis(10));
        timeline.complete_at(Stage::AccessGranted, t0 + Duration::from_millis(25));

        let intervals = timeline.intervals();
        assert_eq!(intervals.len(), 6);
        assert_eq!(intervals[0], (Stage::RequestCompleted, Some(Duration::from_millis(10))));
        assert_eq!(intervals[1], (Stage::AccessGranted, Some(Duration::from_millis(15))));
        assert!(intervals[2..].iter().all(|(_, d)| d.is_none()));
    }

    #[test]
    fn previous_walks_back_in_order() {
        assert_eq!(Stage::RequestSubmitted.previous(), None);
        assert_eq!(Stage::KeyRefreshed.previous(), Some(Stage::QuorumFragmentsRetrieved));
    }
}
