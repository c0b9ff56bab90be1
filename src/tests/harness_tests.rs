use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::mocks::{test_config, Fixture};
use crate::metrics::recorder::{csv_header, entity_log_path};
use crate::scheduler::arrival::schedule_cycle;
use crate::scheduler::poisson::PoissonArrivals;
use crate::tools::harness::{Harness, FANOUT_FILE, SUMMARY_FILE};

fn only_run_dir(output: &Path, entities: usize, threshold: usize) -> PathBuf {
    let parent = output.join(entities.to_string()).join(threshold.to_string());
    let dirs: Vec<PathBuf> = std::fs::read_dir(&parent)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1, "expected one run directory in {}", parent.display());
    dirs.into_iter().next().unwrap()
}

#[tokio::test]
async fn iteration_writes_logs_and_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(4);
    let mut config = test_config(dir.path(), 3, 2, 4);
    config.cycles = 10;
    config.lambda_ms = 1.0;

    let harness = Harness::new(config, fixture.topology.clone(), 1, Duration::from_secs(1))
        .unwrap()
        .with_seed(3);
    let summaries = harness.run().await;

    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.runs_total(), 30);
    assert_eq!(summary.runs_completed, 30);
    assert_eq!(summary.interval_stats["key_refresh"].count, 30);
    assert!(fixture.ledger.closed.load(Ordering::SeqCst));
    assert_eq!(fixture.ledger.calls.count("requestAccessToData"), 10);

    let run_dir = only_run_dir(dir.path(), 3, 2);
    for entity in 0..3 {
        let log = std::fs::read_to_string(entity_log_path(&run_dir, entity)).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], csv_header());
        assert_eq!(lines.len(), 11);
        let mut cycles: Vec<u32> = lines[1..]
            .iter()
            .map(|row| {
                assert_eq!(row.split(',').count(), 7, "torn row {}", row);
                row.split(',').next().unwrap().parse().unwrap()
            })
            .collect();
        cycles.sort_unstable();
        assert_eq!(cycles, (0..10).collect::<Vec<_>>());
    }

    let fanout: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join(FANOUT_FILE)).unwrap()).unwrap();
    assert_eq!(fanout.as_array().unwrap().len(), 30);
    assert_eq!(fanout[0]["retrieve_cfrags"].as_array().unwrap().len(), 2);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(saved["runs_total"], 30);
    assert_eq!(saved["configuration"]["bobs"], "3");
}

#[tokio::test]
async fn preflight_round_trip_passes_on_healthy_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(4);
    let mut config = test_config(dir.path(), 2, 2, 4);
    config.preflight = true;
    config.cycles = 1;

    let harness = Harness::new(config, fixture.topology.clone(), 1, Duration::from_secs(1)).unwrap();
    let summaries = harness.run().await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(fixture.auths[0].calls.count("decrypt"), 1);
    assert_eq!(fixture.auths[0].calls.count("reencrypt"), 2);
    assert_eq!(fixture.auths[0].calls.count("verify"), 1);
    assert_eq!(fixture.brokers[0].calls.count("checkPermissions"), 1);
    assert_eq!(fixture.ledger.calls.count("checkPermissions"), 1);
}

#[tokio::test]
async fn failed_preflight_aborts_the_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(4);
    fixture.auths[0].reject_signatures.store(true, Ordering::SeqCst);
    let mut config = test_config(dir.path(), 2, 2, 4);
    config.preflight = true;
    config.test_runs = 2;

    let harness = Harness::new(config, fixture.topology.clone(), 1, Duration::from_secs(1)).unwrap();
    let summaries = harness.run().await;

    assert!(summaries.is_empty());
    assert_eq!(fixture.ledger.calls.count("requestAccessToData"), 0);
    assert_eq!(fixture.broker_calls("storeKeyFragment"), 0);
    // Both iterations were attempted.
    assert_eq!(fixture.ledger.calls.count("accounts"), 2);
    assert!(fixture.ledger.closed.load(Ordering::SeqCst));
}

#[test]
fn harness_needs_enough_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(2);
    let config = test_config(dir.path(), 2, 2, 4);
    assert!(Harness::new(config, fixture.topology.clone(), 1, Duration::from_secs(1)).is_err());
}

#[tokio::test(start_paused = true)]
async fn cycle_waits_its_sampled_delay_before_submitting() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(4);
    let population = fixture.provision(&test_config(dir.path(), 2, 2, 4)).await;
    let arrivals = PoissonArrivals::seeded(1000.0, 99);

    let start = tokio::time::Instant::now();
    let baseline = schedule_cycle(
        3,
        &arrivals,
        fixture.topology.ledger(),
        &population.aggregator,
        &population.entities,
        Duration::from_secs(1),
    )
    .await;

    assert!(baseline.waited > Duration::ZERO);
    assert!(!baseline.is_skipped());
    let requested_at = fixture.ledger.requested_at.lock().unwrap()[0];
    assert!(requested_at.duration_since(start) >= baseline.waited);
    assert_eq!(baseline.request_ids.as_ref().map(Vec::len), Some(2));
}
