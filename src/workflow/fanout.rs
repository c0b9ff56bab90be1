//! Concurrent fan-out to a set of nodes with join-all semantics.

use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};

use super::stage::{NodeLatency, Stage};
use crate::error::{HarnessError, HarnessResult};

/// Result of one node call within a fan-out.
#[derive(Debug)]
pub struct TargetOutcome<T> {
    pub node: usize,
    /// Time from `started` until this call settled.
    pub elapsed: Duration,
    pub result: HarnessResult<T>,
}

/// Awaits `fut`, failing with [`HarnessError::Timeout`] after `after`.
pub async fn with_timeout<T, Fut>(operation: &'static str, after: Duration, fut: Fut) -> HarnessResult<T>
where
    Fut: Future<Output = HarnessResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(HarnessError::Timeout { operation, after }),
    }
}

/// Issues `call(node)` for every target concurrently and waits until all of
/// them have settled, successfully or not. Outcomes come back in target
/// order, each timed from `started`, the beginning of the enclosing stage.
pub async fn fan_out_join<T, F, Fut>(
    targets: impl IntoIterator<Item = usize>,
    operation: &'static str,
    call_timeout: Duration,
    started: Instant,
    call: F,
) -> Vec<TargetOutcome<T>>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
{
    let calls = targets.into_iter().map(|node| {
        let pending = with_timeout(operation, call_timeout, call(node));
        async move {
            let result = pending.await;
            TargetOutcome {
                node,
                elapsed: started.elapsed(),
                result,
            }
        }
    });
    join_all(calls).await
}

/// Splits fan-out outcomes into per-node latencies and the stage result: the
/// successful values in target order, or a [`HarnessError::FanOut`] if any
/// call failed.
pub fn settle<T>(stage: Stage, outcomes: Vec<TargetOutcome<T>>) -> (Vec<NodeLatency>, HarnessResult<Vec<(usize, T)>>) {
    let total = outcomes.len();
    let mut latencies = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    let mut failed = 0;

    for outcome in outcomes {
        match outcome.result {
            Ok(value) => {
                latencies.push(NodeLatency {
                    node: outcome.node,
                    elapsed: Some(outcome.elapsed),
                });
                values.push((outcome.node, value));
            }
            Err(e) => {
                log::warn!("{}: node {} failed: {}", stage, outcome.node, e);
                latencies.push(NodeLatency {
                    node: outcome.node,
                    elapsed: None,
                });
                failed += 1;
            }
        }
    }

    if failed > 0 {
        (latencies, Err(HarnessError::FanOut { stage, failed, total }))
    } else {
        (latencies, Ok(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joins_every_target_even_after_a_failure() {
        let outcomes = fan_out_join(0..4, "storeKeyFragment", Duration::from_secs(1), Instant::now(), |node| async move {
            if node == 2 {
                Err(HarnessError::collaborator("broker", "storeKeyFragment", "boom"))
            } else {
                Ok(node * 10)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.iter().map(|o| o.node).collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let (latencies, result) = settle(Stage::KeyFragmentsDistributed, outcomes);
        assert_eq!(latencies.len(), 4);
        assert!(latencies[2].elapsed.is_none());
        assert!(latencies[3].elapsed.is_some());
        match result {
            Err(HarnessError::FanOut { failed, total, .. }) => assert_eq!((failed, total), (1, 4)),
            other => panic!("expected FanOut error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn successful_values_keep_target_order() {
        let outcomes = fan_out_join(vec![3, 1], "getReencryptionFragment", Duration::from_secs(1), Instant::now(), |node| async move {
            Ok(node)
        })
        .await;
        let (_, result) = settle(Stage::QuorumFragmentsRetrieved, outcomes);
        assert_eq!(result.unwrap(), vec![(3, 3), (1, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let outcomes = fan_out_join(0..2, "slow", Duration::from_millis(100), Instant::now(), |node| async move {
            if node == 1 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(())
        })
        .await;

        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(HarnessError::Timeout { operation: "slow", .. })));
    }

    #[tokio::test]
    async fn latencies_count_from_the_stage_start() {
        let stage_started = Instant::now() - Duration::from_millis(250);
        let outcomes = fan_out_join(0..3, "storeKeyFragment", Duration::from_secs(1), stage_started, |node| async move {
            Ok(node)
        })
        .await;
        assert!(outcomes.iter().all(|o| o.elapsed >= Duration::from_millis(250)));
    }
}
