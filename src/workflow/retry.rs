use std::future::Future;

use crate::error::{HarnessError, HarnessResult};

/// Produces values until one passes `validate`, at most `max_attempts`
/// times.
///
/// An error from `produce` ends the loop immediately; only validation
/// failures are retried. Exhaustion is reported as
/// [`HarnessError::IntegrityFailure`] carrying the last validation message.
/// On success returns the value with the number of attempts it took.
pub async fn retry_until_valid<T, F, Fut, V>(max_attempts: usize, mut produce: F, validate: V) -> HarnessResult<(T, usize)>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
    V: Fn(&T) -> Result<(), String>,
{
    let mut last_problem = String::from("no attempt was made");
    for attempt in 1..=max_attempts {
        let value = produce(attempt).await?;
        match validate(&value) {
            Ok(()) => return Ok((value, attempt)),
            Err(problem) => {
                log::warn!("attempt {}/{} rejected: {}", attempt, max_attempts, problem);
                last_problem = problem;
            }
        }
    }
    Err(HarnessError::IntegrityFailure {
        attempts: max_attempts,
        detail: last_problem,
    })
}

/// Checks a key-fragment split: exactly `expected_count` fragments of
/// `expected_size` bytes each.
pub fn validate_fragments(fragments: &[Vec<u8>], expected_count: usize, expected_size: usize) -> Result<(), String> {
    if fragments.len() != expected_count {
        return Err(format!("expected {} fragments, got {}", expected_count, fragments.len()));
    }
    match fragments.iter().position(|f| f.len() != expected_size) {
        Some(i) => Err(format!(
            "fragment {} is {} bytes, expected {}",
            i,
            fragments[i].len(),
            expected_size
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_the_value_is_valid() {
        let calls = AtomicUsize::new(0);
        let (value, attempts) = retry_until_valid(
            5,
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            },
            |n| if *n >= 2 { Ok(()) } else { Err(format!("{} too small", n)) },
        )
        .await
        .unwrap();

        assert_eq!((value, attempts), (2, 3));
    }

    #[tokio::test]
    async fn exhaustion_is_an_integrity_failure() {
        let result = retry_until_valid(3, |_| async { Ok(0u8) }, |_| Err("always bad".to_string())).await;
        match result {
            Err(HarnessError::IntegrityFailure { attempts, detail }) => {
                assert_eq!(attempts, 3);
                assert_eq!(detail, "always bad");
            }
            other => panic!("expected IntegrityFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn producer_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: HarnessResult<(u8, usize)> = retry_until_valid(
            5,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(HarnessError::collaborator("auth", "generateKeyFragments", "down")) }
            },
            |_| Ok(()),
        )
        .await;

        assert!(matches!(result, Err(HarnessError::Collaborator { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fragment_validation() {
        let good = vec![vec![0u8; 259]; 4];
        assert!(validate_fragments(&good, 4, 259).is_ok());
        assert!(validate_fragments(&good, 5, 259).is_err());

        let mut bad = good.clone();
        bad[1].pop();
        let err = validate_fragments(&bad, 4, 259).unwrap_err();
        assert!(err.contains("fragment 1"));
    }
}
