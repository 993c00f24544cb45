//! Exponential retry that stops on fail-fast errors

use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use super::EngineError;

/// First delay of a container wait
pub const BACKOFF_INITIAL: Duration = Duration::from_millis(15);

/// Total time a container wait may spend sleeping
pub const BACKOFF_BUDGET: Duration = Duration::from_secs(25);

/// Longest single delay between attempts
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Delays that double from `initial` and stop once `budget` is spent
pub fn backoff(initial: Duration, budget: Duration) -> impl Iterator<Item = Duration> {
    let factor = (initial.as_millis() as u64 / 2).max(1);
    let mut spent = Duration::ZERO;
    ExponentialBackoff::from_millis(2)
        .factor(factor)
        .max_delay(MAX_DELAY)
        .take_while(move |delay| {
            spent += *delay;
            spent <= budget
        })
}

/// Retry `action` until it succeeds, the budget runs out, or it returns
/// a fail-fast error
pub async fn retry_unless_fail_fast<T, F, Fut>(
    initial: Duration,
    budget: Duration,
    action: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    RetryIf::spawn(
        backoff(initial, budget),
        action,
        |e: &EngineError| {
            if e.is_fail_fast() {
                return false;
            }
            tracing::debug!("will retry after error: {}", e);
            true
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::engine::ErrorKind;

    #[test]
    fn backoff_doubles_within_budget() {
        let delays: Vec<Duration> = backoff(Duration::from_millis(16), Duration::from_millis(200)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(16),
                Duration::from_millis(32),
                Duration::from_millis(64),
            ]
        );
        let total: Duration = backoff(BACKOFF_INITIAL, BACKOFF_BUDGET).sum();
        assert!(total <= BACKOFF_BUDGET);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let value = retry_unless_fail_fast(Duration::from_millis(2), Duration::from_secs(1), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::from(ErrorKind::ExitedUnexpectedly))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fail_fast_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = retry_unless_fail_fast(Duration::from_millis(2), Duration::from_secs(1), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(EngineError::from(ErrorKind::CpuCountLimit)) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::CpuCountLimit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
