use crate::{config::settings, ledger};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;

/// Runs `operation` until it succeeds, fails with a non-transient error or
/// `max_attempts` is used up. Waits grow exponentially from the configured
/// backoff.
pub async fn with_backoff<T, F, Fut>(
    settings: &settings::Retry,
    what: &str,
    mut operation: F,
) -> Result<T, ledger::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ledger::Error>>,
{
    let max_attempts = settings.max_attempts;
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(settings.backoff)
        .with_max_elapsed_time(None)
        .build();

    let mut attempts = 0u32;
    let attempt_once = || {
        attempts += 1;
        let attempt = attempts;
        let future = operation();

        async move {
            future.await.map_err(|e| {
                if e.is_transient() && attempt < max_attempts {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    };

    backoff::future::retry_notify(backoff, attempt_once, |e, wait| {
        tracing::warn!(
            "failed to {}, retrying in {:?} ...: {:#}",
            what,
            wait,
            e
        )
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use std::{sync::atomic::{AtomicU32, Ordering}, time::Duration};

    fn settings(max_attempts: u32) -> settings::Retry {
        settings::Retry {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    fn unavailable() -> ledger::Error {
        ledger::Error::ChainUnavailable("connection refused".to_owned())
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);

        let result = with_backoff(&settings(3), "query", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(unavailable())
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_that(&result).is_ok_containing(2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(&settings(3), "query", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;

        assert_that(&result).is_err_containing(unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_surfaced_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_backoff(&settings(5), "redeem", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ledger::Error::Expired) }
        })
        .await;

        assert_that(&result).is_err_containing(ledger::Error::Expired);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
