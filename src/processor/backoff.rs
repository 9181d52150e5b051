use crate::runtime::config::BackoffStrategy;
use anyhow::Result;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Returned when a retry loop or a cancellable sleep is interrupted by its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCancelled;

impl std::fmt::Display for RetryCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("retry cancelled")
    }
}

impl std::error::Error for RetryCancelled {}

#[derive(Clone, Copy)]
pub(crate) struct RetryBackoff<'a> {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    pub cancellation: Option<&'a CancellationToken>,
}

impl<'a> RetryBackoff<'a> {
    pub(crate) fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            strategy: BackoffStrategy::Fixed,
            cancellation: None,
        }
    }

    pub(crate) fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub(crate) fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Runs `operation` until it succeeds, sleeping between attempts. There is no
/// attempt limit; the loop only ends early with [`RetryCancelled`] once the
/// cancellation token fires, which also interrupts an in-flight attempt.
pub(crate) async fn retry_with_backoff<'a, T, F, Fut, L>(
    config: RetryBackoff<'a>,
    mut operation: F,
    mut on_retry: L,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error),
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        attempt += 1;

        let outcome = match config.cancellation {
            Some(token) => {
                if token.is_cancelled() {
                    return Err(RetryCancelled.into());
                }
                tokio::select! {
                    _ = token.cancelled() => return Err(RetryCancelled.into()),
                    result = operation(attempt) => result,
                }
            }
            None => operation(attempt).await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_retry(attempt, backoff, &err);
                sleep_with_cancellation(backoff, config.cancellation).await?;
                backoff = next_backoff(config.strategy, backoff, config.max_delay);
            }
        }
    }
}

pub(crate) async fn sleep_with_cancellation(
    delay: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return match cancellation {
            Some(token) if token.is_cancelled() => Err(RetryCancelled.into()),
            _ => Ok(()),
        };
    }

    if let Some(token) = cancellation {
        tokio::select! {
            _ = token.cancelled() => Err(RetryCancelled.into()),
            _ = sleep(delay) => Ok(()),
        }
    } else {
        sleep(delay).await;
        Ok(())
    }
}

fn next_backoff(strategy: BackoffStrategy, current: Duration, max_backoff: Duration) -> Duration {
    match strategy {
        BackoffStrategy::Fixed => current,
        BackoffStrategy::Exponential => {
            if current.is_zero() {
                return max_backoff.min(Duration::from_millis(1));
            }
            current.saturating_mul(2).min(max_backoff)
        }
    }
}
