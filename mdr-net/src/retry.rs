// mdr-net/src/retry.rs
use std::future::Future;
use std::time::Duration;

use mdr_common::config::Config;
use mdr_common::error::{MdrError, Result};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exponential backoff doubling from `base_delay`, capped at `max_delay`, with jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    /// Un-jittered waits: `base_delay`, twice that, four times that, ... up to `max_delay`.
    pub fn backoff(&self) -> ExponentialBackoff {
        // ExponentialBackoff yields `2^n * factor` for n = 1, 2, ...
        let half_base = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor(half_base.max(1))
            .max_delay(self.max_delay)
    }

    /// The jittered waits between attempts, one per allowed retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        self.backoff().map(jitter).take(self.max_retries as usize)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error or the
    /// retry budget is spent. `cancel` interrupts both attempts and waits.
    pub async fn run<T, F, Fut>(&self, what: &str, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(MdrError::Cancelled);
        }
        let attempts = self.max_retries + 1;
        let mut failures = 0u32;
        let should_retry = |e: &MdrError| {
            failures += 1;
            let transient = e.is_transient();
            if transient && failures < attempts {
                warn!("Transient failure fetching {} (attempt {}/{}): {}", what, failures, attempts, e);
            } else {
                debug!("Giving up on {} after {} attempt(s): {}", what, failures, e);
            }
            transient
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MdrError::Cancelled),
            result = RetryIf::spawn(self.delays(), operation, should_retry) => result,
        }
    }
}
