use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Fixed attempt budget for a single storage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)))
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }

    /// Run `op` until it succeeds, fails permanently or the budget is spent.
    /// Returns the result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> (Result<T, StoreError>, usize)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempts = 0usize;
        let result = (|| {
            attempts += 1;
            op()
        })
        .retry(self.backoff())
        .sleep(tokio::time::sleep)
        .when(StoreError::is_transient)
        .notify(|err: &StoreError, delay: Duration| {
            warn!(operation = what, error = %err, ?delay, "Transient storage failure, retrying");
        })
        .await;
        (result, attempts)
    }
}
