//! Sequential retry with exponential backoff.
//!
//! The executor is the single place that decides a failure is terminal.
//! Delays go through a [`Sleeper`] so tests can record them instead of
//! waiting.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classify::ActionableError;
use crate::obs;

/// Retry bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts in total
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub backoff_base_ms: u64,
    /// Upper bound on any single delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let ms = factor
            .saturating_mul(self.backoff_base_ms)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Injectable delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay via `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Run `operation` until it succeeds, its failure is classified
/// non-retryable, or `config.max_retries` attempts have been made.
///
/// `operation` receives the 1-based attempt number. On terminal failure the
/// full diagnostic is logged and the original error is returned.
pub async fn execute_with_retry<T, E, Op, Fut, C>(
    operation_name: &str,
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut operation: Op,
    classify: C,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ActionableError,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let diagnosis = classify(&err);
        if !diagnosis.retryable || attempt >= max_attempts {
            obs::emit_retry_exhausted(operation_name, attempt, &diagnosis);
            return Err(err);
        }

        let delay = config.delay_for(attempt);
        obs::emit_attempt_failed(operation_name, attempt, &diagnosis, delay);
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_deploy_error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            backoff_base_ms: 10,
            max_delay_ms: 1000,
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.backoff_base_ms, 1000);
        assert_eq!(cfg.max_delay_ms, 30_000);
    }

    #[test]
    fn test_delay_is_capped() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for(1), Duration::from_millis(2000));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(4000));
        assert_eq!(cfg.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(cfg.delay_for(80), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let sleeper = RecordingSleeper::new();
        let result: Result<&str, String> = execute_with_retry(
            "deploy",
            &fast(),
            &sleeper,
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("build failed".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            |e| classify_deploy_error(e),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_millis(20), Duration::from_millis(40)]
        );
    }

    #[tokio::test]
    async fn test_non_retryable_attempted_once() {
        let calls = AtomicU32::new(0);
        let sleeper = RecordingSleeper::new();
        let result: Result<(), String> = execute_with_retry(
            "deploy",
            &fast(),
            &sleeper,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("Project not found".to_string()) }
            },
            |e| classify_deploy_error(e),
        )
        .await;

        assert_eq!(result.unwrap_err(), "Project not found");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_original_error() {
        let sleeper = RecordingSleeper::new();
        let result: Result<(), String> = execute_with_retry(
            "deploy",
            &fast(),
            &sleeper,
            |attempt| async move { Err(format!("rate limit #{}", attempt)) },
            |e| classify_deploy_error(e),
        )
        .await;

        assert_eq!(result.unwrap_err(), "rate limit #3");
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let cfg = RetryConfig {
            max_retries: 0,
            ..fast()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = execute_with_retry(
            "deploy",
            &cfg,
            &RecordingSleeper::new(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            },
            |e| classify_deploy_error(e),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
