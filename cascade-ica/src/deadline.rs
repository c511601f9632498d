//! One shared deadline per command.
//!
//! Every blocking step runs under [`Deadline::run`]; when the deadline
//! elapses the in-flight future is dropped, which releases its connections,
//! and a timeout-class error is returned.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{IcaError, Result};

/// Deadline applied when the caller gives none.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Longest deadline a command may ask for (one year).
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now, capped at [`MAX_COMMAND_TIMEOUT`].
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout.min(MAX_COMMAND_TIMEOUT),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Run `fut` until it finishes or the deadline passes.
    pub async fn run<T, F>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(IcaError::DeadlineExceeded(step.to_string())),
        }
    }

    /// Sleep for `interval`, failing instead if the deadline comes first.
    pub async fn sleep(&self, step: &str, interval: Duration) -> Result<()> {
        match Instant::now().checked_add(interval) {
            Some(wake) if wake < self.at => {
                tokio::time::sleep_until(wake).await;
                Ok(())
            }
            _ => {
                tokio::time::sleep_until(self.at).await;
                Err(IcaError::DeadlineExceeded(step.to_string()))
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::after(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline.run("quick step", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let err = deadline
            .run("slow step", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "deadline exceeded while slow step");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_past_deadline_fails() {
        let deadline = Deadline::after(Duration::from_secs(3));
        deadline.sleep("polling", Duration::from_secs(2)).await.unwrap();
        let err = deadline.sleep("polling", Duration::from_secs(2)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_is_capped() {
        let deadline = Deadline::after(Duration::MAX);
        assert_eq!(deadline.remaining(), MAX_COMMAND_TIMEOUT);

        let err = Deadline::after(Duration::from_secs(1))
            .sleep("polling", Duration::MAX)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
