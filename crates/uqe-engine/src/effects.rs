//! Side effects that must never fail or stall a query.
//!
//! Metric recording and similar bookkeeping run through [`NonCritical`]:
//! the effect gets a bounded amount of time, and a failure or timeout is
//! logged and dropped.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Time bound and label for a best-effort side effect.
#[derive(Debug, Clone, Copy)]
pub struct NonCritical {
    /// Longest the caller will wait for the effect.
    pub timeout: Duration,
}

impl Default for NonCritical {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
        }
    }
}

impl NonCritical {
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `effect`, logging instead of propagating any failure.
    ///
    /// Returns whether the effect completed successfully.
    pub async fn run<E: Display>(
        &self,
        label: &str,
        effect: impl Future<Output = Result<(), E>>,
    ) -> bool {
        match tokio::time::timeout(self.timeout, effect).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::warn!(effect = label, %error, "non-critical effect failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    effect = label,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "non-critical effect timed out"
                );
                false
            }
        }
    }
}

/// [`NonCritical::run`] with the default bound.
pub async fn best_effort<E: Display>(
    label: &str,
    effect: impl Future<Output = Result<(), E>>,
) -> bool {
    NonCritical::default().run(label, effect).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_is_reported() {
        assert!(best_effort("ok", async { Ok::<(), String>(()) }).await);
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        assert!(!best_effort("fails", async { Err::<(), _>("boom") }).await);
    }

    #[tokio::test]
    async fn slow_effect_is_abandoned() {
        let effect = NonCritical::with_timeout(Duration::from_millis(10));
        let completed = effect
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), String>(())
            })
            .await;
        assert!(!completed);
    }
}
