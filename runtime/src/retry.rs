//! Activity retries with exponential backoff.
//!
//! The host owns retries for side-effect calls. Each attempt of an
//! [`Activity`] that fails with a retryable [`ActivityError`] is retried after
//! an exponentially growing delay until the policy's attempt budget is spent.
//! The final error is handed back to the workflow through the activity's
//! failure mapper.
//!
//! # Example
//!
//! ```rust
//! use orderflow_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .initial_backoff(Duration::from_millis(100))
//!     .max_backoff(Duration::from_secs(10))
//!     .backoff_coefficient(2.0)
//!     .build();
//!
//! assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
//! assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
//! ```

use orderflow_core::effect::{Activity, ActivityError};
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for activities.
///
/// # Default Values
///
/// - `max_attempts`: 3 (first attempt plus two retries)
/// - `initial_backoff`: 100ms
/// - `max_backoff`: 30 seconds
/// - `backoff_coefficient`: 2.0 (delay doubles after each failed attempt)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Cap for the exponential delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_coefficient: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `initial_backoff * coefficient ^ (attempt - 1)`, capped at `max_backoff`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = (self.initial_backoff.as_nanos() as f64
            * self.backoff_coefficient.powi(exponent))
        .round();

        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos.max(0.0) as u64)
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set the total attempt budget (at least one attempt always runs).
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay after the first failed attempt.
    #[must_use]
    pub const fn initial_backoff(mut self, delay: Duration) -> Self {
        self.policy.initial_backoff = delay;
        self
    }

    /// Set the cap for exponential backoff.
    #[must_use]
    pub const fn max_backoff(mut self, delay: Duration) -> Self {
        self.policy.max_backoff = delay;
        self
    }

    /// Set the growth factor between delays.
    #[must_use]
    pub const fn backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.policy.backoff_coefficient = coefficient;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Run an activity to its final outcome.
///
/// Always yields an action: the success action, or the activity's failure
/// action once a non-retryable error occurs or the attempt budget runs out.
pub async fn run_activity<A>(policy: &RetryPolicy, activity: Activity<A>) -> A {
    let mut attempt = 1;

    loop {
        let pending = activity.attempt();
        match pending.await {
            Ok(action) => {
                if attempt > 1 {
                    tracing::info!(
                        activity = activity.name(),
                        effect_id = %activity.id(),
                        attempt,
                        "Activity succeeded after retry"
                    );
                }
                return action;
            }
            Err(error) if !error.retryable || attempt >= policy.max_attempts => {
                tracing::error!(
                    activity = activity.name(),
                    effect_id = %activity.id(),
                    attempt,
                    retryable = error.retryable,
                    error = %error,
                    "Activity failed permanently"
                );
                return activity.fail(error);
            }
            Err(error) => {
                let delay = policy.backoff_for(attempt);
                warn_retry(&activity, attempt, delay, &error);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn warn_retry<A>(activity: &Activity<A>, attempt: u32, delay: Duration, error: &ActivityError) {
    tracing::warn!(
        activity = activity.name(),
        effect_id = %activity.id(),
        attempt,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error = %error,
        "Activity attempt failed, retrying"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use orderflow_core::effect::EffectId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Done(u32),
        GaveUp(String),
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
            .build()
    }

    fn flaky(calls: Arc<AtomicU32>, failures: u32, retryable: bool) -> Activity<Outcome> {
        Activity::new(
            EffectId::new(0),
            "flaky",
            move || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= failures {
                        Err(ActivityError {
                            message: format!("failure {n}"),
                            retryable,
                        })
                    } else {
                        Ok(Outcome::Done(n))
                    }
                }
            },
            |error| Outcome::GaveUp(error.message),
        )
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::builder()
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_millis(350))
            .build();

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn builder_keeps_at_least_one_attempt() {
        assert_eq!(RetryPolicy::builder().max_attempts(0).build().max_attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = run_activity(&fast_policy(5), flaky(Arc::clone(&calls), 2, true)).await;

        assert_eq!(outcome, Outcome::Done(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = run_activity(&fast_policy(3), flaky(Arc::clone(&calls), 10, true)).await;

        assert_eq!(outcome, Outcome::GaveUp("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = run_activity(&fast_policy(5), flaky(Arc::clone(&calls), 10, false)).await;

        assert_eq!(outcome, Outcome::GaveUp("failure 1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
