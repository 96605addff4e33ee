//! Bounded retry around a single capability call.

use std::time::Duration;

use tracing::{debug, warn};

use crate::client::{CallResult, ChatOptions, Client};
use crate::core::{Message, Usage, UsageAccumulator};
use crate::error::{Error, Result};

use super::budget::BudgetGuard;

/// Exponential backoff for retryable capability failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the first delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// ```
    /// use minions_rs::protocol::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_after(1), Duration::from_millis(250));
    /// assert_eq!(policy.delay_after(2), Duration::from_millis(500));
    /// assert_eq!(policy.delay_after(10), Duration::from_secs(4));
    /// ```
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// What happened across every attempt of one logical call.
#[derive(Debug)]
pub struct CallReport {
    /// The successful result, or the error that ended the attempts.
    pub result: Result<CallResult>,
    /// Attempts issued.
    pub attempts: u32,
    /// Usage summed over every attempt, failed ones included.
    pub usage: Usage,
}

/// Issues one logical call, retrying retryable failures with backoff.
///
/// Every attempt first reserves a call from `budget`. Usage reported by
/// each attempt, failed or malformed ones included, goes into `accumulator`
/// as soon as the attempt returns.
pub async fn call_with_retry<C: Client + ?Sized>(
    client: &C,
    messages: &[Message],
    options: &ChatOptions,
    policy: &RetryPolicy,
    budget: &BudgetGuard,
    accumulator: &UsageAccumulator,
) -> CallReport {
    let max_attempts = policy.max_attempts.max(1);
    let mut usage = Usage::zero();
    let mut attempts = 0;

    loop {
        if let Err(e) = budget.reserve_call() {
            return CallReport {
                result: Err(e),
                attempts,
                usage,
            };
        }
        attempts += 1;

        let error = match client.chat(messages, options).await {
            Ok(result) => {
                accumulator.add(result.usage);
                usage += result.usage;
                match result.validate() {
                    Ok(()) => {
                        debug!(
                            model = client.model_name(),
                            attempts,
                            tokens = result.usage.total_tokens(),
                            "Capability call succeeded"
                        );
                        return CallReport {
                            result: Ok(result),
                            attempts,
                            usage,
                        };
                    }
                    Err(e) => e,
                }
            }
            Err(e) => {
                accumulator.add(e.usage);
                usage += e.usage;
                e
            }
        };

        if !error.retryable || attempts >= max_attempts {
            return CallReport {
                result: Err(Error::Client(error)),
                attempts,
                usage,
            };
        }

        let delay = policy.delay_after(attempts);
        warn!(
            model = client.model_name(),
            attempt = attempts,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Retrying capability call"
        );
        budget.sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<CallResult, ClientError>>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<CallResult, ClientError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl Client for Scripted {
        async fn chat(
            &self,
            _messages: &[Message],
            _options: &ChatOptions,
        ) -> std::result::Result<CallResult, ClientError> {
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::fatal("script exhausted")))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    async fn run(client: &Scripted, policy: &RetryPolicy) -> (CallReport, Usage) {
        let budget = crate::protocol::Budget::default().start();
        let accumulator = UsageAccumulator::new();
        let report = call_with_retry(
            client,
            &[Message::user("q")],
            &ChatOptions::default(),
            policy,
            &budget,
            &accumulator,
        )
        .await;
        (report, accumulator.total())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_counts_all_usage() {
        let client = Scripted::new(vec![
            Err(ClientError::retryable("rate limited").with_usage(Usage::new(7, 0))),
            Ok(CallResult::single("ok", Usage::new(10, 2))),
        ]);
        let (report, total) = run(&client, &RetryPolicy::default()).await;
        assert_eq!(report.result.unwrap().first(), "ok");
        assert_eq!(report.attempts, 2);
        assert_eq!(report.usage, Usage::new(17, 2));
        assert_eq!(total, Usage::new(17, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let client = Scripted::new(vec![
            Err(ClientError::retryable("a")),
            Err(ClientError::retryable("b")),
            Err(ClientError::retryable("c")),
            Ok(CallResult::single("never", Usage::zero())),
        ]);
        let (report, _) = run(&client, &RetryPolicy::default()).await;
        assert_eq!(report.attempts, 3);
        assert!(matches!(report.result, Err(Error::Client(ref e)) if e.cause == "c"));
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let client = Scripted::new(vec![
            Err(ClientError::fatal("bad request").with_usage(Usage::new(3, 0))),
            Ok(CallResult::single("never", Usage::zero())),
        ]);
        let (report, total) = run(&client, &RetryPolicy::default()).await;
        assert_eq!(report.attempts, 1);
        assert!(report.result.is_err());
        assert_eq!(total, Usage::new(3, 0));
    }

    #[tokio::test]
    async fn test_malformed_result_counted_then_fatal() {
        let client = Scripted::new(vec![Ok(CallResult {
            responses: vec![],
            usage: Usage::new(9, 1),
            finish_reasons: vec![],
        })]);
        let (report, total) = run(&client, &RetryPolicy::default()).await;
        assert_eq!(report.attempts, 1);
        assert!(report.result.is_err());
        assert_eq!(total, Usage::new(9, 1));
    }

    #[tokio::test]
    async fn test_budget_stops_before_call() {
        let client = Scripted::new(vec![Ok(CallResult::single("ok", Usage::new(1, 1)))]);
        let budget = crate::protocol::Budget::default().with_max_calls(0).start();
        let accumulator = UsageAccumulator::new();
        let report = call_with_retry(
            &client,
            &[Message::user("q")],
            &ChatOptions::default(),
            &RetryPolicy::default(),
            &budget,
            &accumulator,
        )
        .await;
        assert_eq!(report.attempts, 0);
        assert!(matches!(report.result, Err(Error::Cancelled { .. })));
        assert!(accumulator.total().is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let client = Scripted::new(vec![
            Err(ClientError::retryable("overloaded").with_usage(Usage::new(2, 0))),
            Ok(CallResult::single("never", Usage::zero())),
        ]);
        let token = crate::protocol::CancelToken::new();
        let budget = crate::protocol::Budget::default()
            .with_cancel(token.clone())
            .start();
        let accumulator = UsageAccumulator::new();
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let trip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });
        let report = call_with_retry(
            &client,
            &[Message::user("q")],
            &ChatOptions::default(),
            &policy,
            &budget,
            &accumulator,
        )
        .await;
        trip.await.unwrap();

        assert!(start.elapsed() < policy.delay_after(1));
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.result, Err(Error::Cancelled { .. })));
        assert_eq!(accumulator.total(), Usage::new(2, 0));
    }

    #[test]
    fn test_delay_after_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(4));

        let odd = RetryPolicy {
            multiplier: f64::NAN,
            ..RetryPolicy::default()
        };
        assert!(odd.delay_after(2) <= odd.max_delay);
    }
}
