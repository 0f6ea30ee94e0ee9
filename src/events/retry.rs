//! Bounded retry with exponential backoff

use std::time::Duration;

use crate::domain::EventEnvelope;

use super::{EventPublisher, PublishError};

/// How often and how patiently to retry a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubles with every further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Publish `envelope`, retrying retryable failures under `policy`.
///
/// Returns the last error once attempts run out, or the first
/// non-retryable error immediately.
pub async fn publish_with_retry(
    publisher: &dyn EventPublisher,
    topic: &str,
    envelope: &EventEnvelope,
    policy: &RetryPolicy,
) -> Result<(), PublishError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match publisher.publish(topic, envelope).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    topic,
                    error = %e,
                    "Publish failed, retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the error built by `make_error`
    struct FlakyPublisher {
        failures: u32,
        calls: AtomicU32,
        make_error: fn() -> PublishError,
    }

    impl FlakyPublisher {
        fn new(failures: u32, make_error: fn() -> PublishError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                make_error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, _topic: &str, _envelope: &EventEnvelope) -> Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err((self.make_error)())
            } else {
                Ok(())
            }
        }
    }

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            event: "transfer.created".to_string(),
            data: serde_json::json!({}),
            timestamp: Utc::now(),
            service: "transfer-service".to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn refused() -> PublishError {
        PublishError::ConnectionRefused("refused".to_string())
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_retryable_failures() {
        let publisher = FlakyPublisher::new(2, refused);
        let result = publish_with_retry(&publisher, "t", &envelope(), &fast_policy()).await;

        assert!(result.is_ok());
        assert_eq!(publisher.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let publisher = FlakyPublisher::new(10, refused);
        let result = publish_with_retry(&publisher, "t", &envelope(), &fast_policy()).await;

        assert!(matches!(result, Err(PublishError::ConnectionRefused(_))));
        assert_eq!(publisher.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let publisher = FlakyPublisher::new(10, || PublishError::Rejected { status: 422 });
        let result = publish_with_retry(&publisher, "t", &envelope(), &fast_policy()).await;

        assert!(matches!(result, Err(PublishError::Rejected { status: 422 })));
        assert_eq!(publisher.calls(), 1);
    }
}
