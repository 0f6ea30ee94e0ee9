//! Event Dispatcher
//!
//! Hands a batch of events to a background task that publishes them in order.

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::domain::LedgerEvent;

use super::{publish_with_retry, DynEventPublisher, RetryPolicy};

/// Outcome of one dispatched batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fire-and-forget publisher front
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: DynEventPublisher,
    policy: RetryPolicy,
}

impl EventDispatcher {
    pub fn new(publisher: DynEventPublisher, policy: RetryPolicy) -> Self {
        Self { publisher, policy }
    }

    /// Publish `events` in order on a spawned task.
    ///
    /// Callers normally drop the handle; it exists so tests can wait for
    /// delivery.
    pub fn dispatch(&self, events: Vec<LedgerEvent>) -> JoinHandle<DispatchReport> {
        let publisher = self.publisher.clone();
        let policy = self.policy;

        tokio::spawn(async move {
            let mut report = DispatchReport::default();

            for event in events {
                let topic = event.topic();
                let envelope = match event.envelope(Utc::now()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::error!(topic, error = %e, "Failed to encode event, dropping");
                        report.dropped += 1;
                        continue;
                    }
                };

                match publish_with_retry(publisher.as_ref(), topic, &envelope, &policy).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        tracing::error!(topic, error = %e, "Event dropped after retries");
                        report.dropped += 1;
                    }
                }
            }

            report
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventEnvelope, TransferEventData, TransferStatus};
    use crate::events::{EventPublisher, PublishError};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records topics, rejecting `transfer.completed`
    #[derive(Default)]
    struct PickyPublisher {
        topics: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventPublisher for PickyPublisher {
        async fn publish(&self, topic: &str, _envelope: &EventEnvelope) -> Result<(), PublishError> {
            self.topics.lock().unwrap().push(topic.to_string());
            if topic == "transfer.completed" {
                return Err(PublishError::Rejected { status: 500 });
            }
            Ok(())
        }
    }

    fn transfer(status: TransferStatus) -> TransferEventData {
        TransferEventData {
            transfer_id: Some(1),
            sender_client_id: 1,
            receiver_client_id: 2,
            amount: Decimal::new(100, 2),
            description: "test".to_string(),
            status,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_order_and_drop_failures() {
        let publisher = Arc::new(PickyPublisher::default());
        let dispatcher = EventDispatcher::new(
            publisher.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );

        let report = dispatcher
            .dispatch(vec![
                LedgerEvent::TransferCreated(transfer(TransferStatus::Created)),
                LedgerEvent::TransferCompleted(transfer(TransferStatus::Completed)),
                LedgerEvent::TransferFailed(transfer(TransferStatus::Failed)),
            ])
            .await
            .unwrap();

        assert_eq!(report, DispatchReport { delivered: 2, dropped: 1 });
        assert_eq!(
            *publisher.topics.lock().unwrap(),
            vec!["transfer.created", "transfer.completed", "transfer.failed"]
        );
    }
}
