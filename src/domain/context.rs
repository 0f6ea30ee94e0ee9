//! Operation Context
//!
//! Request metadata carried alongside a ledger operation for tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attached to every API request by the logging middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID shared by the request, its logs and its response
    pub correlation_id: Uuid,

    pub received_at: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            received_at: Utc::now(),
        }
    }

    /// Milliseconds since the request arrived
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_correlation_id() {
        let correlation_id = Uuid::new_v4();
        let context = OperationContext::new(correlation_id);
        assert_eq!(context.correlation_id, correlation_id);
        assert!(context.elapsed_ms() >= 0);
    }

    #[test]
    fn test_default_context_gets_fresh_id() {
        let a = OperationContext::default();
        let b = OperationContext::default();
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.correlation_id.get_version_num(), 4);
    }
}
