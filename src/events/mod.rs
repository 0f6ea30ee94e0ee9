//! Events module
//!
//! Best-effort delivery of ledger events to other services. Nothing here can
//! fail a ledger operation: publishing happens after commit on a background
//! task and failures are logged and dropped.

mod dispatcher;
mod publisher;
mod retry;

pub use dispatcher::{DispatchReport, EventDispatcher};
pub use publisher::{
    DynEventPublisher, EventPublisher, HttpEventPublisher, LogEventPublisher, PublishError,
};
pub use retry::{publish_with_retry, RetryPolicy};
