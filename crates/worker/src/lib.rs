//! Background loops for Ledgerline.
//!
//! - `dispatcher` - publishes outbox records to the delivery channel
//! - `processor` - posts outbox records directly, as a backup to the channel
//! - `publisher` - delivery-channel publishers
//!
//! Both loops take a `CancellationToken`; on cancellation they stop claiming
//! and return once the in-flight batch is settled.

pub mod dispatcher;
pub mod processor;
pub mod publisher;

pub use dispatcher::{DispatchStats, OutboxDispatcher};
pub use processor::{DirectProcessor, ProcessStats};
pub use publisher::{EventPublisher, HttpPublisher, NoopPublisher, PublishError};
