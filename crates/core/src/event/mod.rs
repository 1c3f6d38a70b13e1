//! Ledger events as they travel through the outbox and delivery channel.

pub mod context;
pub mod envelope;
pub mod error;
pub mod reference;

pub use context::{ProcessingContext, SYSTEM_ACTOR_NAME};
pub use envelope::{EventAction, LedgerEvent, PushEnvelope, PushMessage};
pub use error::EventError;
pub use reference::ReferenceType;
