//! Outbox lifecycles.
//!
//! An outbox record carries two independent state machines:
//! - the publish lifecycle (`PENDING -> PUBLISHING -> SENT | FAILED`)
//! - the processing lifecycle (`new -> PROCESSING -> SUCCEEDED | FAILED -> ... -> DEAD`)
//!
//! Both are pure transitions here; the repository reads a row, applies a
//! transition, and writes the result back under the row's claim token.

pub mod backoff;
pub mod claim;
pub mod publish;
pub mod retry;
pub mod types;

#[cfg(test)]
mod backoff_props;
#[cfg(test)]
mod retry_props;

pub use backoff::BackoffPolicy;
pub use claim::{Claim, ClaimToken};
pub use publish::{PublishLifecycle, PublishOutcome, PublishPolicy, PublishState};
pub use retry::{FailureOutcome, ProcessingState, RetryController, RetryPolicy, SuccessOutcome};
pub use types::{ProcessingStatus, PublishStatus, UnknownStatus};
