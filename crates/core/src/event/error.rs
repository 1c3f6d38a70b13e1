//! Errors raised while decoding events.

use thiserror::Error;

/// A structural defect in an inbound event. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// Body is not valid JSON or does not match the event schema.
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// A required identifier is missing or empty.
    #[error("Missing required identifier: {0}")]
    MissingIdentifier(&'static str),

    /// The reference type is not part of the closed set.
    #[error("Unknown reference type: {0}")]
    UnknownReferenceType(String),
}

impl EventError {
    /// Returns the error code for API responses and outbox error columns.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::MissingIdentifier(_) => "MISSING_IDENTIFIER",
            Self::UnknownReferenceType(_) => "UNKNOWN_REFERENCE_TYPE",
        }
    }
}
