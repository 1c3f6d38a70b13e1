//! Posting pipeline errors and their retry classification.

use ledgerline_core::event::EventError;
use ledgerline_core::ledger::LedgerError;
use ledgerline_core::posting::RouterError;
use ledgerline_shared::types::TenantId;
use ledgerline_shared::AppError;
use sea_orm::DbErr;

use crate::repositories::{BusinessError, LedgerStoreError};

/// How the pipeline treats an error.
///
/// Policy rejections are not errors; they come back as
/// `PostingOutcome::Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Structurally invalid input. Dropped, never retried.
    Malformed,
    /// Infrastructure failure. Retried with backoff.
    Transient,
    /// Domain failure. Retried with backoff; DEAD triggers compensation.
    Business,
}

/// Error types for posting.
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    /// The event or one of its fields is malformed.
    #[error(transparent)]
    Malformed(#[from] EventError),

    /// No routine for the reference type.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Ledger validation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The event names a business that does not exist.
    #[error("Business not found: {0}")]
    TenantNotFound(TenantId),

    /// The tenant lock was not granted within the lock timeout.
    #[error("Timed out waiting for the posting lock of tenant {0}")]
    LockTimeout(TenantId),

    /// A posting routine refused the event.
    #[error("Business rule violation: {0}")]
    Business(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl PostingError {
    /// Classifies the error for the retry controller.
    #[must_use]
    pub const fn classification(&self) -> ErrorClass {
        match self {
            Self::Malformed(_) => ErrorClass::Malformed,
            Self::LockTimeout(_) | Self::Database(_) => ErrorClass::Transient,
            Self::Router(_) | Self::Ledger(_) | Self::TenantNotFound(_) | Self::Business(_) => {
                ErrorClass::Business
            }
        }
    }

    /// Returns true if the event should be delivered again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.classification(), ErrorClass::Malformed)
    }

    /// Returns the error code for API responses and outbox error columns.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(e) => e.error_code(),
            Self::Router(_) => "NO_POSTING_ROUTINE",
            Self::Ledger(e) => e.error_code(),
            Self::TenantNotFound(_) => "TENANT_NOT_FOUND",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Business(_) => "BUSINESS_RULE_VIOLATION",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<LedgerStoreError> for PostingError {
    fn from(err: LedgerStoreError) -> Self {
        match err {
            LedgerStoreError::Ledger(e) => Self::Ledger(e),
            LedgerStoreError::Database(e) => Self::Database(e),
            other @ (LedgerStoreError::Corrupt { .. } | LedgerStoreError::AlreadyReversed(_)) => {
                Self::Business(other.to_string())
            }
        }
    }
}

impl From<BusinessError> for PostingError {
    fn from(err: BusinessError) -> Self {
        match err {
            BusinessError::NotFound(id) => Self::TenantNotFound(id),
            BusinessError::Database(e) => Self::Database(e),
            other @ BusinessError::InvalidTimezone { .. } => Self::Business(other.to_string()),
        }
    }
}

impl From<PostingError> for AppError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::Malformed(e) => Self::Malformed(e.to_string()),
            PostingError::TenantNotFound(id) => Self::NotFound(format!("business {id}")),
            PostingError::Database(e) => Self::Database(e.to_string()),
            PostingError::LockTimeout(id) => {
                Self::Internal(format!("posting lock busy for tenant {id}"))
            }
            other => Self::BusinessRule(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::event::ReferenceType;

    #[test]
    fn test_malformed_is_not_retryable() {
        let err = PostingError::from(EventError::MissingIdentifier("message_id"));
        assert_eq!(err.classification(), ErrorClass::Malformed);
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), "MISSING_IDENTIFIER");
    }

    #[test]
    fn test_lock_timeout_is_transient() {
        let err = PostingError::LockTimeout(TenantId::new());
        assert_eq!(err.classification(), ErrorClass::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ledger_errors_are_business() {
        let err = PostingError::from(LedgerError::InsufficientLines);
        assert_eq!(err.classification(), ErrorClass::Business);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_router_gap_is_business() {
        let err = PostingError::from(RouterError::NoHandler(ReferenceType::Bill));
        assert_eq!(err.classification(), ErrorClass::Business);
        assert_eq!(err.error_code(), "NO_POSTING_ROUTINE");
    }

    #[test]
    fn test_store_corruption_maps_to_business() {
        let err = PostingError::from(LedgerStoreError::AlreadyReversed(uuid::Uuid::nil()));
        assert!(matches!(err, PostingError::Business(_)));
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = PostingError::TenantNotFound(TenantId::new()).into();
        assert_eq!(app.error_code(), "NOT_FOUND");
        let app: AppError = PostingError::from(EventError::InvalidPayload("x".into())).into();
        assert_eq!(app.status_code(), 400);
    }
}
