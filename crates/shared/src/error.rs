//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Payload could not be parsed or is missing required identifiers.
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Event rejected by posting policy (e.g. closed period).
    #[error("Rejected by policy: {0}")]
    Rejected(String),

    /// Posting routine returned a domain error.
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// Conflict (e.g. lock contention).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Delivery channel error.
    #[error("Delivery channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Malformed(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Rejected(_) | Self::BusinessRule(_) => 422,
            Self::Database(_) | Self::Channel(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Rejected(_) => "POLICY_REJECTION",
            Self::BusinessRule(_) => "BUSINESS_RULE_VIOLATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Channel(_) => "CHANNEL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::Malformed(String::new()), 400, "MALFORMED_INPUT")]
    #[case(AppError::NotFound(String::new()), 404, "NOT_FOUND")]
    #[case(AppError::Conflict(String::new()), 409, "CONFLICT")]
    #[case(AppError::Rejected(String::new()), 422, "POLICY_REJECTION")]
    #[case(AppError::BusinessRule(String::new()), 422, "BUSINESS_RULE_VIOLATION")]
    #[case(AppError::Database(String::new()), 500, "DATABASE_ERROR")]
    #[case(AppError::Channel(String::new()), 500, "CHANNEL_ERROR")]
    #[case(AppError::Config(String::new()), 500, "CONFIG_ERROR")]
    #[case(AppError::Internal(String::new()), 500, "INTERNAL_ERROR")]
    fn test_error_mapping(#[case] err: AppError, #[case] status: u16, #[case] code: &str) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.error_code(), code);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::Malformed("msg".into()).to_string(),
            "Malformed input: msg"
        );
        assert_eq!(
            AppError::Rejected("msg".into()).to_string(),
            "Rejected by policy: msg"
        );
        assert_eq!(
            AppError::Channel("msg".into()).to_string(),
            "Delivery channel error: msg"
        );
    }
}
