//! Idempotency decisions for (tenant, handler, message).

use std::fmt;
use std::str::FromStr;

use ledgerline_shared::types::TenantId;
use serde::{Deserialize, Serialize};

use crate::event::{LedgerEvent, ReferenceType};
use crate::outbox::UnknownStatus;

/// Recorded outcome of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    Succeeded,
    Failed,
}

impl IdempotencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdempotencyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "idempotency",
                value: other.to_string(),
            }),
        }
    }
}

/// Identity of one logical posting. The handler is the reference type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub tenant_id: TenantId,
    pub handler: ReferenceType,
    pub message_id: String,
}

impl IdempotencyKey {
    #[must_use]
    pub fn new(tenant_id: TenantId, handler: ReferenceType, message_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            handler,
            message_id: message_id.into(),
        }
    }

    #[must_use]
    pub fn for_event(event: &LedgerEvent) -> Self {
        Self::new(event.tenant_id, event.reference_type, event.message_id.clone())
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.handler, self.message_id)
    }
}

/// A stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub status: IdempotencyStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// What to do with an event given its stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyDecision {
    /// Post. `prior_attempts` failed attempts are on record.
    Proceed { prior_attempts: u32 },
    /// Already applied; acknowledge without writing.
    AlreadySucceeded,
    /// Failed too many times; stop retrying.
    RetriesExhausted { attempts: u32 },
}

impl IdempotencyDecision {
    /// Decides from the stored key, if any.
    #[must_use]
    pub fn decide(existing: Option<&IdempotencyRecord>, max_attempts: u32) -> Self {
        match existing {
            None => Self::Proceed { prior_attempts: 0 },
            Some(record) => match record.status {
                IdempotencyStatus::Succeeded => Self::AlreadySucceeded,
                IdempotencyStatus::Failed if record.attempts >= max_attempts => {
                    Self::RetriesExhausted {
                        attempts: record.attempts,
                    }
                }
                IdempotencyStatus::Failed => Self::Proceed {
                    prior_attempts: record.attempts,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(attempts: u32) -> IdempotencyRecord {
        IdempotencyRecord {
            status: IdempotencyStatus::Failed,
            attempts,
            last_error: Some("boom".to_string()),
        }
    }

    #[test]
    fn test_missing_key_proceeds() {
        assert_eq!(
            IdempotencyDecision::decide(None, 10),
            IdempotencyDecision::Proceed { prior_attempts: 0 }
        );
    }

    #[test]
    fn test_succeeded_short_circuits() {
        let record = IdempotencyRecord {
            status: IdempotencyStatus::Succeeded,
            attempts: 0,
            last_error: None,
        };
        assert_eq!(
            IdempotencyDecision::decide(Some(&record), 10),
            IdempotencyDecision::AlreadySucceeded
        );
    }

    #[test]
    fn test_failed_allows_bounded_retry() {
        assert_eq!(
            IdempotencyDecision::decide(Some(&failed(9)), 10),
            IdempotencyDecision::Proceed { prior_attempts: 9 }
        );
        assert_eq!(
            IdempotencyDecision::decide(Some(&failed(10)), 10),
            IdempotencyDecision::RetriesExhausted { attempts: 10 }
        );
    }

    #[test]
    fn test_key_display() {
        let tenant = TenantId::new();
        let key = IdempotencyKey::new(tenant, ReferenceType::Invoice, "m1");
        assert_eq!(key.to_string(), format!("{tenant}/Invoice/m1"));
    }
}
