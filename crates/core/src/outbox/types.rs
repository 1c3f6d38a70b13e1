//! Status enums stored on outbox rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A status column held a value outside its closed set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Publish lifecycle of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStatus {
    /// Written by the originating transaction, not yet claimed.
    Pending,
    /// Claimed by a dispatcher.
    Publishing,
    /// Acknowledged by the delivery channel.
    Sent,
    /// Last publish attempt failed.
    Failed,
}

impl PublishStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Publishing => "PUBLISHING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PUBLISHING" => Ok(Self::Publishing),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "publish",
                value: other.to_string(),
            }),
        }
    }
}

/// Processing lifecycle of an outbox record. `None` on the row means new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Claimed by a processor.
    Processing,
    /// Last attempt failed; retried after `next_process_attempt_at`.
    Failed,
    /// Applied, dropped as a duplicate, or rejected by the posting gate.
    Succeeded,
    /// Attempts exhausted.
    Dead,
}

impl ProcessingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Failed => "FAILED",
            Self::Succeeded => "SUCCEEDED",
            Self::Dead => "DEAD",
        }
    }

    /// SUCCEEDED and DEAD never change once reached.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Dead)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "FAILED" => Ok(Self::Failed),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "DEAD" => Ok(Self::Dead),
            other => Err(UnknownStatus {
                kind: "processing",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_parse_back() {
        for s in [
            PublishStatus::Pending,
            PublishStatus::Publishing,
            PublishStatus::Sent,
            PublishStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<PublishStatus>().unwrap(), s);
        }
        for s in [
            ProcessingStatus::Processing,
            ProcessingStatus::Failed,
            ProcessingStatus::Succeeded,
            ProcessingStatus::Dead,
        ] {
            assert_eq!(s.as_str().parse::<ProcessingStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_status() {
        let err = "DONE".parse::<ProcessingStatus>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown processing status: DONE");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ProcessingStatus::Succeeded.is_terminal());
        assert!(ProcessingStatus::Dead.is_terminal());
        assert!(!ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }
}
