//! `SeaORM` active enums stored as text columns.
//!
//! Each enum mirrors a status type in `ledgerline-core`; the `From` impls
//! convert at the repository boundary.

use ledgerline_core::outbox;
use ledgerline_core::posting;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Publish lifecycle of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PublishStatus {
    /// Waiting for the dispatcher.
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Claimed by a dispatcher.
    #[sea_orm(string_value = "PUBLISHING")]
    Publishing,
    /// Acknowledged by the delivery channel.
    #[sea_orm(string_value = "SENT")]
    Sent,
    /// Last publish failed.
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Processing lifecycle of an outbox record. `NULL` in the column means new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ProcessingStatus {
    /// Claimed by a processor.
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    /// Last attempt failed; retried later.
    #[sea_orm(string_value = "FAILED")]
    Failed,
    /// Posted, duplicate, or permanently dropped.
    #[sea_orm(string_value = "SUCCEEDED")]
    Succeeded,
    /// Attempts exhausted.
    #[sea_orm(string_value = "DEAD")]
    Dead,
}

/// Stored outcome of an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum IdempotencyStatus {
    /// Applied.
    #[sea_orm(string_value = "SUCCEEDED")]
    Succeeded,
    /// Failed; may be retried while attempts remain.
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

/// Accounting period status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PeriodStatus {
    /// Open for posting.
    #[sea_orm(string_value = "OPEN")]
    Open,
    /// Only the system actor may post.
    #[sea_orm(string_value = "SOFT_CLOSE")]
    SoftClose,
    /// Nobody may post.
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

/// Compensation request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum CompensationStatus {
    /// Waiting for the document owner to revert the document.
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Document reverted.
    #[sea_orm(string_value = "DONE")]
    Done,
}

impl From<outbox::PublishStatus> for PublishStatus {
    fn from(status: outbox::PublishStatus) -> Self {
        match status {
            outbox::PublishStatus::Pending => Self::Pending,
            outbox::PublishStatus::Publishing => Self::Publishing,
            outbox::PublishStatus::Sent => Self::Sent,
            outbox::PublishStatus::Failed => Self::Failed,
        }
    }
}

impl From<PublishStatus> for outbox::PublishStatus {
    fn from(status: PublishStatus) -> Self {
        match status {
            PublishStatus::Pending => Self::Pending,
            PublishStatus::Publishing => Self::Publishing,
            PublishStatus::Sent => Self::Sent,
            PublishStatus::Failed => Self::Failed,
        }
    }
}

impl From<outbox::ProcessingStatus> for ProcessingStatus {
    fn from(status: outbox::ProcessingStatus) -> Self {
        match status {
            outbox::ProcessingStatus::Processing => Self::Processing,
            outbox::ProcessingStatus::Failed => Self::Failed,
            outbox::ProcessingStatus::Succeeded => Self::Succeeded,
            outbox::ProcessingStatus::Dead => Self::Dead,
        }
    }
}

impl From<ProcessingStatus> for outbox::ProcessingStatus {
    fn from(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Processing => Self::Processing,
            ProcessingStatus::Failed => Self::Failed,
            ProcessingStatus::Succeeded => Self::Succeeded,
            ProcessingStatus::Dead => Self::Dead,
        }
    }
}

impl From<posting::IdempotencyStatus> for IdempotencyStatus {
    fn from(status: posting::IdempotencyStatus) -> Self {
        match status {
            posting::IdempotencyStatus::Succeeded => Self::Succeeded,
            posting::IdempotencyStatus::Failed => Self::Failed,
        }
    }
}

impl From<IdempotencyStatus> for posting::IdempotencyStatus {
    fn from(status: IdempotencyStatus) -> Self {
        match status {
            IdempotencyStatus::Succeeded => Self::Succeeded,
            IdempotencyStatus::Failed => Self::Failed,
        }
    }
}

impl From<PeriodStatus> for posting::PeriodStatus {
    fn from(status: PeriodStatus) -> Self {
        match status {
            PeriodStatus::Open => Self::Open,
            PeriodStatus::SoftClose => Self::SoftClose,
            PeriodStatus::Closed => Self::Closed,
        }
    }
}

impl From<posting::PeriodStatus> for PeriodStatus {
    fn from(status: posting::PeriodStatus) -> Self {
        match status {
            posting::PeriodStatus::Open => Self::Open,
            posting::PeriodStatus::SoftClose => Self::SoftClose,
            posting::PeriodStatus::Closed => Self::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn test_status_strings_match_core() {
        for status in PublishStatus::iter() {
            let core: outbox::PublishStatus = status.into();
            assert_eq!(status.to_value(), core.as_str());
        }
        for status in ProcessingStatus::iter() {
            let core: outbox::ProcessingStatus = status.into();
            assert_eq!(status.to_value(), core.as_str());
        }
        for status in IdempotencyStatus::iter() {
            let core: posting::IdempotencyStatus = status.into();
            assert_eq!(status.to_value(), core.as_str());
        }
    }

    #[test]
    fn test_period_status_round_trip() {
        for status in PeriodStatus::iter() {
            let core: posting::PeriodStatus = status.into();
            assert_eq!(PeriodStatus::from(core), status);
        }
    }
}
