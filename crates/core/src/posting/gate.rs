//! Posting gate: period-lock rules.
//!
//! Rules, in order:
//! - `Reconcile` events bypass the gate
//! - a date on or before the business lock date is rejected
//! - a date inside a CLOSED period is rejected
//! - a date inside a SOFT_CLOSE period is allowed only for the system actor
//! - everything else is allowed
//!
//! A rejection is permanent. The event is acknowledged and never retried.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::ProcessingContext;
use crate::event::ReferenceType;
use crate::outbox::UnknownStatus;

/// Accounting period status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    /// Anyone can post.
    Open,
    /// Only the system actor can post.
    SoftClose,
    /// No one can post.
    Closed,
}

impl PeriodStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::SoftClose => "SOFT_CLOSE",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "SOFT_CLOSE" => Ok(Self::SoftClose),
            "CLOSED" => Ok(Self::Closed),
            other => Err(UnknownStatus {
                kind: "period",
                value: other.to_string(),
            }),
        }
    }
}

/// An accounting period, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
}

impl AccountingPeriod {
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// A tenant's period-lock configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodLockConfig {
    /// Every date on or before this is closed.
    pub lock_date: Option<NaiveDate>,
    pub periods: Vec<AccountingPeriod>,
}

/// Why the gate rejected an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateRejection {
    #[error("posting gate: {date} is on or before the lock date {lock_date}")]
    LockDate { date: NaiveDate, lock_date: NaiveDate },

    #[error("posting gate: {date} falls in closed period {start}..{end}")]
    PeriodClosed {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("posting gate: {date} falls in soft-closed period {start}..{end}")]
    PeriodSoftClosed {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// Outcome of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// The reference type is exempt from period rules.
    Bypass,
    Reject(GateRejection),
}

/// Stateless gate.
pub struct PostingGate;

impl PostingGate {
    /// Decides whether an event dated `date` may post.
    #[must_use]
    pub fn evaluate(
        reference_type: ReferenceType,
        date: NaiveDate,
        ctx: &ProcessingContext,
        config: &PeriodLockConfig,
    ) -> GateDecision {
        if reference_type.bypasses_posting_gate() {
            return GateDecision::Bypass;
        }

        if let Some(lock_date) = config.lock_date
            && date <= lock_date
        {
            return GateDecision::Reject(GateRejection::LockDate { date, lock_date });
        }

        // Closed wins over soft-close if periods overlap.
        let mut soft_closed = None;
        for period in config.periods.iter().filter(|p| p.contains(date)) {
            match period.status {
                PeriodStatus::Closed => {
                    return GateDecision::Reject(GateRejection::PeriodClosed {
                        date,
                        start: period.start_date,
                        end: period.end_date,
                    });
                }
                PeriodStatus::SoftClose => soft_closed = Some(period),
                PeriodStatus::Open => {}
            }
        }

        match soft_closed {
            Some(period) if !ctx.is_system() => GateDecision::Reject(GateRejection::PeriodSoftClosed {
                date,
                start: period.start_date,
                end: period.end_date,
            }),
            _ => GateDecision::Allow,
        }
    }
}
