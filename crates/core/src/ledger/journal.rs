//! Journal entries and their account-transaction legs.

use chrono::NaiveDate;
use ledgerline_shared::types::{AccountTransactionId, JournalId, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::ReferenceType;
use crate::ledger::error::LedgerError;

/// Entry type: either Debit or Credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Debit,
    Credit,
}

/// One requested leg, as carried in an event's `journal` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: Uuid,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub credit: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JournalLine {
    #[must_use]
    pub fn debit(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
            description: None,
        }
    }

    #[must_use]
    pub fn credit(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
            description: None,
        }
    }

    /// Side of the leg, if exactly one side is non-zero.
    #[must_use]
    pub fn entry_type(&self) -> Option<EntryType> {
        match (self.debit.is_zero(), self.credit.is_zero()) {
            (false, true) => Some(EntryType::Debit),
            (true, false) => Some(EntryType::Credit),
            _ => None,
        }
    }
}

/// Totals of a validated journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// A journal about to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalDraft {
    pub tenant_id: TenantId,
    pub branch_id: Option<Uuid>,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub transaction_date: NaiveDate,
    pub currency: String,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalDraft {
    /// Validates legs and balance.
    pub fn validate(&self) -> Result<JournalTotals, LedgerError> {
        if self.lines.len() < 2 {
            return Err(LedgerError::InsufficientLines);
        }

        let mut debit = Decimal::ZERO;
        let mut credit = Decimal::ZERO;
        for (index, line) in self.lines.iter().enumerate() {
            if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
                return Err(LedgerError::NegativeAmount);
            }
            if line.entry_type().is_none() {
                return Err(LedgerError::InvalidLine(index));
            }
            debit = debit
                .checked_add(line.debit)
                .ok_or(LedgerError::Overflow("journal debit total"))?;
            credit = credit
                .checked_add(line.credit)
                .ok_or(LedgerError::Overflow("journal credit total"))?;
        }

        if debit != credit {
            return Err(LedgerError::UnbalancedJournal { debit, credit });
        }
        Ok(JournalTotals { debit, credit })
    }

    /// Assigns ids and turns the draft into rows ready to insert.
    pub fn into_posted(self) -> Result<PostedJournal, LedgerError> {
        self.validate()?;
        let id = JournalId::new();
        let lines = self
            .lines
            .into_iter()
            .map(|line| PostedLine {
                id: AccountTransactionId::new(),
                journal_id: id,
                account_id: line.account_id,
                debit: line.debit,
                credit: line.credit,
                description: line.description,
                is_reversal: false,
                reverses_id: None,
                reversed_by_id: None,
            })
            .collect();
        Ok(PostedJournal {
            id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            transaction_date: self.transaction_date,
            currency: self.currency,
            description: self.description,
            is_reversal: false,
            reverses_journal_id: None,
            reversed_by_journal_id: None,
            lines,
        })
    }
}

/// A stored account transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedLine {
    pub id: AccountTransactionId,
    pub journal_id: JournalId,
    pub account_id: Uuid,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
    pub is_reversal: bool,
    pub reverses_id: Option<AccountTransactionId>,
    pub reversed_by_id: Option<AccountTransactionId>,
}

impl PostedLine {
    /// Not reversed and not itself a reversal.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_reversal && self.reversed_by_id.is_none()
    }

    /// Signed effect: debit minus credit.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A stored journal with its legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedJournal {
    pub id: JournalId,
    pub tenant_id: TenantId,
    pub branch_id: Option<Uuid>,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub transaction_date: NaiveDate,
    pub currency: String,
    pub description: Option<String>,
    pub is_reversal: bool,
    pub reverses_journal_id: Option<JournalId>,
    pub reversed_by_journal_id: Option<JournalId>,
    pub lines: Vec<PostedLine>,
}

impl PostedJournal {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_reversal && self.reversed_by_journal_id.is_none()
    }

    /// Debit minus credit over all legs.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.lines.iter().map(PostedLine::net).sum()
    }
}
