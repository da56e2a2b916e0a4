use super::account::{AccountNumber, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a fresh id. Version 7 ids sort roughly chronologically.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied token identifying a logical operation, so that a
/// repeated submission is deduplicated rather than re-executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Transfer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Transfer => "transfer",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Failed,
    Blocked,
    Pending,
}

/// The only legal rewrites of a `Pending` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingResolution {
    Succeeded,
    Failed,
}

impl From<PendingResolution> for EntryStatus {
    fn from(resolution: PendingResolution) -> Self {
        match resolution {
            PendingResolution::Succeeded => Self::Success,
            PendingResolution::Failed => Self::Failed,
        }
    }
}

/// One immutable record per money-movement attempt, whatever its outcome.
///
/// Entries with a terminal status are never mutated; a `Pending` entry is
/// rewritten exactly once, by the approval workflow.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    /// `None` when the attempt failed before an account was resolved.
    pub account_number: Option<AccountNumber>,
    /// Signed amount: credits positive, debits negative.
    pub amount: Decimal,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: IdempotencyKey,
    pub status: EntryStatus,
    /// Destination account number; transfers only.
    pub counterparty: Option<AccountNumber>,
}

impl LedgerEntry {
    /// Starts the record for one attempt. Id and timestamp are assigned
    /// here; the status is whatever terminal (or pending) state the
    /// orchestrator reached.
    pub fn new(
        user_id: UserId,
        kind: OperationKind,
        amount: Decimal,
        idempotency_key: IdempotencyKey,
        status: EntryStatus,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            account_number: None,
            amount,
            kind,
            timestamp: Utc::now(),
            idempotency_key,
            status,
            counterparty: None,
        }
    }

    pub fn with_account(mut self, number: AccountNumber) -> Self {
        self.account_number = Some(number);
        self
    }

    pub fn with_counterparty(mut self, number: AccountNumber) -> Self {
        self.counterparty = Some(number);
        self
    }
}
