use super::account::{Account, AccountNumber, UserId};
use super::entry::{
    EntryId, EntryStatus, IdempotencyKey, LedgerEntry, OperationKind, PendingResolution,
};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Predicate evaluated atomically by the account store.
///
/// All present criteria must hold for a record to match. The lock
/// manager relies on `locked` plus `min_balance` being checked in the
/// same store operation as the patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountFilter {
    pub user_id: Option<UserId>,
    pub number: Option<AccountNumber>,
    pub locked: Option<bool>,
    pub min_balance: Option<Decimal>,
}

impl AccountFilter {
    pub fn by_user(user_id: &UserId) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            ..Self::default()
        }
    }

    pub fn by_number(number: &AccountNumber) -> Self {
        Self {
            number: Some(number.clone()),
            ..Self::default()
        }
    }

    pub fn unlocked(mut self) -> Self {
        self.locked = Some(false);
        self
    }

    pub fn with_min_balance(mut self, min: Decimal) -> Self {
        self.min_balance = Some(min);
        self
    }

    pub fn matches(&self, account: &Account) -> bool {
        if let Some(user_id) = &self.user_id
            && account.user_id != *user_id
        {
            return false;
        }
        if let Some(number) = &self.number
            && account.number != *number
        {
            return false;
        }
        if let Some(locked) = self.locked
            && account.locked != locked
        {
            return false;
        }
        if let Some(min) = self.min_balance
            && account.balance.0 < min
        {
            return false;
        }
        true
    }
}

/// Field updates applied when an [`AccountFilter`] matches.
///
/// Only the lock flag is patchable. Balances move exclusively through
/// [`AccountStore::increment_balance`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub locked: Option<bool>,
}

impl AccountPatch {
    pub fn lock() -> Self {
        Self { locked: Some(true) }
    }

    pub fn unlock() -> Self {
        Self {
            locked: Some(false),
        }
    }

    pub fn apply(&self, account: &mut Account) {
        if let Some(locked) = self.locked {
            account.locked = locked;
        }
    }
}

/// Query over ledger entries: equality criteria plus a half-open
/// `[since, until)` timestamp window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub user_id: Option<UserId>,
    pub kinds: Option<Vec<OperationKind>>,
    pub status: Option<EntryStatus>,
    pub counterparty: Option<AccountNumber>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn by_user(user_id: &UserId) -> Self {
        Self {
            user_id: Some(user_id.clone()),
            ..Self::default()
        }
    }

    pub fn with_kinds(mut self, kinds: &[OperationKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_counterparty(mut self, number: &AccountNumber) -> Self {
        self.counterparty = Some(number.clone());
        self
    }

    pub fn after(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn before(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(user_id) = &self.user_id
            && entry.user_id != *user_id
        {
            return false;
        }
        if let Some(kinds) = &self.kinds
            && !kinds.contains(&entry.kind)
        {
            return false;
        }
        if let Some(status) = self.status
            && entry.status != status
        {
            return false;
        }
        if let Some(counterparty) = &self.counterparty
            && entry.counterparty.as_ref() != Some(counterparty)
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        if let Some(until) = self.until
            && entry.timestamp >= until
        {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts a freshly opened account record.
    async fn insert(&self, account: Account) -> StoreResult<()>;

    async fn find_one(&self, filter: AccountFilter) -> StoreResult<Option<Account>>;

    /// Returns every account, ordered by user id.
    async fn find_all(&self) -> StoreResult<Vec<Account>>;

    /// Applies the patch to the record matching the filter, atomically.
    /// Returns the number of records modified (0 or 1).
    async fn update_one(&self, filter: AccountFilter, patch: AccountPatch) -> StoreResult<u64>;

    /// Atomically adds `delta` to the balance of the matching record.
    /// Returns the number of records modified (0 or 1).
    async fn increment_balance(&self, filter: AccountFilter, delta: Decimal) -> StoreResult<u64>;
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Appends one entry. Fails with [`StoreError::DuplicateKey`] when the
    /// idempotency key is already claimed by an existing entry.
    ///
    /// [`StoreError::DuplicateKey`]: crate::error::StoreError::DuplicateKey
    async fn insert(&self, entry: LedgerEntry) -> StoreResult<()>;

    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<LedgerEntry>>;

    async fn find_by_key(&self, key: &IdempotencyKey) -> StoreResult<Option<LedgerEntry>>;

    /// Returns matching entries in ascending timestamp order.
    async fn find_many(&self, filter: EntryFilter) -> StoreResult<Vec<LedgerEntry>>;

    /// Rewrites a `Pending` entry into its terminal status, atomically.
    /// Returns the number of entries modified (0 or 1).
    async fn resolve_pending(
        &self,
        id: EntryId,
        resolution: PendingResolution,
    ) -> StoreResult<u64>;
}

/// Opaque token describing the authenticated caller. Forwarded to the
/// audit sink untouched with every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext(String);

impl AuditContext {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Boundary to the external audit-log collaborator. One event is emitted
/// per terminal transition; failures inside the sink never fail the
/// operation that emitted the event.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &str, ctx: &AuditContext);
}

pub type SharedAccountStore = Arc<dyn AccountStore>;
pub type SharedEntryStore = Arc<dyn EntryStore>;
pub type SharedAuditSink = Arc<dyn AuditSink>;
