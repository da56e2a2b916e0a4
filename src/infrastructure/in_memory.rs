use crate::domain::account::{Account, Balance, UserId};
use crate::domain::entry::{EntryId, EntryStatus, IdempotencyKey, LedgerEntry, PendingResolution};
use crate::domain::ports::{AccountFilter, AccountPatch, AccountStore, EntryFilter, EntryStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for accounts.
///
/// Conditional updates and increments take the write lock for their full
/// read-evaluate-mutate cycle, giving the same single-record atomicity
/// the production document store provides.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<UserId, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> StoreResult<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.user_id.clone(), account);
        Ok(())
    }

    async fn find_one(&self, filter: AccountFilter) -> StoreResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| filter.matches(a)).cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.as_str().cmp(b.user_id.as_str()));
        Ok(all)
    }

    async fn update_one(&self, filter: AccountFilter, patch: AccountPatch) -> StoreResult<u64> {
        let mut accounts = self.accounts.write().await;
        match accounts.values_mut().find(|a| filter.matches(a)) {
            Some(account) => {
                patch.apply(account);
                account.version += 1;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn increment_balance(&self, filter: AccountFilter, delta: Decimal) -> StoreResult<u64> {
        let mut accounts = self.accounts.write().await;
        match accounts.values_mut().find(|a| filter.matches(a)) {
            Some(account) => {
                account.balance += Balance::new(delta);
                account.version += 1;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[derive(Default)]
struct EntryTable {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<EntryId, usize>,
    by_key: HashMap<IdempotencyKey, usize>,
}

/// A thread-safe in-memory store for ledger entries.
///
/// Enforces the idempotency-key uniqueness constraint on insert, the
/// same way a unique index does on the production store.
#[derive(Default, Clone)]
pub struct InMemoryEntryStore {
    table: Arc<RwLock<EntryTable>>,
}

impl InMemoryEntryStore {
    /// Creates a new, empty in-memory entry store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn insert(&self, entry: LedgerEntry) -> StoreResult<()> {
        let mut table = self.table.write().await;
        if table.by_key.contains_key(&entry.idempotency_key) {
            return Err(StoreError::DuplicateKey);
        }
        let index = table.entries.len();
        table.by_id.insert(entry.id, index);
        table.by_key.insert(entry.idempotency_key.clone(), index);
        table.entries.push(entry);
        Ok(())
    }

    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).map(|&i| table.entries[i].clone()))
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> StoreResult<Option<LedgerEntry>> {
        let table = self.table.read().await;
        Ok(table.by_key.get(key).map(|&i| table.entries[i].clone()))
    }

    async fn find_many(&self, filter: EntryFilter) -> StoreResult<Vec<LedgerEntry>> {
        let table = self.table.read().await;
        let mut matched: Vec<LedgerEntry> = table
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }

    async fn resolve_pending(
        &self,
        id: EntryId,
        resolution: PendingResolution,
    ) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let Some(&index) = table.by_id.get(&id) else {
            return Ok(0);
        };
        let entry = &mut table.entries[index];
        if entry.status != EntryStatus::Pending {
            return Ok(0);
        }
        entry.status = resolution.into();
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountNumber;
    use crate::domain::entry::OperationKind;
    use rust_decimal_macros::dec;

    fn account(user: &str, number: &str, balance: Decimal) -> Account {
        let mut account = Account::open(UserId::new(user), AccountNumber::new(number));
        account.balance = Balance::new(balance);
        account
    }

    fn entry(user: &str, key: &str, status: EntryStatus) -> LedgerEntry {
        LedgerEntry::new(
            UserId::new(user),
            OperationKind::Withdraw,
            dec!(-10.0),
            IdempotencyKey::new(key),
            status,
        )
    }

    #[tokio::test]
    async fn test_conditional_update_respects_predicate() {
        let store = InMemoryAccountStore::new();
        store
            .insert(account("alice", "1111111111", dec!(100.0)))
            .await
            .unwrap();
        let alice = UserId::new("alice");

        // Predicate holds: unlocked with sufficient funds.
        let matched = store
            .update_one(
                AccountFilter::by_user(&alice)
                    .unlocked()
                    .with_min_balance(dec!(100.0)),
                AccountPatch::lock(),
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        // Now locked, the same predicate matches nothing.
        let matched = store
            .update_one(
                AccountFilter::by_user(&alice)
                    .unlocked()
                    .with_min_balance(dec!(1.0)),
                AccountPatch::lock(),
            )
            .await
            .unwrap();
        assert_eq!(matched, 0);

        let stored = store
            .find_one(AccountFilter::by_user(&alice))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.locked);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_increment_balance_is_signed() {
        let store = InMemoryAccountStore::new();
        store
            .insert(account("alice", "1111111111", dec!(50.0)))
            .await
            .unwrap();
        let alice = UserId::new("alice");

        store
            .increment_balance(AccountFilter::by_user(&alice), dec!(25.0))
            .await
            .unwrap();
        store
            .increment_balance(AccountFilter::by_user(&alice), dec!(-30.0))
            .await
            .unwrap();

        let stored = store
            .find_one(AccountFilter::by_user(&alice))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.balance, Balance::new(dec!(45.0)));

        let missing = store
            .increment_balance(AccountFilter::by_user(&UserId::new("bob")), dec!(1.0))
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_find_one_by_number() {
        let store = InMemoryAccountStore::new();
        store
            .insert(account("alice", "1111111111", dec!(0)))
            .await
            .unwrap();
        store
            .insert(account("bob", "2222222222", dec!(0)))
            .await
            .unwrap();

        let found = store
            .find_one(AccountFilter::by_number(&AccountNumber::new("2222222222")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("bob"));
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let store = InMemoryEntryStore::new();
        store
            .insert(entry("alice", "w-1", EntryStatus::Success))
            .await
            .unwrap();

        let result = store.insert(entry("alice", "w-1", EntryStatus::Failed)).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey)));

        // The original record is untouched.
        let stored = store
            .find_by_key(&IdempotencyKey::new("w-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, EntryStatus::Success);
    }

    #[tokio::test]
    async fn test_find_many_orders_by_timestamp() {
        let store = InMemoryEntryStore::new();
        let mut older = entry("alice", "w-1", EntryStatus::Success);
        older.timestamp -= chrono::Duration::hours(2);
        let newer = entry("alice", "w-2", EntryStatus::Success);

        // Insert newest first; read-back must still be ascending.
        store.insert(newer.clone()).await.unwrap();
        store.insert(older.clone()).await.unwrap();

        let all = store
            .find_many(EntryFilter::by_user(&UserId::new("alice")))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, older.id);
        assert_eq!(all[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_resolve_pending_is_single_shot() {
        let store = InMemoryEntryStore::new();
        let pending = entry("alice", "w-1", EntryStatus::Pending);
        store.insert(pending.clone()).await.unwrap();

        let matched = store
            .resolve_pending(pending.id, PendingResolution::Succeeded)
            .await
            .unwrap();
        assert_eq!(matched, 1);

        // A second resolution finds no pending record.
        let matched = store
            .resolve_pending(pending.id, PendingResolution::Failed)
            .await
            .unwrap();
        assert_eq!(matched, 0);

        let stored = store.find_by_id(pending.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Success);
    }
}
