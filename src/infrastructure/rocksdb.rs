use crate::domain::account::Account;
use crate::domain::entry::{EntryId, EntryStatus, IdempotencyKey, LedgerEntry, PendingResolution};
use crate::domain::ports::{AccountFilter, AccountPatch, AccountStore, EntryFilter, EntryStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for account records, keyed by user id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for ledger entries, keyed by entry id.
pub const CF_ENTRIES: &str = "entries";
/// Column Family mapping idempotency keys to entry ids.
pub const CF_ENTRY_KEYS: &str = "entry_keys";

/// A persistent store implementation using RocksDB.
///
/// Handles storage for both `Account` and `LedgerEntry` records using
/// separate Column Families. RocksDB offers no native conditional
/// update, so every read-evaluate-mutate sequence runs under a
/// store-wide mutex; single point reads and scans go straight to the db.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path,
    /// ensuring the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Options::default()),
            ColumnFamilyDescriptor::new(CF_ENTRY_KEYS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("column family {name} not found")))
    }

    fn scan_account(&self, filter: &AccountFilter) -> StoreResult<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;

        // Point lookup when the filter pins the owning user.
        if let Some(user_id) = &filter.user_id {
            let Some(bytes) = self.db.get_cf(cf, user_id.as_str().as_bytes())? else {
                return Ok(None);
            };
            let account: Account = serde_json::from_slice(&bytes)?;
            return Ok(filter.matches(&account).then_some(account));
        }

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let account: Account = serde_json::from_slice(&value)?;
            if filter.matches(&account) {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    fn put_account(&self, account: &Account) -> StoreResult<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let value = serde_json::to_vec(account)?;
        self.db
            .put_cf(cf, account.user_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn get_entry(&self, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        match self.db.get_cf(cf, id.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let cf = self.cf(CF_ENTRIES)?;
        let value = serde_json::to_vec(entry)?;
        self.db.put_cf(cf, entry.id.to_string().as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn insert(&self, account: Account) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        self.put_account(&account)
    }

    async fn find_one(&self, filter: AccountFilter) -> StoreResult<Option<Account>> {
        self.scan_account(&filter)
    }

    async fn find_all(&self) -> StoreResult<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        // Keys are user ids, so the iteration order is already by user.
        Ok(accounts)
    }

    async fn update_one(&self, filter: AccountFilter, patch: AccountPatch) -> StoreResult<u64> {
        let _guard = self.write_guard.lock().await;
        let Some(mut account) = self.scan_account(&filter)? else {
            return Ok(0);
        };
        patch.apply(&mut account);
        account.version += 1;
        self.put_account(&account)?;
        Ok(1)
    }

    async fn increment_balance(&self, filter: AccountFilter, delta: Decimal) -> StoreResult<u64> {
        let _guard = self.write_guard.lock().await;
        let Some(mut account) = self.scan_account(&filter)? else {
            return Ok(0);
        };
        account.balance.0 += delta;
        account.version += 1;
        self.put_account(&account)?;
        Ok(1)
    }
}

#[async_trait]
impl EntryStore for RocksDBStore {
    async fn insert(&self, entry: LedgerEntry) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        let keys_cf = self.cf(CF_ENTRY_KEYS)?;
        let key_bytes = entry.idempotency_key.as_str().as_bytes();
        if self.db.get_pinned_cf(keys_cf, key_bytes)?.is_some() {
            return Err(StoreError::DuplicateKey);
        }
        self.put_entry(&entry)?;
        self.db
            .put_cf(keys_cf, key_bytes, entry.id.to_string().as_bytes())?;
        Ok(())
    }

    async fn find_by_id(&self, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        self.get_entry(id)
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> StoreResult<Option<LedgerEntry>> {
        let keys_cf = self.cf(CF_ENTRY_KEYS)?;
        let Some(id_bytes) = self.db.get_cf(keys_cf, key.as_str().as_bytes())? else {
            return Ok(None);
        };
        let entries_cf = self.cf(CF_ENTRIES)?;
        match self.db.get_cf(entries_cf, &id_bytes)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_many(&self, filter: EntryFilter) -> StoreResult<Vec<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        let mut matched = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&value)?;
            if filter.matches(&entry) {
                matched.push(entry);
            }
        }
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }

    async fn resolve_pending(
        &self,
        id: EntryId,
        resolution: PendingResolution,
    ) -> StoreResult<u64> {
        let _guard = self.write_guard.lock().await;
        let Some(mut entry) = self.get_entry(id)? else {
            return Ok(0);
        };
        if entry.status != EntryStatus::Pending {
            return Ok(0);
        }
        entry.status = resolution.into();
        self.put_entry(&entry)?;
        Ok(1)
    }
}
