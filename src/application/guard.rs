use crate::domain::entry::{IdempotencyKey, LedgerEntry};
use crate::domain::ports::SharedEntryStore;
use crate::error::Result;

/// Short-circuits retried requests before any funds move.
///
/// Any prior entry claims its key, whatever the status: a retry of a
/// failed or blocked attempt echoes the recorded outcome instead of
/// re-running the operation. The entry store's key uniqueness backs
/// this check for requests that race past it concurrently.
pub struct IdempotencyGuard {
    entries: SharedEntryStore,
}

impl IdempotencyGuard {
    pub fn new(entries: SharedEntryStore) -> Self {
        Self { entries }
    }

    /// Returns the entry already recorded under `key`, if any.
    pub async fn check(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>> {
        Ok(self.entries.find_by_key(key).await?)
    }
}
