use crate::domain::account::UserId;
use crate::domain::ports::{AccountFilter, AccountPatch, SharedAccountStore};
use crate::error::Result;
use rust_decimal::Decimal;
use std::future::Future;

/// Rejection reason when a debit lock cannot be taken. Acquisition
/// failure does not distinguish a held lock from a short balance, so
/// the reason names both.
pub const LOCK_CONFLICT: &str = "Insufficient balance or account locked";
/// Same conflict, worded for the sending side of a transfer.
pub const SENDER_LOCK_CONFLICT: &str = "Sender account is currently locked or insufficient funds";

/// Outcome of running a closure under the account debit lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt<T> {
    /// Lock held, body ran, lock released.
    Executed(T),
    /// The conditional update matched nothing; the body never ran.
    Contended,
}

/// Per-account mutual exclusion for debits, built on the store's
/// conditional update.
///
/// The acquire predicate checks `unlocked AND balance >= required` in
/// the same atomic operation that flips the lock flag, which closes the
/// check-then-act race on the balance. Deposits bypass this entirely;
/// a lone atomic increment needs no exclusion.
pub struct LockManager {
    accounts: SharedAccountStore,
}

impl LockManager {
    pub fn new(accounts: SharedAccountStore) -> Self {
        Self { accounts }
    }

    /// Attempts to take the debit lock. `false` means the predicate did
    /// not hold, without telling which half failed.
    pub async fn acquire(&self, user_id: &UserId, required: Decimal) -> Result<bool> {
        let matched = self
            .accounts
            .update_one(
                AccountFilter::by_user(user_id)
                    .unlocked()
                    .with_min_balance(required),
                AccountPatch::lock(),
            )
            .await?;
        Ok(matched == 1)
    }

    /// Unconditionally clears the lock flag.
    pub async fn release(&self, user_id: &UserId) -> Result<()> {
        self.accounts
            .update_one(AccountFilter::by_user(user_id), AccountPatch::unlock())
            .await?;
        Ok(())
    }

    /// Runs `body` with the debit lock held, releasing it on every exit
    /// path. A body error takes precedence over a release error; the
    /// release failure is still logged so a stuck lock is visible.
    pub async fn with_debit_lock<T, F, Fut>(
        &self,
        user_id: &UserId,
        required: Decimal,
        body: F,
    ) -> Result<LockAttempt<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.acquire(user_id, required).await? {
            return Ok(LockAttempt::Contended);
        }

        let outcome = body().await;

        match (outcome, self.release(user_id).await) {
            (Ok(value), Ok(())) => Ok(LockAttempt::Executed(value)),
            (Err(body_err), Ok(())) => Err(body_err),
            (outcome, Err(release_err)) => {
                tracing::error!(
                    user = %user_id,
                    error = %release_err,
                    "failed to release account lock"
                );
                Err(outcome.err().unwrap_or(release_err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, AccountNumber, Balance};
    use crate::domain::ports::AccountStore;
    use crate::error::LedgerError;
    use crate::infrastructure::in_memory::InMemoryAccountStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn store_with(user: &str, balance: Decimal) -> Arc<InMemoryAccountStore> {
        let store = Arc::new(InMemoryAccountStore::new());
        let mut account = Account::open(UserId::new(user), AccountNumber::new("1111111111"));
        account.balance = Balance::new(balance);
        store.insert(account).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = store_with("alice", dec!(100)).await;
        let locks = LockManager::new(store.clone());
        let alice = UserId::new("alice");

        assert!(locks.acquire(&alice, dec!(50)).await.unwrap());
        assert!(!locks.acquire(&alice, dec!(50)).await.unwrap());

        locks.release(&alice).await.unwrap();
        assert!(locks.acquire(&alice, dec!(50)).await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_checks_balance_in_same_operation() {
        let store = store_with("alice", dec!(40)).await;
        let locks = LockManager::new(store.clone());
        let alice = UserId::new("alice");

        assert!(!locks.acquire(&alice, dec!(50)).await.unwrap());

        let account = store
            .find_one(AccountFilter::by_user(&alice))
            .await
            .unwrap()
            .unwrap();
        assert!(!account.locked);
    }

    #[tokio::test]
    async fn test_scoped_lock_releases_after_body() {
        let store = store_with("alice", dec!(100)).await;
        let locks = LockManager::new(store.clone());
        let alice = UserId::new("alice");

        let attempt = locks
            .with_debit_lock(&alice, dec!(50), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(attempt, LockAttempt::Executed(7));

        let account = store
            .find_one(AccountFilter::by_user(&alice))
            .await
            .unwrap()
            .unwrap();
        assert!(!account.locked);
    }

    #[tokio::test]
    async fn test_scoped_lock_releases_when_body_errors() {
        let store = store_with("alice", dec!(100)).await;
        let locks = LockManager::new(store.clone());
        let alice = UserId::new("alice");

        let result: Result<LockAttempt<()>> = locks
            .with_debit_lock(&alice, dec!(50), || async {
                Err(LedgerError::AccountNotFound)
            })
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound)));

        let account = store
            .find_one(AccountFilter::by_user(&alice))
            .await
            .unwrap()
            .unwrap();
        assert!(!account.locked);
    }

    #[tokio::test]
    async fn test_contended_lock_never_runs_body() {
        let store = store_with("alice", dec!(100)).await;
        let locks = LockManager::new(store.clone());
        let alice = UserId::new("alice");

        assert!(locks.acquire(&alice, dec!(10)).await.unwrap());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let attempt = locks
            .with_debit_lock(&alice, dec!(10), || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(attempt, LockAttempt::Contended);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
