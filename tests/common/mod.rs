use bankcore::application::engine::LedgerEngine;
use bankcore::application::risk::RiskConfig;
use bankcore::domain::account::{Account, Amount, UserId};
use bankcore::domain::entry::{
    EntryStatus, IdempotencyKey, LedgerEntry, OperationKind,
};
use bankcore::domain::ports::{AuditContext, EntryStore};
use bankcore::infrastructure::audit::MemoryAuditSink;
use bankcore::infrastructure::in_memory::{InMemoryAccountStore, InMemoryEntryStore};
use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;

/// An engine wired against in-memory stores and a recording audit sink.
pub struct TestBank {
    pub engine: LedgerEngine,
    pub accounts: Arc<InMemoryAccountStore>,
    pub entries: Arc<InMemoryEntryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub ctx: AuditContext,
}

impl TestBank {
    pub fn new() -> Self {
        Self::with_config(RiskConfig::default())
    }

    pub fn with_config(config: RiskConfig) -> Self {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let entries = Arc::new(InMemoryEntryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = LedgerEngine::new(
            accounts.clone(),
            entries.clone(),
            audit.clone(),
            config,
        );
        Self {
            engine,
            accounts,
            entries,
            audit,
            ctx: AuditContext::new("test"),
        }
    }

    /// Opens an account and deposits `balance` into it.
    pub async fn funded_account(&self, user: &str, balance: Decimal) -> Account {
        let user_id = UserId::new(user);
        self.engine.open_account(&user_id, &self.ctx).await.unwrap();
        if balance > Decimal::ZERO {
            self.engine
                .deposit(
                    &user_id,
                    amt(balance),
                    key(&format!("seed-{user}")),
                    &self.ctx,
                )
                .await
                .unwrap();
        }
        self.engine.account(&user_id).await.unwrap()
    }

    /// Plants a settled ledger entry `age` in the past, bypassing the
    /// engine, so history-based risk rules can be exercised.
    pub async fn seed_entry(
        &self,
        user: &str,
        kind: OperationKind,
        amount: Decimal,
        idem: &str,
        status: EntryStatus,
        age: Duration,
    ) -> LedgerEntry {
        let mut entry = LedgerEntry::new(
            UserId::new(user),
            kind,
            amount,
            key(idem),
            status,
        );
        entry.timestamp -= age;
        self.entries.insert(entry.clone()).await.unwrap();
        entry
    }

    /// Like `seed_entry`, for settled transfers carrying a destination.
    pub async fn seed_transfer(
        &self,
        user: &str,
        recipient: &Account,
        amount: Decimal,
        idem: &str,
        age: Duration,
    ) -> LedgerEntry {
        let mut entry = LedgerEntry::new(
            UserId::new(user),
            OperationKind::Transfer,
            amount,
            key(idem),
            EntryStatus::Success,
        )
        .with_counterparty(recipient.number.clone());
        entry.timestamp -= age;
        self.entries.insert(entry.clone()).await.unwrap();
        entry
    }
}

pub fn amt(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn key(value: &str) -> IdempotencyKey {
    IdempotencyKey::new(value)
}

pub fn user(value: &str) -> UserId {
    UserId::new(value)
}
