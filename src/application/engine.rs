use crate::application::approval::{ApprovalAction, ApprovalReceipt, ApprovalWorkflow};
use crate::application::funds::{CREDIT_FAILED, FundsMover, TransferOutcome};
use crate::application::guard::IdempotencyGuard;
use crate::application::lock::{LOCK_CONFLICT, LockAttempt, LockManager, SENDER_LOCK_CONFLICT};
use crate::application::risk::{RiskConfig, RiskDecision, RiskEvaluator};
use crate::domain::account::{Account, AccountNumber, Amount, Balance, UserId};
use crate::domain::entry::{
    EntryId, EntryStatus, IdempotencyKey, LedgerEntry, OperationKind,
};
use crate::domain::ports::{
    AccountFilter, AuditContext, EntryFilter, SharedAccountStore, SharedAuditSink,
    SharedEntryStore,
};
use crate::error::{LedgerError, Result, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Terminal disposition of one accepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Funds settled and the entry was recorded.
    Success,
    /// The idempotency key was seen before; nothing ran again.
    Duplicate,
    /// Deferred by the risk evaluator, awaiting admin resolution.
    PendingApproval,
}

/// What a caller gets back from deposit, withdraw and transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReceipt {
    pub status: ReceiptStatus,
    /// Entry recording this attempt; for a duplicate, the prior entry.
    pub entry: LedgerEntry,
    /// Post-operation balance. Deposits and withdrawals report one;
    /// transfers and non-settled outcomes never do.
    pub balance: Option<Balance>,
    /// Stated reason when the operation was deferred.
    pub reason: Option<String>,
}

impl OperationReceipt {
    fn settled(entry: LedgerEntry, balance: Option<Balance>) -> Self {
        Self {
            status: ReceiptStatus::Success,
            entry,
            balance,
            reason: None,
        }
    }

    fn duplicate(entry: LedgerEntry) -> Self {
        Self {
            status: ReceiptStatus::Duplicate,
            entry,
            balance: None,
            reason: None,
        }
    }

    fn pending(entry: LedgerEntry, reason: String) -> Self {
        Self {
            status: ReceiptStatus::PendingApproval,
            entry,
            balance: None,
            reason: Some(reason),
        }
    }
}

/// Optional narrowing criteria for a user's ledger history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<OperationKind>,
    pub status: Option<EntryStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Result of appending one entry under idempotency-key uniqueness.
enum WriteOutcome {
    Recorded(LedgerEntry),
    /// A concurrent request with the same key recorded first.
    Raced(LedgerEntry),
}

/// What happened inside the debit lock.
enum Settled {
    /// Funds moved and the success entry was recorded. Withdrawals
    /// report the post-debit balance; transfers report none.
    Done {
        entry: LedgerEntry,
        balance: Option<Balance>,
    },
    /// A same-key request settled first; the movement was reversed.
    Raced(LedgerEntry),
    /// Transfer only: the credit leg failed and was compensated.
    CreditFailed,
}

/// The main entry point of the ledger transaction application.
///
/// `LedgerEngine` drives the per-operation state machine combining the
/// idempotency guard, risk evaluator and lock manager, and performs
/// compensating actions on partial failure. It holds no mutable state
/// of its own; all coordination happens through the store's per-record
/// atomic primitives.
pub struct LedgerEngine {
    accounts: SharedAccountStore,
    entries: SharedEntryStore,
    audit: SharedAuditSink,
    guard: IdempotencyGuard,
    risk: RiskEvaluator,
    locks: Arc<LockManager>,
    funds: Arc<FundsMover>,
    approval: ApprovalWorkflow,
}

impl LedgerEngine {
    /// Creates a new `LedgerEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `accounts` - The store for account records.
    /// * `entries` - The store for the append-only ledger.
    /// * `audit` - The sink receiving one event per terminal transition.
    /// * `risk_config` - Thresholds for the risk evaluator.
    pub fn new(
        accounts: SharedAccountStore,
        entries: SharedEntryStore,
        audit: SharedAuditSink,
        risk_config: RiskConfig,
    ) -> Self {
        let guard = IdempotencyGuard::new(entries.clone());
        let risk = RiskEvaluator::new(entries.clone(), risk_config);
        let locks = Arc::new(LockManager::new(accounts.clone()));
        let funds = Arc::new(FundsMover::new(accounts.clone()));
        let approval = ApprovalWorkflow::new(
            accounts.clone(),
            entries.clone(),
            audit.clone(),
            locks.clone(),
            funds.clone(),
        );
        Self {
            accounts,
            entries,
            audit,
            guard,
            risk,
            locks,
            funds,
            approval,
        }
    }

    /// Opens an account for the user with a fresh random number and a
    /// zero balance. Each user holds at most one account.
    pub async fn open_account(&self, user_id: &UserId, ctx: &AuditContext) -> Result<Account> {
        if self
            .accounts
            .find_one(AccountFilter::by_user(user_id))
            .await?
            .is_some()
        {
            return Err(LedgerError::AccountExists);
        }

        let account = Account::open(user_id.clone(), AccountNumber::random());
        self.accounts.insert(account.clone()).await?;
        self.audit.record("account_opened", ctx).await;
        Ok(account)
    }

    /// Credits the user's account. Deposits are never risk-gated and
    /// take no lock; the lone atomic increment needs no exclusion.
    pub async fn deposit(
        &self,
        user_id: &UserId,
        amount: Amount,
        key: IdempotencyKey,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        if let Some(prior) = self.guard.check(&key).await? {
            return self.echo_duplicate(OperationKind::Deposit, prior, ctx).await;
        }

        let credited = self.funds.apply_to_user(user_id, amount.value()).await?;
        if credited == 0 {
            let entry = LedgerEntry::new(
                user_id.clone(),
                OperationKind::Deposit,
                amount.value(),
                key,
                EntryStatus::Failed,
            );
            return self
                .reject_with_entry(entry, LedgerError::AccountNotFound, ctx)
                .await;
        }

        let account = self.require_account(user_id).await?;
        let entry = LedgerEntry::new(
            user_id.clone(),
            OperationKind::Deposit,
            amount.value(),
            key,
            EntryStatus::Success,
        )
        .with_account(account.number.clone());

        match self.write_entry(entry).await? {
            WriteOutcome::Recorded(entry) => {
                self.audit.record("deposit_success", ctx).await;
                Ok(OperationReceipt::settled(entry, Some(account.balance)))
            }
            WriteOutcome::Raced(prior) => {
                // A same-key deposit settled concurrently; this increment
                // double-counted and is reversed.
                let reversed = self.funds.apply_to_user(user_id, -amount.value()).await?;
                if reversed == 0 {
                    tracing::error!(user = %user_id, "failed to reverse a double-counted deposit");
                }
                self.echo_duplicate(OperationKind::Deposit, prior, ctx).await
            }
        }
    }

    /// Debits the user's account under the per-account soft lock.
    pub async fn withdraw(
        &self,
        user_id: &UserId,
        amount: Amount,
        key: IdempotencyKey,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        if let Some(prior) = self.guard.check(&key).await? {
            return self
                .echo_duplicate(OperationKind::Withdraw, prior, ctx)
                .await;
        }

        match self
            .risk
            .evaluate(user_id, OperationKind::Withdraw, amount, None, Utc::now())
            .await?
        {
            RiskDecision::Allow => {}
            RiskDecision::Block(reason) => {
                let entry = LedgerEntry::new(
                    user_id.clone(),
                    OperationKind::Withdraw,
                    -amount.value(),
                    key,
                    EntryStatus::Blocked,
                );
                return self.block_with_entry(entry, reason, ctx).await;
            }
            RiskDecision::Defer(reason) => {
                let entry = LedgerEntry::new(
                    user_id.clone(),
                    OperationKind::Withdraw,
                    -amount.value(),
                    key,
                    EntryStatus::Pending,
                );
                return self.defer_with_entry(entry, reason, ctx).await;
            }
        }

        let body_key = key.clone();
        let attempt = self
            .locks
            .with_debit_lock(user_id, amount.value(), || async move {
                self.settle_withdraw(user_id, amount, body_key).await
            })
            .await;

        let fail_entry = LedgerEntry::new(
            user_id.clone(),
            OperationKind::Withdraw,
            -amount.value(),
            key,
            EntryStatus::Failed,
        );
        self.finish_debit(fail_entry, LOCK_CONFLICT, ctx, attempt)
            .await
    }

    /// Moves funds from the user's account to the numbered recipient
    /// account. The debit and credit are not atomic as a pair; a failed
    /// credit is compensated by crediting the sender back.
    pub async fn transfer(
        &self,
        user_id: &UserId,
        recipient: &AccountNumber,
        amount: Amount,
        key: IdempotencyKey,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        if let Some(prior) = self.guard.check(&key).await? {
            return self
                .echo_duplicate(OperationKind::Transfer, prior, ctx)
                .await;
        }

        match self
            .risk
            .evaluate(
                user_id,
                OperationKind::Transfer,
                amount,
                Some(recipient),
                Utc::now(),
            )
            .await?
        {
            RiskDecision::Allow => {}
            RiskDecision::Block(reason) => {
                let entry = LedgerEntry::new(
                    user_id.clone(),
                    OperationKind::Transfer,
                    -amount.value(),
                    key,
                    EntryStatus::Blocked,
                )
                .with_counterparty(recipient.clone());
                return self.block_with_entry(entry, reason, ctx).await;
            }
            RiskDecision::Defer(reason) => {
                let entry = LedgerEntry::new(
                    user_id.clone(),
                    OperationKind::Transfer,
                    -amount.value(),
                    key,
                    EntryStatus::Pending,
                )
                .with_counterparty(recipient.clone());
                return self.defer_with_entry(entry, reason, ctx).await;
            }
        }

        // Advisory pre-checks; the lock predicate re-checks the balance
        // atomically at acquisition.
        let Some(sender) = self
            .accounts
            .find_one(AccountFilter::by_user(user_id))
            .await?
        else {
            let entry = self.transfer_fail_entry(user_id, recipient, amount, key);
            return self
                .reject_with_entry(entry, LedgerError::AccountNotFound, ctx)
                .await;
        };
        if sender.balance.0 < amount.value() {
            let entry = self.transfer_fail_entry(user_id, recipient, amount, key);
            return self
                .reject_with_entry(entry, LedgerError::InsufficientFunds, ctx)
                .await;
        }
        if self
            .accounts
            .find_one(AccountFilter::by_number(recipient))
            .await?
            .is_none()
        {
            let entry = self.transfer_fail_entry(user_id, recipient, amount, key);
            return self
                .reject_with_entry(entry, LedgerError::AccountNotFound, ctx)
                .await;
        }

        let body_key = key.clone();
        let attempt = self
            .locks
            .with_debit_lock(user_id, amount.value(), || async move {
                self.settle_transfer(user_id, recipient, amount, body_key)
                    .await
            })
            .await;

        let fail_entry = self.transfer_fail_entry(user_id, recipient, amount, key);
        self.finish_debit(fail_entry, SENDER_LOCK_CONFLICT, ctx, attempt)
            .await
    }

    /// Returns the live account record of the user.
    pub async fn account(&self, user_id: &UserId) -> Result<Account> {
        self.require_account(user_id).await
    }

    /// Returns the user's ledger history, oldest first.
    pub async fn history(
        &self,
        user_id: &UserId,
        filter: HistoryFilter,
    ) -> Result<Vec<LedgerEntry>> {
        let mut query = EntryFilter::by_user(user_id);
        if let Some(kind) = filter.kind {
            query = query.with_kinds(&[kind]);
        }
        if let Some(status) = filter.status {
            query = query.with_status(status);
        }
        if let Some(since) = filter.since {
            query = query.after(since);
        }
        if let Some(until) = filter.until {
            query = query.before(until);
        }
        Ok(self.entries.find_many(query).await?)
    }

    /// Returns every ledger entry, oldest first.
    pub async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.entries.find_many(EntryFilter::default()).await?)
    }

    /// Returns every account, ordered by user id.
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.find_all().await?)
    }

    /// Returns the entries awaiting admin resolution, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<LedgerEntry>> {
        self.approval.list_pending().await
    }

    /// Approves or rejects one pending entry.
    pub async fn resolve_pending(
        &self,
        id: EntryId,
        action: ApprovalAction,
        ctx: &AuditContext,
    ) -> Result<ApprovalReceipt> {
        self.approval.resolve(id, action, ctx).await
    }

    async fn require_account(&self, user_id: &UserId) -> Result<Account> {
        self.accounts
            .find_one(AccountFilter::by_user(user_id))
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    fn transfer_fail_entry(
        &self,
        user_id: &UserId,
        recipient: &AccountNumber,
        amount: Amount,
        key: IdempotencyKey,
    ) -> LedgerEntry {
        LedgerEntry::new(
            user_id.clone(),
            OperationKind::Transfer,
            -amount.value(),
            key,
            EntryStatus::Failed,
        )
        .with_counterparty(recipient.clone())
    }

    /// Appends one entry, falling back to the prior entry when a
    /// concurrent request already claimed the key.
    async fn write_entry(&self, entry: LedgerEntry) -> Result<WriteOutcome> {
        match self.entries.insert(entry.clone()).await {
            Ok(()) => Ok(WriteOutcome::Recorded(entry)),
            Err(StoreError::DuplicateKey) => {
                let prior = self
                    .entries
                    .find_by_key(&entry.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Backend("claimed idempotency key has no entry".to_string())
                    })?;
                Ok(WriteOutcome::Raced(prior))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn echo_duplicate(
        &self,
        kind: OperationKind,
        prior: LedgerEntry,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        self.audit
            .record(&format!("{}_duplicate", kind.as_str()), ctx)
            .await;
        Ok(OperationReceipt::duplicate(prior))
    }

    /// Records a failed attempt and signals `error`, unless a racing
    /// same-key request already recorded an outcome to echo.
    async fn reject_with_entry(
        &self,
        entry: LedgerEntry,
        error: LedgerError,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        let kind = entry.kind;
        match self.write_entry(entry).await? {
            WriteOutcome::Recorded(_) => {
                self.audit
                    .record(&format!("{}_failed", kind.as_str()), ctx)
                    .await;
                Err(error)
            }
            WriteOutcome::Raced(prior) => self.echo_duplicate(kind, prior, ctx).await,
        }
    }

    async fn block_with_entry(
        &self,
        entry: LedgerEntry,
        reason: String,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        let kind = entry.kind;
        match self.write_entry(entry).await? {
            WriteOutcome::Recorded(_) => {
                self.audit
                    .record(&format!("{}_blocked", kind.as_str()), ctx)
                    .await;
                Err(LedgerError::RiskBlocked(reason))
            }
            WriteOutcome::Raced(prior) => self.echo_duplicate(kind, prior, ctx).await,
        }
    }

    async fn defer_with_entry(
        &self,
        entry: LedgerEntry,
        reason: String,
        ctx: &AuditContext,
    ) -> Result<OperationReceipt> {
        let kind = entry.kind;
        match self.write_entry(entry).await? {
            WriteOutcome::Recorded(entry) => {
                self.audit
                    .record(&format!("{}_pending", kind.as_str()), ctx)
                    .await;
                Ok(OperationReceipt::pending(entry, reason))
            }
            WriteOutcome::Raced(prior) => self.echo_duplicate(kind, prior, ctx).await,
        }
    }

    /// Withdraw body, run with the debit lock held: move the funds,
    /// then record the entry.
    async fn settle_withdraw(
        &self,
        user_id: &UserId,
        amount: Amount,
        key: IdempotencyKey,
    ) -> Result<Settled> {
        let debited = self.funds.apply_to_user(user_id, -amount.value()).await?;
        if debited == 0 {
            return Err(LedgerError::AccountNotFound);
        }

        let account = self.require_account(user_id).await?;
        let entry = LedgerEntry::new(
            user_id.clone(),
            OperationKind::Withdraw,
            -amount.value(),
            key,
            EntryStatus::Success,
        )
        .with_account(account.number.clone());

        match self.write_entry(entry).await? {
            WriteOutcome::Recorded(entry) => Ok(Settled::Done {
                entry,
                balance: Some(account.balance),
            }),
            WriteOutcome::Raced(prior) => {
                let reversed = self.funds.apply_to_user(user_id, amount.value()).await?;
                if reversed == 0 {
                    tracing::error!(user = %user_id, "failed to reverse a double-settled withdraw");
                }
                Ok(Settled::Raced(prior))
            }
        }
    }

    /// Transfer body, run with the sender's debit lock held.
    async fn settle_transfer(
        &self,
        user_id: &UserId,
        recipient: &AccountNumber,
        amount: Amount,
        key: IdempotencyKey,
    ) -> Result<Settled> {
        match self
            .funds
            .transfer_between(user_id, recipient, amount)
            .await?
        {
            TransferOutcome::SenderMissing => Err(LedgerError::AccountNotFound),
            TransferOutcome::CreditFailed => Ok(Settled::CreditFailed),
            TransferOutcome::Completed => {
                let account = self.require_account(user_id).await?;
                let entry = LedgerEntry::new(
                    user_id.clone(),
                    OperationKind::Transfer,
                    -amount.value(),
                    key,
                    EntryStatus::Success,
                )
                .with_account(account.number.clone())
                .with_counterparty(recipient.clone());

                match self.write_entry(entry).await? {
                    WriteOutcome::Recorded(entry) => Ok(Settled::Done {
                        entry,
                        balance: None,
                    }),
                    WriteOutcome::Raced(prior) => {
                        // Reverse both legs of the double-settled transfer.
                        let debit_back =
                            self.funds.apply_to_user(user_id, amount.value()).await?;
                        let credit_back = self
                            .funds
                            .apply_to_number(recipient, -amount.value())
                            .await?;
                        if debit_back == 0 || credit_back == 0 {
                            tracing::error!(
                                user = %user_id,
                                recipient = %recipient,
                                "failed to fully reverse a double-settled transfer"
                            );
                        }
                        Ok(Settled::Raced(prior))
                    }
                }
            }
        }
    }

    /// Shared tail of withdraw and transfer: folds the lock attempt
    /// into a receipt, recording a failed entry for every outcome that
    /// did not settle or echo.
    async fn finish_debit(
        &self,
        fail_entry: LedgerEntry,
        conflict: &str,
        ctx: &AuditContext,
        attempt: Result<LockAttempt<Settled>>,
    ) -> Result<OperationReceipt> {
        let kind = fail_entry.kind;
        match attempt {
            Ok(LockAttempt::Executed(Settled::Done { entry, balance })) => {
                self.audit
                    .record(&format!("{}_success", kind.as_str()), ctx)
                    .await;
                Ok(OperationReceipt::settled(entry, balance))
            }
            Ok(LockAttempt::Executed(Settled::Raced(prior))) => {
                self.echo_duplicate(kind, prior, ctx).await
            }
            Ok(LockAttempt::Executed(Settled::CreditFailed)) => {
                self.reject_with_entry(
                    fail_entry,
                    LedgerError::PreconditionFailed(CREDIT_FAILED.to_string()),
                    ctx,
                )
                .await
            }
            Ok(LockAttempt::Contended) => {
                self.reject_with_entry(
                    fail_entry,
                    LedgerError::PreconditionFailed(conflict.to_string()),
                    ctx,
                )
                .await
            }
            Err(err) => {
                // The attempt died mid-flight; the ledger still gets its
                // record unless a settled entry already claimed the key.
                if let Err(write_err) = self.write_entry(fail_entry).await {
                    tracing::error!(error = %write_err, "failed to record a failed attempt");
                }
                self.audit
                    .record(&format!("{}_failed", kind.as_str()), ctx)
                    .await;
                Err(err)
            }
        }
    }
}
