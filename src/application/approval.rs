use crate::application::funds::{CREDIT_FAILED, FundsMover, TransferOutcome};
use crate::application::lock::{LockAttempt, LockManager};
use crate::domain::account::{Amount, Balance};
use crate::domain::entry::{
    EntryId, EntryStatus, LedgerEntry, OperationKind, PendingResolution,
};
use crate::domain::ports::{
    AccountFilter, AuditContext, EntryFilter, SharedAccountStore, SharedAuditSink,
    SharedEntryStore,
};
use crate::error::{LedgerError, Result};
use std::sync::Arc;

/// Rejection reason when an approval loses the account lock. The entry
/// stays pending and the resolution can be retried.
pub const APPROVAL_CONTENTION: &str = "Account is busy, approval was not applied";

/// Administrative verdict on a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// What the admin gets back from a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalReceipt {
    /// The entry carrying its settled status.
    pub entry: LedgerEntry,
    /// Post-settlement balance, for approvals that moved funds.
    pub balance: Option<Balance>,
}

/// What happened inside the debit lock while approving.
enum ApproveBody {
    /// Funds moved and the entry settled to success. Approved
    /// withdrawals carry the post-debit balance; transfers none.
    Settled(Option<Balance>),
    /// A concurrent resolution won; any movement was reversed.
    AlreadyResolved,
    /// Transfer only: the credit leg failed and was compensated.
    CreditFailed,
}

/// Finalizes entries the risk evaluator deferred.
///
/// A pending entry is resolved exactly once. Approval re-validates the
/// live balance before moving funds, and moves them through the same
/// lock and increment primitives as the primary operations, compensation
/// rule included.
pub struct ApprovalWorkflow {
    accounts: SharedAccountStore,
    entries: SharedEntryStore,
    audit: SharedAuditSink,
    locks: Arc<LockManager>,
    funds: Arc<FundsMover>,
}

impl ApprovalWorkflow {
    pub fn new(
        accounts: SharedAccountStore,
        entries: SharedEntryStore,
        audit: SharedAuditSink,
        locks: Arc<LockManager>,
        funds: Arc<FundsMover>,
    ) -> Self {
        Self {
            accounts,
            entries,
            audit,
            locks,
            funds,
        }
    }

    /// Returns the entries awaiting resolution, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .find_many(EntryFilter::default().with_status(EntryStatus::Pending))
            .await?)
    }

    /// Applies the admin's verdict to one pending entry.
    pub async fn resolve(
        &self,
        id: EntryId,
        action: ApprovalAction,
        ctx: &AuditContext,
    ) -> Result<ApprovalReceipt> {
        let entry = self
            .entries
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::EntryNotFound)?;
        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::InvalidApprovalState);
        }
        if !matches!(
            entry.kind,
            OperationKind::Withdraw | OperationKind::Transfer
        ) {
            return Err(LedgerError::UnsupportedOperation);
        }

        match action {
            ApprovalAction::Approve => self.approve(entry, ctx).await,
            ApprovalAction::Reject => self.reject(entry, ctx).await,
        }
    }

    async fn reject(&self, entry: LedgerEntry, ctx: &AuditContext) -> Result<ApprovalReceipt> {
        let resolved = self
            .entries
            .resolve_pending(entry.id, PendingResolution::Failed)
            .await?;
        if resolved == 0 {
            // Lost the resolution race to a concurrent admin.
            return Err(LedgerError::InvalidApprovalState);
        }

        self.audit
            .record(&format!("{}_rejected", entry.kind.as_str()), ctx)
            .await;
        let mut entry = entry;
        entry.status = EntryStatus::Failed;
        Ok(ApprovalReceipt {
            entry,
            balance: None,
        })
    }

    async fn approve(&self, entry: LedgerEntry, ctx: &AuditContext) -> Result<ApprovalReceipt> {
        let amount = Amount::new(entry.amount.abs())?;

        // Re-validate against the live balance: time has passed since
        // the deferral and the funds may be gone. A short balance is a
        // terminal rejection, not a retryable conflict.
        let account = self
            .accounts
            .find_one(AccountFilter::by_user(&entry.user_id))
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        if account.balance.0 < amount.value() {
            return self
                .fail_pending(&entry, LedgerError::InsufficientFunds, ctx)
                .await;
        }

        let body_entry = &entry;
        let attempt = self
            .locks
            .with_debit_lock(&entry.user_id, amount.value(), || async move {
                self.settle_approved(body_entry, amount).await
            })
            .await?;

        match attempt {
            LockAttempt::Contended => Err(LedgerError::PreconditionFailed(
                APPROVAL_CONTENTION.to_string(),
            )),
            LockAttempt::Executed(ApproveBody::AlreadyResolved) => {
                Err(LedgerError::InvalidApprovalState)
            }
            LockAttempt::Executed(ApproveBody::CreditFailed) => {
                self.fail_pending(
                    &entry,
                    LedgerError::PreconditionFailed(CREDIT_FAILED.to_string()),
                    ctx,
                )
                .await
            }
            LockAttempt::Executed(ApproveBody::Settled(balance)) => {
                self.audit
                    .record(&format!("{}_approved", entry.kind.as_str()), ctx)
                    .await;
                let mut entry = entry;
                entry.status = EntryStatus::Success;
                Ok(ApprovalReceipt { entry, balance })
            }
        }
    }

    /// Approval body, run with the debit lock held: re-check the entry,
    /// move the funds, then settle the status.
    async fn settle_approved(&self, entry: &LedgerEntry, amount: Amount) -> Result<ApproveBody> {
        let current = self
            .entries
            .find_by_id(entry.id)
            .await?
            .ok_or(LedgerError::EntryNotFound)?;
        if current.status != EntryStatus::Pending {
            return Ok(ApproveBody::AlreadyResolved);
        }

        match entry.kind {
            OperationKind::Withdraw => {
                let debited = self
                    .funds
                    .apply_to_user(&entry.user_id, -amount.value())
                    .await?;
                if debited == 0 {
                    return Err(LedgerError::AccountNotFound);
                }
            }
            OperationKind::Transfer => {
                let Some(recipient) = &entry.counterparty else {
                    return Err(LedgerError::PreconditionFailed(
                        "pending transfer carries no counterparty".to_string(),
                    ));
                };
                match self
                    .funds
                    .transfer_between(&entry.user_id, recipient, amount)
                    .await?
                {
                    TransferOutcome::Completed => {}
                    TransferOutcome::SenderMissing => return Err(LedgerError::AccountNotFound),
                    TransferOutcome::CreditFailed => return Ok(ApproveBody::CreditFailed),
                }
            }
            OperationKind::Deposit => return Err(LedgerError::UnsupportedOperation),
        }

        let resolved = self
            .entries
            .resolve_pending(entry.id, PendingResolution::Succeeded)
            .await?;
        if resolved == 0 {
            // A concurrent resolution landed between the status re-read
            // and this write; undo the movement it never authorized.
            self.reverse_movement(entry, amount).await;
            return Ok(ApproveBody::AlreadyResolved);
        }

        let account = self
            .accounts
            .find_one(AccountFilter::by_user(&entry.user_id))
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        Ok(ApproveBody::Settled(Some(account.balance)))
    }

    async fn reverse_movement(&self, entry: &LedgerEntry, amount: Amount) {
        let restored = match (entry.kind, &entry.counterparty) {
            (OperationKind::Transfer, Some(recipient)) => {
                let credit_back = self
                    .funds
                    .apply_to_user(&entry.user_id, amount.value())
                    .await;
                let debit_back = self.funds.apply_to_number(recipient, -amount.value()).await;
                credit_back.is_ok_and(|n| n == 1) && debit_back.is_ok_and(|n| n == 1)
            }
            _ => self
                .funds
                .apply_to_user(&entry.user_id, amount.value())
                .await
                .is_ok_and(|n| n == 1),
        };
        if !restored {
            tracing::error!(entry = %entry.id, "failed to reverse an unauthorized settlement");
        }
    }

    /// Settles the entry to failed without moving funds, then signals
    /// `error` to the caller.
    async fn fail_pending(
        &self,
        entry: &LedgerEntry,
        error: LedgerError,
        ctx: &AuditContext,
    ) -> Result<ApprovalReceipt> {
        let resolved = self
            .entries
            .resolve_pending(entry.id, PendingResolution::Failed)
            .await?;
        if resolved == 0 {
            return Err(LedgerError::InvalidApprovalState);
        }

        self.audit
            .record(&format!("{}_approval_failed", entry.kind.as_str()), ctx)
            .await;
        Err(error)
    }
}
