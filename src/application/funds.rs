use crate::domain::account::{AccountNumber, Amount, UserId};
use crate::domain::ports::{AccountFilter, SharedAccountStore};
use crate::error::Result;
use rust_decimal::Decimal;

/// Rejection reason when the credit leg of a transfer matches nothing.
pub const CREDIT_FAILED: &str = "Failed to credit recipient account";

/// Outcome of moving funds between two accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Debit and credit both applied.
    Completed,
    /// The debit matched no account; nothing moved.
    SenderMissing,
    /// The credit matched no account; the debit was compensated.
    CreditFailed,
}

/// Applies balance mutations through the store's atomic increment.
///
/// The store offers no multi-record transaction, so a transfer is a
/// debit followed by a credit with a compensating credit back to the
/// sender when the second leg fails. Both the orchestrator and the
/// approval workflow move funds through this one type, never through
/// their own increments.
pub struct FundsMover {
    accounts: SharedAccountStore,
}

impl FundsMover {
    pub fn new(accounts: SharedAccountStore) -> Self {
        Self { accounts }
    }

    /// Adds `delta` to the balance of the user's account. Returns the
    /// number of records matched (0 or 1).
    pub async fn apply_to_user(&self, user_id: &UserId, delta: Decimal) -> Result<u64> {
        Ok(self
            .accounts
            .increment_balance(AccountFilter::by_user(user_id), delta)
            .await?)
    }

    /// Adds `delta` to the balance of the numbered account. Returns the
    /// number of records matched (0 or 1).
    pub async fn apply_to_number(&self, number: &AccountNumber, delta: Decimal) -> Result<u64> {
        Ok(self
            .accounts
            .increment_balance(AccountFilter::by_number(number), delta)
            .await?)
    }

    /// Debits the sender, then credits the recipient. A failed credit
    /// is compensated by crediting the amount back to the sender so the
    /// total system balance is preserved.
    ///
    /// Callers hold the sender's debit lock across this call; the lock
    /// is what keeps the sender's balance sufficient for the debit.
    pub async fn transfer_between(
        &self,
        sender: &UserId,
        recipient: &AccountNumber,
        amount: Amount,
    ) -> Result<TransferOutcome> {
        let debited = self.apply_to_user(sender, -amount.value()).await?;
        if debited == 0 {
            return Ok(TransferOutcome::SenderMissing);
        }

        let credited = self.apply_to_number(recipient, amount.value()).await?;
        if credited == 0 {
            let compensated = self.apply_to_user(sender, amount.value()).await?;
            if compensated == 0 {
                tracing::error!(
                    sender = %sender,
                    amount = %amount.value(),
                    "compensating credit matched no account, funds are unaccounted for"
                );
            }
            return Ok(TransferOutcome::CreditFailed);
        }

        Ok(TransferOutcome::Completed)
    }
}
