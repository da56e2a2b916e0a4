use crate::domain::account::{AccountNumber, Amount, UserId};
use crate::domain::entry::{EntryStatus, OperationKind};
use crate::domain::ports::{EntryFilter, SharedEntryStore};
use crate::error::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const DAILY_CAP_REASON: &str = "Daily limit exceeded";
pub const VELOCITY_REASON: &str = "Hourly transaction frequency exceeded";
pub const FAN_OUT_REASON: &str = "Too many transfers to this recipient today";
pub const REVIEW_REASON: &str = "exceeds threshold, pending admin approval";

/// Thresholds applied by the [`RiskEvaluator`]. Immutable once
/// constructed; business logic never reads ambient process state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Aggregate debit volume allowed per user per UTC day.
    pub daily_debit_cap: Decimal,
    /// Successful debits tolerated within a trailing hour.
    pub hourly_debit_limit: usize,
    /// Successful transfers to one recipient per UTC day.
    pub recipient_daily_limit: usize,
    /// Single-operation amount above which admin approval is required.
    pub review_threshold: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_debit_cap: dec!(50_000),
            hourly_debit_limit: 20,
            recipient_daily_limit: 5,
            review_threshold: dec!(25_000),
        }
    }
}

/// Verdict on one candidate operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Allow,
    /// Route to manual approval with the given reason.
    Defer(String),
    /// Reject outright with the given reason.
    Block(String),
}

/// Evaluates candidate debits against recent ledger history.
///
/// Pure reads, no locking: the verdict can race concurrent writers and
/// is advisory, a best-effort control rather than a hard guarantee.
pub struct RiskEvaluator {
    entries: SharedEntryStore,
    config: RiskConfig,
}

impl RiskEvaluator {
    pub fn new(entries: SharedEntryStore, config: RiskConfig) -> Self {
        Self { entries, config }
    }

    /// Applies the rules in a fixed order; the first rule that trips
    /// decides. Only settled withdraw/transfer entries count toward the
    /// windows, and deposits are never gated.
    pub async fn evaluate(
        &self,
        user_id: &UserId,
        kind: OperationKind,
        amount: Amount,
        counterparty: Option<&AccountNumber>,
        now: DateTime<Utc>,
    ) -> Result<RiskDecision> {
        if kind == OperationKind::Deposit {
            return Ok(RiskDecision::Allow);
        }

        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let debits = [OperationKind::Withdraw, OperationKind::Transfer];

        let settled_today = self
            .entries
            .find_many(
                EntryFilter::by_user(user_id)
                    .with_kinds(&debits)
                    .with_status(EntryStatus::Success)
                    .after(midnight),
            )
            .await?;

        // Stored debit amounts are signed, so magnitudes are summed.
        let spent_today: Decimal = settled_today.iter().map(|e| e.amount.abs()).sum();
        if spent_today + amount.value() > self.config.daily_debit_cap {
            return Ok(RiskDecision::Block(DAILY_CAP_REASON.to_string()));
        }

        let trailing_hour = self
            .entries
            .find_many(
                EntryFilter::by_user(user_id)
                    .with_kinds(&debits)
                    .with_status(EntryStatus::Success)
                    .after(now - Duration::hours(1)),
            )
            .await?;
        if trailing_hour.len() >= self.config.hourly_debit_limit {
            return Ok(RiskDecision::Block(VELOCITY_REASON.to_string()));
        }

        if kind == OperationKind::Transfer
            && let Some(recipient) = counterparty
        {
            let to_recipient = self
                .entries
                .find_many(
                    EntryFilter::by_user(user_id)
                        .with_kinds(&[OperationKind::Transfer])
                        .with_status(EntryStatus::Success)
                        .with_counterparty(recipient)
                        .after(midnight),
                )
                .await?;
            if to_recipient.len() >= self.config.recipient_daily_limit {
                return Ok(RiskDecision::Block(FAN_OUT_REASON.to_string()));
            }
        }

        if amount.value() > self.config.review_threshold {
            return Ok(RiskDecision::Defer(REVIEW_REASON.to_string()));
        }

        Ok(RiskDecision::Allow)
    }
}
