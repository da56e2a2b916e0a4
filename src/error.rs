use miette::Diagnostic;
use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Result type returned by store adapters.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures raised below the ports, by the storage adapters themselves.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The idempotency key on an inserted entry is already claimed.
    #[error("Idempotency key already claimed")]
    DuplicateKey,
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Engine-level error taxonomy.
///
/// Duplicate submissions and risk-deferred transactions are deliberately
/// absent: they are valid outcomes, reported through receipt statuses,
/// not errors.
#[derive(Error, Debug, Diagnostic)]
pub enum LedgerError {
    #[error("Account not found or invalid")]
    AccountNotFound,
    #[error("User already has an account")]
    AccountExists,
    #[error("Pending entry not found")]
    EntryNotFound,
    #[error("Insufficient funds")]
    InsufficientFunds,
    /// A conditional update matched nothing. The reason string is all the
    /// caller gets; the underlying cause is not disambiguated.
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("Transaction blocked: {0}")]
    RiskBlocked(String),
    #[error("Entry is not pending approval")]
    InvalidApprovalState,
    #[error("Operation kind does not support approval")]
    UnsupportedOperation,
    #[error("Amount must be positive")]
    InvalidAmount,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
