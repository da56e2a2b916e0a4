use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// Operation codes accepted on the replay input.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationCode {
    Open,
    Deposit,
    Withdraw,
    Transfer,
}

/// One row of the replay input.
///
/// `amount` and `key` are required for the money-moving codes and
/// ignored for `open`; `to_account` only applies to transfers.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OperationRecord {
    pub op: OperationCode,
    pub user: String,
    pub amount: Option<Decimal>,
    pub to_account: Option<String>,
    pub key: Option<String>,
}

/// Reads operations from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<OperationRecord>`. It handles whitespace trimming and
/// flexible record lengths automatically.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations.
    ///
    /// This allows for processing large files in a streaming fashion
    /// without loading the entire dataset into memory.
    pub fn operations(self) -> impl Iterator<Item = Result<OperationRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
