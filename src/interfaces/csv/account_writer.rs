use crate::domain::account::Account;
use crate::error::Result;
use std::io::Write;

/// Writes final account state as CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    /// Writes the header row followed by one row per account.
    pub fn write_accounts(&mut self, accounts: Vec<Account>) -> Result<()> {
        self.writer
            .write_record(["user", "account", "balance", "locked"])?;
        for account in accounts {
            let balance = account.balance.0.to_string();
            self.writer.write_record([
                account.user_id.as_str(),
                account.number.as_str(),
                balance.as_str(),
                if account.locked { "true" } else { "false" },
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
