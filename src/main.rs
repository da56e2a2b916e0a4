use bankcore::application::approval::ApprovalAction;
use bankcore::application::engine::LedgerEngine;
use bankcore::application::risk::RiskConfig;
use bankcore::domain::account::{AccountNumber, Amount, UserId};
use bankcore::domain::entry::IdempotencyKey;
use bankcore::domain::ports::{
    AuditContext, SharedAccountStore, SharedAuditSink, SharedEntryStore,
};
use bankcore::error::LedgerError;
use bankcore::infrastructure::audit::TracingAuditSink;
use bankcore::infrastructure::in_memory::{InMemoryAccountStore, InMemoryEntryStore};
#[cfg(feature = "storage-rocksdb")]
use bankcore::infrastructure::rocksdb::RocksDBStore;
use bankcore::interfaces::csv::account_writer::AccountWriter;
use bankcore::interfaces::csv::operation_reader::{
    OperationCode, OperationReader, OperationRecord,
};
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Resolve every entry still pending after the replay.
    #[arg(long, value_enum)]
    resolve_pending: Option<ResolveAction>,

    /// Opaque token forwarded with every audit event.
    #[arg(long, default_value = "csv-replay")]
    audit_context: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolveAction {
    Approve,
    Reject,
}

impl From<ResolveAction> for ApprovalAction {
    fn from(action: ResolveAction) -> Self {
        match action {
            ResolveAction::Approve => ApprovalAction::Approve,
            ResolveAction::Reject => ApprovalAction::Reject,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn assemble(accounts: SharedAccountStore, entries: SharedEntryStore) -> LedgerEngine {
    let audit: SharedAuditSink = Arc::new(TracingAuditSink);
    LedgerEngine::new(accounts, entries, audit, RiskConfig::default())
}

fn build_engine(cli: &Cli) -> Result<LedgerEngine> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        // Use persistent storage (RocksDB)
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        let accounts: SharedAccountStore = Arc::new(store.clone());
        let entries: SharedEntryStore = Arc::new(store);
        return Ok(assemble(accounts, entries));
    }

    // Use in-memory storage
    let accounts: SharedAccountStore = Arc::new(InMemoryAccountStore::new());
    let entries: SharedEntryStore = Arc::new(InMemoryEntryStore::new());
    Ok(assemble(accounts, entries))
}

fn money_fields(record: &OperationRecord) -> bankcore::error::Result<(Amount, IdempotencyKey)> {
    let amount = record.amount.ok_or(LedgerError::InvalidAmount)?;
    let amount = Amount::new(amount)?;
    let key = record.key.as_deref().ok_or_else(|| {
        LedgerError::PreconditionFailed("row is missing an idempotency key".to_string())
    })?;
    Ok((amount, IdempotencyKey::new(key)))
}

async fn apply(
    engine: &LedgerEngine,
    record: OperationRecord,
    ctx: &AuditContext,
) -> bankcore::error::Result<()> {
    let user_id = UserId::new(record.user.as_str());
    match record.op {
        OperationCode::Open => {
            engine.open_account(&user_id, ctx).await?;
        }
        OperationCode::Deposit => {
            let (amount, key) = money_fields(&record)?;
            engine.deposit(&user_id, amount, key, ctx).await?;
        }
        OperationCode::Withdraw => {
            let (amount, key) = money_fields(&record)?;
            engine.withdraw(&user_id, amount, key, ctx).await?;
        }
        OperationCode::Transfer => {
            let (amount, key) = money_fields(&record)?;
            let recipient = record.to_account.as_deref().ok_or_else(|| {
                LedgerError::PreconditionFailed("transfer row is missing to_account".to_string())
            })?;
            engine
                .transfer(&user_id, &AccountNumber::new(recipient), amount, key, ctx)
                .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let engine = build_engine(&cli)?;
    let ctx = AuditContext::new(cli.audit_context.as_str());

    // Replay operations
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for record in reader.operations() {
        match record {
            Ok(record) => {
                if let Err(e) = apply(&engine, record, &ctx).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    // Sweep entries left pending by the risk evaluator
    if let Some(action) = cli.resolve_pending {
        for entry in engine.list_pending().await? {
            if let Err(e) = engine.resolve_pending(entry.id, action.into(), &ctx).await {
                eprintln!("Error resolving entry {}: {}", entry.id, e);
            }
        }
    }

    let accounts = engine.all_accounts().await?;
    let pending = engine.list_pending().await?.len();

    // Output final state
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;
    drop(writer);

    println!("pending,{pending}");

    Ok(())
}
