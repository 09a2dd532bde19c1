use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use saldo_core::{
    BankAccountId, CompanyId, InvoiceId, Money, NewBankAccount, NewInvoice, ReconStore,
    TransactionFilter, TransactionId, TransactionStatus,
};
use saldo_recon::{
    auto_reconcile_all, candidates, ignore, import_statement, reconcile, statistics,
    ImportRequest, MatchConfig, MatchEngine, ReconcileRequest,
};
use saldo_storage::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "saldo", version, about = "camt.054 bank reconciliation toolkit")]
struct Cli {
    /// SQLite database file; created on first use.
    #[arg(long, default_value = "saldo.db")]
    db: PathBuf,

    /// Company scope for every operation.
    #[arg(long, default_value_t = 1)]
    company: i64,

    /// Optional matching configuration (TOML) overriding the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a bank account.
    AccountAdd {
        #[arg(long)]
        name: String,
        #[arg(long)]
        iban: String,
        #[arg(long, default_value = "CHF")]
        currency: String,
    },
    /// Register an open invoice.
    InvoiceAdd {
        #[arg(long)]
        number: String,
        #[arg(long)]
        counterparty: String,
        /// Invoice total, e.g. 199.95
        #[arg(long)]
        total: String,
        /// QR/ISR structured reference.
        #[arg(long)]
        reference: Option<String>,
    },
    /// Import a camt.054 statement file.
    Import {
        file: PathBuf,
        #[arg(long)]
        account: i64,
        /// Settle exact-reference matches immediately.
        #[arg(long)]
        auto: bool,
    },
    /// Show ranked invoice candidates for one transaction.
    Candidates { transaction: i64 },
    /// Link a transaction to an invoice; --pay also creates the payment.
    Reconcile {
        transaction: i64,
        invoice: i64,
        #[arg(long)]
        pay: bool,
    },
    /// Dismiss a transaction that will never be reconciled.
    Ignore { transaction: i64 },
    /// Auto-reconcile every pending transaction in scope.
    ReconcileAll {
        #[arg(long)]
        account: Option<i64>,
    },
    /// List transactions, newest first.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Reconciliation statistics for the scope.
    Stats {
        #[arg(long)]
        account: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store = SqliteStore::open(&cli.db)
        .await
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    let config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MatchConfig::from_toml(&content).context("parsing match configuration")?
        }
        None => MatchConfig::default(),
    };
    let engine = MatchEngine::new(config);
    let company = CompanyId(cli.company);

    match cli.command {
        Command::AccountAdd {
            name,
            iban,
            currency,
        } => {
            let account = store
                .create_bank_account(NewBankAccount {
                    company_id: company,
                    name,
                    iban,
                    currency,
                })
                .await?;
            println!("account {} ({})", account.id, account.iban);
        }
        Command::InvoiceAdd {
            number,
            counterparty,
            total,
            reference,
        } => {
            let total = Decimal::from_str(&total)
                .with_context(|| format!("invalid amount '{total}'"))?;
            let invoice = store
                .create_invoice(NewInvoice {
                    company_id: company,
                    number,
                    counterparty,
                    total: Money::from_decimal(total),
                    reference,
                })
                .await?;
            println!("invoice {} ({})", invoice.id, invoice.number);
        }
        Command::Import {
            file,
            account,
            auto,
        } => {
            let xml = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let outcome = import_statement(
                &store,
                &engine,
                ImportRequest {
                    company_id: company,
                    bank_account_id: BankAccountId(account),
                    xml,
                    auto_reconcile: auto,
                },
            )
            .await?;
            println!(
                "imported {} transaction(s), auto-reconciled {}",
                outcome.imported, outcome.matched
            );
            for settlement in &outcome.settlements {
                println!(
                    "  transaction {} -> invoice {} (payment {})",
                    settlement.transaction_id, settlement.invoice_id, settlement.payment_id
                );
            }
        }
        Command::Candidates { transaction } => {
            let ranked =
                candidates(&store, &engine, company, TransactionId(transaction)).await?;
            if ranked.is_empty() {
                println!("no candidates");
            }
            for candidate in ranked {
                println!(
                    "{:>3}  invoice {} {} {} — {}",
                    candidate.confidence,
                    candidate.invoice_id,
                    candidate.invoice_number,
                    candidate.invoice_total,
                    candidate.reason
                );
            }
        }
        Command::Reconcile {
            transaction,
            invoice,
            pay,
        } => {
            let updated = reconcile(
                &store,
                ReconcileRequest {
                    company_id: company,
                    transaction_id: TransactionId(transaction),
                    invoice_id: Some(InvoiceId(invoice)),
                    create_payment: pay,
                },
            )
            .await?;
            println!("transaction {} is now {}", updated.id, updated.status);
        }
        Command::Ignore { transaction } => {
            let updated = ignore(&store, company, TransactionId(transaction)).await?;
            println!("transaction {} is now {}", updated.id, updated.status);
        }
        Command::ReconcileAll { account } => {
            let outcome = auto_reconcile_all(
                &store,
                &engine,
                company,
                account.map(BankAccountId),
            )
            .await?;
            println!(
                "considered {}: reconciled {}, failed {}",
                outcome.total, outcome.reconciled, outcome.failed
            );
        }
        Command::List { status, page } => {
            let mut filter = TransactionFilter::for_company(company);
            filter.page = page;
            if let Some(status) = status {
                filter.status = Some(
                    TransactionStatus::from_str(&status).map_err(anyhow::Error::msg)?,
                );
            }
            let listing = store.list_transactions(&filter).await?;
            for item in &listing.items {
                let t = &item.transaction;
                println!(
                    "{:>5}  {}  {:>10} {}  {:<10}  {}  {}",
                    t.id.0,
                    t.booking_date,
                    t.amount,
                    t.currency,
                    t.status,
                    item.invoice_number.as_deref().unwrap_or("-"),
                    t.counterparty_name.as_deref().unwrap_or("-"),
                );
            }
            println!(
                "page {}/{} ({} total)",
                listing.page,
                listing.total.div_ceil(listing.page_size as u64).max(1),
                listing.total
            );
        }
        Command::Stats { account } => {
            let stats = statistics(&store, company, account.map(BankAccountId)).await?;
            println!("total        {}", stats.total);
            println!("pending      {}", stats.pending);
            println!("matched      {}", stats.matched);
            println!("reconciled   {}", stats.reconciled);
            println!("ignored      {}", stats.ignored);
            println!("credits in   {}", stats.reconciled_credit);
            println!("debits out   {}", stats.reconciled_debit);
            println!("rate         {}%", stats.reconciliation_rate);
        }
    }

    Ok(())
}
