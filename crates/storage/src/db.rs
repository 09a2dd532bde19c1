use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, QueryBuilder, Row, Sqlite};

use saldo_core::{
    BankAccount, BankAccountId, BankTransaction, CompanyId, InsertOutcome, Invoice,
    InvoiceId, InvoiceStatus, Money, NewBankAccount, NewBankTransaction, NewInvoice,
    NewPayment, PaymentId, ReconStore, StatusTotal, StoreError, TransactionFilter,
    TransactionId, TransactionPage, TransactionStatus, TransactionSummary,
};

pub type DbPool = Pool<Sqlite>;

/// SQLite-backed [`ReconStore`]. One writer connection, WAL journal,
/// dedup enforced by a unique index so concurrent imports cannot race
/// past the existence check.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        init(&pool).await?;
        Ok(SqliteStore { pool })
    }

    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        init(&pool).await?;
        Ok(SqliteStore { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

async fn init(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    run_migrations(pool).await
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            iban TEXT NOT NULL,
            currency TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL,
            number TEXT NOT NULL,
            counterparty TEXT NOT NULL,
            total_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            reference TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL,
            bank_account_id INTEGER NOT NULL,
            entry_reference TEXT NOT NULL,
            direction TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            booking_date TEXT NOT NULL,
            value_date TEXT,
            reference TEXT,
            creditor_reference TEXT,
            end_to_end_id TEXT,
            counterparty_name TEXT,
            counterparty_iban TEXT,
            remittance TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            matched_invoice_id INTEGER,
            matched_payment_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id),
            FOREIGN KEY (matched_invoice_id) REFERENCES invoices(id),
            UNIQUE (company_id, bank_account_id, entry_reference)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL,
            invoice_id INTEGER NOT NULL,
            bank_account_id INTEGER NOT NULL,
            direction TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            method TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            structured_reference TEXT,
            entry_reference TEXT,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (invoice_id) REFERENCES invoices(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    company_id: i64,
    bank_account_id: i64,
    entry_reference: String,
    direction: String,
    amount_cents: i64,
    currency: String,
    booking_date: NaiveDate,
    value_date: Option<NaiveDate>,
    reference: Option<String>,
    creditor_reference: Option<String>,
    end_to_end_id: Option<String>,
    counterparty_name: Option<String>,
    counterparty_iban: Option<String>,
    remittance: Option<String>,
    status: String,
    matched_invoice_id: Option<i64>,
    matched_payment_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<BankTransaction, StoreError> {
        Ok(BankTransaction {
            id: TransactionId(self.id),
            company_id: CompanyId(self.company_id),
            bank_account_id: BankAccountId(self.bank_account_id),
            entry_reference: self.entry_reference,
            direction: self.direction.parse().map_err(StoreError::Corrupt)?,
            amount: Money::from_cents(self.amount_cents),
            currency: self.currency,
            booking_date: self.booking_date,
            value_date: self.value_date,
            reference: self.reference,
            creditor_reference: self.creditor_reference,
            end_to_end_id: self.end_to_end_id,
            counterparty_name: self.counterparty_name,
            counterparty_iban: self.counterparty_iban,
            remittance: self.remittance,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            matched_invoice_id: self.matched_invoice_id.map(InvoiceId),
            matched_payment_id: self.matched_payment_id.map(PaymentId),
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: i64,
    company_id: i64,
    number: String,
    counterparty: String,
    total_cents: i64,
    status: String,
    reference: Option<String>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice, StoreError> {
        Ok(Invoice {
            id: InvoiceId(self.id),
            company_id: CompanyId(self.company_id),
            number: self.number,
            counterparty: self.counterparty,
            total: Money::from_cents(self.total_cents),
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            reference: self.reference,
        })
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &TransactionFilter) {
    if let Some(account) = filter.bank_account_id {
        query.push(" AND t.bank_account_id = ").push_bind(account.0);
    }
    if let Some(status) = filter.status {
        query.push(" AND t.status = ").push_bind(status.as_str());
    }
    if let Some(direction) = filter.direction {
        query.push(" AND t.direction = ").push_bind(direction.as_str());
    }
    if let Some(from) = filter.from_date {
        query.push(" AND t.booking_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to_date {
        query.push(" AND t.booking_date <= ").push_bind(to);
    }
}

#[async_trait]
impl ReconStore for SqliteStore {
    async fn create_bank_account(
        &self,
        account: NewBankAccount,
    ) -> Result<BankAccount, StoreError> {
        let row = sqlx::query(
            "INSERT INTO bank_accounts (company_id, name, iban, currency) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(account.company_id.0)
        .bind(&account.name)
        .bind(&account.iban)
        .bind(&account.currency)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(BankAccount {
            id: BankAccountId(row.try_get("id").map_err(backend)?),
            company_id: account.company_id,
            name: account.name,
            iban: account.iban,
            currency: account.currency,
        })
    }

    async fn bank_account(
        &self,
        company: CompanyId,
        id: BankAccountId,
    ) -> Result<Option<BankAccount>, StoreError> {
        let row = sqlx::query_as::<_, (i64, i64, String, String, String)>(
            "SELECT id, company_id, name, iban, currency FROM bank_accounts \
             WHERE id = ? AND company_id = ?",
        )
        .bind(id.0)
        .bind(company.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| BankAccount {
            id: BankAccountId(r.0),
            company_id: CompanyId(r.1),
            name: r.2,
            iban: r.3,
            currency: r.4,
        }))
    }

    async fn insert_transaction(
        &self,
        transaction: NewBankTransaction,
    ) -> Result<InsertOutcome, StoreError> {
        // OR IGNORE turns a dedup-key collision into "no row returned":
        // re-importing a statement is an expected no-op, not an error.
        let row = sqlx::query(
            r#"
            INSERT OR IGNORE INTO bank_transactions (
                company_id, bank_account_id, entry_reference, direction,
                amount_cents, currency, booking_date, value_date, reference,
                creditor_reference, end_to_end_id, counterparty_name,
                counterparty_iban, remittance, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            RETURNING id, created_at
            "#,
        )
        .bind(transaction.company_id.0)
        .bind(transaction.bank_account_id.0)
        .bind(&transaction.entry_reference)
        .bind(transaction.direction.as_str())
        .bind(transaction.amount.to_cents())
        .bind(&transaction.currency)
        .bind(transaction.booking_date)
        .bind(transaction.value_date)
        .bind(&transaction.reference)
        .bind(&transaction.creditor_reference)
        .bind(&transaction.end_to_end_id)
        .bind(&transaction.counterparty_name)
        .bind(&transaction.counterparty_iban)
        .bind(&transaction.remittance)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(InsertOutcome::Duplicate);
        };

        Ok(InsertOutcome::Inserted(BankTransaction {
            id: TransactionId(row.try_get("id").map_err(backend)?),
            company_id: transaction.company_id,
            bank_account_id: transaction.bank_account_id,
            entry_reference: transaction.entry_reference,
            direction: transaction.direction,
            amount: transaction.amount,
            currency: transaction.currency,
            booking_date: transaction.booking_date,
            value_date: transaction.value_date,
            reference: transaction.reference,
            creditor_reference: transaction.creditor_reference,
            end_to_end_id: transaction.end_to_end_id,
            counterparty_name: transaction.counterparty_name,
            counterparty_iban: transaction.counterparty_iban,
            remittance: transaction.remittance,
            status: TransactionStatus::Pending,
            matched_invoice_id: None,
            matched_payment_id: None,
            created_at: row.try_get("created_at").map_err(backend)?,
        }))
    }

    async fn transaction(
        &self,
        company: CompanyId,
        id: TransactionId,
    ) -> Result<Option<BankTransaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM bank_transactions WHERE id = ? AND company_id = ?",
        )
        .bind(id.0)
        .bind(company.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(TransactionRow::into_transaction).transpose()
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, StoreError> {
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 200);

        let mut count_query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM bank_transactions t WHERE t.company_id = ",
        );
        count_query.push_bind(filter.company_id.0);
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT t.*, a.iban AS account_iban, i.number AS invoice_number, \
             p.amount_cents AS payment_cents \
             FROM bank_transactions t \
             JOIN bank_accounts a ON a.id = t.bank_account_id \
             LEFT JOIN invoices i ON i.id = t.matched_invoice_id \
             LEFT JOIN payments p ON p.id = t.matched_payment_id \
             WHERE t.company_id = ",
        );
        query.push_bind(filter.company_id.0);
        push_filters(&mut query, filter);
        query.push(" ORDER BY t.booking_date DESC, t.id DESC LIMIT ");
        query.push_bind(page_size as i64);
        query.push(" OFFSET ");
        query.push_bind((i64::from(page) - 1) * i64::from(page_size));

        let rows = query.build().fetch_all(&self.pool).await.map_err(backend)?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let transaction = TransactionRow::from_row(&row)
                .map_err(backend)?
                .into_transaction()?;
            items.push(TransactionSummary {
                transaction,
                account_iban: row.try_get("account_iban").map_err(backend)?,
                invoice_number: row.try_get("invoice_number").map_err(backend)?,
                payment_amount: row
                    .try_get::<Option<i64>, _>("payment_cents")
                    .map_err(backend)?
                    .map(Money::from_cents),
            });
        }

        Ok(TransactionPage {
            items,
            total: total as u64,
            page,
            page_size,
        })
    }

    async fn pending_transactions(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<BankTransaction>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM bank_transactions WHERE status = 'pending' AND company_id = ",
        );
        query.push_bind(company.0);
        if let Some(account) = account {
            query.push(" AND bank_account_id = ").push_bind(account.0);
        }
        query.push(" ORDER BY id");

        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter()
            .map(TransactionRow::into_transaction)
            .collect()
    }

    async fn set_matched(
        &self,
        id: TransactionId,
        invoice: InvoiceId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE bank_transactions SET status = 'matched', matched_invoice_id = ? \
             WHERE id = ? AND status NOT IN ('reconciled', 'ignored')",
        )
        .bind(invoice.0)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "transaction {id} is already settled or ignored"
            )));
        }
        Ok(())
    }

    async fn set_ignored(&self, id: TransactionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE bank_transactions SET status = 'ignored' \
             WHERE id = ? AND status NOT IN ('reconciled', 'ignored')",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "transaction {id} is already settled or ignored"
            )));
        }
        Ok(())
    }

    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let row = sqlx::query(
            "INSERT INTO invoices (company_id, number, counterparty, total_cents, reference) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(invoice.company_id.0)
        .bind(&invoice.number)
        .bind(&invoice.counterparty)
        .bind(invoice.total.to_cents())
        .bind(&invoice.reference)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Invoice {
            id: InvoiceId(row.try_get("id").map_err(backend)?),
            company_id: invoice.company_id,
            number: invoice.number,
            counterparty: invoice.counterparty,
            total: invoice.total,
            status: InvoiceStatus::Open,
            reference: invoice.reference,
        })
    }

    async fn invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, company_id, number, counterparty, total_cents, status, reference \
             FROM invoices WHERE id = ? AND company_id = ?",
        )
        .bind(id.0)
        .bind(company.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    async fn open_invoice_by_reference(
        &self,
        company: CompanyId,
        reference: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, company_id, number, counterparty, total_cents, status, reference \
             FROM invoices \
             WHERE company_id = ? AND reference = ? AND status IN ('open', 'partial') \
             ORDER BY id LIMIT 1",
        )
        .bind(company.0)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    async fn open_invoices_near_amount(
        &self,
        company: CompanyId,
        amount: Money,
        tolerance: Money,
    ) -> Result<Vec<Invoice>, StoreError> {
        // The LIMIT bounds pathological windows; the engine caps per
        // strategy on top of this.
        let rows = sqlx::query_as::<_, InvoiceRow>(
            "SELECT id, company_id, number, counterparty, total_cents, status, reference \
             FROM invoices \
             WHERE company_id = ? AND status IN ('open', 'partial') \
               AND total_cents BETWEEN ? AND ? \
             ORDER BY id LIMIT 100",
        )
        .bind(company.0)
        .bind((amount - tolerance).to_cents())
        .bind((amount + tolerance).to_cents())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }

    async fn settle(
        &self,
        transaction: TransactionId,
        invoice: InvoiceId,
        payment: NewPayment,
    ) -> Result<PaymentId, StoreError> {
        let mut db_tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query(
            r#"
            INSERT INTO payments (
                company_id, invoice_id, bank_account_id, direction, amount_cents,
                method, payment_date, structured_reference, entry_reference, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(payment.company_id.0)
        .bind(payment.invoice_id.0)
        .bind(payment.bank_account_id.0)
        .bind(payment.direction.as_str())
        .bind(payment.amount.to_cents())
        .bind(payment.method.as_str())
        .bind(payment.payment_date)
        .bind(&payment.structured_reference)
        .bind(&payment.entry_reference)
        .bind(&payment.notes)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(backend)?;
        let payment_id: i64 = row.try_get("id").map_err(backend)?;

        // The payment logic owns the invoice transition: fully covered by
        // cumulative payments → paid, anything less → partial.
        let (total_cents,): (i64,) =
            sqlx::query_as("SELECT total_cents FROM invoices WHERE id = ?")
                .bind(invoice.0)
                .fetch_one(&mut *db_tx)
                .await
                .map_err(backend)?;
        let (paid_cents,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE invoice_id = ?",
        )
        .bind(invoice.0)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(backend)?;
        let status = if paid_cents >= total_cents {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        };
        sqlx::query("UPDATE invoices SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(invoice.0)
            .execute(&mut *db_tx)
            .await
            .map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE bank_transactions \
             SET status = 'reconciled', matched_invoice_id = ?, matched_payment_id = ? \
             WHERE id = ? AND status NOT IN ('reconciled', 'ignored')",
        )
        .bind(invoice.0)
        .bind(payment_id)
        .bind(transaction.0)
        .execute(&mut *db_tx)
        .await
        .map_err(backend)?;
        if updated.rows_affected() == 0 {
            // Dropping the open transaction rolls the payment back too.
            return Err(StoreError::Conflict(format!(
                "transaction {transaction} is already settled or ignored"
            )));
        }

        db_tx.commit().await.map_err(backend)?;
        Ok(PaymentId(payment_id))
    }

    async fn status_totals(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<StatusTotal>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT status, direction, COUNT(*) AS count, \
             COALESCE(SUM(amount_cents), 0) AS amount_cents \
             FROM bank_transactions WHERE company_id = ",
        );
        query.push_bind(company.0);
        if let Some(account) = account {
            query.push(" AND bank_account_id = ").push_bind(account.0);
        }
        query.push(" GROUP BY status, direction");

        let rows = query.build().fetch_all(&self.pool).await.map_err(backend)?;
        rows.into_iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(backend)?;
                let direction: String = row.try_get("direction").map_err(backend)?;
                Ok(StatusTotal {
                    status: status.parse().map_err(StoreError::Corrupt)?,
                    direction: direction.parse().map_err(StoreError::Corrupt)?,
                    count: row.try_get("count").map_err(backend)?,
                    amount: Money::from_cents(row.try_get("amount_cents").map_err(backend)?),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::Direction;

    async fn store_with_account() -> (SqliteStore, BankAccount) {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let account = store
            .create_bank_account(NewBankAccount {
                company_id: CompanyId(1),
                name: "Geschäftskonto".to_string(),
                iban: "CH9300762011623852957".to_string(),
                currency: "CHF".to_string(),
            })
            .await
            .unwrap();
        (store, account)
    }

    fn new_txn(account: &BankAccount, entry_reference: &str, cents: i64) -> NewBankTransaction {
        NewBankTransaction {
            company_id: account.company_id,
            bank_account_id: account.id,
            entry_reference: entry_reference.to_string(),
            direction: Direction::Credit,
            amount: Money::from_cents(cents),
            currency: "CHF".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            value_date: None,
            reference: None,
            creditor_reference: None,
            end_to_end_id: None,
            counterparty_name: Some("Muster Treuhand AG".to_string()),
            counterparty_iban: None,
            remittance: None,
        }
    }

    async fn payment_count(store: &SqliteStore) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM payments")
            .fetch_one(store.pool())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn duplicate_entry_reference_is_skipped() {
        let (store, account) = store_with_account().await;

        let first = store
            .insert_transaction(new_txn(&account, "ENTRY-1", 10_000))
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store
            .insert_transaction(new_txn(&account, "ENTRY-1", 10_000))
            .await
            .unwrap();
        assert!(matches!(second, InsertOutcome::Duplicate));

        let page = store
            .list_transactions(&TransactionFilter::for_company(account.company_id))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn settle_links_payment_invoice_and_transaction() {
        let (store, account) = store_with_account().await;
        let invoice = store
            .create_invoice(NewInvoice {
                company_id: account.company_id,
                number: "RE-1001".to_string(),
                counterparty: "Muster Treuhand AG".to_string(),
                total: Money::from_cents(10_000),
                reference: None,
            })
            .await
            .unwrap();
        let InsertOutcome::Inserted(txn) = store
            .insert_transaction(new_txn(&account, "ENTRY-1", 10_000))
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };

        let payment_id = store
            .settle(
                txn.id,
                invoice.id,
                NewPayment {
                    company_id: account.company_id,
                    invoice_id: invoice.id,
                    bank_account_id: account.id,
                    direction: Direction::Credit,
                    amount: txn.amount,
                    method: saldo_core::PaymentMethod::BankTransfer,
                    payment_date: txn.booking_date,
                    structured_reference: None,
                    entry_reference: Some(txn.entry_reference.clone()),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let settled = store
            .transaction(account.company_id, txn.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Reconciled);
        assert_eq!(settled.matched_invoice_id, Some(invoice.id));
        assert_eq!(settled.matched_payment_id, Some(payment_id));

        let invoice = store
            .invoice(account.company_id, invoice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn settle_twice_fails_and_rolls_back_second_payment() {
        let (store, account) = store_with_account().await;
        let invoice = store
            .create_invoice(NewInvoice {
                company_id: account.company_id,
                number: "RE-1001".to_string(),
                counterparty: "Muster".to_string(),
                total: Money::from_cents(10_000),
                reference: None,
            })
            .await
            .unwrap();
        let InsertOutcome::Inserted(txn) = store
            .insert_transaction(new_txn(&account, "ENTRY-1", 10_000))
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };

        let payment = NewPayment {
            company_id: account.company_id,
            invoice_id: invoice.id,
            bank_account_id: account.id,
            direction: Direction::Credit,
            amount: txn.amount,
            method: saldo_core::PaymentMethod::BankTransfer,
            payment_date: txn.booking_date,
            structured_reference: None,
            entry_reference: None,
            notes: None,
        };
        store.settle(txn.id, invoice.id, payment.clone()).await.unwrap();
        assert_eq!(payment_count(&store).await, 1);

        let again = store.settle(txn.id, invoice.id, payment).await;
        assert!(matches!(again, Err(StoreError::Conflict(_))));
        // The rejected settlement must not leave its payment behind.
        assert_eq!(payment_count(&store).await, 1);
    }

    #[tokio::test]
    async fn partial_payment_keeps_invoice_partial() {
        let (store, account) = store_with_account().await;
        let invoice = store
            .create_invoice(NewInvoice {
                company_id: account.company_id,
                number: "RE-2".to_string(),
                counterparty: "Muster".to_string(),
                total: Money::from_cents(50_000),
                reference: None,
            })
            .await
            .unwrap();
        let InsertOutcome::Inserted(txn) = store
            .insert_transaction(new_txn(&account, "ENTRY-1", 20_000))
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };

        store
            .settle(
                txn.id,
                invoice.id,
                NewPayment {
                    company_id: account.company_id,
                    invoice_id: invoice.id,
                    bank_account_id: account.id,
                    direction: Direction::Credit,
                    amount: txn.amount,
                    method: saldo_core::PaymentMethod::BankTransfer,
                    payment_date: txn.booking_date,
                    structured_reference: None,
                    entry_reference: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let invoice = store
            .invoice(account.company_id, invoice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Partial);
    }

    #[tokio::test]
    async fn listing_filters_and_paginates() {
        let (store, account) = store_with_account().await;
        for i in 0..3 {
            store
                .insert_transaction(new_txn(&account, &format!("ENTRY-{i}"), 1_000 + i))
                .await
                .unwrap();
        }

        let mut filter = TransactionFilter::for_company(account.company_id);
        filter.status = Some(TransactionStatus::Pending);
        filter.page_size = 2;
        let page = store.list_transactions(&filter).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].account_iban, account.iban);
        assert!(page.items[0].invoice_number.is_none());

        filter.page = 2;
        let page = store.list_transactions(&filter).await.unwrap();
        assert_eq!(page.items.len(), 1);

        filter.page = 1;
        filter.status = Some(TransactionStatus::Reconciled);
        let page = store.list_transactions(&filter).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn status_totals_group_by_status_and_direction() {
        let (store, account) = store_with_account().await;
        store
            .insert_transaction(new_txn(&account, "ENTRY-1", 10_000))
            .await
            .unwrap();
        let mut debit = new_txn(&account, "ENTRY-2", 2_500);
        debit.direction = Direction::Debit;
        store.insert_transaction(debit).await.unwrap();

        let totals = store
            .status_totals(account.company_id, Some(account.id))
            .await
            .unwrap();
        assert_eq!(totals.len(), 2);
        let credit = totals
            .iter()
            .find(|t| t.direction == Direction::Credit)
            .unwrap();
        assert_eq!(credit.status, TransactionStatus::Pending);
        assert_eq!(credit.count, 1);
        assert_eq!(credit.amount, Money::from_cents(10_000));
    }
}
