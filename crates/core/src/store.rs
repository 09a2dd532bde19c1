use async_trait::async_trait;

use super::error::StoreError;
use super::invoice::{Invoice, NewInvoice, NewPayment};
use super::money::Money;
use super::transaction::{
    BankAccount, BankAccountId, BankTransaction, CompanyId, Direction, InvoiceId,
    NewBankAccount, NewBankTransaction, PaymentId, TransactionFilter, TransactionId,
    TransactionPage, TransactionStatus,
};

/// Result of an idempotent transaction insert. A duplicate dedup key
/// `(company, bank account, entry reference)` is an expected outcome of
/// re-importing a statement, not an error.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(BankTransaction),
    Duplicate,
}

/// One aggregation row for the statistics view.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTotal {
    pub status: TransactionStatus,
    pub direction: Direction,
    pub count: i64,
    pub amount: Money,
}

/// Storage access of the reconciliation core: read invoices, read/write
/// bank transactions, create payments. Orchestrators take this as an
/// explicit dependency so tests can substitute an in-memory fake.
#[async_trait]
pub trait ReconStore: Send + Sync {
    async fn create_bank_account(
        &self,
        account: NewBankAccount,
    ) -> Result<BankAccount, StoreError>;

    async fn bank_account(
        &self,
        company: CompanyId,
        id: BankAccountId,
    ) -> Result<Option<BankAccount>, StoreError>;

    /// Inserts a transaction in PENDING status, or reports a duplicate
    /// dedup key. Implementations must enforce the key with a storage-level
    /// unique constraint so concurrent imports of the same statement cannot
    /// race past the check.
    async fn insert_transaction(
        &self,
        transaction: NewBankTransaction,
    ) -> Result<InsertOutcome, StoreError>;

    /// Company-scoped point lookup: a transaction of another company does
    /// not exist as far as the caller is concerned.
    async fn transaction(
        &self,
        company: CompanyId,
        id: TransactionId,
    ) -> Result<Option<BankTransaction>, StoreError>;

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, StoreError>;

    async fn pending_transactions(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<BankTransaction>, StoreError>;

    /// Records a suggested match without settling: status becomes MATCHED
    /// and the candidate invoice is remembered.
    async fn set_matched(
        &self,
        id: TransactionId,
        invoice: InvoiceId,
    ) -> Result<(), StoreError>;

    async fn set_ignored(&self, id: TransactionId) -> Result<(), StoreError>;

    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError>;

    async fn invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError>;

    /// The open invoice whose stored structured reference equals `reference`
    /// exactly, if any.
    async fn open_invoice_by_reference(
        &self,
        company: CompanyId,
        reference: &str,
    ) -> Result<Option<Invoice>, StoreError>;

    /// Open invoices whose total lies within `tolerance` of `amount`.
    /// Read-only candidate search; must not block writers.
    async fn open_invoices_near_amount(
        &self,
        company: CompanyId,
        amount: Money,
        tolerance: Money,
    ) -> Result<Vec<Invoice>, StoreError>;

    /// The sole mechanism for creating settlement records: creates the
    /// payment, lets the payment logic advance the invoice status
    /// (PAID/PARTIAL by cumulative paid amount), and marks the transaction
    /// RECONCILED with both ids recorded — all as one transactional unit.
    /// A transaction marked RECONCILED without its payment (or the
    /// reverse) must never become observable.
    async fn settle(
        &self,
        transaction: TransactionId,
        invoice: InvoiceId,
        payment: NewPayment,
    ) -> Result<PaymentId, StoreError>;

    /// Per-(status, direction) counts and amount sums for a scope.
    async fn status_totals(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<StatusTotal>, StoreError>;
}
