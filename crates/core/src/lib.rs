pub mod error;
pub mod invoice;
pub mod money;
pub mod store;
pub mod transaction;

pub use error::{ReconError, StoreError};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice, NewPayment, PaymentMethod};
pub use money::Money;
pub use store::{InsertOutcome, ReconStore, StatusTotal};
pub use transaction::{
    BankAccount, BankAccountId, BankTransaction, CompanyId, Direction, InvoiceId,
    NewBankAccount, NewBankTransaction, PaymentId, TransactionFilter, TransactionId,
    TransactionPage, TransactionStatus, TransactionSummary,
};
