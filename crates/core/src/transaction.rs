use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BankAccountId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvoiceId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BankAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction: '{other}'")),
        }
    }
}

/// Lifecycle of an imported booking line. RECONCILED and IGNORED are
/// terminal; nothing reopens them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Matched,
    Reconciled,
    Ignored,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Matched => "matched",
            TransactionStatus::Reconciled => "reconciled",
            TransactionStatus::Ignored => "ignored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Reconciled | TransactionStatus::Ignored
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "matched" => Ok(TransactionStatus::Matched),
            "reconciled" => Ok(TransactionStatus::Reconciled),
            "ignored" => Ok(TransactionStatus::Ignored),
            other => Err(format!("unknown transaction status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub company_id: CompanyId,
    pub name: String,
    pub iban: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewBankAccount {
    pub company_id: CompanyId,
    pub name: String,
    pub iban: String,
    pub currency: String,
}

/// A booking line as extracted from a statement, before it has an identity.
#[derive(Debug, Clone)]
pub struct NewBankTransaction {
    pub company_id: CompanyId,
    pub bank_account_id: BankAccountId,
    pub entry_reference: String,
    pub direction: Direction,
    pub amount: Money,
    pub currency: String,
    pub booking_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    /// Canonical QR/ISR reference extracted from the remittance fields.
    pub reference: Option<String>,
    /// Raw creditor reference text as delivered by the bank.
    pub creditor_reference: Option<String>,
    pub end_to_end_id: Option<String>,
    pub counterparty_name: Option<String>,
    pub counterparty_iban: Option<String>,
    pub remittance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: TransactionId,
    pub company_id: CompanyId,
    pub bank_account_id: BankAccountId,
    pub entry_reference: String,
    pub direction: Direction,
    pub amount: Money,
    pub currency: String,
    pub booking_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub creditor_reference: Option<String>,
    pub end_to_end_id: Option<String>,
    pub counterparty_name: Option<String>,
    pub counterparty_iban: Option<String>,
    pub remittance: Option<String>,
    pub status: TransactionStatus,
    pub matched_invoice_id: Option<InvoiceId>,
    pub matched_payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

/// Filter for the paginated transaction listing. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub company_id: CompanyId,
    pub bank_account_id: Option<BankAccountId>,
    pub status: Option<TransactionStatus>,
    pub direction: Option<Direction>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: u32,
    pub page_size: u32,
}

impl TransactionFilter {
    pub fn for_company(company_id: CompanyId) -> Self {
        TransactionFilter {
            company_id,
            bank_account_id: None,
            status: None,
            direction: None,
            from_date: None,
            to_date: None,
            page: 1,
            page_size: 50,
        }
    }
}

/// One listing row with the joined summary fields the UI shows next to
/// the transaction itself.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub transaction: BankTransaction,
    pub account_iban: String,
    pub invoice_number: Option<String>,
    pub payment_amount: Option<Money>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub items: Vec<TransactionSummary>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
