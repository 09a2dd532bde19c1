use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::Money;
use super::transaction::{BankAccountId, CompanyId, Direction, InvoiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Open,
    Partial,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Eligible for matching: not yet fully settled, not cancelled.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Open | InvoiceStatus::Partial)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InvoiceStatus::Open),
            "partial" => Ok(InvoiceStatus::Partial),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("unknown invoice status: '{other}'")),
        }
    }
}

/// Read view of an invoice. The invoice itself is owned by the documents
/// module; the reconciliation core reads it and only ever changes its
/// status indirectly, through payment creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub company_id: CompanyId,
    pub number: String,
    pub counterparty: String,
    pub total: Money,
    pub status: InvoiceStatus,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub company_id: CompanyId,
    pub number: String,
    pub counterparty: String,
    pub total: Money,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method: '{other}'")),
        }
    }
}

/// Settlement record handed to the payments collaborator. Once created,
/// the payment belongs to that subsystem; the core only keeps its id.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub company_id: CompanyId,
    pub invoice_id: InvoiceId,
    pub bank_account_id: BankAccountId,
    pub direction: Direction,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub structured_reference: Option<String>,
    pub entry_reference: Option<String>,
    pub notes: Option<String>,
}
