#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use saldo_core::{
    BankAccount, BankAccountId, BankTransaction, CompanyId, Direction, InsertOutcome,
    Invoice, InvoiceId, InvoiceStatus, Money, NewBankAccount, NewBankTransaction,
    NewInvoice, NewPayment, PaymentId, ReconStore, StatusTotal, StoreError,
    TransactionFilter, TransactionId, TransactionPage, TransactionStatus,
    TransactionSummary,
};

#[derive(Default)]
struct State {
    accounts: HashMap<BankAccountId, BankAccount>,
    invoices: HashMap<InvoiceId, Invoice>,
    transactions: HashMap<TransactionId, BankTransaction>,
    payments: Vec<(PaymentId, NewPayment)>,
    fail_settlement: HashSet<TransactionId>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`ReconStore`] double. Mirrors the SQLite store's contract,
/// including the dedup key and the terminal-state guards, and can be
/// armed to fail settlement for chosen transactions.
#[derive(Default)]
pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    pub fn add_account(&self, company: i64, iban: &str) -> BankAccount {
        let mut state = self.state.lock().unwrap();
        let id = BankAccountId(state.next_id());
        let account = BankAccount {
            id,
            company_id: CompanyId(company),
            name: "Geschäftskonto".to_string(),
            iban: iban.to_string(),
            currency: "CHF".to_string(),
        };
        state.accounts.insert(id, account.clone());
        account
    }

    pub fn add_invoice(
        &self,
        company: i64,
        number: &str,
        counterparty: &str,
        total_cents: i64,
        reference: Option<&str>,
    ) -> Invoice {
        let mut state = self.state.lock().unwrap();
        let id = InvoiceId(state.next_id());
        let invoice = Invoice {
            id,
            company_id: CompanyId(company),
            number: number.to_string(),
            counterparty: counterparty.to_string(),
            total: Money::from_cents(total_cents),
            status: InvoiceStatus::Open,
            reference: reference.map(str::to_string),
        };
        state.invoices.insert(id, invoice.clone());
        invoice
    }

    /// Seeds a pending transaction directly, bypassing the importer.
    pub fn add_transaction(
        &self,
        account: &BankAccount,
        entry_reference: &str,
        amount_cents: i64,
        reference: Option<&str>,
        counterparty: Option<&str>,
    ) -> BankTransaction {
        let mut state = self.state.lock().unwrap();
        let id = TransactionId(state.next_id());
        let txn = BankTransaction {
            id,
            company_id: account.company_id,
            bank_account_id: account.id,
            entry_reference: entry_reference.to_string(),
            direction: Direction::Credit,
            amount: Money::from_cents(amount_cents),
            currency: "CHF".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            value_date: None,
            reference: reference.map(str::to_string),
            creditor_reference: None,
            end_to_end_id: None,
            counterparty_name: counterparty.map(str::to_string),
            counterparty_iban: None,
            remittance: None,
            status: TransactionStatus::Pending,
            matched_invoice_id: None,
            matched_payment_id: None,
            created_at: Utc::now(),
        };
        state.transactions.insert(id, txn.clone());
        txn
    }

    /// Arms a one-off settlement failure, standing in for a payment
    /// collaborator outage.
    pub fn fail_settlement_for(&self, id: TransactionId) {
        self.state.lock().unwrap().fail_settlement.insert(id);
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn payment_count(&self) -> usize {
        self.state.lock().unwrap().payments.len()
    }

    pub fn get_transaction(&self, id: TransactionId) -> BankTransaction {
        self.state.lock().unwrap().transactions[&id].clone()
    }

    pub fn get_invoice(&self, id: InvoiceId) -> Invoice {
        self.state.lock().unwrap().invoices[&id].clone()
    }
}

#[async_trait]
impl ReconStore for MemStore {
    async fn create_bank_account(
        &self,
        account: NewBankAccount,
    ) -> Result<BankAccount, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = BankAccountId(state.next_id());
        let account = BankAccount {
            id,
            company_id: account.company_id,
            name: account.name,
            iban: account.iban,
            currency: account.currency,
        };
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn bank_account(
        &self,
        company: CompanyId,
        id: BankAccountId,
    ) -> Result<Option<BankAccount>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .get(&id)
            .filter(|a| a.company_id == company)
            .cloned())
    }

    async fn insert_transaction(
        &self,
        transaction: NewBankTransaction,
    ) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.transactions.values().any(|t| {
            t.company_id == transaction.company_id
                && t.bank_account_id == transaction.bank_account_id
                && t.entry_reference == transaction.entry_reference
        });
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }

        let id = TransactionId(state.next_id());
        let txn = BankTransaction {
            id,
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
            created_at: Utc::now(),
        };
        state.transactions.insert(id, txn.clone());
        Ok(InsertOutcome::Inserted(txn))
    }

    async fn transaction(
        &self,
        company: CompanyId,
        id: TransactionId,
    ) -> Result<Option<BankTransaction>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .get(&id)
            .filter(|t| t.company_id == company)
            .cloned())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage, StoreError> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<&BankTransaction> = state
            .transactions
            .values()
            .filter(|t| t.company_id == filter.company_id)
            .filter(|t| filter.bank_account_id.is_none_or(|a| t.bank_account_id == a))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.direction.is_none_or(|d| t.direction == d))
            .filter(|t| filter.from_date.is_none_or(|d| t.booking_date >= d))
            .filter(|t| filter.to_date.is_none_or(|d| t.booking_date <= d))
            .collect();
        matches.sort_by(|a, b| (b.booking_date, b.id).cmp(&(a.booking_date, a.id)));

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 200);
        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(((page as usize) - 1) * page_size as usize)
            .take(page_size as usize)
            .map(|t| TransactionSummary {
                transaction: t.clone(),
                account_iban: state
                    .accounts
                    .get(&t.bank_account_id)
                    .map(|a| a.iban.clone())
                    .unwrap_or_default(),
                invoice_number: t
                    .matched_invoice_id
                    .and_then(|id| state.invoices.get(&id))
                    .map(|i| i.number.clone()),
                payment_amount: t.matched_payment_id.and_then(|id| {
                    state
                        .payments
                        .iter()
                        .find(|(pid, _)| *pid == id)
                        .map(|(_, p)| p.amount)
                }),
            })
            .collect();

        Ok(TransactionPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn pending_transactions(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<BankTransaction>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|t| t.company_id == company)
            .filter(|t| t.status == TransactionStatus::Pending)
            .filter(|t| account.is_none_or(|a| t.bank_account_id == a))
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.id);
        Ok(pending)
    }

    async fn set_matched(
        &self,
        id: TransactionId,
        invoice: InvoiceId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.transactions.get_mut(&id) {
            Some(txn) if !txn.status.is_terminal() => {
                txn.status = TransactionStatus::Matched;
                txn.matched_invoice_id = Some(invoice);
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!(
                "transaction {id} is already settled or ignored"
            ))),
        }
    }

    async fn set_ignored(&self, id: TransactionId) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.transactions.get_mut(&id) {
            Some(txn) if !txn.status.is_terminal() => {
                txn.status = TransactionStatus::Ignored;
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!(
                "transaction {id} is already settled or ignored"
            ))),
        }
    }

    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = InvoiceId(state.next_id());
        let invoice = Invoice {
            id,
            company_id: invoice.company_id,
            number: invoice.number,
            counterparty: invoice.counterparty,
            total: invoice.total,
            status: InvoiceStatus::Open,
            reference: invoice.reference,
        };
        state.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn invoice(
        &self,
        company: CompanyId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .invoices
            .get(&id)
            .filter(|i| i.company_id == company)
            .cloned())
    }

    async fn open_invoice_by_reference(
        &self,
        company: CompanyId,
        reference: &str,
    ) -> Result<Option<Invoice>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut hits: Vec<&Invoice> = state
            .invoices
            .values()
            .filter(|i| i.company_id == company)
            .filter(|i| i.status.is_open())
            .filter(|i| i.reference.as_deref() == Some(reference))
            .collect();
        hits.sort_by_key(|i| i.id);
        Ok(hits.first().map(|i| (*i).clone()))
    }

    async fn open_invoices_near_amount(
        &self,
        company: CompanyId,
        amount: Money,
        tolerance: Money,
    ) -> Result<Vec<Invoice>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut hits: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.company_id == company)
            .filter(|i| i.status.is_open())
            .filter(|i| i.total.abs_diff(amount) <= tolerance)
            .cloned()
            .collect();
        hits.sort_by_key(|i| i.id);
        Ok(hits)
    }

    async fn settle(
        &self,
        transaction: TransactionId,
        invoice: InvoiceId,
        payment: NewPayment,
    ) -> Result<PaymentId, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_settlement.contains(&transaction) {
            return Err(StoreError::Backend(
                "payment collaborator unavailable".to_string(),
            ));
        }
        let terminal = state
            .transactions
            .get(&transaction)
            .is_none_or(|t| t.status.is_terminal());
        if terminal {
            return Err(StoreError::Conflict(format!(
                "transaction {transaction} is already settled or ignored"
            )));
        }

        let payment_id = PaymentId(state.next_id());
        state.payments.push((payment_id, payment));

        let paid: Money = state
            .payments
            .iter()
            .filter(|(_, p)| p.invoice_id == invoice)
            .fold(Money::zero(), |sum, (_, p)| sum + p.amount);
        if let Some(stored) = state.invoices.get_mut(&invoice) {
            stored.status = if paid >= stored.total {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::Partial
            };
        }

        let txn = state.transactions.get_mut(&transaction).unwrap();
        txn.status = TransactionStatus::Reconciled;
        txn.matched_invoice_id = Some(invoice);
        txn.matched_payment_id = Some(payment_id);

        Ok(payment_id)
    }

    async fn status_totals(
        &self,
        company: CompanyId,
        account: Option<BankAccountId>,
    ) -> Result<Vec<StatusTotal>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut groups: HashMap<(TransactionStatus, Direction), (i64, Money)> = HashMap::new();
        for txn in state
            .transactions
            .values()
            .filter(|t| t.company_id == company)
            .filter(|t| account.is_none_or(|a| t.bank_account_id == a))
        {
            let entry = groups
                .entry((txn.status, txn.direction))
                .or_insert((0, Money::zero()));
            entry.0 += 1;
            entry.1 = entry.1 + txn.amount;
        }
        Ok(groups
            .into_iter()
            .map(|((status, direction), (count, amount))| StatusTotal {
                status,
                direction,
                count,
                amount,
            })
            .collect())
    }
}
