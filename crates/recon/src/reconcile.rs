use tracing::{info, warn};

use saldo_core::{
    BankAccountId, BankTransaction, CompanyId, InvoiceId, NewPayment, PaymentId,
    PaymentMethod, ReconError, ReconStore, TransactionId,
};

use crate::match_engine::{AutoMatchDecision, MatchCandidate, MatchEngine};

/// A confirmed link between a transaction, the invoice it settles, and
/// the payment created for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AutoMatchOutcome {
    Settled(Settlement),
    Parked { invoice_id: InvoiceId },
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub company_id: CompanyId,
    pub transaction_id: TransactionId,
    pub invoice_id: Option<InvoiceId>,
    pub create_payment: bool,
}

/// Per-item result of a batch run; failures are collected, never raised.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Reconciled(Settlement),
    NeedsReview {
        transaction_id: TransactionId,
        invoice_id: InvoiceId,
    },
    Unmatched {
        transaction_id: TransactionId,
    },
    Failed {
        transaction_id: TransactionId,
        error: String,
    },
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub reconciled: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

/// Ranked candidates for the interactive view. Read-only: unlike the
/// import-time decision, this never settles or parks anything.
pub async fn candidates(
    store: &dyn ReconStore,
    engine: &MatchEngine,
    company: CompanyId,
    transaction_id: TransactionId,
) -> Result<Vec<MatchCandidate>, ReconError> {
    let txn = store
        .transaction(company, transaction_id)
        .await?
        .ok_or_else(|| ReconError::not_found("transaction", transaction_id.0))?;

    let by_reference = match txn.reference.as_deref() {
        Some(reference) => store.open_invoice_by_reference(company, reference).await?,
        None => None,
    };
    let near_amount = store
        .open_invoices_near_amount(company, txn.amount, engine.config().search_window())
        .await?;

    Ok(engine.rank(&txn, by_reference.as_ref(), &near_amount))
}

/// Manually links a transaction to an invoice, optionally settling it
/// with a payment. Terminal transactions are never touched again.
pub async fn reconcile(
    store: &dyn ReconStore,
    request: ReconcileRequest,
) -> Result<BankTransaction, ReconError> {
    let txn = store
        .transaction(request.company_id, request.transaction_id)
        .await?
        .ok_or_else(|| ReconError::not_found("transaction", request.transaction_id.0))?;

    if txn.status.is_terminal() {
        return Err(ReconError::Conflict(format!(
            "transaction {} is already {}",
            txn.id, txn.status
        )));
    }

    let invoice_id = request
        .invoice_id
        .ok_or_else(|| ReconError::Validation("an invoice id is required".to_string()))?;
    // Company-scoped lookup: linking across companies is impossible.
    let invoice = store
        .invoice(request.company_id, invoice_id)
        .await?
        .ok_or_else(|| ReconError::not_found("invoice", invoice_id.0))?;

    if request.create_payment {
        let payment_id = store
            .settle(txn.id, invoice.id, payment_for(&txn, invoice.id))
            .await?;
        info!(
            transaction = %txn.id,
            invoice = %invoice.id,
            payment = %payment_id,
            "manually reconciled"
        );
    } else {
        store.set_matched(txn.id, invoice.id).await?;
    }

    store
        .transaction(request.company_id, request.transaction_id)
        .await?
        .ok_or_else(|| ReconError::not_found("transaction", request.transaction_id.0))
}

/// Dismisses a transaction that will never be reconciled (fees, internal
/// transfers, noise). Settled transactions cannot be hidden this way.
pub async fn ignore(
    store: &dyn ReconStore,
    company: CompanyId,
    transaction_id: TransactionId,
) -> Result<BankTransaction, ReconError> {
    let txn = store
        .transaction(company, transaction_id)
        .await?
        .ok_or_else(|| ReconError::not_found("transaction", transaction_id.0))?;

    if txn.status.is_terminal() {
        return Err(ReconError::Conflict(format!(
            "transaction {} is already {}",
            txn.id, txn.status
        )));
    }

    store.set_ignored(txn.id).await?;
    store
        .transaction(company, transaction_id)
        .await?
        .ok_or_else(|| ReconError::not_found("transaction", transaction_id.0))
}

/// Applies the automatic match decision to every pending transaction in
/// the scope. Each item stands alone: one failed settlement is counted
/// and the batch moves on.
pub async fn auto_reconcile_all(
    store: &dyn ReconStore,
    engine: &MatchEngine,
    company: CompanyId,
    account: Option<BankAccountId>,
) -> Result<BatchOutcome, ReconError> {
    let pending = store.pending_transactions(company, account).await?;
    let mut outcome = BatchOutcome {
        total: pending.len(),
        ..BatchOutcome::default()
    };

    for txn in &pending {
        match auto_match(store, engine, txn).await {
            Ok(AutoMatchOutcome::Settled(settlement)) => {
                outcome.reconciled += 1;
                outcome.items.push(BatchItem::Reconciled(settlement));
            }
            Ok(AutoMatchOutcome::Parked { invoice_id }) => {
                outcome.items.push(BatchItem::NeedsReview {
                    transaction_id: txn.id,
                    invoice_id,
                });
            }
            Ok(AutoMatchOutcome::Unmatched) => {
                outcome.items.push(BatchItem::Unmatched {
                    transaction_id: txn.id,
                });
            }
            Err(e) => {
                warn!(transaction = %txn.id, error = %e, "auto-reconcile item failed");
                outcome.failed += 1;
                outcome.items.push(BatchItem::Failed {
                    transaction_id: txn.id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        total = outcome.total,
        reconciled = outcome.reconciled,
        failed = outcome.failed,
        "batch auto-reconcile finished"
    );
    Ok(outcome)
}

/// The deterministic import-time decision: only an exact structured
/// reference may settle automatically, and only when the invoice total
/// is within tolerance of the transaction amount.
pub(crate) async fn auto_match(
    store: &dyn ReconStore,
    engine: &MatchEngine,
    txn: &BankTransaction,
) -> Result<AutoMatchOutcome, ReconError> {
    let Some(reference) = txn.reference.as_deref() else {
        return Ok(AutoMatchOutcome::Unmatched);
    };
    let by_reference = store
        .open_invoice_by_reference(txn.company_id, reference)
        .await?;

    match engine.auto_decision(txn, by_reference.as_ref()) {
        AutoMatchDecision::NoMatch => Ok(AutoMatchOutcome::Unmatched),
        AutoMatchDecision::Review { invoice_id } => {
            store.set_matched(txn.id, invoice_id).await?;
            info!(
                transaction = %txn.id,
                invoice = %invoice_id,
                "amount differs from invoice total, parked for review"
            );
            Ok(AutoMatchOutcome::Parked { invoice_id })
        }
        AutoMatchDecision::Settle { invoice_id } => {
            let payment_id = store
                .settle(txn.id, invoice_id, payment_for(txn, invoice_id))
                .await?;
            info!(
                transaction = %txn.id,
                invoice = %invoice_id,
                payment = %payment_id,
                "auto-reconciled"
            );
            Ok(AutoMatchOutcome::Settled(Settlement {
                transaction_id: txn.id,
                invoice_id,
                payment_id,
            }))
        }
    }
}

fn payment_for(txn: &BankTransaction, invoice_id: InvoiceId) -> NewPayment {
    NewPayment {
        company_id: txn.company_id,
        invoice_id,
        bank_account_id: txn.bank_account_id,
        direction: txn.direction,
        amount: txn.amount,
        method: PaymentMethod::BankTransfer,
        payment_date: txn.booking_date,
        structured_reference: txn.reference.clone(),
        entry_reference: Some(txn.entry_reference.clone()),
        notes: None,
    }
}
