use tracing::{info, warn};

use saldo_camt::{CamtEntry, CamtTransactionDetail, ReferenceExtractor};
use saldo_core::{
    BankAccount, BankAccountId, BankTransaction, CompanyId, Direction, InsertOutcome,
    NewBankTransaction, ReconError, ReconStore,
};

use crate::match_engine::MatchEngine;
use crate::reconcile::{auto_match, AutoMatchOutcome, Settlement};

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub company_id: CompanyId,
    pub bank_account_id: BankAccountId,
    pub xml: String,
    pub auto_reconcile: bool,
}

#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Newly persisted transactions; duplicates are not counted.
    pub imported: usize,
    /// Transactions settled by the automatic match during this import.
    pub matched: usize,
    pub transactions: Vec<BankTransaction>,
    pub settlements: Vec<Settlement>,
}

/// Imports a camt.054 statement into the bank account's transaction set.
/// Re-importing the same statement is harmless: every line already known
/// under its entry reference is skipped.
pub async fn import_statement(
    store: &dyn ReconStore,
    engine: &MatchEngine,
    request: ImportRequest,
) -> Result<ImportOutcome, ReconError> {
    let account = store
        .bank_account(request.company_id, request.bank_account_id)
        .await?
        .ok_or_else(|| ReconError::not_found("bank account", request.bank_account_id.0))?;

    let notification =
        saldo_camt::parse(&request.xml).map_err(|e| ReconError::Validation(e.to_string()))?;

    let statement_iban = notification
        .iban
        .as_deref()
        .map(normalize_iban)
        .unwrap_or_default();
    if statement_iban.is_empty() || statement_iban != normalize_iban(&account.iban) {
        return Err(ReconError::Validation(format!(
            "statement is for account {}, not {}",
            notification.iban.as_deref().unwrap_or("<missing>"),
            account.iban
        )));
    }

    let extractor = ReferenceExtractor::default();
    let mut outcome = ImportOutcome::default();

    for entry in &notification.entries {
        let Some(entry_reference) = entry.dedup_reference() else {
            warn!("skipping entry without a bank-assigned reference");
            continue;
        };
        let Some(booking_date) = entry.booking_date.or(entry.value_date) else {
            warn!(entry = entry_reference, "skipping entry without any date");
            continue;
        };

        for detail in &entry.details {
            let new_txn = transaction_from(
                &account,
                entry,
                detail,
                entry_reference,
                booking_date,
                &extractor,
            );

            let txn = match store.insert_transaction(new_txn).await? {
                InsertOutcome::Duplicate => continue,
                InsertOutcome::Inserted(txn) => txn,
            };
            outcome.imported += 1;

            if request.auto_reconcile && txn.reference.is_some() {
                match auto_match(store, engine, &txn).await? {
                    AutoMatchOutcome::Settled(settlement) => {
                        outcome.matched += 1;
                        outcome.settlements.push(settlement);
                    }
                    AutoMatchOutcome::Parked { .. } | AutoMatchOutcome::Unmatched => {}
                }
                // Pick up whatever status the match decision left behind.
                let refreshed = store.transaction(request.company_id, txn.id).await?;
                outcome.transactions.push(refreshed.unwrap_or(txn));
            } else {
                outcome.transactions.push(txn);
            }
        }
    }

    info!(
        account = %account.iban,
        imported = outcome.imported,
        matched = outcome.matched,
        "statement import complete"
    );
    Ok(outcome)
}

fn transaction_from(
    account: &BankAccount,
    entry: &CamtEntry,
    detail: &CamtTransactionDetail,
    entry_reference: &str,
    booking_date: chrono::NaiveDate,
    extractor: &ReferenceExtractor,
) -> NewBankTransaction {
    let reference = extractor.extract(
        detail.creditor_reference.as_deref(),
        detail.remittance.as_deref(),
    );
    // The counterparty is whoever is on the far side of the booking.
    let (counterparty_name, counterparty_iban) = match entry.direction {
        Direction::Credit => (detail.debtor_name.clone(), detail.debtor_iban.clone()),
        Direction::Debit => (detail.creditor_name.clone(), detail.creditor_iban.clone()),
    };

    NewBankTransaction {
        company_id: account.company_id,
        bank_account_id: account.id,
        entry_reference: entry_reference.to_string(),
        direction: entry.direction,
        amount: entry.amount,
        currency: entry
            .currency
            .clone()
            .unwrap_or_else(|| account.currency.clone()),
        booking_date,
        value_date: entry.value_date,
        reference,
        creditor_reference: detail.creditor_reference.clone(),
        end_to_end_id: detail.end_to_end_id.clone(),
        counterparty_name,
        counterparty_iban,
        remittance: detail.remittance.clone(),
    }
}

fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iban_normalization_strips_whitespace() {
        assert_eq!(
            normalize_iban("CH93 0076 2011 6238 5295 7"),
            "CH9300762011623852957"
        );
        assert_eq!(
            normalize_iban("ch9300762011623852957"),
            "CH9300762011623852957"
        );
    }
}
