use std::collections::HashSet;

use saldo_core::{BankTransaction, Invoice, InvoiceId, Money};

use crate::config::MatchConfig;

/// Confidence depends solely on which strategy produced the candidate.
const CONFIDENCE_EXACT_REFERENCE: u8 = 100;
const CONFIDENCE_NAME_AND_AMOUNT: u8 = 75;
const CONFIDENCE_AMOUNT_ONLY: u8 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub counterparty: String,
    pub invoice_total: Money,
    pub confidence: u8,
    pub reason: String,
}

/// Import-time decision. Only an exact reference hit may settle without
/// a human in the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoMatchDecision {
    /// Exact reference, amount within tolerance — create the payment.
    Settle { invoice_id: InvoiceId },
    /// Exact reference but the amount is off — park for review.
    Review { invoice_id: InvoiceId },
    /// No exact reference hit; the transaction stays pending.
    NoMatch,
}

/// Ranks open invoices against one bank transaction using deterministic,
/// explainable strategies. Pure: the caller supplies the invoice rows,
/// the engine never touches storage.
pub struct MatchEngine {
    config: MatchConfig,
}

impl Default for MatchEngine {
    fn default() -> Self {
        MatchEngine::new(MatchConfig::default())
    }
}

impl MatchEngine {
    pub fn new(config: MatchConfig) -> Self {
        MatchEngine { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Candidates in descending confidence, deduplicated by invoice id: an
    /// invoice already suggested by a stronger strategy is not repeated by
    /// a weaker one. `by_reference` is the open invoice whose stored
    /// reference equals the transaction's structured reference;
    /// `near_amount` holds open invoices inside the widest amount window,
    /// in store order.
    pub fn rank(
        &self,
        txn: &BankTransaction,
        by_reference: Option<&Invoice>,
        near_amount: &[Invoice],
    ) -> Vec<MatchCandidate> {
        let mut candidates = Vec::new();
        let mut seen: HashSet<InvoiceId> = HashSet::new();

        if let Some(invoice) = by_reference {
            seen.insert(invoice.id);
            candidates.push(candidate(
                invoice,
                CONFIDENCE_EXACT_REFERENCE,
                format!("structured reference matches invoice {}", invoice.number),
            ));
        }

        let mut name_hits = 0;
        for invoice in near_amount {
            if name_hits == self.config.name_candidate_cap {
                break;
            }
            if seen.contains(&invoice.id) {
                continue;
            }
            if invoice.total.abs_diff(txn.amount) <= self.config.name_amount_tolerance
                && names_overlap(&invoice.counterparty, txn.counterparty_name.as_deref())
            {
                seen.insert(invoice.id);
                candidates.push(candidate(
                    invoice,
                    CONFIDENCE_NAME_AND_AMOUNT,
                    format!(
                        "counterparty resembles '{}' and amount is within {}",
                        invoice.counterparty, self.config.name_amount_tolerance
                    ),
                ));
                name_hits += 1;
            }
        }

        let mut amount_hits = 0;
        for invoice in near_amount {
            if amount_hits == self.config.amount_candidate_cap {
                break;
            }
            if seen.contains(&invoice.id) {
                continue;
            }
            if invoice.total.abs_diff(txn.amount) <= self.config.amount_only_tolerance {
                seen.insert(invoice.id);
                candidates.push(candidate(
                    invoice,
                    CONFIDENCE_AMOUNT_ONLY,
                    format!(
                        "amount within {} of invoice total",
                        self.config.amount_only_tolerance
                    ),
                ));
                amount_hits += 1;
            }
        }

        candidates
    }

    pub fn auto_decision(
        &self,
        txn: &BankTransaction,
        by_reference: Option<&Invoice>,
    ) -> AutoMatchDecision {
        match by_reference {
            None => AutoMatchDecision::NoMatch,
            Some(invoice)
                if invoice.total.abs_diff(txn.amount) <= self.config.auto_match_tolerance =>
            {
                AutoMatchDecision::Settle {
                    invoice_id: invoice.id,
                }
            }
            Some(invoice) => AutoMatchDecision::Review {
                invoice_id: invoice.id,
            },
        }
    }
}

fn candidate(invoice: &Invoice, confidence: u8, reason: String) -> MatchCandidate {
    MatchCandidate {
        invoice_id: invoice.id,
        invoice_number: invoice.number.clone(),
        counterparty: invoice.counterparty.clone(),
        invoice_total: invoice.total,
        confidence,
        reason,
    }
}

/// The first whitespace-delimited token of the invoice counterparty,
/// contained case-insensitively in the transaction counterparty, is
/// enough to consider the names related.
fn names_overlap(invoice_name: &str, txn_name: Option<&str>) -> bool {
    let Some(txn_name) = txn_name else {
        return false;
    };
    let Some(token) = invoice_name.split_whitespace().next() else {
        return false;
    };
    txn_name.to_lowercase().contains(&token.to_lowercase())
}
