use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use saldo_core::{Direction, Money};

#[derive(Error, Debug)]
pub enum CamtError {
    #[error("invalid camt.054 document: {0}")]
    Xml(String),
}

/// Normalized view of one camt.054 notification: the business fields the
/// reconciliation core needs, nothing else. Banks vary in which optional
/// schema elements they emit; unknown elements are simply ignored.
#[derive(Debug, Clone)]
pub struct CamtNotification {
    pub message_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub iban: Option<String>,
    pub currency: Option<String>,
    pub entries: Vec<CamtEntry>,
}

/// One booking entry. Entries lacking an amount or a credit/debit
/// indicator carry no usable booking information and are dropped during
/// normalization; an empty entry list is a valid (if boring) statement.
#[derive(Debug, Clone)]
pub struct CamtEntry {
    pub entry_reference: Option<String>,
    pub servicer_reference: Option<String>,
    pub amount: Money,
    pub currency: Option<String>,
    pub direction: Direction,
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub details: Vec<CamtTransactionDetail>,
}

impl CamtEntry {
    /// Bank-assigned identifier used as the dedup key. `NtryRef` when
    /// present, else the account servicer reference.
    pub fn dedup_reference(&self) -> Option<&str> {
        self.entry_reference
            .as_deref()
            .or(self.servicer_reference.as_deref())
    }
}

/// Fields of one `TxDtls` block. Every lookup that produced these values
/// was scoped to the block's own subtree, so a statement carrying many
/// transactions cannot leak counterparty data across entries.
#[derive(Debug, Clone, Default)]
pub struct CamtTransactionDetail {
    pub end_to_end_id: Option<String>,
    pub creditor_reference: Option<String>,
    pub remittance: Option<String>,
    pub debtor_name: Option<String>,
    pub debtor_iban: Option<String>,
    pub creditor_name: Option<String>,
    pub creditor_iban: Option<String>,
}

pub fn parse(xml: &str) -> Result<CamtNotification, CamtError> {
    let document: Document =
        quick_xml::de::from_str(xml).map_err(|e| CamtError::Xml(e.to_string()))?;
    Ok(normalize(document))
}

fn normalize(document: Document) -> CamtNotification {
    let message = document.notification;
    let header = message.group_header;

    let mut iban = None;
    let mut currency = None;
    let mut entries = Vec::new();

    for notification in message.notifications {
        if let Some(account) = &notification.account {
            if iban.is_none() {
                iban = account.id.as_ref().and_then(|id| id.iban.clone());
            }
            if currency.is_none() {
                currency = account.currency.clone();
            }
        }
        for entry in notification.entries {
            if let Some(normalized) = normalize_entry(entry) {
                entries.push(normalized);
            }
        }
    }

    CamtNotification {
        message_id: header.as_ref().and_then(|h| h.message_id.clone()),
        created_at: header
            .as_ref()
            .and_then(|h| h.creation_time.as_deref())
            .and_then(parse_timestamp),
        iban,
        currency,
        entries,
    }
}

fn normalize_entry(entry: Ntry) -> Option<CamtEntry> {
    let direction = match entry.credit_debit.as_deref() {
        Some("CRDT") => Direction::Credit,
        Some("DBIT") => Direction::Debit,
        _ => return None,
    };
    let amount_element = entry.amount?;
    let amount = Money::from_decimal(
        Decimal::from_str(amount_element.value.as_deref().unwrap_or("").trim()).ok()?,
    );

    let mut details: Vec<CamtTransactionDetail> = entry
        .details
        .into_iter()
        .flat_map(|d| d.transactions)
        .map(normalize_detail)
        .collect();
    if details.is_empty() {
        // Entries without TxDtls still represent one booking line.
        details.push(CamtTransactionDetail::default());
    }

    Some(CamtEntry {
        entry_reference: entry.entry_reference,
        servicer_reference: entry.servicer_reference,
        amount,
        currency: amount_element.currency,
        direction,
        booking_date: entry.booking_date.as_ref().and_then(DateChoice::as_naive),
        value_date: entry.value_date.as_ref().and_then(DateChoice::as_naive),
        details,
    })
}

fn normalize_detail(detail: TxDtls) -> CamtTransactionDetail {
    let remittance = detail.remittance.as_ref().map(|r| {
        r.unstructured
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    });
    let creditor_reference = detail.remittance.as_ref().and_then(|r| {
        r.structured
            .iter()
            .find_map(|s| s.creditor_reference.as_ref())
            .and_then(|c| c.reference.clone())
    });
    let parties = detail.parties;

    CamtTransactionDetail {
        end_to_end_id: detail.references.and_then(|r| r.end_to_end_id),
        creditor_reference,
        remittance: remittance.filter(|s| !s.is_empty()),
        debtor_name: parties
            .as_ref()
            .and_then(|p| p.debtor.as_ref())
            .and_then(Party::display_name),
        debtor_iban: parties
            .as_ref()
            .and_then(|p| p.debtor_account.as_ref())
            .and_then(Acct::iban),
        creditor_name: parties
            .as_ref()
            .and_then(|p| p.creditor.as_ref())
            .and_then(Party::display_name),
        creditor_iban: parties
            .as_ref()
            .and_then(|p| p.creditor_account.as_ref())
            .and_then(Acct::iban),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── raw ISO 20022 shapes ─────────────────────────────────────────────────
// Tag-for-tag subset of camt.054; serde skips everything not listed here.

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "BkToCstmrDbtCdtNtfctn")]
    notification: BkToCstmrDbtCdtNtfctn,
}

#[derive(Debug, Deserialize)]
struct BkToCstmrDbtCdtNtfctn {
    #[serde(rename = "GrpHdr")]
    group_header: Option<GrpHdr>,
    #[serde(rename = "Ntfctn", default)]
    notifications: Vec<Ntfctn>,
}

#[derive(Debug, Deserialize)]
struct GrpHdr {
    #[serde(rename = "MsgId")]
    message_id: Option<String>,
    #[serde(rename = "CreDtTm")]
    creation_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ntfctn {
    #[serde(rename = "Acct")]
    account: Option<Acct>,
    #[serde(rename = "Ntry", default)]
    entries: Vec<Ntry>,
}

#[derive(Debug, Deserialize)]
struct Acct {
    #[serde(rename = "Id")]
    id: Option<AcctId>,
    #[serde(rename = "Ccy")]
    currency: Option<String>,
}

impl Acct {
    fn iban(&self) -> Option<String> {
        self.id.as_ref().and_then(|id| id.iban.clone())
    }
}

#[derive(Debug, Deserialize)]
struct AcctId {
    #[serde(rename = "IBAN")]
    iban: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ntry {
    #[serde(rename = "NtryRef")]
    entry_reference: Option<String>,
    #[serde(rename = "Amt")]
    amount: Option<Amt>,
    #[serde(rename = "CdtDbtInd")]
    credit_debit: Option<String>,
    #[serde(rename = "BookgDt")]
    booking_date: Option<DateChoice>,
    #[serde(rename = "ValDt")]
    value_date: Option<DateChoice>,
    #[serde(rename = "AcctSvcrRef")]
    servicer_reference: Option<String>,
    #[serde(rename = "NtryDtls", default)]
    details: Vec<NtryDtls>,
}

#[derive(Debug, Deserialize)]
struct Amt {
    #[serde(rename = "@Ccy")]
    currency: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateChoice {
    #[serde(rename = "Dt")]
    date: Option<String>,
    #[serde(rename = "DtTm")]
    date_time: Option<String>,
}

impl DateChoice {
    fn as_naive(&self) -> Option<NaiveDate> {
        if let Some(d) = &self.date {
            return NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok();
        }
        self.date_time
            .as_deref()
            .and_then(parse_timestamp)
            .map(|dt| dt.date_naive())
    }
}

#[derive(Debug, Deserialize)]
struct NtryDtls {
    #[serde(rename = "TxDtls", default)]
    transactions: Vec<TxDtls>,
}

#[derive(Debug, Deserialize)]
struct TxDtls {
    #[serde(rename = "Refs")]
    references: Option<Refs>,
    #[serde(rename = "RltdPties")]
    parties: Option<RltdPties>,
    #[serde(rename = "RmtInf")]
    remittance: Option<RmtInf>,
}

#[derive(Debug, Deserialize)]
struct Refs {
    #[serde(rename = "EndToEndId")]
    end_to_end_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RltdPties {
    #[serde(rename = "Dbtr")]
    debtor: Option<Party>,
    #[serde(rename = "DbtrAcct")]
    debtor_account: Option<Acct>,
    #[serde(rename = "Cdtr")]
    creditor: Option<Party>,
    #[serde(rename = "CdtrAcct")]
    creditor_account: Option<Acct>,
}

/// Party name appears directly as `Nm` in camt.054.001.04 and wrapped in
/// `Pty` from .001.08 onward; both layouts occur in the wild.
#[derive(Debug, Deserialize)]
struct Party {
    #[serde(rename = "Nm")]
    name: Option<String>,
    #[serde(rename = "Pty")]
    party: Option<PartyInner>,
}

impl Party {
    fn display_name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.party.as_ref().and_then(|p| p.name.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct PartyInner {
    #[serde(rename = "Nm")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RmtInf {
    #[serde(rename = "Ustrd", default)]
    unstructured: Vec<String>,
    #[serde(rename = "Strd", default)]
    structured: Vec<Strd>,
}

#[derive(Debug, Deserialize)]
struct Strd {
    #[serde(rename = "CdtrRefInf")]
    creditor_reference: Option<CdtrRefInf>,
}

#[derive(Debug, Deserialize)]
struct CdtrRefInf {
    #[serde(rename = "Ref")]
    reference: Option<String>,
}
