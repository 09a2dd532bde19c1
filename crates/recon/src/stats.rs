use serde::Serialize;

use saldo_core::{
    BankAccountId, CompanyId, Direction, Money, ReconError, ReconStore, StatusTotal,
    TransactionStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total: i64,
    pub pending: i64,
    pub matched: i64,
    pub reconciled: i64,
    pub ignored: i64,
    /// Sums cover settled transactions only.
    pub reconciled_credit: Money,
    pub reconciled_debit: Money,
    /// reconciled / total as an integer percentage; 0 for an empty scope.
    pub reconciliation_rate: u8,
}

pub async fn statistics(
    store: &dyn ReconStore,
    company: CompanyId,
    account: Option<BankAccountId>,
) -> Result<Statistics, ReconError> {
    let rows = store.status_totals(company, account).await?;
    Ok(fold(&rows))
}

fn fold(rows: &[StatusTotal]) -> Statistics {
    let mut stats = Statistics {
        total: 0,
        pending: 0,
        matched: 0,
        reconciled: 0,
        ignored: 0,
        reconciled_credit: Money::zero(),
        reconciled_debit: Money::zero(),
        reconciliation_rate: 0,
    };

    for row in rows {
        stats.total += row.count;
        match row.status {
            TransactionStatus::Pending => stats.pending += row.count,
            TransactionStatus::Matched => stats.matched += row.count,
            TransactionStatus::Ignored => stats.ignored += row.count,
            TransactionStatus::Reconciled => {
                stats.reconciled += row.count;
                match row.direction {
                    Direction::Credit => {
                        stats.reconciled_credit = stats.reconciled_credit + row.amount;
                    }
                    Direction::Debit => {
                        stats.reconciled_debit = stats.reconciled_debit + row.amount;
                    }
                }
            }
        }
    }

    if stats.total > 0 {
        stats.reconciliation_rate =
            ((stats.reconciled as f64 / stats.total as f64) * 100.0).round() as u8;
    }
    stats
}
