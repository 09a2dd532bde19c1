use saldo_core::Money;
use serde::Deserialize;

/// Tolerances and caps of the matching strategies. The defaults are the
/// production values; deployments can override them from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Amount window of the counterparty-name strategy.
    pub name_amount_tolerance: Money,
    /// Amount window of the amount-only strategy.
    pub amount_only_tolerance: Money,
    /// Acceptable gap between invoice total and transaction amount when an
    /// exact reference match settles automatically; covers bank-fee
    /// rounding. Inclusive.
    pub auto_match_tolerance: Money,
    pub name_candidate_cap: usize,
    pub amount_candidate_cap: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            name_amount_tolerance: Money::from_cents(5),
            amount_only_tolerance: Money::from_cents(1),
            auto_match_tolerance: Money::from_cents(5),
            name_candidate_cap: 5,
            amount_candidate_cap: 10,
        }
    }
}

impl MatchConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Widest amount tolerance; drives the single invoice window query
    /// that feeds every amount-based strategy.
    pub fn search_window(&self) -> Money {
        self.name_amount_tolerance
            .max(self.amount_only_tolerance)
            .max(self.auto_match_tolerance)
    }
}
