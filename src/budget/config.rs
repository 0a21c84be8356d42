//! Spend budget configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::Period;

/// Caps and per-call prices for the paid generation backends.
///
/// Amounts are fixed-point currency ([`Decimal`], two decimal places in
/// practice); comparisons in the ledger use exact decimal arithmetic so a
/// cap can never be bypassed by float rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily cap on image generation spend, in USD.
    pub daily_image_cap: Decimal,

    /// Monthly cap on text generation spend, in USD.
    pub monthly_text_cap: Decimal,

    /// Price of one image generation call, in USD.
    pub image_cost: Decimal,

    /// Price per 1000 text tokens, in USD.
    pub text_cost_per_1k_tokens: Decimal,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_image_cap: Decimal::new(20, 2),         // $0.20/day
            monthly_text_cap: Decimal::new(1000, 2),      // $10.00/month
            image_cost: Decimal::new(4, 2),               // $0.04 per image
            text_cost_per_1k_tokens: Decimal::new(2, 3),  // $0.002 per 1K tokens
        }
    }
}

impl BudgetConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the daily image spend cap.
    pub fn with_daily_image_cap(mut self, cap: Decimal) -> Self {
        self.daily_image_cap = cap;
        self
    }

    /// Set the monthly text spend cap.
    pub fn with_monthly_text_cap(mut self, cap: Decimal) -> Self {
        self.monthly_text_cap = cap;
        self
    }

    /// Set the per-image price.
    pub fn with_image_cost(mut self, cost: Decimal) -> Self {
        self.image_cost = cost;
        self
    }

    /// Set the per-1K-token text price.
    pub fn with_text_cost_per_1k_tokens(mut self, cost: Decimal) -> Self {
        self.text_cost_per_1k_tokens = cost;
        self
    }

    /// Cap for a budget period.
    pub fn cap_for(&self, period: Period) -> Decimal {
        match period {
            Period::Day => self.daily_image_cap,
            Period::Month => self.monthly_text_cap,
        }
    }

    /// Estimated cost of a text generation call with the given token budget.
    pub fn text_cost_for(&self, tokens: u32) -> Decimal {
        self.text_cost_per_1k_tokens * Decimal::from(tokens) / Decimal::from(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    #[test]
    fn test_default_caps() {
        let config = BudgetConfig::default();
        assert_eq!(config.daily_image_cap, dec("0.20"));
        assert_eq!(config.monthly_text_cap, dec("10.00"));
        assert_eq!(config.cap_for(Period::Day), dec("0.20"));
        assert_eq!(config.cap_for(Period::Month), dec("10.00"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = BudgetConfig::new()
            .with_daily_image_cap(dec("0.50"))
            .with_image_cost(dec("0.08"));
        assert_eq!(config.daily_image_cap, dec("0.50"));
        assert_eq!(config.image_cost, dec("0.08"));
    }

    #[test]
    fn test_text_cost_is_exact() {
        let config = BudgetConfig::default();
        // 150 tokens at $0.002/1K
        assert_eq!(config.text_cost_for(150), dec("0.0003"));
        assert_eq!(config.text_cost_for(1000), dec("0.002"));
    }
}
