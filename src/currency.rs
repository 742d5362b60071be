use crate::error::{AnalyticsError, DataIssue, ReferenceKind, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Currency code → USD multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CurrencyTable {
    #[schemars(
        description = "Map of lowercase currency code to the USD value of one unit (e.g. 'eur': 1.05)"
    )]
    pub rates: BTreeMap<String, f64>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        let rates = [
            ("usd", 1.0),
            ("eur", 1.05),
            ("rd", 0.018),
            ("dkk", 0.14),
            ("czk", 0.043),
            ("sek", 0.091),
            ("jpy", 0.0067),
            ("cnh", 0.136524),
            ("chf", 1.11),
            ("gbp", 1.21),
        ]
        .into_iter()
        .map(|(code, rate)| (code.to_string(), rate))
        .collect();

        Self { rates }
    }
}

impl CurrencyTable {
    pub fn new(rates: BTreeMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (normalize_currency_code(&code), rate))
            .collect();
        Self { rates }
    }

    /// Strips punctuation and lowercases, so `RD$` and `rd` are the same code.
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.rates.get(&normalize_currency_code(code)).copied()
    }

    /// Converts `amount` in `code` to USD. An unknown code is reported instead
    /// of producing a silent zero.
    pub fn to_usd(&self, amount: f64, code: &str) -> std::result::Result<f64, DataIssue> {
        self.rate(code)
            .map(|rate| amount * rate)
            .ok_or_else(|| DataIssue::MissingReferenceData {
                kind: ReferenceKind::Currency,
                key: normalize_currency_code(code),
            })
    }

    pub fn validate(&self) -> Result<()> {
        for (code, rate) in &self.rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(AnalyticsError::InvalidCurrencyRate {
                    code: code.clone(),
                    rate: *rate,
                });
            }
        }
        Ok(())
    }
}

pub fn normalize_currency_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_currency_code("RD$"), "rd");
        assert_eq!(normalize_currency_code(" US$ "), "us");
        assert_eq!(normalize_currency_code("EUR"), "eur");
    }

    #[test]
    fn test_to_usd() {
        let table = CurrencyTable::default();
        assert!((table.to_usd(100.0, "EUR").unwrap() - 105.0).abs() < 1e-9);
        assert!((table.to_usd(1000.0, "RD$").unwrap() - 18.0).abs() < 1e-9);
        assert_eq!(table.to_usd(7.5, "usd").unwrap(), 7.5);
    }

    #[test]
    fn test_unknown_currency_is_reported() {
        let table = CurrencyTable::default();
        let err = table.to_usd(10.0, "ARS").unwrap_err();
        assert_eq!(
            err,
            DataIssue::MissingReferenceData {
                kind: ReferenceKind::Currency,
                key: "ars".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_rate() {
        let mut rates = BTreeMap::new();
        rates.insert("xyz".to_string(), 0.0);
        assert!(CurrencyTable::new(rates).validate().is_err());
        assert!(CurrencyTable::default().validate().is_ok());
    }
}
