use crate::currency::CurrencyTable;
use crate::error::{AnalyticsError, Result};
use crate::ingestion::SourceFiles;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalyticsConfig {
    #[schemars(description = "Currency code to USD conversion rates used for purchases and cost lists")]
    pub currencies: CurrencyTable,

    #[schemars(description = "Production loss applied when exploding the bill of materials")]
    pub waste: WasteFactors,

    #[schemars(
        description = "Fixed overhead per unit in USD (otros), subtracted from every margin. Defaults to 3.44 + 0.23."
    )]
    pub fixed_overhead_usd: f64,

    #[schemars(description = "Canonicalization rules for free-text sales and receivables fields")]
    pub aliases: AliasRules,

    pub sales_filter: SalesFilter,

    #[schemars(description = "Ordered literal replacements that clean article descriptions")]
    pub article_cleanup: Vec<TextReplacement>,

    pub receivables: ReceivablesConfig,

    pub market_share: MarketShareConfig,

    #[schemars(
        description = "Per-brand year-over-year comparisons only count prior-year sales dated at least this many days before the latest sale"
    )]
    pub brand_comparison_window_days: i64,

    pub sources: SourceFiles,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            currencies: CurrencyTable::default(),
            waste: WasteFactors::default(),
            fixed_overhead_usd: 3.44 + 0.23,
            aliases: AliasRules::default(),
            sales_filter: SalesFilter::default(),
            article_cleanup: default_article_cleanup(),
            receivables: ReceivablesConfig::default(),
            market_share: MarketShareConfig::default(),
            brand_comparison_window_days: 360,
            sources: SourceFiles::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalyticsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.currencies.validate()?;
        self.waste.validate()?;

        if !self.fixed_overhead_usd.is_finite() || self.fixed_overhead_usd < 0.0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "fixed_overhead_usd must be a non-negative number, got {}",
                self.fixed_overhead_usd
            )));
        }

        if self.receivables.local_currency_per_usd <= 0.0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "receivables.local_currency_per_usd must be positive, got {}",
                self.receivables.local_currency_per_usd
            )));
        }

        let share = &self.market_share;
        for (name, value) in [
            ("liters_per_unit", share.liters_per_unit),
            ("alcohol_by_volume", share.alcohol_by_volume),
            ("category_share", share.category_share),
        ] {
            if value <= 0.0 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "market_share.{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.brand_comparison_window_days < 0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "brand_comparison_window_days must not be negative, got {}",
                self.brand_comparison_window_days
            )));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalyticsConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WasteFactors {
    #[schemars(description = "Fraction lost for raw materials ('MP'). Quantities are divided by (1 - factor).")]
    pub raw_material: f64,

    #[schemars(description = "Fraction lost for every other component. Quantities are divided by (1 - factor).")]
    pub packaging: f64,
}

impl Default for WasteFactors {
    fn default() -> Self {
        Self {
            raw_material: 0.05,
            packaging: 0.03,
        }
    }
}

impl WasteFactors {
    pub fn validate(&self) -> Result<()> {
        for factor in [self.raw_material, self.packaging] {
            if !(0.0..1.0).contains(&factor) {
                return Err(AnalyticsError::InvalidWasteFactor(factor));
            }
        }
        Ok(())
    }
}

/// A single canonicalization step. Rules run in order and the last match wins,
/// so a broad rule can be refined by a later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum AliasRule {
    /// Replace the whole value when it equals `value`.
    Exact { value: String, replacement: String },

    /// Replace the whole value when it contains `pattern`.
    Contains {
        pattern: String,
        replacement: String,
    },
}

impl AliasRule {
    pub fn exact(value: &str, replacement: &str) -> Self {
        AliasRule::Exact {
            value: value.to_string(),
            replacement: replacement.to_string(),
        }
    }

    pub fn contains(pattern: &str, replacement: &str) -> Self {
        AliasRule::Contains {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }

    pub fn matches(&self, input: &str) -> bool {
        match self {
            AliasRule::Exact { value, .. } => input == value,
            AliasRule::Contains { pattern, .. } => input.contains(pattern.as_str()),
        }
    }

    pub fn replacement(&self) -> &str {
        match self {
            AliasRule::Exact { replacement, .. } | AliasRule::Contains { replacement, .. } => {
                replacement
            }
        }
    }
}

pub fn apply_aliases(rules: &[AliasRule], input: &str) -> String {
    let mut current = input.to_string();
    for rule in rules {
        if rule.matches(&current) {
            current = rule.replacement().to_string();
        }
    }
    current
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AliasRules {
    #[schemars(description = "Applied to the lowercased brand (family) name")]
    pub brand: Vec<AliasRule>,

    #[schemars(description = "Applied to the lowercased client name, in sales and receivables")]
    pub client: Vec<AliasRule>,

    #[schemars(description = "Applied to the raw country name, before lowercasing")]
    pub country: Vec<AliasRule>,
}

impl Default for AliasRules {
    fn default() -> Self {
        Self {
            brand: vec![
                AliasRule::exact("bavaro premiun", "bavaro"),
                AliasRule::contains("quorhum", "quorhum"),
                AliasRule::contains("cubaney", "cubaney"),
                AliasRule::contains("presidencial", "presidente"),
            ],
            client: vec![
                AliasRule::contains("compagnia", "compagnia dei caraibi"),
                AliasRule::contains("dufry", "dufry"),
            ],
            country: vec![
                AliasRule::contains("Russian", "Russia"),
                AliasRule::contains("USA", "United States of America"),
                AliasRule::contains("Schweiz", "Switzerland"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SalesFilter {
    #[schemars(description = "Articles containing this text are internal migration entries and are dropped")]
    pub excluded_article_marker: String,

    #[schemars(
        description = "A sales line is kept when its code is missing or contains one of these markers"
    )]
    pub finished_good_markers: Vec<String>,
}

impl Default for SalesFilter {
    fn default() -> Self {
        Self {
            excluded_article_marker: "migraci".to_string(),
            finished_good_markers: vec!["BPT".to_string(), "PT".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextReplacement {
    pub pattern: String,
    pub replacement: String,
}

impl TextReplacement {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

fn default_article_cleanup() -> Vec<TextReplacement> {
    vec![
        TextReplacement::new("s.s.", ""),
        TextReplacement::new("ron", ""),
        TextReplacement::new("licor", ""),
        TextReplacement::new("(", ""),
        TextReplacement::new(")", ""),
        TextReplacement::new(".", ""),
        TextReplacement::new(",", ""),
        TextReplacement::new("-", ""),
        TextReplacement::new("eumac", "eu"),
        TextReplacement::new("eumo", "eu"),
        TextReplacement::new("uemac", "eu"),
        TextReplacement::new("spirit drink", ""),
        TextReplacement::new("spirt drink", ""),
        TextReplacement::new("ml", ""),
        TextReplacement::new("6/700", ""),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReceivablesConfig {
    #[schemars(description = "Units of ledger currency per USD; outstanding balances are divided by this")]
    pub local_currency_per_usd: f64,
}

impl Default for ReceivablesConfig {
    fn default() -> Self {
        Self {
            local_currency_per_usd: 56.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MarketShareConfig {
    #[schemars(description = "Liters of product per sold unit (a case of 6 x 700ml is 4.2)")]
    pub liters_per_unit: f64,

    #[schemars(description = "Alcohol by volume of the product")]
    pub alcohol_by_volume: f64,

    #[schemars(description = "Share of the country's pure alcohol consumption attributed to the category")]
    pub category_share: f64,
}

impl Default for MarketShareConfig {
    fn default() -> Self {
        Self {
            liters_per_unit: 4.2,
            alcohol_by_volume: 0.4,
            category_share: 0.03,
        }
    }
}
