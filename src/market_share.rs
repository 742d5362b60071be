use crate::config::MarketShareConfig;
use crate::error::{DataIssue, Diagnostics, ReferenceKind};
use crate::ingestion::RawMarketShareRow;
use crate::sales::strip_diacritics;
use crate::schema::{MarketShareReference, MarketShareRow, SalesRecord};
use crate::utils::round_to;
use std::collections::BTreeMap;

/// Reference countries are matched against canonical sales countries.
pub fn normalize_references(rows: &[RawMarketShareRow]) -> Vec<MarketShareReference> {
    rows.iter()
        .map(|row| MarketShareReference {
            country: strip_diacritics(&row.country.trim().to_lowercase()),
            alcohol_per_capita: row.alcohol_per_capita,
            population: row.population,
        })
        .collect()
}

/// Estimates a brand's share of each country's spirits category.
pub struct MarketShareEstimator<'a> {
    config: &'a MarketShareConfig,
    references: BTreeMap<&'a str, &'a MarketShareReference>,
}

impl<'a> MarketShareEstimator<'a> {
    pub fn new(config: &'a MarketShareConfig, references: &'a [MarketShareReference]) -> Self {
        let mut by_country = BTreeMap::new();
        for reference in references {
            by_country.entry(reference.country.as_str()).or_insert(reference);
        }
        Self {
            config,
            references: by_country,
        }
    }

    /// Percent share for `quantity` units sold into `country`, or `None` when
    /// the country has no reference data or no consumption.
    pub fn share_of(&self, country: &str, quantity: f64) -> Option<f64> {
        let reference = self.references.get(country)?;
        let category_liters = reference.alcohol_per_capita
            * reference.population
            * self.config.category_share;
        if category_liters == 0.0 {
            return None;
        }
        let brand_liters =
            quantity * self.config.liters_per_unit * self.config.alcohol_by_volume;
        Some(round_to(brand_liters / category_liters * 100.0, 3))
    }

    pub fn estimate(
        &self,
        sales: &[SalesRecord],
        brand: &str,
        year: i32,
        diagnostics: &mut Diagnostics,
    ) -> Vec<MarketShareRow> {
        let mut by_country: BTreeMap<&str, (f64, f64)> = BTreeMap::new();

        for record in sales {
            let (Some(_), Some(record_brand), Some(country), Some(_)) = (
                record.sku.as_deref(),
                record.brand.as_deref(),
                record.country.as_deref(),
                record.client.as_deref(),
            ) else {
                continue;
            };
            if record_brand != brand || record.year() != year {
                continue;
            }
            // Deductions do not count as sales; their quantities still do.
            let totals = by_country.entry(country).or_insert((0.0, 0.0));
            totals.0 += record.revenue_usd.max(0.0);
            totals.1 += record.quantity;
        }

        by_country
            .into_iter()
            .map(|(country, (sales_usd, quantity))| {
                let market_share = self.share_of(country, quantity);
                if market_share.is_none() {
                    diagnostics.record(DataIssue::MissingReferenceData {
                        kind: ReferenceKind::Country,
                        key: country.to_string(),
                    });
                }
                MarketShareRow {
                    brand: brand.to_string(),
                    country: country.to_string(),
                    sales_usd,
                    quantity,
                    market_share,
                }
            })
            .collect()
    }
}

pub fn market_share(
    sales: &[SalesRecord],
    references: &[MarketShareReference],
    brand: &str,
    year: i32,
    config: &MarketShareConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<MarketShareRow> {
    MarketShareEstimator::new(config, references).estimate(sales, brand, year, diagnostics)
}
