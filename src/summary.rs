use crate::schema::{Margin, SalesRecord};
use crate::utils::relative_change;
use chrono::{Duration, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A headline figure with its change against the previous year, when that
/// year had a non-zero base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub value: f64,
    pub delta: Option<f64>,
}

impl Kpi {
    fn compare(value: f64, previous: f64) -> Self {
        Self {
            value,
            delta: relative_change(value, previous),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueClass {
    /// Positive sales revenue (ingreso).
    Revenue,
    /// Advertising and promotion deductions (a&p).
    Promotion,
}

impl RevenueClass {
    pub fn of(revenue_usd: f64) -> Self {
        if revenue_usd < 0.0 {
            RevenueClass::Promotion
        } else {
            RevenueClass::Revenue
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RevenueClass::Revenue => "ingreso",
            RevenueClass::Promotion => "a&p",
        }
    }
}

/// One bar segment of the revenue vs A&P chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRevenueSplit {
    pub year: i32,
    pub class: RevenueClass,
    /// Absolute amount in USD.
    pub amount_usd: f64,
    /// Percent of the year's absolute total.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueShare {
    pub key: String,
    pub revenue_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandPerformance {
    pub brand: String,
    pub ytd_usd: f64,
    /// Previous-year revenue up to the same point of the year.
    pub previous_usd: f64,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub latest_year: i32,
    pub revenue_ytd: Kpi,
    pub profit_ytd: f64,
    pub promotion_ytd: Kpi,
    pub revenue_by_year: Vec<YearRevenueSplit>,
    pub revenue_by_brand: Vec<RevenueShare>,
    pub revenue_by_country: Vec<RevenueShare>,
    pub revenue_by_client: Vec<RevenueShare>,
    pub brands: Vec<BrandPerformance>,
}

/// Computes the dashboard's headline tables from normalized sales.
pub struct DashboardSummarizer<'a> {
    sales: &'a [SalesRecord],
    comparison_window_days: i64,
}

impl<'a> DashboardSummarizer<'a> {
    pub fn new(sales: &'a [SalesRecord], comparison_window_days: i64) -> Self {
        Self {
            sales,
            comparison_window_days,
        }
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.sales.iter().map(SalesRecord::year).max()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.sales.iter().map(|r| r.date).max()
    }

    /// Returns `None` when there are no sales.
    pub fn summarize(&self, margins: &[Margin]) -> Option<DashboardSummary> {
        let latest_year = self.latest_year()?;

        let summary = DashboardSummary {
            latest_year,
            revenue_ytd: self.revenue_ytd(latest_year),
            profit_ytd: self.profit_ytd(latest_year, margins),
            promotion_ytd: self.promotion_ytd(latest_year),
            revenue_by_year: self.revenue_by_year(),
            revenue_by_brand: self.revenue_share(latest_year, |r| r.brand.as_deref()),
            revenue_by_country: self.revenue_share(latest_year, |r| r.country.as_deref()),
            revenue_by_client: self.revenue_share(latest_year, |r| r.client.as_deref()),
            brands: self.brand_performance(latest_year),
        };

        debug!(
            "Summarized {} sales lines for {}",
            self.sales.len(),
            latest_year
        );

        Some(summary)
    }

    fn revenue_where(&self, filter: impl Fn(&SalesRecord) -> bool) -> f64 {
        self.sales
            .iter()
            .filter(|r| filter(r))
            .map(|r| r.revenue_usd)
            .sum()
    }

    pub fn revenue_ytd(&self, latest_year: i32) -> Kpi {
        let current = self.revenue_where(|r| r.year() >= latest_year);
        let previous = self.revenue_where(|r| r.year() == latest_year - 1);
        Kpi::compare(current, previous)
    }

    /// Units sold times the SKU's unit margin (unknown margins count as zero),
    /// less the year's deductions.
    pub fn profit_ytd(&self, latest_year: i32, margins: &[Margin]) -> f64 {
        let by_sku: BTreeMap<&str, f64> = margins
            .iter()
            .map(|m| (m.key.as_str(), m.margin_usd))
            .collect();

        self.sales
            .iter()
            .filter(|r| r.year() == latest_year)
            .map(|r| {
                let margin = r
                    .sku
                    .as_deref()
                    .and_then(|sku| by_sku.get(sku))
                    .copied()
                    .unwrap_or(0.0);
                r.quantity * margin + r.revenue_usd.min(0.0)
            })
            .sum()
    }

    pub fn promotion_ytd(&self, latest_year: i32) -> Kpi {
        let current = -self.revenue_where(|r| r.year() >= latest_year && r.is_promotion());
        let previous = -self.revenue_where(|r| r.year() == latest_year - 1 && r.is_promotion());
        Kpi::compare(current, previous)
    }

    pub fn revenue_by_year(&self) -> Vec<YearRevenueSplit> {
        let mut totals: BTreeMap<(i32, RevenueClass), f64> = BTreeMap::new();
        for record in self.sales {
            *totals
                .entry((record.year(), RevenueClass::of(record.revenue_usd)))
                .or_insert(0.0) += record.revenue_usd;
        }

        let mut year_totals: BTreeMap<i32, f64> = BTreeMap::new();
        for ((year, _), amount) in &totals {
            *year_totals.entry(*year).or_insert(0.0) += amount.abs();
        }

        totals
            .into_iter()
            .map(|((year, class), amount)| {
                let amount_usd = amount.abs();
                let year_total = year_totals.get(&year).copied().unwrap_or(0.0);
                YearRevenueSplit {
                    year,
                    class,
                    amount_usd,
                    percentage: if year_total == 0.0 {
                        0.0
                    } else {
                        amount_usd / year_total * 100.0
                    },
                }
            })
            .collect()
    }

    fn revenue_share<F>(&self, latest_year: i32, key: F) -> Vec<RevenueShare>
    where
        F: Fn(&SalesRecord) -> Option<&str>,
    {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for record in self.sales.iter().filter(|r| r.year() >= latest_year) {
            if let Some(key) = key(record) {
                *totals.entry(key).or_insert(0.0) += record.revenue_usd;
            }
        }
        into_shares(totals)
    }

    /// Per-brand revenue this year against the previous year, where the
    /// previous year only counts sales dated at least the comparison window
    /// before the latest sale.
    pub fn brand_performance(&self, latest_year: i32) -> Vec<BrandPerformance> {
        let Some(latest_date) = self.latest_date() else {
            return Vec::new();
        };
        let cutoff = latest_date - Duration::days(self.comparison_window_days);

        let brands: BTreeSet<&str> = self
            .sales
            .iter()
            .filter(|r| r.year() >= latest_year)
            .filter_map(|r| r.brand.as_deref())
            .collect();

        brands
            .into_iter()
            .map(|brand| {
                let ytd_usd = self.revenue_where(|r| {
                    r.year() >= latest_year && r.brand.as_deref() == Some(brand)
                });
                let previous_usd = self.revenue_where(|r| {
                    r.year() == latest_year - 1
                        && r.brand.as_deref() == Some(brand)
                        && r.date <= cutoff
                });
                BrandPerformance {
                    brand: brand.to_string(),
                    ytd_usd,
                    previous_usd,
                    delta: relative_change(ytd_usd, previous_usd),
                }
            })
            .collect()
    }

    /// Revenue per cleaned article description for one brand and year.
    pub fn revenue_by_description(&self, brand: &str, year: i32) -> Vec<RevenueShare> {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for record in self
            .sales
            .iter()
            .filter(|r| r.year() == year && r.brand.as_deref() == Some(brand))
        {
            *totals.entry(record.description.as_str()).or_insert(0.0) += record.revenue_usd;
        }
        into_shares(totals)
    }
}

fn into_shares(totals: BTreeMap<&str, f64>) -> Vec<RevenueShare> {
    totals
        .into_iter()
        .map(|(key, revenue_usd)| RevenueShare {
            key: key.to_string(),
            revenue_usd,
        })
        .collect()
}

pub fn summarize(
    sales: &[SalesRecord],
    margins: &[Margin],
    comparison_window_days: i64,
) -> Option<DashboardSummary> {
    DashboardSummarizer::new(sales, comparison_window_days).summarize(margins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(
        sku: &str,
        brand: &str,
        date: (i32, u32, u32),
        revenue: f64,
        quantity: f64,
    ) -> SalesRecord {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        SalesRecord {
            sku: Some(sku.to_string()),
            brand: Some(brand.to_string()),
            description: format!("{} article", brand),
            country: Some("spain".to_string()),
            client: Some("dufry".to_string()),
            date,
            quarter: crate::utils::quarter_label(date),
            revenue_usd: revenue,
            quantity,
        }
    }

    fn sample() -> Vec<SalesRecord> {
        vec![
            sale("S1", "quorhum", (2022, 2, 1), 1000.0, 10.0),
            sale("S1", "quorhum", (2022, 11, 1), 500.0, 5.0),
            sale("S1", "quorhum", (2022, 3, 1), -100.0, 0.0),
            sale("S1", "quorhum", (2023, 3, 1), 1200.0, 12.0),
            sale("S2", "cubaney", (2023, 3, 1), 300.0, 6.0),
            sale("S1", "quorhum", (2023, 4, 1), -150.0, 0.0),
        ]
    }

    #[test]
    fn test_revenue_and_promotion_kpis() {
        let sales = sample();
        let summarizer = DashboardSummarizer::new(&sales, 360);
        assert_eq!(summarizer.latest_year(), Some(2023));

        let revenue = summarizer.revenue_ytd(2023);
        assert_eq!(revenue.value, 1350.0);
        assert!((revenue.delta.unwrap() - (1350.0 / 1400.0 - 1.0)).abs() < 1e-12);

        let promotion = summarizer.promotion_ytd(2023);
        assert_eq!(promotion.value, 150.0);
        assert!((promotion.delta.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_profit_uses_margins_and_deductions() {
        let sales = sample();
        let margins = vec![Margin {
            key: "S1".to_string(),
            margin_usd: 2.0,
        }];
        let profit = DashboardSummarizer::new(&sales, 360).profit_ytd(2023, &margins);
        // 12 * 2.0 + 6 * 0.0 - 150
        assert_eq!(profit, -126.0);
    }

    #[test]
    fn test_revenue_by_year_percentages() {
        let sales = sample();
        let splits = DashboardSummarizer::new(&sales, 360).revenue_by_year();
        assert_eq!(splits.len(), 4);
        assert_eq!(splits[0].year, 2022);
        assert_eq!(splits[0].class, RevenueClass::Revenue);
        assert_eq!(splits[0].amount_usd, 1500.0);
        assert!((splits[0].percentage + splits[1].percentage - 100.0).abs() < 1e-9);
        assert_eq!(splits[1].amount_usd, 100.0);
    }

    #[test]
    fn test_brand_window_excludes_late_prior_year_sales() {
        let sales = sample();
        let brands = DashboardSummarizer::new(&sales, 360).brand_performance(2023);
        let quorhum = brands.iter().find(|b| b.brand == "quorhum").unwrap();
        // Cutoff is 2022-04-06: the November 2022 sale is excluded.
        assert_eq!(quorhum.ytd_usd, 1050.0);
        assert_eq!(quorhum.previous_usd, 900.0);

        let cubaney = brands.iter().find(|b| b.brand == "cubaney").unwrap();
        assert_eq!(cubaney.delta, None);
    }

    #[test]
    fn test_summary_and_shares() {
        let sales = sample();
        let summary = summarize(&sales, &[], 360).unwrap();
        assert_eq!(summary.latest_year, 2023);
        assert_eq!(summary.revenue_by_brand.len(), 2);
        assert_eq!(summary.revenue_by_country[0].revenue_usd, 1350.0);

        let descriptions =
            DashboardSummarizer::new(&sales, 360).revenue_by_description("quorhum", 2022);
        assert_eq!(descriptions[0].revenue_usd, 1400.0);

        assert!(summarize(&[], &[], 360).is_none());
    }
}
