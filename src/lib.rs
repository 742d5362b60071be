//! # Sales Margin Analytics
//!
//! A library for turning a spirits producer's spreadsheet exports (sales,
//! purchases, bill of materials, cost lists, receivables) into the tables a
//! sales dashboard shows: per-SKU unit margins, cost breakdowns, receivables
//! aging, market share and headline KPIs.
//!
//! ## Core Concepts
//!
//! - **BOM Flattening**: Finished goods are exploded one level deep into raw
//!   material ("MP") and packaging ("ME") quantities, inflated for waste
//! - **Cost Resolution**: Each component gets one unit cost: the calendar-year
//!   purchase average, else the average of its latest purchases, else the
//!   manual cost list
//! - **Margins**: Realized price minus liquid cost, packaging cost and a fixed
//!   per-unit overhead
//! - **Diagnostics**: Rows with missing reference data are dropped and
//!   reported, never silently zeroed
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_margin_analytics::*;
//! use chrono::NaiveDate;
//!
//! let config = AnalyticsConfig::default();
//! let tables = SourceTables::from_dir("data/", &config.sources)?;
//! let dataset = DashboardProcessor::process(&tables, &config)?;
//!
//! let mut diagnostics = Diagnostics::new();
//! for margin in dataset.portfolio_margins(&mut diagnostics) {
//!     println!("{}: {:.2}", margin.key, margin.margin_usd);
//! }
//!
//! let report = dataset.report(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
//! println!("{}", report.to_markdown());
//! ```

pub mod bom;
pub mod config;
pub mod costing;
pub mod currency;
pub mod error;
pub mod ingestion;
pub mod margin;
pub mod market_share;
pub mod purchases;
pub mod receivables;
pub mod report;
pub mod sales;
pub mod schema;
pub mod summary;
pub mod utils;

pub use bom::{bom_edges, flatten_bom, BomFlattener};
pub use config::{
    AliasRule, AliasRules, AnalyticsConfig, MarketShareConfig, ReceivablesConfig, SalesFilter,
    TextReplacement, WasteFactors,
};
pub use costing::{resolve_costs, CostResolver};
pub use currency::CurrencyTable;
pub use error::{AnalyticsError, DataIssue, Diagnostics, ReferenceKind, Result};
pub use ingestion::*;
pub use margin::{
    compute_margin, cost_breakdown, portfolio_margins, realized_prices, MarginEngine,
    MarginGrouping,
};
pub use market_share::{market_share, MarketShareEstimator};
pub use purchases::{aggregate_purchases, assemble_fallback_costs};
pub use receivables::{
    age_receivables, outstanding_by_bucket, outstanding_by_client, BucketTotal, ClientExposure,
    ReceivablesAging,
};
pub use report::DashboardReport;
pub use sales::{normalize_sales, SalesNormalizer};
pub use schema::*;
pub use summary::{DashboardSummarizer, DashboardSummary, Kpi, RevenueShare};
pub use utils::*;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Normalized snapshot of every source table. All dashboard tables are
/// derived from it on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub config: AnalyticsConfig,
    pub sales: Vec<SalesRecord>,
    pub purchases: Vec<PurchaseRecord>,
    pub fallback_costs: Vec<FallbackCost>,
    pub requirements: Vec<FlattenedRequirement>,
    pub market_share_references: Vec<MarketShareReference>,
    pub invoices: Vec<Invoice>,
    pub credit_terms: Vec<CreditTerm>,
    /// Issues found while loading.
    pub diagnostics: Diagnostics,
}

pub struct DashboardProcessor;

impl DashboardProcessor {
    pub fn process(tables: &SourceTables, config: &AnalyticsConfig) -> Result<Dataset> {
        config.validate()?;

        info!(
            "Processing {} sales rows, {} purchase rows and {} BOM edges",
            tables.sales.len(),
            tables.purchases.len(),
            tables.bom.len()
        );

        let mut diagnostics = Diagnostics::new();

        let sales = normalize_sales(&tables.sales, config, &mut diagnostics);
        let purchases = aggregate_purchases(&tables.purchases, &config.currencies, &mut diagnostics);

        let primary_costs: Vec<RawCostListRow> = tables
            .packaging_costs
            .iter()
            .chain(&tables.raw_material_costs)
            .cloned()
            .collect();
        let fallback_costs = assemble_fallback_costs(
            &primary_costs,
            &tables.extra_costs,
            &purchases,
            &config.currencies,
            &mut diagnostics,
        );

        let requirements = BomFlattener::new(config.waste).flatten(&bom_edges(&tables.bom));

        let market_share_references = market_share::normalize_references(&tables.market_share);
        let invoices = receivables::normalize_invoices(
            &tables.invoices,
            &config.aliases.client,
            &mut diagnostics,
        );
        let credit_terms = receivables::parse_credit_terms(&tables.credit_terms);

        debug!(
            "Loaded {} sales records, {} purchase records, {} fallback costs, {} requirements",
            sales.len(),
            purchases.len(),
            fallback_costs.len(),
            requirements.len()
        );

        if !diagnostics.is_empty() {
            info!("{} data issues recorded while loading", diagnostics.len());
        }

        Ok(Dataset {
            config: config.clone(),
            sales,
            purchases,
            fallback_costs,
            requirements,
            market_share_references,
            invoices,
            credit_terms,
            diagnostics,
        })
    }

    pub fn process_dir(
        dir: impl AsRef<std::path::Path>,
        config: &AnalyticsConfig,
    ) -> Result<Dataset> {
        let tables = SourceTables::from_dir(dir, &config.sources)?;
        Self::process(&tables, config)
    }
}

pub fn process_tables(tables: &SourceTables, config: &AnalyticsConfig) -> Result<Dataset> {
    DashboardProcessor::process(tables, config)
}

impl Dataset {
    fn summarizer(&self) -> DashboardSummarizer<'_> {
        DashboardSummarizer::new(&self.sales, self.config.brand_comparison_window_days)
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.summarizer().latest_year()
    }

    pub fn resolved_costs(&self, year: i32) -> Vec<ResolvedCost> {
        resolve_costs(&self.purchases, &self.fallback_costs, year)
    }

    /// Margin lines for `year` costs and prices under `grouping`.
    pub fn margin_lines(
        &self,
        grouping: &MarginGrouping,
        year: i32,
        diagnostics: &mut Diagnostics,
    ) -> Vec<MarginLine> {
        let costs = self.resolved_costs(year);
        let prices = realized_prices(&self.sales, year, grouping);
        MarginEngine::new(self.config.fixed_overhead_usd).compute(
            &self.requirements,
            &self.sales,
            &costs,
            &prices,
            grouping,
            diagnostics,
        )
    }

    /// Unit margin per SKU for the latest sales year.
    pub fn portfolio_margins(&self, diagnostics: &mut Diagnostics) -> Vec<Margin> {
        match self.latest_year() {
            Some(year) => portfolio_margins(&self.margin_lines(
                &MarginGrouping::BySku,
                year,
                diagnostics,
            )),
            None => Vec::new(),
        }
    }

    pub fn cost_breakdown(
        &self,
        brand: &str,
        year: i32,
        diagnostics: &mut Diagnostics,
    ) -> Vec<CostBreakdownRow> {
        let grouping = MarginGrouping::ByDescription {
            brand: brand.to_string(),
        };
        cost_breakdown(&self.margin_lines(&grouping, year, diagnostics))
    }

    pub fn receivables(&self, as_of: NaiveDate, diagnostics: &mut Diagnostics) -> Vec<ReceivableRow> {
        ReceivablesAging::new(&self.config.receivables).age(
            &self.invoices,
            &self.credit_terms,
            as_of,
            diagnostics,
        )
    }

    pub fn market_share(
        &self,
        brand: &str,
        year: i32,
        diagnostics: &mut Diagnostics,
    ) -> Vec<MarketShareRow> {
        market_share(
            &self.sales,
            &self.market_share_references,
            brand,
            year,
            &self.config.market_share,
            diagnostics,
        )
    }

    pub fn summary(&self, diagnostics: &mut Diagnostics) -> Option<DashboardSummary> {
        let margins = self.portfolio_margins(diagnostics);
        self.summarizer().summarize(&margins)
    }

    pub fn revenue_by_description(&self, brand: &str, year: i32) -> Vec<RevenueShare> {
        self.summarizer().revenue_by_description(brand, year)
    }

    /// Collects the summary page, including every issue found while loading
    /// and while computing it.
    pub fn report(&self, as_of: NaiveDate) -> DashboardReport {
        let mut query_issues = Diagnostics::new();
        let margins = self.portfolio_margins(&mut query_issues);
        let summary = self.summarizer().summarize(&margins);
        let receivables = self.receivables(as_of, &mut query_issues);

        let mut diagnostics = self.diagnostics.clone();
        diagnostics.extend(query_issues);

        DashboardReport {
            as_of,
            summary,
            margins,
            receivables_by_bucket: outstanding_by_bucket(&receivables),
            receivables_by_client: outstanding_by_client(&receivables),
            issues: diagnostics.issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_row(code: &str, article: &str, month: u32, amount: f64, quantity: f64) -> RawSalesRow {
        RawSalesRow {
            code: Some(code.to_string()),
            article: Some(article.to_string()),
            family: Some("Quorhum".to_string()),
            client: Some("Dufry".to_string()),
            country: Some("Spain".to_string()),
            year: 2023,
            month,
            day: 1,
            amount,
            quantity,
        }
    }

    fn purchase_row(date: &str, component: &str, cost: f64) -> RawPurchaseRow {
        RawPurchaseRow {
            date: date.to_string(),
            supplier: None,
            component: component.to_string(),
            description: None,
            quantity: 100.0,
            currency: "USD".to_string(),
            unit_cost: cost,
        }
    }

    fn tables() -> SourceTables {
        SourceTables {
            sales: vec![
                sales_row("BPT001", "Quorhum 12", 3, 600.0, 100.0),
                sales_row("BPT001", "Quorhum 12", 5, -50.0, 0.0),
            ],
            purchases: vec![
                purchase_row("01/02/2023", "MP001", 0.475),
                purchase_row("01/02/2023", "ME001", 0.485),
            ],
            bom: vec![
                RawBomRow {
                    component: "BPT001".to_string(),
                    subcomponent: "MP001".to_string(),
                    quantity: 2.0,
                },
                RawBomRow {
                    component: "BPT001".to_string(),
                    subcomponent: "ME001".to_string(),
                    quantity: 1.0,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_margin() {
        let dataset = DashboardProcessor::process(&tables(), &AnalyticsConfig::default()).unwrap();
        assert_eq!(dataset.latest_year(), Some(2023));

        let mut diagnostics = Diagnostics::new();
        let margins = dataset.portfolio_margins(&mut diagnostics);
        assert_eq!(margins.len(), 1);
        assert_eq!(margins[0].key, "BPT001");
        // liquido = 2 / 0.95 * 0.475 = 1.0, material_empaque = 1 / 0.97 * 0.485 = 0.5
        assert!((margins[0].margin_usd - 0.83).abs() < 1e-9);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AnalyticsConfig::default();
        config.waste.packaging = 1.5;
        let result = DashboardProcessor::process(&tables(), &config);
        assert!(matches!(result, Err(AnalyticsError::InvalidWasteFactor(_))));
    }

    #[test]
    fn test_processing_is_idempotent() {
        let config = AnalyticsConfig::default();
        let first = DashboardProcessor::process(&tables(), &config).unwrap();
        let second = DashboardProcessor::process(&tables(), &config).unwrap();
        assert_eq!(first, second);

        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(first.report(as_of), second.report(as_of));
    }

    #[test]
    fn test_empty_tables() {
        let dataset =
            DashboardProcessor::process(&SourceTables::default(), &AnalyticsConfig::default())
                .unwrap();
        let mut diagnostics = Diagnostics::new();
        assert!(dataset.portfolio_margins(&mut diagnostics).is_empty());
        assert!(dataset.summary(&mut diagnostics).is_none());
        assert!(dataset
            .cost_breakdown("quorhum", 2023, &mut diagnostics)
            .is_empty());
    }
}
