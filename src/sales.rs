use crate::config::{apply_aliases, AnalyticsConfig, TextReplacement};
use crate::error::{DataIssue, Diagnostics};
use crate::ingestion::RawSalesRow;
use crate::schema::SalesRecord;
use crate::utils::{date_from_parts, quarter_label};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Turns the raw sales ledger into canonical records.
pub struct SalesNormalizer<'a> {
    config: &'a AnalyticsConfig,
}

impl<'a> SalesNormalizer<'a> {
    pub fn new(config: &'a AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn normalize(
        &self,
        rows: &[RawSalesRow],
        diagnostics: &mut Diagnostics,
    ) -> Vec<SalesRecord> {
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(article) = row.article.as_deref() else {
                continue;
            };
            let article = article.to_lowercase();
            if article.contains(&self.config.sales_filter.excluded_article_marker) {
                continue;
            }
            if !self.is_finished_good(row.code.as_deref()) {
                continue;
            }

            let date = match date_from_parts(row.year, row.month, row.day) {
                Ok(date) => date,
                Err(_) => {
                    diagnostics.record(DataIssue::UnparseableDate {
                        table: "sales".to_string(),
                        value: format!("{:04}-{:02}-{:02}", row.year, row.month, row.day),
                    });
                    continue;
                }
            };

            records.push(SalesRecord {
                sku: row.code.clone(),
                brand: row.family.as_deref().map(|f| self.canonical_brand(f)),
                description: clean_article(&article, &self.config.article_cleanup),
                country: row.country.as_deref().map(|c| self.canonical_country(c)),
                client: row.client.as_deref().map(|c| self.canonical_client(c)),
                date,
                quarter: quarter_label(date),
                revenue_usd: row.amount,
                quantity: row.quantity,
            });
        }

        // `YYYY-Qn` sorts chronologically; the sort is stable within a quarter.
        records.sort_by(|a, b| a.quarter.cmp(&b.quarter));

        debug!(
            "Normalized {} of {} sales rows",
            records.len(),
            rows.len()
        );

        records
    }

    fn is_finished_good(&self, code: Option<&str>) -> bool {
        match code {
            None => true,
            Some(code) => self
                .config
                .sales_filter
                .finished_good_markers
                .iter()
                .any(|marker| code.contains(marker.as_str())),
        }
    }

    pub fn canonical_brand(&self, family: &str) -> String {
        apply_aliases(&self.config.aliases.brand, &family.to_lowercase())
    }

    pub fn canonical_client(&self, client: &str) -> String {
        canonical_client(&self.config.aliases.client, client)
    }

    pub fn canonical_country(&self, country: &str) -> String {
        let aliased = apply_aliases(&self.config.aliases.country, country);
        strip_diacritics(&aliased.to_lowercase())
    }
}

pub fn canonical_client(rules: &[crate::config::AliasRule], client: &str) -> String {
    apply_aliases(rules, &client.to_lowercase())
}

/// NFKD-decomposes and keeps only the ASCII part ("méxico" → "mexico").
pub fn strip_diacritics(input: &str) -> String {
    input.nfkd().filter(|c| c.is_ascii()).collect()
}

pub fn clean_article(article: &str, replacements: &[TextReplacement]) -> String {
    let mut cleaned = article.to_string();
    for replacement in replacements {
        cleaned = cleaned.replace(replacement.pattern.as_str(), &replacement.replacement);
    }
    WHITESPACE.replace_all(&cleaned, " ").into_owned()
}

pub fn normalize_sales(
    rows: &[RawSalesRow],
    config: &AnalyticsConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<SalesRecord> {
    SalesNormalizer::new(config).normalize(rows, diagnostics)
}
