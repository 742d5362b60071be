use crate::config::{AliasRule, ReceivablesConfig};
use crate::error::{DataIssue, Diagnostics, ReferenceKind};
use crate::ingestion::{RawCreditTermRow, RawInvoiceRow};
use crate::sales::canonical_client;
use crate::schema::{AgingBucket, CreditTerm, Invoice, ReceivableRow};
use crate::utils::parse_ledger_date;
use chrono::NaiveDate;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("static regex"));

/// Outstanding total for one aging bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTotal {
    pub bucket: AgingBucket,
    pub amount_outstanding: f64,
}

/// Outstanding per client, split by whether the credit term has lapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientExposure {
    pub client: String,
    pub overdue: f64,
    pub not_overdue: f64,
}

/// Extracts the first run of digits from a free-text credit term
/// ("30 dias" → 30). Terms without digits count as cash (0 days).
pub fn parse_credit_days(terms: Option<&str>) -> i64 {
    terms
        .and_then(|t| DIGITS.captures(t))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn parse_credit_terms(rows: &[RawCreditTermRow]) -> Vec<CreditTerm> {
    rows.iter()
        .map(|row| CreditTerm {
            client_code: row.client_code.trim().to_string(),
            days: parse_credit_days(row.terms.as_deref()),
        })
        .collect()
}

pub fn normalize_invoices(
    rows: &[RawInvoiceRow],
    client_rules: &[AliasRule],
    diagnostics: &mut Diagnostics,
) -> Vec<Invoice> {
    let mut invoices = Vec::with_capacity(rows.len());
    for row in rows {
        let date = match parse_ledger_date(&row.date) {
            Ok(date) => date,
            Err(_) => {
                diagnostics.record(DataIssue::UnparseableDate {
                    table: "receivables".to_string(),
                    value: row.date.clone(),
                });
                continue;
            }
        };
        invoices.push(Invoice {
            invoice_id: row.invoice_id.clone(),
            date,
            client_code: row.client_code.trim().to_string(),
            client: canonical_client(client_rules, row.client.trim()),
            invoiced: row.invoiced,
            paid: row.paid,
            outstanding: row.outstanding,
        });
    }
    invoices
}

/// Ages open invoices against each client's credit term.
pub struct ReceivablesAging {
    local_currency_per_usd: f64,
}

impl ReceivablesAging {
    pub fn new(config: &ReceivablesConfig) -> Self {
        Self {
            local_currency_per_usd: config.local_currency_per_usd,
        }
    }

    pub fn age(
        &self,
        invoices: &[Invoice],
        credit_terms: &[CreditTerm],
        as_of: NaiveDate,
        diagnostics: &mut Diagnostics,
    ) -> Vec<ReceivableRow> {
        let mut terms: BTreeMap<&str, i64> = BTreeMap::new();
        for term in credit_terms {
            terms.entry(term.client_code.as_str()).or_insert(term.days);
        }

        let mut grouped: BTreeMap<(NaiveDate, &str, i64), f64> = BTreeMap::new();
        for invoice in invoices {
            if invoice.outstanding == 0.0 {
                continue;
            }
            let Some(&days) = terms.get(invoice.client_code.as_str()) else {
                diagnostics.record(DataIssue::MissingReferenceData {
                    kind: ReferenceKind::CreditTerm,
                    key: invoice.client_code.clone(),
                });
                continue;
            };
            *grouped
                .entry((invoice.date, invoice.client.as_str(), days))
                .or_insert(0.0) += invoice.outstanding;
        }

        let rows: Vec<ReceivableRow> = grouped
            .into_iter()
            .map(|((invoice_date, client, credit_term_days), outstanding)| {
                let days_overdue = (as_of - invoice_date).num_days() - credit_term_days;
                ReceivableRow {
                    invoice_date,
                    client: client.to_string(),
                    credit_term_days,
                    // Half-way amounts round to even.
                    amount_outstanding: (outstanding / self.local_currency_per_usd)
                        .round_ties_even(),
                    days_overdue,
                    bucket: AgingBucket::for_days(days_overdue),
                }
            })
            .collect();

        debug!(
            "Aged {} open receivables as of {}",
            rows.len(),
            as_of
        );

        rows
    }
}

impl Default for ReceivablesAging {
    fn default() -> Self {
        Self::new(&ReceivablesConfig::default())
    }
}

pub fn age_receivables(
    invoices: &[Invoice],
    credit_terms: &[CreditTerm],
    as_of: NaiveDate,
) -> Vec<ReceivableRow> {
    let mut diagnostics = Diagnostics::new();
    ReceivablesAging::default().age(invoices, credit_terms, as_of, &mut diagnostics)
}

/// Outstanding per bucket, every bucket present in order.
pub fn outstanding_by_bucket(rows: &[ReceivableRow]) -> Vec<BucketTotal> {
    AgingBucket::ALL
        .iter()
        .map(|bucket| BucketTotal {
            bucket: *bucket,
            amount_outstanding: rows
                .iter()
                .filter(|r| r.bucket == *bucket)
                .map(|r| r.amount_outstanding)
                .sum(),
        })
        .collect()
}

pub fn outstanding_by_client(rows: &[ReceivableRow]) -> Vec<ClientExposure> {
    let mut clients: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let totals = clients.entry(row.client.as_str()).or_insert((0.0, 0.0));
        if row.is_overdue() {
            totals.0 += row.amount_outstanding;
        } else {
            totals.1 += row.amount_outstanding;
        }
    }
    clients
        .into_iter()
        .map(|(client, (overdue, not_overdue))| ClientExposure {
            client: client.to_string(),
            overdue,
            not_overdue,
        })
        .collect()
}
