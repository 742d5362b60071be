use crate::currency::CurrencyTable;
use crate::error::{DataIssue, Diagnostics, ReferenceKind};
use crate::ingestion::{RawCostListRow, RawPurchaseRow};
use crate::schema::{ComponentId, FallbackCost, PurchaseRecord};
use crate::utils::{parse_ledger_date, weighted_average};
use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Normalizes the purchase ledger to USD and merges lines bought on the same
/// day: quantities add up, unit costs are quantity-weighted.
///
/// Rows with an unparseable date or an unknown currency are dropped and
/// reported. Only raw material and packaging purchases are kept.
pub fn aggregate_purchases(
    rows: &[RawPurchaseRow],
    currencies: &CurrencyTable,
    diagnostics: &mut Diagnostics,
) -> Vec<PurchaseRecord> {
    let mut buckets: BTreeMap<(String, NaiveDate), Vec<(f64, f64)>> = BTreeMap::new();

    for row in rows {
        let date = match parse_ledger_date(&row.date) {
            Ok(date) => date,
            Err(_) => {
                diagnostics.record(DataIssue::UnparseableDate {
                    table: "purchases".to_string(),
                    value: row.date.clone(),
                });
                continue;
            }
        };

        let unit_cost = match currencies.to_usd(row.unit_cost, &row.currency) {
            Ok(cost) => cost,
            Err(issue) => {
                diagnostics.record(issue);
                continue;
            }
        };

        let component = ComponentId::new(row.component.trim());
        if !component.category.is_purchasable() {
            continue;
        }

        buckets
            .entry((component.code, date))
            .or_default()
            .push((unit_cost, row.quantity));
    }

    let records: Vec<PurchaseRecord> = buckets
        .into_iter()
        .filter_map(|((code, date), lines)| {
            let quantity = lines.iter().map(|(_, q)| q).sum();
            weighted_average(lines).map(|unit_cost_usd| PurchaseRecord {
                component: ComponentId::new(code),
                date,
                quantity,
                unit_cost_usd,
            })
        })
        .collect();

    debug!(
        "Aggregated {} purchase lines into {} (component, date) records",
        rows.len(),
        records.len()
    );

    records
}

/// Builds the manual cost list used for components never purchased.
///
/// The primary sheets only contribute components missing from the purchase
/// history; the extras sheet only fills components the primary sheets lack.
pub fn assemble_fallback_costs(
    primary: &[RawCostListRow],
    extras: &[RawCostListRow],
    purchases: &[PurchaseRecord],
    currencies: &CurrencyTable,
    diagnostics: &mut Diagnostics,
) -> Vec<FallbackCost> {
    let purchased: BTreeSet<&str> = purchases
        .iter()
        .map(|p| p.component.code.as_str())
        .collect();

    let mut selected: Vec<(String, Option<String>, f64)> = Vec::new();
    let mut primary_codes: BTreeSet<String> = BTreeSet::new();

    for row in primary {
        let (Some(component), Some(currency), Some(cost)) =
            (row.component.as_deref(), row.currency.as_deref(), row.unit_cost)
        else {
            continue;
        };
        let component = component.trim().to_string();
        if purchased.contains(component.as_str()) {
            continue;
        }
        primary_codes.insert(component.clone());
        selected.push((component, Some(currency.to_string()), cost));
    }

    for row in extras {
        let (Some(component), Some(cost)) = (row.component.as_deref(), row.unit_cost) else {
            continue;
        };
        let component = component.trim().to_uppercase();
        if primary_codes.contains(&component) {
            continue;
        }
        selected.push((component, row.currency.clone(), cost));
    }

    let mut fallback = Vec::with_capacity(selected.len());
    for (component, currency, cost) in selected {
        let Some(currency) = currency else {
            diagnostics.record(DataIssue::MissingReferenceData {
                kind: ReferenceKind::Currency,
                key: component,
            });
            continue;
        };
        match currencies.to_usd(cost, &currency) {
            Ok(unit_cost_usd) => fallback.push(FallbackCost {
                component: ComponentId::new(component),
                unit_cost_usd,
            }),
            Err(issue) => diagnostics.record(issue),
        }
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(date: &str, component: &str, quantity: f64, currency: &str, cost: f64) -> RawPurchaseRow {
        RawPurchaseRow {
            date: date.to_string(),
            supplier: Some("Proveedor SA".to_string()),
            component: component.to_string(),
            description: None,
            quantity,
            currency: currency.to_string(),
            unit_cost: cost,
        }
    }

    fn cost_row(component: &str, currency: Option<&str>, cost: f64) -> RawCostListRow {
        RawCostListRow {
            component: Some(component.to_string()),
            currency: currency.map(str::to_string),
            unit_cost: Some(cost),
        }
    }

    #[test]
    fn test_same_day_lines_are_weighted() {
        let mut diagnostics = Diagnostics::new();
        let rows = vec![
            purchase("01/02/2023", "MP001", 10.0, "USD", 2.0),
            purchase("01/02/2023", "MP001", 30.0, "USD", 4.0),
            purchase("15/02/2023", "MP001", 5.0, "USD", 3.0),
        ];

        let records = aggregate_purchases(&rows, &CurrencyTable::default(), &mut diagnostics);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].quantity, 40.0);
        assert!((records[0].unit_cost_usd - 3.5).abs() < 1e-12);
        assert_eq!(records[1].unit_cost_usd, 3.0);
    }

    #[test]
    fn test_currency_conversion_and_filtering() {
        let mut diagnostics = Diagnostics::new();
        let rows = vec![
            purchase("01/02/2023", "ME100", 100.0, "EUR", 1.0),
            purchase("01/02/2023", "SRV-FLETE", 1.0, "USD", 500.0),
            purchase("01/02/2023", "MP002", 1.0, "ARS", 500.0),
            purchase("garbage", "MP003", 1.0, "USD", 1.0),
        ];

        let records = aggregate_purchases(&rows, &CurrencyTable::default(), &mut diagnostics);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].component.code, "ME100");
        assert!((records[0].unit_cost_usd - 1.05).abs() < 1e-12);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.missing_references(ReferenceKind::Currency), vec!["ars"]);
    }

    #[test]
    fn test_fallback_assembly_precedence() {
        let mut diagnostics = Diagnostics::new();
        let purchases = vec![PurchaseRecord {
            component: ComponentId::new("MP001"),
            date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            quantity: 1.0,
            unit_cost_usd: 9.0,
        }];
        let primary = vec![
            cost_row("MP001", Some("usd"), 1.0),
            cost_row("ME200", Some("eur"), 2.0),
        ];
        let extras = vec![
            cost_row("me200", Some("usd"), 50.0),
            cost_row("me201", Some("usd"), 0.4),
            cost_row("me202", None, 0.4),
        ];

        let fallback = assemble_fallback_costs(
            &primary,
            &extras,
            &purchases,
            &CurrencyTable::default(),
            &mut diagnostics,
        );

        let codes: Vec<&str> = fallback.iter().map(|f| f.component.code.as_str()).collect();
        assert_eq!(codes, vec!["ME200", "ME201"]);
        assert!((fallback[0].unit_cost_usd - 2.1).abs() < 1e-12);
        assert_eq!(diagnostics.missing_references(ReferenceKind::Currency), vec!["ME202"]);
    }
}
