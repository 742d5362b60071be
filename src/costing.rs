use crate::schema::{ComponentId, CostMethod, FallbackCost, PurchaseRecord, ResolvedCost};
use crate::utils::weighted_average;
use chrono::Datelike;
use log::debug;
use std::collections::BTreeMap;

/// Number of most recent purchase dates averaged by the slice estimator.
pub const SLICE_DEPTH: usize = 2;

/// Resolves one authoritative unit cost per component for a target year.
///
/// Purchase history always wins over the manual list: the calendar-year
/// average is used when the component was bought during the year, otherwise
/// the average of its latest purchases. Components never bought fall back to
/// the manual cost list.
pub struct CostResolver<'a> {
    purchases: &'a [PurchaseRecord],
    fallback: &'a [FallbackCost],
}

impl<'a> CostResolver<'a> {
    pub fn new(purchases: &'a [PurchaseRecord], fallback: &'a [FallbackCost]) -> Self {
        Self {
            purchases,
            fallback,
        }
    }

    pub fn resolve(&self, year: i32) -> Vec<ResolvedCost> {
        let by_year = self.year_method(year);
        let by_slice = self.slice_method();

        let mut resolved: BTreeMap<&str, ResolvedCost> = BTreeMap::new();

        for (code, (component, cost)) in &by_slice {
            let entry = match by_year.get(code) {
                Some((_, year_cost)) => ResolvedCost {
                    component: (*component).clone(),
                    unit_cost_usd: *year_cost,
                    method: CostMethod::Year,
                },
                None => ResolvedCost {
                    component: (*component).clone(),
                    unit_cost_usd: *cost,
                    method: CostMethod::Slice,
                },
            };
            resolved.insert(*code, entry);
        }

        let from_history = resolved.len();

        for fallback in self.fallback {
            resolved
                .entry(fallback.component.code.as_str())
                .or_insert_with(|| ResolvedCost {
                    component: fallback.component.clone(),
                    unit_cost_usd: fallback.unit_cost_usd,
                    method: CostMethod::Fallback,
                });
        }

        debug!(
            "Resolved {} component costs for {} ({} from purchases, {} from fallback list)",
            resolved.len(),
            year,
            from_history,
            resolved.len() - from_history
        );

        resolved.into_values().collect()
    }

    /// Quantity-weighted average over the purchases dated in `year`.
    pub fn year_method(&self, year: i32) -> BTreeMap<&'a str, (&'a ComponentId, f64)> {
        let mut groups: BTreeMap<&'a str, (&'a ComponentId, Vec<(f64, f64)>)> = BTreeMap::new();
        for purchase in self.purchases.iter().filter(|p| p.date.year() == year) {
            groups
                .entry(purchase.component.code.as_str())
                .or_insert_with(|| (&purchase.component, Vec::new()))
                .1
                .push((purchase.unit_cost_usd, purchase.quantity));
        }
        Self::average_groups(groups)
    }

    /// Quantity-weighted average over each component's latest purchase dates,
    /// regardless of year.
    pub fn slice_method(&self) -> BTreeMap<&'a str, (&'a ComponentId, f64)> {
        let mut history: BTreeMap<&'a str, Vec<&'a PurchaseRecord>> = BTreeMap::new();
        for purchase in self.purchases {
            history
                .entry(purchase.component.code.as_str())
                .or_default()
                .push(purchase);
        }

        let mut groups: BTreeMap<&'a str, (&'a ComponentId, Vec<(f64, f64)>)> = BTreeMap::new();
        for (code, mut purchases) in history {
            purchases.sort_by(|a, b| b.date.cmp(&a.date));
            let latest: &'a PurchaseRecord = purchases[0];
            let lines: Vec<(f64, f64)> = purchases
                .iter()
                .take(SLICE_DEPTH)
                .map(|p| (p.unit_cost_usd, p.quantity))
                .collect();
            groups.insert(code, (&latest.component, lines));
        }
        Self::average_groups(groups)
    }

    fn average_groups(
        groups: BTreeMap<&'a str, (&'a ComponentId, Vec<(f64, f64)>)>,
    ) -> BTreeMap<&'a str, (&'a ComponentId, f64)> {
        groups
            .into_iter()
            .filter_map(|(code, (component, lines))| {
                weighted_average(lines).map(|cost| (code, (component, cost)))
            })
            .collect()
    }
}

pub fn resolve_costs(
    purchases: &[PurchaseRecord],
    fallback: &[FallbackCost],
    year: i32,
) -> Vec<ResolvedCost> {
    CostResolver::new(purchases, fallback).resolve(year)
}
