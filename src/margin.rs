use crate::error::{DataIssue, Diagnostics, ReferenceKind};
use crate::schema::{
    BreakdownVariable, CostBreakdownRow, CostClass, FlattenedRequirement, Margin, MarginLine,
    RealizedPrice, ResolvedCost, SalesRecord,
};
use crate::utils::{round_to, weighted_average};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Default fixed overhead per unit (otros).
pub const DEFAULT_FIXED_OVERHEAD_USD: f64 = 3.44 + 0.23;

/// How margin lines are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarginGrouping {
    /// One line per SKU across the whole portfolio.
    BySku,
    /// One line per article description, restricted to one brand.
    ByDescription { brand: String },
}

impl MarginGrouping {
    fn price_key<'s>(&self, record: &'s SalesRecord) -> Option<&'s str> {
        match self {
            MarginGrouping::BySku => record.sku.as_deref(),
            MarginGrouping::ByDescription { .. } => Some(record.description.as_str()),
        }
    }
}

#[derive(Default)]
struct GroupCosts {
    liquido: Option<f64>,
    material_empaque: Option<f64>,
    unresolved: bool,
}

impl GroupCosts {
    fn add(&mut self, class: CostClass, cost: f64) {
        let slot = match class {
            CostClass::Liquido => &mut self.liquido,
            CostClass::MaterialEmpaque => &mut self.material_empaque,
        };
        *slot = Some(slot.unwrap_or(0.0) + cost);
    }
}

/// Joins flattened requirements, resolved costs and realized prices into
/// per-group contribution margins.
pub struct MarginEngine {
    fixed_overhead_usd: f64,
}

impl MarginEngine {
    pub fn new(fixed_overhead_usd: f64) -> Self {
        Self { fixed_overhead_usd }
    }

    /// Groups with an uncosted component, a missing cost class or no price
    /// are left out and reported.
    pub fn compute(
        &self,
        bom: &[FlattenedRequirement],
        sales: &[SalesRecord],
        costs: &[ResolvedCost],
        prices: &[RealizedPrice],
        grouping: &MarginGrouping,
        diagnostics: &mut Diagnostics,
    ) -> Vec<MarginLine> {
        let groups_by_sku = sku_groups(sales, grouping);
        if groups_by_sku.is_empty() {
            return Vec::new();
        }

        let unit_costs: BTreeMap<&str, f64> = costs
            .iter()
            .map(|c| (c.component.code.as_str(), c.unit_cost_usd))
            .collect();

        let mut groups: BTreeMap<&str, GroupCosts> = BTreeMap::new();
        let mut unresolved: BTreeSet<(&str, &str)> = BTreeSet::new();

        for requirement in bom {
            let Some(keys) = groups_by_sku.get(requirement.sku.as_str()) else {
                continue;
            };
            let class = requirement.component.cost_class();
            let unit_cost = unit_costs.get(requirement.component.code.as_str()).copied();

            for &key in keys {
                let group = groups.entry(key).or_default();
                match unit_cost {
                    Some(cost) => group.add(class, cost * requirement.quantity),
                    None => {
                        group.unresolved = true;
                        unresolved.insert((key, requirement.component.code.as_str()));
                    }
                }
            }
        }

        for (group, component) in unresolved {
            diagnostics.record(DataIssue::UnresolvedCost {
                group: group.to_string(),
                component: component.to_string(),
            });
        }

        let prices: BTreeMap<&str, f64> = prices
            .iter()
            .map(|p| (p.key.as_str(), p.price_usd))
            .collect();

        let mut lines = Vec::new();
        for (key, group) in groups {
            if group.unresolved {
                continue;
            }
            let (liquido, material_empaque) = match (group.liquido, group.material_empaque) {
                (Some(liquido), Some(material_empaque)) => (liquido, material_empaque),
                (liquido, _) => {
                    let class = if liquido.is_none() {
                        CostClass::Liquido
                    } else {
                        CostClass::MaterialEmpaque
                    };
                    diagnostics.record(DataIssue::MissingCostClass {
                        group: key.to_string(),
                        class,
                    });
                    continue;
                }
            };
            let Some(&price) = prices.get(key) else {
                diagnostics.record(DataIssue::MissingReferenceData {
                    kind: ReferenceKind::Price,
                    key: key.to_string(),
                });
                continue;
            };

            lines.push(MarginLine {
                key: key.to_string(),
                liquido,
                material_empaque,
                otros: self.fixed_overhead_usd,
                price,
                margin: price - material_empaque - liquido - self.fixed_overhead_usd,
            });
        }

        debug!(
            "Computed {} margin lines ({:?})",
            lines.len(),
            grouping
        );

        lines
    }
}

impl Default for MarginEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_OVERHEAD_USD)
    }
}

/// Maps each SKU with a complete sales identity to the group keys it feeds.
fn sku_groups<'s>(
    sales: &'s [SalesRecord],
    grouping: &MarginGrouping,
) -> BTreeMap<&'s str, BTreeSet<&'s str>> {
    let mut groups: BTreeMap<&'s str, BTreeSet<&'s str>> = BTreeMap::new();

    for record in sales {
        let (Some(sku), Some(brand)) = (record.sku.as_deref(), record.brand.as_deref()) else {
            continue;
        };
        match grouping {
            MarginGrouping::BySku => {
                groups.entry(sku).or_default().insert(sku);
            }
            MarginGrouping::ByDescription { brand: wanted } => {
                if brand == wanted {
                    groups
                        .entry(sku)
                        .or_default()
                        .insert(record.description.as_str());
                }
            }
        }
    }

    groups
}

/// Average selling price per group key in `year`: quantity-weighted unit
/// price over complete lines with non-negative revenue and non-zero quantity.
pub fn realized_prices(
    sales: &[SalesRecord],
    year: i32,
    grouping: &MarginGrouping,
) -> Vec<RealizedPrice> {
    let mut lines: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();

    for record in sales {
        if record.year() != year
            || !record.is_complete()
            || record.revenue_usd < 0.0
            || record.quantity == 0.0
        {
            continue;
        }
        let Some(key) = grouping.price_key(record) else {
            continue;
        };
        lines
            .entry(key)
            .or_default()
            .push((record.revenue_usd / record.quantity, record.quantity));
    }

    lines
        .into_iter()
        .filter_map(|(key, lines)| {
            weighted_average(lines).map(|price_usd| RealizedPrice {
                key: key.to_string(),
                price_usd,
            })
        })
        .collect()
}

pub fn compute_margin(
    bom: &[FlattenedRequirement],
    sales: &[SalesRecord],
    costs: &[ResolvedCost],
    prices: &[RealizedPrice],
    grouping: &MarginGrouping,
) -> Vec<MarginLine> {
    let mut diagnostics = Diagnostics::new();
    MarginEngine::default().compute(bom, sales, costs, prices, grouping, &mut diagnostics)
}

/// Portfolio view: `(sku, margin)` pairs.
pub fn portfolio_margins(lines: &[MarginLine]) -> Vec<Margin> {
    lines
        .iter()
        .map(|line| Margin {
            key: line.key.clone(),
            margin_usd: line.margin,
        })
        .collect()
}

/// Drill-down view in long format, one variable at a time.
pub fn cost_breakdown(lines: &[MarginLine]) -> Vec<CostBreakdownRow> {
    BreakdownVariable::ALL
        .iter()
        .flat_map(|variable| {
            lines.iter().map(move |line| CostBreakdownRow {
                description: line.key.clone(),
                variable: *variable,
                value: round_to(variable.value_of(line), 2),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ComponentId, CostMethod};
    use chrono::NaiveDate;

    fn requirement(sku: &str, component: &str, quantity: f64) -> FlattenedRequirement {
        FlattenedRequirement {
            sku: sku.to_string(),
            component: ComponentId::new(component),
            quantity,
        }
    }

    fn cost(component: &str, unit_cost_usd: f64) -> ResolvedCost {
        ResolvedCost {
            component: ComponentId::new(component),
            unit_cost_usd,
            method: CostMethod::Year,
        }
    }

    fn sale(sku: &str, brand: &str, description: &str, revenue: f64, quantity: f64) -> SalesRecord {
        SalesRecord {
            sku: Some(sku.to_string()),
            brand: Some(brand.to_string()),
            description: description.to_string(),
            country: Some("spain".to_string()),
            client: Some("dufry".to_string()),
            date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            quarter: "2023-Q2".to_string(),
            revenue_usd: revenue,
            quantity,
        }
    }

    #[test]
    fn test_margin_example() {
        let bom = vec![requirement("S", "MP001", 2.0), requirement("S", "ME001", 1.0)];
        let costs = vec![cost("MP001", 0.5), cost("ME001", 0.5)];
        let sales = vec![sale("S", "quorhum", "quorhum 12", 600.0, 100.0)];
        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);

        let lines = compute_margin(&bom, &sales, &costs, &prices, &MarginGrouping::BySku);
        assert_eq!(lines.len(), 1);
        assert!((lines[0].liquido - 1.0).abs() < 1e-12);
        assert!((lines[0].material_empaque - 0.5).abs() < 1e-12);
        assert!((lines[0].margin - 0.83).abs() < 1e-9);
    }

    #[test]
    fn test_missing_cost_class_excludes_sku() {
        let bom = vec![requirement("S", "MP001", 1.0)];
        let costs = vec![cost("MP001", 1.0)];
        let sales = vec![sale("S", "quorhum", "quorhum 12", 600.0, 100.0)];
        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);

        let mut diagnostics = Diagnostics::new();
        let lines = MarginEngine::default().compute(
            &bom,
            &sales,
            &costs,
            &prices,
            &MarginGrouping::BySku,
            &mut diagnostics,
        );
        assert!(lines.is_empty());
        assert_eq!(
            diagnostics.issues,
            vec![DataIssue::MissingCostClass {
                group: "S".to_string(),
                class: CostClass::MaterialEmpaque,
            }]
        );
    }

    #[test]
    fn test_uncosted_component_excludes_sku() {
        let bom = vec![
            requirement("S", "MP001", 1.0),
            requirement("S", "ME001", 1.0),
            requirement("S", "ME002", 1.0),
        ];
        let costs = vec![cost("MP001", 1.0), cost("ME001", 1.0)];
        let sales = vec![sale("S", "quorhum", "quorhum 12", 600.0, 100.0)];
        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);

        let mut diagnostics = Diagnostics::new();
        let lines = MarginEngine::default().compute(
            &bom,
            &sales,
            &costs,
            &prices,
            &MarginGrouping::BySku,
            &mut diagnostics,
        );
        assert!(lines.is_empty());
        assert_eq!(
            diagnostics.issues,
            vec![DataIssue::UnresolvedCost {
                group: "S".to_string(),
                component: "ME002".to_string(),
            }]
        );
    }

    #[test]
    fn test_packaging_marker_wins_cost_class() {
        let bom = vec![requirement("S", "MP001", 1.0), requirement("S", "MPME01", 1.0)];
        let costs = vec![cost("MP001", 1.0), cost("MPME01", 0.5)];
        let sales = vec![sale("S", "quorhum", "quorhum 12", 600.0, 100.0)];
        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);

        let lines = compute_margin(&bom, &sales, &costs, &prices, &MarginGrouping::BySku);
        assert_eq!(lines.len(), 1);
        assert!((lines[0].liquido - 1.0).abs() < 1e-12);
        assert!((lines[0].material_empaque - 0.5).abs() < 1e-12);
        assert!((lines[0].margin - 0.83).abs() < 1e-9);
    }

    #[test]
    fn test_unsold_skus_are_dropped() {
        let bom = vec![requirement("X", "MP001", 1.0), requirement("X", "ME001", 1.0)];
        let costs = vec![cost("MP001", 1.0), cost("ME001", 1.0)];
        let sales = vec![sale("S", "quorhum", "quorhum 12", 600.0, 100.0)];
        let lines = compute_margin(&bom, &sales, &costs, &[], &MarginGrouping::BySku);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_realized_price_is_quantity_weighted() {
        let sales = vec![
            sale("S", "quorhum", "quorhum 12", 100.0, 10.0),
            sale("S", "quorhum", "quorhum 12", 600.0, 30.0),
            sale("S", "quorhum", "quorhum 12", -50.0, 0.0),
            sale("S", "quorhum", "quorhum 12", 0.0, 0.0),
        ];
        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);
        assert_eq!(prices.len(), 1);
        assert!((prices[0].price_usd - 700.0 / 40.0).abs() < 1e-12);
        assert!(realized_prices(&sales, 2022, &MarginGrouping::BySku).is_empty());
    }

    #[test]
    fn test_realized_price_skips_incomplete_lines() {
        let mut no_country = sale("S", "quorhum", "quorhum 12", 100.0, 100.0);
        no_country.country = None;
        let mut no_sku = sale("S", "quorhum", "quorhum 12", 100.0, 100.0);
        no_sku.sku = None;
        let sales = vec![
            sale("S", "quorhum", "quorhum 12", 600.0, 100.0),
            no_country,
            no_sku,
        ];

        let prices = realized_prices(&sales, 2023, &MarginGrouping::BySku);
        assert_eq!(prices.len(), 1);
        assert!((prices[0].price_usd - 6.0).abs() < 1e-12);

        let grouping = MarginGrouping::ByDescription {
            brand: "quorhum".to_string(),
        };
        let prices = realized_prices(&sales, 2023, &grouping);
        assert_eq!(prices.len(), 1);
        assert!((prices[0].price_usd - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_breakdown_by_description() {
        let bom = vec![
            requirement("S1", "MP001", 1.0),
            requirement("S1", "ME001", 1.0),
            requirement("S2", "MP001", 2.0),
            requirement("S2", "ME001", 1.0),
            requirement("S3", "MP001", 1.0),
            requirement("S3", "ME001", 1.0),
        ];
        let costs = vec![cost("MP001", 1.0), cost("ME001", 0.333)];
        let sales = vec![
            sale("S1", "quorhum", "quorhum 12", 1000.0, 100.0),
            sale("S2", "quorhum", "quorhum 23", 2000.0, 100.0),
            sale("S3", "cubaney", "cubaney 7", 900.0, 100.0),
        ];
        let grouping = MarginGrouping::ByDescription {
            brand: "quorhum".to_string(),
        };
        let prices = realized_prices(&sales, 2023, &grouping);
        let lines = compute_margin(&bom, &sales, &costs, &prices, &grouping);
        let rows = cost_breakdown(&lines);

        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].description, "quorhum 12");
        assert_eq!(rows[0].variable, BreakdownVariable::Liquido);
        assert_eq!(rows[1].description, "quorhum 23");
        assert_eq!(rows[1].value, 2.0);
        assert_eq!(rows[2].variable, BreakdownVariable::MaterialEmpaque);
        assert_eq!(rows[2].value, 0.33);
        assert_eq!(rows[4].variable, BreakdownVariable::Otros);
        assert_eq!(rows[4].value, 3.67);
        assert_eq!(rows[7].variable, BreakdownVariable::Margen);
        assert_eq!(rows[7].value, round_to(20.0 - 2.0 - 0.333 - 3.67, 2));
    }

    #[test]
    fn test_portfolio_projection() {
        let lines = vec![MarginLine {
            key: "S".to_string(),
            liquido: 1.0,
            material_empaque: 0.5,
            otros: 3.67,
            price: 6.0,
            margin: 0.83,
        }];
        let margins = portfolio_margins(&lines);
        assert_eq!(margins, vec![Margin { key: "S".to_string(), margin_usd: 0.83 }]);
    }
}
