use crate::config::WasteFactors;
use crate::ingestion::RawBomRow;
use crate::schema::{BomEdge, ComponentCategory, ComponentId, FlattenedRequirement};
use crate::utils::share;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Explodes a two-level bill of materials into per-SKU component quantities.
///
/// Only one level of intermediate substitution is performed
/// (parent → intermediate → component). Deeper chains are not followed.
pub struct BomFlattener {
    waste: WasteFactors,
}

// Joined parent/child row before the quantities are combined.
struct JoinedEdge<'e> {
    parent: &'e ComponentId,
    intermediate: &'e ComponentId,
    parent_quantity: f64,
    child: Option<&'e ComponentId>,
    child_quantity: Option<f64>,
}

impl BomFlattener {
    pub fn new(waste: WasteFactors) -> Self {
        Self { waste }
    }

    pub fn flatten(&self, edges: &[BomEdge]) -> Vec<FlattenedRequirement> {
        let top_level: BTreeSet<&str> = edges
            .iter()
            .filter(|e| !e.parent.category.is_material())
            .map(|e| e.parent.code.as_str())
            .collect();

        let parent_edges: Vec<&BomEdge> = edges
            .iter()
            .filter(|e| top_level.contains(e.parent.code.as_str()))
            .collect();

        let parent_children: BTreeSet<&str> = parent_edges
            .iter()
            .map(|e| e.child.code.as_str())
            .collect();

        // Keyed by the intermediate code; rows keep their input order.
        let mut child_edges: BTreeMap<&str, Vec<&BomEdge>> = BTreeMap::new();
        for edge in edges {
            if !top_level.contains(edge.parent.code.as_str())
                || parent_children.contains(edge.child.code.as_str())
            {
                child_edges
                    .entry(edge.parent.code.as_str())
                    .or_default()
                    .push(edge);
            }
        }

        let joined = Self::left_join(&parent_edges, &child_edges);
        let group_totals = Self::child_totals(&joined);

        let requirements: Vec<FlattenedRequirement> = joined
            .iter()
            .map(|row| {
                let child_quantity = match row.child_quantity {
                    Some(qy) if row.intermediate.category == ComponentCategory::RawMaterial => {
                        let total = group_totals
                            .get(&(row.parent.code.as_str(), row.intermediate.code.as_str()))
                            .copied()
                            .unwrap_or(0.0);
                        share(qy, total)
                    }
                    Some(qy) => qy,
                    None => 1.0,
                };

                let component = row.child.unwrap_or(row.intermediate);
                let quantity = row.parent_quantity * child_quantity;

                FlattenedRequirement {
                    sku: row.parent.code.clone(),
                    component: component.clone(),
                    quantity: self.apply_waste(component, quantity),
                }
            })
            .collect();

        debug!(
            "Flattened {} BOM edges into {} requirements for {} parents",
            edges.len(),
            requirements.len(),
            top_level.len()
        );

        requirements
    }

    pub fn apply_waste(&self, component: &ComponentId, quantity: f64) -> f64 {
        let factor = if component.category == ComponentCategory::RawMaterial {
            self.waste.raw_material
        } else {
            self.waste.packaging
        };
        quantity / (1.0 - factor)
    }

    fn left_join<'e>(
        parent_edges: &[&'e BomEdge],
        child_edges: &BTreeMap<&str, Vec<&'e BomEdge>>,
    ) -> Vec<JoinedEdge<'e>> {
        let mut joined = Vec::new();
        for &parent in parent_edges {
            match child_edges.get(parent.child.code.as_str()) {
                Some(children) => {
                    for &child in children {
                        joined.push(JoinedEdge {
                            parent: &parent.parent,
                            intermediate: &parent.child,
                            parent_quantity: parent.quantity,
                            child: Some(&child.child),
                            child_quantity: Some(child.quantity),
                        });
                    }
                }
                None => joined.push(JoinedEdge {
                    parent: &parent.parent,
                    intermediate: &parent.child,
                    parent_quantity: parent.quantity,
                    child: None,
                    child_quantity: None,
                }),
            }
        }
        joined
    }

    fn child_totals<'e>(joined: &[JoinedEdge<'e>]) -> BTreeMap<(&'e str, &'e str), f64> {
        let mut totals = BTreeMap::new();
        for row in joined {
            if let Some(qy) = row.child_quantity {
                *totals
                    .entry((row.parent.code.as_str(), row.intermediate.code.as_str()))
                    .or_insert(0.0) += qy;
            }
        }
        totals
    }
}

impl Default for BomFlattener {
    fn default() -> Self {
        Self::new(WasteFactors::default())
    }
}

pub fn flatten_bom(edges: &[BomEdge]) -> Vec<FlattenedRequirement> {
    BomFlattener::default().flatten(edges)
}

pub fn bom_edges(rows: &[RawBomRow]) -> Vec<BomEdge> {
    rows.iter()
        .map(|row| BomEdge::new(row.component.trim(), row.subcomponent.trim(), row.quantity))
        .collect()
}
