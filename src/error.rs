use crate::schema::CostClass;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid waste factor {0}: must be in [0.0, 1.0)")]
    InvalidWasteFactor(f64),

    #[error("Invalid currency rate for '{code}': {rate}")]
    InvalidCurrencyRate { code: String, rate: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing source table: {0}")]
    MissingSource(String),

    #[error("CSV error in {table}: {source}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Row-level data problems. These never abort a batch: the affected row is
/// dropped and the issue is recorded in [`Diagnostics`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum DataIssue {
    #[error("No {kind} reference found for '{key}'")]
    MissingReferenceData { kind: ReferenceKind, key: String },

    #[error("Unparseable date '{value}' in {table}")]
    UnparseableDate { table: String, value: String },

    #[error("Component '{component}' has no resolved cost (group '{group}')")]
    UnresolvedCost { group: String, component: String },

    #[error("Group '{group}' has no {class} components")]
    MissingCostClass { group: String, class: CostClass },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Currency,
    CreditTerm,
    Country,
    Price,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReferenceKind::Currency => "currency",
            ReferenceKind::CreditTerm => "credit term",
            ReferenceKind::Country => "country",
            ReferenceKind::Price => "price",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub issues: Vec<DataIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, issue: DataIssue) {
        warn!("{}", issue);
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn missing_references(&self, kind: ReferenceKind) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                DataIssue::MissingReferenceData { kind: k, key } if *k == kind => {
                    Some(key.as_str())
                }
                _ => None,
            })
            .collect()
    }
}
