use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const RAW_MATERIAL_MARKER: &str = "MP";
pub const PACKAGING_MARKER: &str = "ME";
pub const MISCELLANEOUS_MARKER: &str = "MV";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    #[schemars(description = "Raw liquid or ingredient material, code carries the 'MP' marker")]
    RawMaterial,

    #[schemars(description = "Packaging material, code carries the 'ME' marker")]
    Packaging,

    #[schemars(description = "Miscellaneous material, code carries the 'MV' marker")]
    Miscellaneous,

    #[schemars(description = "Finished good or sub-assembly: any code without a material marker")]
    Assembly,
}

impl ComponentCategory {
    /// Markers are matched anywhere in the code, raw material first.
    pub fn classify(code: &str) -> Self {
        if code.contains(RAW_MATERIAL_MARKER) {
            ComponentCategory::RawMaterial
        } else if code.contains(PACKAGING_MARKER) {
            ComponentCategory::Packaging
        } else if code.contains(MISCELLANEOUS_MARKER) {
            ComponentCategory::Miscellaneous
        } else {
            ComponentCategory::Assembly
        }
    }

    pub fn is_material(&self) -> bool {
        !matches!(self, ComponentCategory::Assembly)
    }

    /// Only raw material and packaging are bought and costed.
    pub fn is_purchasable(&self) -> bool {
        matches!(
            self,
            ComponentCategory::RawMaterial | ComponentCategory::Packaging
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ComponentId {
    pub code: String,
    pub category: ComponentCategory,
}

impl ComponentId {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let category = ComponentCategory::classify(&code);
        Self { code, category }
    }

    /// Any code carrying the packaging marker rolls up as packaging, even when
    /// it is classified as raw material for waste.
    pub fn cost_class(&self) -> CostClass {
        if self.code.contains(PACKAGING_MARKER) {
            CostClass::MaterialEmpaque
        } else {
            CostClass::Liquido
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomEdge {
    pub parent: ComponentId,
    pub child: ComponentId,
    pub quantity: f64,
}

impl BomEdge {
    pub fn new(parent: impl Into<String>, child: impl Into<String>, quantity: f64) -> Self {
        Self {
            parent: ComponentId::new(parent),
            child: ComponentId::new(child),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedRequirement {
    pub sku: String,
    pub component: ComponentId,
    /// Units of `component` per unit of `sku`, waste included.
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub component: ComponentId,
    pub date: NaiveDate,
    pub quantity: f64,
    pub unit_cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackCost {
    pub component: ComponentId,
    pub unit_cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMethod {
    /// Weighted average over the target calendar year.
    Year,
    /// Weighted average over the two most recent purchase dates.
    Slice,
    /// Manual cost list.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCost {
    pub component: ComponentId,
    pub unit_cost_usd: f64,
    pub method: CostMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub description: String,
    pub country: Option<String>,
    pub client: Option<String>,
    pub date: NaiveDate,
    /// `YYYY-Qn`
    pub quarter: String,
    pub revenue_usd: f64,
    pub quantity: f64,
}

impl SalesRecord {
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.date.year()
    }

    /// Advertising & promotion deduction: negative revenue with nothing shipped.
    pub fn is_promotion(&self) -> bool {
        self.revenue_usd < 0.0 && self.quantity == 0.0
    }

    /// Sku, brand, country and client are all present.
    pub fn is_complete(&self) -> bool {
        self.sku.is_some()
            && self.brand.is_some()
            && self.country.is_some()
            && self.client.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostClass {
    Liquido,
    MaterialEmpaque,
}

impl CostClass {
    pub fn label(&self) -> &'static str {
        match self {
            CostClass::Liquido => "liquido",
            CostClass::MaterialEmpaque => "material_empaque",
        }
    }
}

impl std::fmt::Display for CostClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedPrice {
    pub key: String,
    pub price_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginLine {
    pub key: String,
    pub liquido: f64,
    pub material_empaque: f64,
    pub otros: f64,
    pub price: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub key: String,
    pub margin_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownVariable {
    Liquido,
    MaterialEmpaque,
    Otros,
    Margen,
}

impl BreakdownVariable {
    pub const ALL: [BreakdownVariable; 4] = [
        BreakdownVariable::Liquido,
        BreakdownVariable::MaterialEmpaque,
        BreakdownVariable::Otros,
        BreakdownVariable::Margen,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BreakdownVariable::Liquido => "liquido",
            BreakdownVariable::MaterialEmpaque => "material_empaque",
            BreakdownVariable::Otros => "otros",
            BreakdownVariable::Margen => "margen",
        }
    }

    pub fn value_of(&self, line: &MarginLine) -> f64 {
        match self {
            BreakdownVariable::Liquido => line.liquido,
            BreakdownVariable::MaterialEmpaque => line.material_empaque,
            BreakdownVariable::Otros => line.otros,
            BreakdownVariable::Margen => line.margin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdownRow {
    pub description: String,
    pub variable: BreakdownVariable,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub date: NaiveDate,
    pub client_code: String,
    pub client: String,
    pub invoiced: f64,
    pub paid: f64,
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTerm {
    pub client_code: String,
    pub days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "[-inf, -100]")]
    WellAhead,
    #[serde(rename = "[-100, -50]")]
    Ahead,
    #[serde(rename = "[-50, 0]")]
    DueSoon,
    #[serde(rename = "[0, 50]")]
    Overdue,
    #[serde(rename = "[50, 100]")]
    LongOverdue,
    #[serde(rename = "[100, inf]")]
    Delinquent,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 6] = [
        AgingBucket::WellAhead,
        AgingBucket::Ahead,
        AgingBucket::DueSoon,
        AgingBucket::Overdue,
        AgingBucket::LongOverdue,
        AgingBucket::Delinquent,
    ];

    /// Right-closed intervals over days overdue.
    pub fn for_days(days_overdue: i64) -> Self {
        match days_overdue {
            d if d <= -100 => AgingBucket::WellAhead,
            d if d <= -50 => AgingBucket::Ahead,
            d if d <= 0 => AgingBucket::DueSoon,
            d if d <= 50 => AgingBucket::Overdue,
            d if d <= 100 => AgingBucket::LongOverdue,
            _ => AgingBucket::Delinquent,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::WellAhead => "[-inf, -100]",
            AgingBucket::Ahead => "[-100, -50]",
            AgingBucket::DueSoon => "[-50, 0]",
            AgingBucket::Overdue => "[0, 50]",
            AgingBucket::LongOverdue => "[50, 100]",
            AgingBucket::Delinquent => "[100, inf]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivableRow {
    pub invoice_date: NaiveDate,
    pub client: String,
    pub credit_term_days: i64,
    pub amount_outstanding: f64,
    pub days_overdue: i64,
    pub bucket: AgingBucket,
}

impl ReceivableRow {
    pub fn is_overdue(&self) -> bool {
        self.days_overdue > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShareReference {
    pub country: String,
    pub alcohol_per_capita: f64,
    pub population: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShareRow {
    pub brand: String,
    pub country: String,
    pub sales_usd: f64,
    pub quantity: f64,
    /// Percent of the estimated category volume, absent when the country is unknown.
    pub market_share: Option<f64>,
}
