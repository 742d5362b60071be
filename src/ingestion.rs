//! Typed rows for each spreadsheet export and the CSV readers that produce
//! them. Column headers may use either the English field names or the
//! Spanish headers of the exported workbooks.

use crate::error::{AnalyticsError, Result};
use log::{debug, info};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSalesRow {
    #[serde(alias = "codigo")]
    pub code: Option<String>,
    #[serde(alias = "articulo")]
    pub article: Option<String>,
    #[serde(alias = "familia")]
    pub family: Option<String>,
    #[serde(alias = "cliente")]
    pub client: Option<String>,
    #[serde(alias = "pais")]
    pub country: Option<String>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    #[serde(alias = "monto")]
    pub amount: f64,
    #[serde(alias = "cantidad")]
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPurchaseRow {
    #[serde(alias = "fecha")]
    pub date: String,
    #[serde(default, alias = "proveedor")]
    pub supplier: Option<String>,
    #[serde(alias = "componente")]
    pub component: String,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "cantidad")]
    pub quantity: f64,
    #[serde(alias = "moneda")]
    pub currency: String,
    #[serde(alias = "costo")]
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBomRow {
    #[serde(alias = "componente")]
    pub component: String,
    #[serde(alias = "subcomponente")]
    pub subcomponent: String,
    #[serde(alias = "cantidad")]
    pub quantity: f64,
}

/// Row of a manual cost sheet. Incomplete rows are skipped during assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCostListRow {
    #[serde(alias = "componente", alias = "id_item")]
    pub component: Option<String>,
    #[serde(default, alias = "moneda")]
    pub currency: Option<String>,
    #[serde(alias = "costo", alias = "precio")]
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInvoiceRow {
    #[serde(alias = "factura")]
    pub invoice_id: String,
    #[serde(alias = "fecha")]
    pub date: String,
    #[serde(alias = "codigo_cliente")]
    pub client_code: String,
    #[serde(alias = "cliente")]
    pub client: String,
    #[serde(default, alias = "facturado")]
    pub invoiced: f64,
    #[serde(default, alias = "pagado")]
    pub paid: f64,
    #[serde(alias = "pendiente")]
    pub outstanding: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCreditTermRow {
    #[serde(alias = "codigo_cliente")]
    pub client_code: String,
    /// Free text such as "30 dias" or "contado".
    #[serde(default, alias = "dias_credito", alias = "condicion")]
    pub terms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMarketShareRow {
    #[serde(alias = "pais")]
    pub country: String,
    #[serde(alias = "aa_per_capita")]
    pub alcohol_per_capita: f64,
    pub population: f64,
}

/// File names of each table inside a source directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SourceFiles {
    pub sales: String,
    pub purchases: String,
    pub bom: String,
    pub packaging_costs: String,
    pub raw_material_costs: String,
    pub extra_costs: String,
    pub market_share: String,
    pub receivables: String,
    pub credit_terms: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            sales: "ventas.csv".to_string(),
            purchases: "compras.csv".to_string(),
            bom: "bill_of_materials.csv".to_string(),
            packaging_costs: "costo_me.csv".to_string(),
            raw_material_costs: "costo_mp.csv".to_string(),
            extra_costs: "costo_me_faltantes.csv".to_string(),
            market_share: "market_share.csv".to_string(),
            receivables: "cuentas_por_cobrar.csv".to_string(),
            credit_terms: "condiciones.csv".to_string(),
        }
    }
}

/// Every raw table the pipeline consumes, exactly as read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTables {
    pub sales: Vec<RawSalesRow>,
    pub purchases: Vec<RawPurchaseRow>,
    pub bom: Vec<RawBomRow>,
    pub packaging_costs: Vec<RawCostListRow>,
    pub raw_material_costs: Vec<RawCostListRow>,
    pub extra_costs: Vec<RawCostListRow>,
    pub market_share: Vec<RawMarketShareRow>,
    pub invoices: Vec<RawInvoiceRow>,
    pub credit_terms: Vec<RawCreditTermRow>,
}

impl SourceTables {
    /// Loads every table from `dir`. Each file listed in `files` must exist.
    pub fn from_dir(dir: impl AsRef<Path>, files: &SourceFiles) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading source tables from {}", dir.display());

        let tables = Self {
            sales: read_csv_file(dir.join(&files.sales), "sales")?,
            purchases: read_csv_file(dir.join(&files.purchases), "purchases")?,
            bom: read_csv_file(dir.join(&files.bom), "bom")?,
            packaging_costs: read_csv_file(dir.join(&files.packaging_costs), "packaging_costs")?,
            raw_material_costs: read_csv_file(
                dir.join(&files.raw_material_costs),
                "raw_material_costs",
            )?,
            extra_costs: read_csv_file(dir.join(&files.extra_costs), "extra_costs")?,
            market_share: read_csv_file(dir.join(&files.market_share), "market_share")?,
            invoices: read_csv_file(dir.join(&files.receivables), "receivables")?,
            credit_terms: read_csv_file(dir.join(&files.credit_terms), "credit_terms")?,
        };

        debug!(
            "Loaded {} sales rows, {} purchase rows, {} BOM rows, {} invoices",
            tables.sales.len(),
            tables.purchases.len(),
            tables.bom.len(),
            tables.invoices.len()
        );

        Ok(tables)
    }
}

/// Deserializes every record of a headed CSV stream.
pub fn read_csv<T, R>(reader: R, table: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in csv_reader.deserialize() {
        let record: T = result.map_err(|source| AnalyticsError::Csv {
            table: table.to_string(),
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

pub fn read_csv_file<T>(path: impl AsRef<Path>, table: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnalyticsError::MissingSource(path.display().to_string()));
    }
    let file = File::open(path)?;
    read_csv(file, table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALES_CSV: &str = "\
codigo,articulo,familia,cliente,pais,year,month,day,monto,cantidad
BPT0101,Ron Presidente 700ml,Presidencial,DUFRY AMERICA,USA,2023,3,14,1200.50,100
,Marketing Fee,Quorhum,Dufry,Spain,2023,4,2,-300,0
";

    #[test]
    fn test_read_sales_with_spanish_headers() {
        let rows: Vec<RawSalesRow> = read_csv(SALES_CSV.as_bytes(), "sales").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code.as_deref(), Some("BPT0101"));
        assert_eq!(rows[0].amount, 1200.50);
        assert_eq!(rows[1].code, None);
        assert_eq!(rows[1].quantity, 0.0);
    }

    #[test]
    fn test_cost_list_accepts_extra_sheet_headers() {
        let csv = "id_item,precio\nme0450,0.12\nme0451,\n";
        let rows: Vec<RawCostListRow> = read_csv(csv.as_bytes(), "extra_costs").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].component.as_deref(), Some("me0450"));
        assert_eq!(rows[0].currency, None);
        assert_eq!(rows[1].unit_cost, None);
    }

    #[test]
    fn test_malformed_row_names_table() {
        let csv = "componente,subcomponente,cantidad\nBPT01,MP01,abc\n";
        let err = read_csv::<RawBomRow, _>(csv.as_bytes(), "bom").unwrap_err();
        assert!(err.to_string().starts_with("CSV error in bom"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = read_csv_file::<RawBomRow>("/definitely/not/here.csv", "bom");
        assert!(matches!(result, Err(AnalyticsError::MissingSource(_))));
    }
}
