use crate::error::{AnalyticsError, DataIssue, Result};
use crate::receivables::{BucketTotal, ClientExposure};
use crate::schema::Margin;
use crate::summary::{DashboardSummary, Kpi};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything the dashboard's summary page shows, in exportable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub as_of: NaiveDate,
    pub summary: Option<DashboardSummary>,
    pub margins: Vec<Margin>,
    pub receivables_by_bucket: Vec<BucketTotal>,
    pub receivables_by_client: Vec<ClientExposure>,
    pub issues: Vec<DataIssue>,
}

fn csv_error(source: csv::Error) -> AnalyticsError {
    AnalyticsError::Csv {
        table: "report".to_string(),
        source,
    }
}

fn write_row(
    writer: &mut csv::Writer<Vec<u8>>,
    section: &str,
    key: &str,
    value: String,
) -> Result<()> {
    writer
        .write_record([section, key, value.as_str()])
        .map_err(csv_error)
}

fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(delta) => format!("{:.0}%", delta * 100.0),
        None => "n/a".to_string(),
    }
}

impl DashboardReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One `Section,Key,Value` row per figure.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["Section", "Key", "Value"])
            .map_err(csv_error)?;

        if let Some(summary) = &self.summary {
            let kpi_rows: [(&str, Kpi); 2] = [
                ("Revenue YTD", summary.revenue_ytd),
                ("A&P YTD", summary.promotion_ytd),
            ];
            for (name, kpi) in kpi_rows {
                write_row(&mut writer, "KPI", name, format!("{:.2}", kpi.value))?;
                if let Some(delta) = kpi.delta {
                    write_row(
                        &mut writer,
                        "KPI",
                        &format!("{} Delta", name),
                        format!("{:.4}", delta),
                    )?;
                }
            }
            write_row(
                &mut writer,
                "KPI",
                "Profit YTD",
                format!("{:.2}", summary.profit_ytd),
            )?;

            for split in &summary.revenue_by_year {
                write_row(
                    &mut writer,
                    "Revenue by Year",
                    &format!("{} {}", split.year, split.class.label()),
                    format!("{:.2}", split.amount_usd),
                )?;
            }

            for (section, shares) in [
                ("Revenue by Brand", &summary.revenue_by_brand),
                ("Revenue by Country", &summary.revenue_by_country),
                ("Revenue by Client", &summary.revenue_by_client),
            ] {
                for share in shares {
                    write_row(
                        &mut writer,
                        section,
                        &share.key,
                        format!("{:.2}", share.revenue_usd),
                    )?;
                }
            }

            for brand in &summary.brands {
                write_row(
                    &mut writer,
                    "Brand YTD",
                    &brand.brand,
                    format!("{:.2}", brand.ytd_usd),
                )?;
            }
        }

        for margin in &self.margins {
            write_row(
                &mut writer,
                "Margin",
                &margin.key,
                format!("{:.2}", margin.margin_usd),
            )?;
        }

        for bucket in &self.receivables_by_bucket {
            write_row(
                &mut writer,
                "Receivables by Bucket",
                bucket.bucket.label(),
                format!("{:.0}", bucket.amount_outstanding),
            )?;
        }

        for client in &self.receivables_by_client {
            write_row(
                &mut writer,
                "Receivables Overdue",
                &client.client,
                format!("{:.0}", client.overdue),
            )?;
            write_row(
                &mut writer,
                "Receivables Not Overdue",
                &client.client,
                format!("{:.0}", client.not_overdue),
            )?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AnalyticsError::IoError(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Sales Dashboard - {}\n\n", self.as_of));

        if let Some(summary) = &self.summary {
            output.push_str(&format!("## Headlines ({})\n\n", summary.latest_year));
            output.push_str("| Metric | Value | Delta |\n");
            output.push_str("|--------|-------|-------|\n");
            output.push_str(&format!(
                "| Revenue (YTD) | ${:.0} | {} |\n",
                summary.revenue_ytd.value,
                format_delta(summary.revenue_ytd.delta)
            ));
            output.push_str(&format!(
                "| Profit (YTD) | ${:.0} | |\n",
                summary.profit_ytd
            ));
            output.push_str(&format!(
                "| A&P (YTD) | ${:.0} | {} |\n\n",
                summary.promotion_ytd.value,
                format_delta(summary.promotion_ytd.delta)
            ));

            if !summary.brands.is_empty() {
                output.push_str("## Brands\n\n");
                output.push_str("| Brand | YTD | Previous | Delta |\n");
                output.push_str("|-------|-----|----------|-------|\n");
                for brand in &summary.brands {
                    output.push_str(&format!(
                        "| {} | ${:.0} | ${:.0} | {} |\n",
                        brand.brand,
                        brand.ytd_usd,
                        brand.previous_usd,
                        format_delta(brand.delta)
                    ));
                }
                output.push('\n');
            }
        } else {
            output.push_str("No sales data.\n\n");
        }

        if !self.margins.is_empty() {
            output.push_str("## Unit Margins\n\n");
            output.push_str("| SKU | Margin (USD) |\n");
            output.push_str("|-----|--------------|\n");
            for margin in &self.margins {
                output.push_str(&format!("| {} | {:.2} |\n", margin.key, margin.margin_usd));
            }
            output.push('\n');
        }

        output.push_str("## Receivables\n\n");
        output.push_str("| Days Overdue | Outstanding (USD) |\n");
        output.push_str("|--------------|-------------------|\n");
        for bucket in &self.receivables_by_bucket {
            output.push_str(&format!(
                "| {} | {:.0} |\n",
                bucket.bucket.label(),
                bucket.amount_outstanding
            ));
        }
        output.push('\n');

        if !self.issues.is_empty() {
            output.push_str(&format!("## Data Issues ({})\n\n", self.issues.len()));
            for issue in &self.issues {
                output.push_str(&format!("- {}\n", issue));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AgingBucket;

    fn report() -> DashboardReport {
        DashboardReport {
            as_of: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            summary: None,
            margins: vec![Margin {
                key: "BPT01".to_string(),
                margin_usd: 0.83,
            }],
            receivables_by_bucket: vec![BucketTotal {
                bucket: AgingBucket::LongOverdue,
                amount_outstanding: 100.0,
            }],
            receivables_by_client: vec![ClientExposure {
                client: "compagnia dei caraibi, spa".to_string(),
                overdue: 100.0,
                not_overdue: 0.0,
            }],
            issues: Vec::new(),
        }
    }

    #[test]
    fn test_csv_sections() {
        let csv = report().to_csv().unwrap();
        assert!(csv.starts_with("Section,Key,Value\n"));
        assert!(csv.contains("Margin,BPT01,0.83\n"));
        assert!(csv.contains("Receivables by Bucket,\"[50, 100]\",100\n"));
        assert!(csv.contains("Receivables Overdue,\"compagnia dei caraibi, spa\",100\n"));
        assert!(csv.contains("Receivables Not Overdue,\"compagnia dei caraibi, spa\",0\n"));
    }

    #[test]
    fn test_csv_escapes_quotes() {
        let mut report = report();
        report.margins[0].key = "ron \"12\" años".to_string();
        let csv = report.to_csv().unwrap();
        assert!(csv.contains("Margin,\"ron \"\"12\"\" años\",0.83\n"));
    }

    #[test]
    fn test_markdown_and_json() {
        let report = report();
        let markdown = report.to_markdown();
        assert!(markdown.contains("# Sales Dashboard - 2024-01-31"));
        assert!(markdown.contains("| BPT01 | 0.83 |"));
        assert!(markdown.contains("No sales data."));

        let json = report.to_json().unwrap();
        let parsed: DashboardReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
