use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Date layouts seen in the ledger exports, tried in order.
const LEDGER_DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];
const LEDGER_DATETIME_FORMATS: [&str; 1] = ["%Y-%d-%m %H:%M:%S"];

/// Parses a ledger date cell.
///
/// Day-first `dd/mm/YYYY` and ISO `YYYY-mm-dd` are tried first, then the
/// spreadsheet's datetime rendering which swaps month and day
/// (`YYYY-dd-mm HH:MM:SS`).
pub fn parse_ledger_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();

    for format in LEDGER_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    for format in LEDGER_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }

    Err(AnalyticsError::DateError(format!(
        "Invalid date '{}'. Expected dd/mm/YYYY or YYYY-dd-mm HH:MM:SS",
        value
    )))
}

pub fn date_from_parts(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        AnalyticsError::DateError(format!(
            "Invalid calendar date {:04}-{:02}-{:02}",
            year, month, day
        ))
    })
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

/// Formats the quarter as `YYYY-Qn`.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{}-Q{}", date.year(), quarter_of(date))
}

/// Quantity-weighted average of `(value, quantity)` lines.
///
/// Each value is scaled by its share of the group's total quantity before
/// summing. A zero total makes every share 1.
pub fn weighted_average<I>(lines: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let lines: Vec<(f64, f64)> = lines.into_iter().collect();
    if lines.is_empty() {
        return None;
    }

    let total_quantity: f64 = lines.iter().map(|(_, q)| q).sum();

    let value = lines
        .iter()
        .map(|(value, quantity)| value * share(*quantity, total_quantity))
        .sum();

    Some(value)
}

/// Proportion of `part` within `total`, neutral when the total is zero.
pub fn share(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        1.0
    } else {
        part / total
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Relative change `current / previous - 1`, absent when there is no base.
pub fn relative_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some(current / previous - 1.0)
    }
}
