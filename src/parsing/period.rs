use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{EngineError, Result};

const ABBREVIATIONS: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

const FULL_NAMES: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

/// 24 entries: abbreviation and full name for each month.
static MONTHS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    ABBREVIATIONS
        .iter()
        .zip(FULL_NAMES.iter())
        .enumerate()
        .flat_map(|(idx, (abbr, full))| [(*abbr, idx as u32 + 1), (*full, idx as u32 + 1)])
        .collect()
});

/// Turn a label such as `"jan/06"` or `"Janeiro/2023"` into the first day of
/// that month. Only used for ordering.
pub fn parse_period(raw: &str) -> Result<NaiveDate> {
    // 1. Split into month and year tokens
    let mut parts = raw.split('/');
    let (month_token, year_token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(y), None) => (m, y),
        _ => return Err(EngineError::period(raw, "expected <month>/<year>")),
    };

    // 2. Strip encoding noise from the year and expand two-digit years
    let digits: String = year_token.chars().filter(|c| c.is_ascii_digit()).collect();
    let year = match digits.len() {
        2 | 4 => digits
            .parse::<i32>()
            .map_err(|e| EngineError::period(raw, e.to_string()))?,
        0 => return Err(EngineError::period(raw, "year has no digits")),
        n => return Err(EngineError::period(raw, format!("year has {} digits", n))),
    };
    let year = if digits.len() == 2 { 2000 + year } else { year };

    // 3. Month dictionary lookup
    let month_key = month_token.trim().to_lowercase();
    let month = *MONTHS
        .get(month_key.as_str())
        .ok_or_else(|| EngineError::period(raw, format!("unknown month '{}'", month_token.trim())))?;

    // 4. Day is always the first
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::period(raw, "date out of range"))
}

/// Convert a statistical-API key (`"202301"`) into the short label form (`"jan/23"`).
pub fn label_from_year_month(key: &str) -> Result<String> {
    let key = key.trim();
    if key.len() != 6 || !key.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::period(key, "expected a 6-digit YYYYMM key"));
    }

    let year: i32 = key[..4]
        .parse()
        .map_err(|e: std::num::ParseIntError| EngineError::period(key, e.to_string()))?;
    let month: usize = key[4..]
        .parse()
        .map_err(|e: std::num::ParseIntError| EngineError::period(key, e.to_string()))?;

    let abbr = month
        .checked_sub(1)
        .and_then(|idx| ABBREVIATIONS.get(idx))
        .ok_or_else(|| EngineError::period(key, format!("month {} out of range", month)))?;

    Ok(format_label(abbr, year))
}

/// Two-digit years always expand into 2000..2100, so years outside that range
/// keep four digits to stay orderable.
fn format_label(abbr: &str, year: i32) -> String {
    if (2000..2100).contains(&year) {
        format!("{}/{:02}", abbr, year - 2000)
    } else {
        format!("{}/{}", abbr, year)
    }
}
