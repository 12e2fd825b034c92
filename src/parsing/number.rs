use crate::error::{EngineError, Result};
use crate::models::DecimalStyle;

/// Parse a Brazilian-formatted decimal: `"1.234,56"` -> `1234.56`.
pub fn parse_number(raw: &str) -> Result<f64> {
    parse_number_with(raw, DecimalStyle::Brazilian)
}

pub fn parse_number_with(raw: &str, style: DecimalStyle) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::number(raw, "empty value"));
    }

    // 1. Normalize to a standard float literal
    let normalized = match style {
        DecimalStyle::Brazilian => trimmed.replace('.', "").replace(',', "."),
        DecimalStyle::Plain => trimmed.to_string(),
    };

    // 2. Reject anything `f64::from_str` would accept but is not a plain number ("inf", "NaN")
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return Err(EngineError::number(raw, "not a numeric literal"));
    }

    let value = normalized
        .parse::<f64>()
        .map_err(|e| EngineError::number(raw, e.to_string()))?;

    if !value.is_finite() {
        return Err(EngineError::number(raw, "value is not finite"));
    }

    Ok(value)
}
