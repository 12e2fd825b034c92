use crate::error::{EngineError, Result};
use crate::models::{IndexSeries, Readjustment, Side};

/// `adjusted = amount * end / start`, `percent = (end / start - 1) * 100`.
///
/// Labels are matched verbatim; a missing label is never replaced by the
/// nearest period. Nothing is rounded here.
pub fn compute_readjustment(
    series: &IndexSeries,
    original_amount: f64,
    start_label: &str,
    end_label: &str,
) -> Result<Readjustment> {
    if !(original_amount.is_finite() && original_amount > 0.0) {
        return Err(EngineError::InvalidAmount(original_amount));
    }

    let not_found = |side: Side, label: &str| EngineError::PeriodNotFound {
        source_id: series.source_id().to_string(),
        side,
        label: label.to_string(),
    };

    // 1. Exact lookups
    let start = series
        .get(start_label)
        .ok_or_else(|| not_found(Side::Start, start_label))?;
    let end = series
        .get(end_label)
        .ok_or_else(|| not_found(Side::End, end_label))?;

    // 2. Ratio. For the same label this is x / x, exactly 1.0 for any finite x > 0
    let ratio = end.index_value / start.index_value;

    Ok(Readjustment {
        source_id: series.source_id().to_string(),
        start: start.clone(),
        end: end.clone(),
        original_amount,
        ratio,
        adjusted_amount: original_amount * ratio,
        percent_change: (ratio - 1.0) * 100.0,
    })
}
