use std::collections::HashSet;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::{DecimalStyle, IndexPoint, IndexSeries, SourceDescriptor, TableRow};
use crate::parsing::{keep_or_abort, parse_number_with, parse_period};

/// Type, de-duplicate and order extracted rows into an `IndexSeries`.
///
/// Shared by every connector kind. Never returns an empty series.
pub fn assemble(descriptor: &SourceDescriptor, rows: Vec<TableRow>) -> Result<IndexSeries> {
    let mut points = Vec::with_capacity(rows.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());

    for (idx, row) in rows.into_iter().enumerate() {
        let outcome = to_point(row, descriptor.decimal_style).and_then(|point| {
            if seen.contains(&point.period_label) {
                Err(EngineError::DuplicatePeriod {
                    source_id: descriptor.id.clone(),
                    label: point.period_label,
                })
            } else {
                Ok(point)
            }
        });

        if let Some(point) = keep_or_abort(descriptor.row_policy, &descriptor.id, idx, outcome)? {
            seen.insert(point.period_label.clone());
            points.push(point);
        }
    }

    if points.is_empty() {
        return Err(EngineError::EmptySeries {
            source_id: descriptor.id.clone(),
        });
    }

    // Stable: labels normalizing to the same month keep their source order
    points.sort_by_key(|p| p.canonical_date);

    debug!(source = %descriptor.id, points = points.len(), "series assembled");
    Ok(IndexSeries::from_sorted(descriptor.id.clone(), points))
}

fn to_point(row: TableRow, style: DecimalStyle) -> Result<IndexPoint> {
    let canonical_date = parse_period(&row.period)?;

    let index_value = parse_number_with(&row.index, style)?;
    if index_value <= 0.0 {
        return Err(EngineError::number(&row.index, "index value must be positive"));
    }

    let variation = match row.variation.as_deref().map(str::trim) {
        None | Some("") | Some("-") => None,
        Some(raw) => Some(parse_number_with(raw, style)?),
    };

    Ok(IndexPoint {
        period_label: row.period,
        canonical_date,
        index_value,
        variation,
    })
}
