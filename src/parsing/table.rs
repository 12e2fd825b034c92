use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::keep_or_abort;
use super::period::label_from_year_month;
use crate::error::{EngineError, Result};
use crate::models::{RawDocument, RowPolicy, SourceDescriptor, TableRow};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector"));
static THEAD: Lazy<Selector> = Lazy::new(|| Selector::parse("thead").expect("thead selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("tr selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("cell selector"));

/// Turn a fetched document into validated rows, in source order.
pub fn extract_rows(descriptor: &SourceDescriptor, doc: &RawDocument) -> Result<Vec<TableRow>> {
    let rows = match doc {
        RawDocument::Markup(html) => extract_markup(descriptor, html)?,
        RawDocument::Json(json) => extract_series_json(descriptor, json)?,
    };

    debug!(source = %descriptor.id, rows = rows.len(), "rows extracted");
    Ok(rows)
}

/// Concatenate the data rows of every `<table>` in the page.
///
/// The published page spreads its history over several collapsible panels,
/// one table each, so fragments are joined in document order.
pub fn extract_markup(descriptor: &SourceDescriptor, html: &str) -> Result<Vec<TableRow>> {
    let raw_rows = table_cells(html);
    let raw_rows = match raw_rows {
        Some(rows) => rows,
        None => {
            return Err(EngineError::IncompleteDocument {
                source_id: descriptor.id.clone(),
                reason: "no <table> element in rendered page".to_string(),
            })
        }
    };

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (idx, cells) in raw_rows.into_iter().enumerate() {
        if let Some(row) =
            keep_or_abort(descriptor.row_policy, &descriptor.id, idx, validate_row(idx, cells))?
        {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Cell text of every data row, or `None` when the page has no table at all.
fn table_cells(html: &str) -> Option<Vec<Vec<String>>> {
    let document = Html::parse_document(html);
    let mut tables = document.select(&TABLE).peekable();
    tables.peek()?;

    let mut out = Vec::new();
    for table in tables {
        let has_thead = table.select(&THEAD).next().is_some();
        let mut first_body_row = true;

        for row in table.select(&ROW) {
            if in_thead(&row) {
                continue;
            }
            // Without a <thead> the first row carries the column titles
            if first_body_row {
                first_body_row = false;
                if !has_thead {
                    continue;
                }
            }

            let cells: Vec<String> = row.select(&CELL).map(|c| cell_text(&c)).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            out.push(cells);
        }
    }
    Some(out)
}

fn in_thead(row: &ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| el.value().name() != "table")
        .any(|el| el.value().name() == "thead")
}

fn cell_text(cell: &ElementRef) -> String {
    // split_whitespace also treats U+00A0 as a separator
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Schema boundary: `{period, variation?, index}`.
pub fn validate_row(idx: usize, cells: Vec<String>) -> Result<TableRow> {
    let found = cells.len();
    let mut cells = cells.into_iter();

    let row = match (cells.next(), cells.next(), cells.next(), cells.next()) {
        (Some(period), Some(index), None, None) => TableRow {
            period,
            variation: None,
            index,
        },
        (Some(period), Some(variation), Some(index), None) => TableRow {
            period,
            variation: Some(variation),
            index,
        },
        _ => {
            return Err(EngineError::ColumnSchema {
                row: idx,
                found,
                reason: "wrong number of fields".to_string(),
            })
        }
    };

    if row.period.trim().is_empty() {
        return Err(EngineError::ColumnSchema {
            row: idx,
            found,
            reason: "missing period".to_string(),
        });
    }

    Ok(row)
}

#[derive(Debug, Deserialize)]
struct AggregateVariable {
    resultados: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    series: Vec<LocalitySeries>,
}

#[derive(Debug, Deserialize)]
struct LocalitySeries {
    serie: BTreeMap<String, Value>,
}

/// `[{ resultados: [{ series: [{ serie: { "YYYYMM": "value" } }] }] }]` -> two-field rows.
pub fn extract_series_json(descriptor: &SourceDescriptor, json: &Value) -> Result<Vec<TableRow>> {
    let variables: Vec<AggregateVariable> = serde_json::from_value(json.clone())
        .map_err(|e| EngineError::fetch(&descriptor.id, format!("unexpected payload shape: {}", e)))?;

    let serie = variables
        .into_iter()
        .next()
        .and_then(|v| v.resultados.into_iter().next())
        .and_then(|r| r.series.into_iter().next())
        .map(|s| s.serie)
        .ok_or_else(|| EngineError::fetch(&descriptor.id, "payload has no series"))?;

    // BTreeMap keeps YYYYMM keys in chronological order
    let mut rows = Vec::with_capacity(serie.len());
    for (idx, (key, value)) in serie.into_iter().enumerate() {
        let outcome = api_row(idx, &key, value);
        if let Some(row) = keep_or_abort(descriptor.row_policy, &descriptor.id, idx, outcome)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn api_row(idx: usize, key: &str, value: Value) -> Result<TableRow> {
    let index = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(EngineError::ColumnSchema {
                row: idx,
                found: 1,
                reason: format!("no index value for '{}'", key),
            })
        }
    };

    validate_row(idx, vec![label_from_year_month(key)?, index])
}
