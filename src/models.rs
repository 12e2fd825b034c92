use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

/// One published observation of an index series.
///
/// `period_label` is kept verbatim from the source and is the only lookup key.
/// `canonical_date` exists to order the series and is never used for lookups.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct IndexPoint {
    pub period_label: String,
    pub canonical_date: NaiveDate,
    pub index_value: f64,
    pub variation: Option<f64>,
}

/// Immutable, date-ordered series with unique period labels.
///
/// Built once per fetch cycle by `core::series::assemble`; a refresh produces a
/// new value instead of mutating this one.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct IndexSeries {
    source_id: String,
    points: Vec<IndexPoint>,
}

impl IndexSeries {
    /// Callers must hand over points already sorted and de-duplicated.
    pub(crate) fn from_sorted(source_id: impl Into<String>, points: Vec<IndexPoint>) -> Self {
        Self {
            source_id: source_id.into(),
            points,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn points(&self) -> &[IndexPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Exact, case-sensitive match on the published label.
    pub fn get(&self, period_label: &str) -> Option<&IndexPoint> {
        self.points.iter().find(|p| p.period_label == period_label)
    }

    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.period_label.clone()).collect()
    }

    pub fn first(&self) -> Option<&IndexPoint> {
        self.points.first()
    }

    pub fn latest(&self) -> Option<&IndexPoint> {
        self.points.last()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Published HTML page whose history is split across collapsible panels.
    RenderedPage,
    /// Statistical REST API returning a `YYYYMM`-keyed series.
    StatisticalApi,
}

/// Decimal notation used by a source's numeric cells.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecimalStyle {
    /// `1.234,56`
    Brazilian,
    /// `1234.56`
    Plain,
}

/// What extraction does with a structurally invalid row.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Abort the whole fetch cycle on the first bad row.
    #[default]
    Strict,
    /// Drop the row, log a warning and keep going.
    SkipInvalid,
}

/// What the cache does when a refresh fails but an older entry exists.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Surface the refresh error.
    #[default]
    Fail,
    /// Return the previous series and log a warning.
    ServeStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Cached for the whole process lifetime.
    Forever,
    Seconds(u64),
}

/// Same shape as the config file: a number of seconds or `"forever"`.
impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Ttl::Forever => serializer.serialize_str("forever"),
            Ttl::Seconds(secs) => serializer.serialize_u64(*secs),
        }
    }
}

impl Ttl {
    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Ttl::Forever => true,
            Ttl::Seconds(secs) => {
                let secs = i64::try_from(*secs).unwrap_or(i64::MAX);
                // Saturates for absurdly large TTLs.
                match chrono::Duration::try_seconds(secs) {
                    Some(ttl) => now.signed_duration_since(fetched_at) < ttl,
                    None => true,
                }
            }
        }
    }
}

/// Static description of one data source.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub kind: ConnectorKind,
    #[serde(rename = "url")]
    pub location: String,
    pub ttl: Ttl,
    pub decimal_style: DecimalStyle,
    pub row_policy: RowPolicy,
    pub stale_policy: StalePolicy,
    /// External renderer command for rendered pages; `None` means plain HTTP.
    pub render_command: Option<Vec<String>>,
}

/// Raw content handed from a connector to the table extractor.
#[derive(Debug, Clone)]
pub enum RawDocument {
    Markup(String),
    Json(serde_json::Value),
}

/// Row record produced at the schema-validation boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub period: String,
    pub variation: Option<String>,
    pub index: String,
}

/// A cached series and the moment it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: Arc<IndexSeries>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Ttl,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_fresh(self.fetched_at, now)
    }
}

/// Which lookup of a readjustment request failed.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Start,
    End,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Start => write!(f, "start"),
            Side::End => write!(f, "end"),
        }
    }
}

/// Outcome of a readjustment. Values are unrounded.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Readjustment {
    pub source_id: String,
    pub start: IndexPoint,
    pub end: IndexPoint,
    pub original_amount: f64,
    pub ratio: f64,
    pub adjusted_amount: f64,
    pub percent_change: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_serializes_like_config() {
        assert_eq!(serde_json::to_value(Ttl::Seconds(86400)).unwrap(), json!(86400));
        assert_eq!(serde_json::to_value(Ttl::Forever).unwrap(), json!("forever"));
    }

    #[test]
    fn test_descriptor_json_uses_config_shape() {
        let descriptor = crate::sources::Registry::get_descriptor("ist").unwrap();
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["ttl"], json!(86400));
        assert_eq!(value["kind"], json!("rendered_page"));
        assert_eq!(value["row_policy"], json!("strict"));
        assert_eq!(value["url"], json!(descriptor.location));
    }
}
