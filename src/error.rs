use thiserror::Error;

use crate::models::Side;

/// Every failure the engine can report.
///
/// `Clone` so one single-flight outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("fetch failed for source '{source_id}': {reason}")]
    Fetch { source_id: String, reason: String },

    #[error("document for source '{source_id}' is incomplete: {reason}")]
    IncompleteDocument { source_id: String, reason: String },

    #[error("row {row} has {found} fields, expected 2 or 3 with a period: {reason}")]
    ColumnSchema {
        row: usize,
        found: usize,
        reason: String,
    },

    #[error("invalid number '{raw}': {reason}")]
    NumberFormat { raw: String, reason: String },

    #[error("invalid period '{raw}': {reason}")]
    PeriodParse { raw: String, reason: String },

    #[error("period '{label}' ({side}) not found in source '{source_id}'")]
    PeriodNotFound {
        source_id: String,
        side: Side,
        label: String,
    },

    #[error("fetch for source '{source_id}' timed out after {timeout_ms} ms")]
    Timeout { source_id: String, timeout_ms: u128 },

    #[error("source '{source_id}' produced no data rows")]
    EmptySeries { source_id: String },

    #[error("period '{label}' appears more than once in source '{source_id}'")]
    DuplicatePeriod { source_id: String, label: String },

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("original amount must be a positive finite number, got {0}")]
    InvalidAmount(f64),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn fetch(source_id: &str, reason: impl Into<String>) -> Self {
        EngineError::Fetch {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn number(raw: &str, reason: impl Into<String>) -> Self {
        EngineError::NumberFormat {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn period(raw: &str, reason: impl Into<String>) -> Self {
        EngineError::PeriodParse {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// Row-level errors are the ones `RowPolicy::SkipInvalid` may swallow.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            EngineError::ColumnSchema { .. }
                | EngineError::NumberFormat { .. }
                | EngineError::PeriodParse { .. }
                | EngineError::DuplicatePeriod { .. }
        )
    }

    /// Bad input from the caller rather than a failing source.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::PeriodNotFound { .. }
                | EngineError::InvalidAmount(_)
                | EngineError::UnknownSource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
