use tracing::warn;

use crate::error::Result;
use crate::models::RowPolicy;

pub mod number;
pub mod period;
pub mod table;

pub use number::{parse_number, parse_number_with};
pub use period::{label_from_year_month, parse_period};
pub use table::extract_rows;

/// Apply a source's row policy to the outcome of processing one row.
///
/// `Ok(None)` means the row was dropped.
pub(crate) fn keep_or_abort<T>(
    policy: RowPolicy,
    source_id: &str,
    row: usize,
    outcome: Result<T>,
) -> Result<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(e) if policy == RowPolicy::SkipInvalid && e.is_row_level() => {
            warn!(source = source_id, row, error = %e, "skipping invalid row");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
