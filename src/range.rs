//! Numeric spreads such as `1990..2000`, and the column names they stand for.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{DataseriesError, Result};

/// Prefix given to purely numeric column names so they are legal identifiers.
pub const NUMERIC_PREFIX: &str = "n";

/// Spreads wider than this are refused rather than materialized.
pub const MAX_SPREAD_LEN: i64 = 100_000;

lazy_static! {
    static ref SPREAD: Regex = Regex::new(r"^\s*([+-]?\d+)\s*\.\.\s*([+-]?\d+)\s*$").unwrap();
    static ref NUMERIC: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
}

/// Expands `"<low>..<high>"` into the inclusive sequence `low..=high`.
///
/// `low > high` is not an error and yields an empty sequence.
pub fn range_spread(spread: &str) -> Result<Vec<i64>> {
    let malformed = || DataseriesError::MalformedRangeSpread(spread.to_string());
    let captures = SPREAD.captures(spread).ok_or_else(malformed)?;
    let low: i64 = captures[1].parse().map_err(|_| malformed())?;
    let high: i64 = captures[2].parse().map_err(|_| malformed())?;
    if high.saturating_sub(low) >= MAX_SPREAD_LEN {
        return Err(malformed());
    }
    Ok((low..=high).collect())
}

/// Renders a column name the way it appears in a series table.
pub fn column_name(name: &str) -> String {
    if NUMERIC.is_match(name) {
        format!("{NUMERIC_PREFIX}{name}")
    } else {
        name.to_string()
    }
}

/// The column names covered by a spread, e.g. `1..3` gives `n1, n2, n3`.
pub fn spread_columns(spread: &str) -> Result<Vec<String>> {
    Ok(range_spread(spread)?
        .into_iter()
        .map(|n| column_name(&n.to_string()))
        .collect())
}
