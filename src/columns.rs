//! Output columns implied by a query, and their validation.

use std::fmt;

use crate::engine::Allowlist;
use crate::error::{DataseriesError, Result};
use crate::query::RawQuery;
use crate::range::spread_columns;

/// The column selector of a `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    /// Every column of the table (`*`).
    All,
    /// The named columns, in query order, duplicates kept.
    Named(Vec<String>),
}

impl fmt::Display for Columns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Columns::All => write!(f, "*"),
            Columns::Named(names) => write!(f, "{}", names.join(",")),
        }
    }
}

/// Collects the columns a query asks for.
///
/// Order: the dyad's key and co-key (or, without a dyad, every domain key),
/// then explicit range values, then the range spread, then special columns.
/// Nothing at all yields [`Columns::All`].
pub fn extract_columns(query: &RawQuery) -> Result<Columns> {
    let mut names: Vec<String> = Vec::new();

    if let Some(dyad) = &query.dyad {
        names.push(dyad.p.key.clone());
        names.push(dyad.q.cokey.clone());
    } else if let Some(domain) = &query.domain {
        names.extend(domain.iter().map(|d| d.key.clone()));
    }

    if let Some(range) = &query.range {
        if let Some(values) = &range.values {
            names.extend(values.iter().cloned());
        }
        if let (Some(from), Some(to)) = (&range.from, &range.to) {
            names.extend(spread_columns(&format!("{from}..{to}"))?);
        }
    }

    if let Some(special) = &query.special {
        names.extend(special.iter().cloned());
    }

    if names.is_empty() {
        Ok(Columns::All)
    } else {
        Ok(Columns::Named(names))
    }
}

/// Checks every named column against the table's real columns.
///
/// The first unknown name is reported; `*` always passes.
pub fn validate_columns<A>(columns: Columns, allowlist: &A) -> Result<Columns>
where
    A: Allowlist + ?Sized,
{
    if let Columns::Named(names) = &columns {
        if let Some(invalid) = names.iter().find(|name| !allowlist.allows(name)) {
            return Err(DataseriesError::InvalidColumnName(invalid.clone()));
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CokeySide, DomainClause, DyadClause, KeySide, RangeClause};

    fn domain(key: &str, values: &[&str]) -> DomainClause {
        DomainClause {
            key: key.to_string(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    fn named(names: &[&str]) -> Columns {
        Columns::Named(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn empty_query_selects_everything() {
        assert_eq!(extract_columns(&RawQuery::default()).unwrap(), Columns::All);
    }

    #[test]
    fn empty_clauses_select_everything() {
        let query = RawQuery {
            domain: Some(vec![]),
            range: Some(RangeClause { values: Some(vec![]), ..Default::default() }),
            special: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(extract_columns(&query).unwrap(), Columns::All);
    }

    #[test]
    fn clauses_are_ordered_by_priority() {
        let query = RawQuery {
            domain: Some(vec![domain("Key1", &["Val1", "Val2"])]),
            range: Some(RangeClause { from: Some("1".into()), to: Some("3".into()), values: None }),
            special: Some(vec!["Special1".to_string(), "Special2".to_string()]),
            ..Default::default()
        };
        assert_eq!(
            extract_columns(&query).unwrap(),
            named(&["Key1", "n1", "n2", "n3", "Special1", "Special2"])
        );
    }

    #[test]
    fn dyad_shadows_domain() {
        let query = RawQuery {
            domain: Some(vec![domain("ignored", &[])]),
            dyad: Some(DyadClause {
                p: KeySide { key: "test".to_string(), values: None },
                q: CokeySide { cokey: "test2".to_string(), values: None },
            }),
            ..Default::default()
        };
        assert_eq!(extract_columns(&query).unwrap(), named(&["test", "test2"]));
    }

    #[test]
    fn duplicates_are_kept() {
        let query = RawQuery {
            domain: Some(vec![domain("a", &[]), domain("a", &[])]),
            special: Some(vec!["a".to_string()]),
            ..Default::default()
        };
        assert_eq!(extract_columns(&query).unwrap(), named(&["a", "a", "a"]));
    }

    #[test]
    fn reversed_spread_contributes_nothing() {
        let query = RawQuery {
            range: Some(RangeClause { from: Some("4".into()), to: Some("2".into()), values: None }),
            ..Default::default()
        };
        assert_eq!(extract_columns(&query).unwrap(), Columns::All);
    }

    #[test]
    fn half_open_spread_contributes_nothing() {
        let query = RawQuery {
            range: Some(RangeClause { from: Some("4".into()), to: None, values: None }),
            ..Default::default()
        };
        assert_eq!(extract_columns(&query).unwrap(), Columns::All);
    }

    #[test]
    fn malformed_spread_fails_extraction() {
        let query = RawQuery {
            range: Some(RangeClause { from: Some("x".into()), to: Some("3".into()), values: None }),
            ..Default::default()
        };
        assert_eq!(
            extract_columns(&query).unwrap_err(),
            DataseriesError::MalformedRangeSpread("x..3".to_string())
        );
    }

    #[test]
    fn star_always_validates() {
        let allowlist: Vec<String> = vec![];
        assert_eq!(validate_columns(Columns::All, &allowlist).unwrap(), Columns::All);
    }

    #[test]
    fn first_unknown_column_is_reported() {
        let allowlist = vec!["a".to_string(), "b".to_string()];
        let err = validate_columns(named(&["a", "x", "y"]), &allowlist).unwrap_err();
        assert_eq!(err, DataseriesError::InvalidColumnName("x".to_string()));
    }

    #[test]
    fn known_columns_pass_unchanged() {
        let allowlist = vec!["a".to_string(), "b".to_string()];
        assert_eq!(validate_columns(named(&["b", "a", "b"]), &allowlist).unwrap(), named(&["b", "a", "b"]));
    }

    #[test]
    fn columns_render_comma_separated() {
        assert_eq!(named(&["a", "n1"]).to_string(), "a,n1");
        assert_eq!(Columns::All.to_string(), "*");
    }
}
