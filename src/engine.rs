//! Validation and compilation of client queries into SQL.
//!
//! The pipeline is a single pass that stops at the first problem:
//!
//! 1. [`extract_columns`] then [`validate_columns`] against the table's columns.
//! 2. [`condition_pairs`] then [`validate_values`] against the known key values.
//! 3. [`combine`] the pairs into a condition tree for the table's shape.
//! 4. [`CompiledQuery::to_sql`].
//!
//! Everything here is pure; the allowlists and table shape come from the
//! caller on every call.

use std::collections::{BTreeSet, HashSet};
use std::hash::BuildHasher;

use tracing::debug;

use crate::columns::{extract_columns, validate_columns};
use crate::condition::{combine, condition_pairs, validate_values};
use crate::error::Result;
use crate::query::{RawQuery, TableShape};
use crate::sql::CompiledQuery;

/// A set of strings a query is allowed to mention.
pub trait Allowlist {
    fn allows(&self, candidate: &str) -> bool;
}

impl Allowlist for [String] {
    fn allows(&self, candidate: &str) -> bool {
        self.iter().any(|allowed| allowed == candidate)
    }
}
impl Allowlist for Vec<String> {
    fn allows(&self, candidate: &str) -> bool {
        self.as_slice().allows(candidate)
    }
}
impl<S: BuildHasher> Allowlist for HashSet<String, S> {
    fn allows(&self, candidate: &str) -> bool {
        self.contains(candidate)
    }
}
impl Allowlist for BTreeSet<String> {
    fn allows(&self, candidate: &str) -> bool {
        self.contains(candidate)
    }
}

/// What the engine needs to know about the series a query targets.
pub trait SeriesMetadata {
    fn table_name(&self) -> &str;
    fn table_shape(&self) -> TableShape;
    /// The real columns of the series table.
    fn column_names(&self) -> &dyn Allowlist;
    /// Every key and co-key value known for the series' group.
    fn key_values(&self) -> &dyn Allowlist;
}

/// Validates a query and turns it into a [`CompiledQuery`].
pub fn compile_query<C, V>(query: &RawQuery, columns: &C, values: &V, shape: TableShape) -> Result<CompiledQuery>
where
    C: Allowlist + ?Sized,
    V: Allowlist + ?Sized,
{
    let selected = validate_columns(extract_columns(query)?, columns)?;
    let pairs = validate_values(condition_pairs(query)?, values)?;
    let restriction = combine(pairs, shape)?;
    Ok(CompiledQuery::new(selected, restriction))
}

/// Validates a query and renders it as SQL against `table_name`.
pub fn compile<C, V>(query: &RawQuery, columns: &C, values: &V, shape: TableShape, table_name: &str) -> Result<String>
where
    C: Allowlist + ?Sized,
    V: Allowlist + ?Sized,
{
    match compile_query(query, columns, values, shape) {
        Ok(compiled) => {
            let sql = compiled.to_sql(table_name);
            debug!(table = table_name, %sql, "query compiled");
            Ok(sql)
        }
        Err(e) => {
            debug!(table = table_name, error = %e, "query rejected");
            Err(e)
        }
    }
}

/// Compiles queries against one series.
pub struct Engine<'m, M: SeriesMetadata + ?Sized> {
    metadata: &'m M,
}

impl<'m, M: SeriesMetadata + ?Sized> Engine<'m, M> {
    pub fn new(metadata: &'m M) -> Self {
        Self { metadata }
    }
    pub fn compile_query(&self, query: &RawQuery) -> Result<CompiledQuery> {
        compile_query(
            query,
            self.metadata.column_names(),
            self.metadata.key_values(),
            self.metadata.table_shape(),
        )
    }
    pub fn compile(&self, query: &RawQuery) -> Result<String> {
        compile(
            query,
            self.metadata.column_names(),
            self.metadata.key_values(),
            self.metadata.table_shape(),
            self.metadata.table_name(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataseriesError;

    struct Fixture {
        columns: Vec<String>,
        values: BTreeSet<String>,
    }

    impl SeriesMetadata for Fixture {
        fn table_name(&self) -> &str {
            "fixture"
        }
        fn table_shape(&self) -> TableShape {
            TableShape::Monadic
        }
        fn column_names(&self) -> &dyn Allowlist {
            &self.columns
        }
        fn key_values(&self) -> &dyn Allowlist {
            &self.values
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            columns: vec!["country".to_string(), "n2000".to_string()],
            values: ["Norway", "Chile"].iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn allowlists_agree() {
        let vec = vec!["a".to_string()];
        let hash: HashSet<String> = vec.iter().cloned().collect();
        let tree: BTreeSet<String> = vec.iter().cloned().collect();
        let lists: [&dyn Allowlist; 3] = [&vec, &hash, &tree];
        for list in lists {
            assert!(list.allows("a"));
            assert!(!list.allows("b"));
        }
        assert!(vec.as_slice().allows("a"));
    }

    #[test]
    fn engine_uses_series_metadata() {
        let series = fixture();
        let query = RawQuery::from_json(r#"{"domain": [{"key": "country", "values": ["Chile"]}], "range": {"from": 2000, "to": 2000}}"#).unwrap();
        assert_eq!(
            Engine::new(&series).compile(&query).unwrap(),
            "SELECT DISTINCT country,n2000 FROM fixture WHERE country='Chile' ;"
        );
    }

    #[test]
    fn columns_are_checked_before_values() {
        let series = fixture();
        let query = RawQuery::from_json(r#"{"domain": [{"key": "region", "values": ["Mars"]}]}"#).unwrap();
        assert_eq!(
            Engine::new(&series).compile_query(&query).unwrap_err(),
            DataseriesError::InvalidColumnName("region".to_string())
        );
    }

    #[test]
    fn unknown_value_is_rejected() {
        let series = fixture();
        let query = RawQuery::from_json(r#"{"domain": [{"key": "country", "values": ["Chile", "Mars"]}]}"#).unwrap();
        assert_eq!(
            Engine::new(&series).compile(&query).unwrap_err(),
            DataseriesError::InvalidValue("Mars".to_string())
        );
    }
}
