//! Dataseries serves curated statistical series through a query API.
//!
//! Series are loaded from CSV files into SQLite tables, one table per series.
//! Clients describe the slice of a series they want as a JSON [`query::RawQuery`]:
//! * `domain`: key columns and the values to match (monadic series).
//! * `dyad`: a key (`p`) and co-key (`q`) with values for each (dyadic series).
//! * `range`: range columns, named or as a numeric spread (`from`..`to`).
//! * `special`: further columns by name.
//!
//! The query is untrusted. It only reaches the database after every column it
//! names has been checked against the series' real columns and every value
//! against the values known for its group. SQL is produced by string
//! rendering with no placeholders, so those allowlists are the only guard;
//! see [`sql::CompiledQuery`].
//!
//! ## Modules
//! * [`query`]: The client query and table shapes.
//! * [`range`]: Numeric spreads and the column names they expand to.
//! * [`columns`]: Selected columns and their validation.
//! * [`condition`]: Equality pairs, value validation and the balanced condition tree.
//! * [`sql`]: Rendering of a validated query as SQL.
//! * [`engine`]: The compile pipeline and its allowlist seams.
//! * [`settings`]: Settings file (columns, groups, series).
//! * [`catalog`]: Loaded series and their allowlists.
//! * [`store`]: SQLite tables, CSV loading and query execution.
//! * [`server`]: HTTP routes.
//!
//! ## Quick Start
//! ```
//! use dataseries::engine::compile;
//! use dataseries::query::{RawQuery, TableShape};
//! let query = RawQuery::from_json(r#"{"domain": [{"key": "Key1", "values": ["Val1", "Val2"]}]}"#).unwrap();
//! let columns = vec!["Key1".to_string()];
//! let values = vec!["Val1".to_string(), "Val2".to_string()];
//! let sql = compile(&query, &columns, &values, TableShape::Monadic, "tbl").unwrap();
//! assert_eq!(sql, "SELECT DISTINCT Key1 FROM tbl WHERE Key1='Val1' OR Key1='Val2' ;");
//! ```

pub mod catalog;
pub mod columns;
pub mod condition;
pub mod engine;
pub mod error;
pub mod query;
pub mod range;
pub mod server;
pub mod settings;
pub mod sql;
pub mod store;

pub use error::{DataseriesError, Result};
