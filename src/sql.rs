//! Rendering of validated queries as SQL text.
//!
//! Values are written as plain single-quoted literals. That is only sound
//! because a [`CompiledQuery`] cannot exist unless every column and value in
//! it passed the allowlists, and it has no public constructor.

use std::fmt;

use crate::columns::Columns;
use crate::condition::{Condition, Connector, Restriction};

/// A query whose columns and values have all been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    columns: Columns,
    restriction: Restriction,
}

impl CompiledQuery {
    pub(crate) fn new(columns: Columns, restriction: Restriction) -> Self {
        Self { columns, restriction }
    }
    pub fn columns(&self) -> &Columns {
        &self.columns
    }
    pub fn restriction(&self) -> &Restriction {
        &self.restriction
    }
    /// `SELECT DISTINCT <columns> FROM <table> WHERE <condition> ;`
    pub fn to_sql(&self, table_name: &str) -> String {
        format!("SELECT DISTINCT {} FROM {} WHERE {} ;", self.columns, table_name, self.restriction)
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restriction::True => write!(f, "true"),
            Restriction::Where(condition) => write!(f, "{condition}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Leaf(pair) => write!(f, "{}='{}'", pair.column(), pair.value()),
            Condition::Node { connector, left, right } => {
                write_child(f, left, *connector)?;
                write!(f, " {connector} ")?;
                write_child(f, right, *connector)
            }
        }
    }
}

// AND binds tighter than OR, so a child joined differently from its parent
// needs parentheses to keep its grouping.
fn write_child(f: &mut fmt::Formatter<'_>, child: &Condition, parent: Connector) -> fmt::Result {
    match child {
        Condition::Node { connector, .. } if *connector != parent => write!(f, "({child})"),
        _ => write!(f, "{child}"),
    }
}
