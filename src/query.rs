//! Untrusted query descriptions as submitted by clients.
//!
//! Nothing in here is validated. A [`RawQuery`] is only ever consumed by
//! [`crate::engine::compile_query`], which checks every column and value it
//! references before anything reaches SQL.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a series is keyed by a single column or by a key/co-key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableShape {
    Monadic,
    Dyadic,
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableShape::Monadic => write!(f, "monadic"),
            TableShape::Dyadic => write!(f, "dyadic"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Vec<DomainClause>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dyad: Option<DyadClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<Vec<String>>,
}

/// One domain key and the values it is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainClause {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DyadClause {
    pub p: KeySide,
    pub q: CokeySide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySide {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CokeySide {
    pub cokey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// Range columns, either named explicitly or as an inclusive numeric spread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SpreadBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<SpreadBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// A spread bound as sent by clients: `"1990"` and `1990` are both accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpreadBound {
    Number(i64),
    Text(String),
}

impl fmt::Display for SpreadBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadBound::Number(n) => write!(f, "{n}"),
            SpreadBound::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for SpreadBound {
    fn from(s: &str) -> Self { SpreadBound::Text(s.to_string()) }
}
impl From<i64> for SpreadBound {
    fn from(n: i64) -> Self { SpreadBound::Number(n) }
}

impl RawQuery {
    /// Parses a query from its JSON wire form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
