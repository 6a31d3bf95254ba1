//! Restriction clauses of a query: equality pairs, their validation, and the
//! condition tree they are combined into.
//!
//! The tree is balanced rather than folded into a chain, so a restriction over
//! `n` values is `⌈log2(n)⌉` connectors deep instead of `n`.

use std::fmt;

use crate::engine::Allowlist;
use crate::error::{DataseriesError, Result, Side};
use crate::query::{RawQuery, TableShape};

// ------------- Pairs -------------
/// One `column = 'value'` assertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EqualityPair {
    column: String,
    value: String,
}

impl EqualityPair {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
    pub fn column(&self) -> &str {
        &self.column
    }
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Pairs for the key side (`p`) and co-key side (`q`) of a dyadic query.
///
/// Both sides are non-empty; there is no way to build one that isn't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DyadicPairs {
    p: Vec<EqualityPair>,
    q: Vec<EqualityPair>,
}

impl DyadicPairs {
    pub fn new(p: Vec<EqualityPair>, q: Vec<EqualityPair>) -> Result<Self> {
        if p.is_empty() {
            return Err(DataseriesError::MissingRequiredSide(Side::P));
        }
        if q.is_empty() {
            return Err(DataseriesError::MissingRequiredSide(Side::Q));
        }
        Ok(Self { p, q })
    }
    pub fn p(&self) -> &[EqualityPair] {
        &self.p
    }
    pub fn q(&self) -> &[EqualityPair] {
        &self.q
    }
    pub fn into_parts(self) -> (Vec<EqualityPair>, Vec<EqualityPair>) {
        (self.p, self.q)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSet {
    Monadic(Vec<EqualityPair>),
    Dyadic(DyadicPairs),
}

impl ColumnSet {
    /// Every pair in the set, `p` before `q` for dyadic sets.
    pub fn pairs(&self) -> impl Iterator<Item = &EqualityPair> {
        let (first, second): (&[EqualityPair], &[EqualityPair]) = match self {
            ColumnSet::Monadic(pairs) => (pairs.as_slice(), Default::default()),
            ColumnSet::Dyadic(dyad) => (dyad.p(), dyad.q()),
        };
        first.iter().chain(second.iter())
    }
    fn into_pairs(self) -> Vec<EqualityPair> {
        match self {
            ColumnSet::Monadic(pairs) => pairs,
            ColumnSet::Dyadic(dyad) => {
                let (mut p, q) = dyad.into_parts();
                p.extend(q);
                p
            }
        }
    }
}

fn paired(column: &str, values: Option<&Vec<String>>) -> Vec<EqualityPair> {
    values
        .map(|values| values.iter().map(|v| EqualityPair::new(column, v.as_str())).collect())
        .unwrap_or_default()
}

/// Turns the query's restrictions into equality pairs.
///
/// `Ok(None)` means the query places no restriction at all. A dyad shadows
/// the domain and must carry values on both sides; a domain entry without
/// values simply contributes nothing.
pub fn condition_pairs(query: &RawQuery) -> Result<Option<ColumnSet>> {
    if let Some(dyad) = &query.dyad {
        let p = paired(&dyad.p.key, dyad.p.values.as_ref());
        let q = paired(&dyad.q.cokey, dyad.q.values.as_ref());
        return Ok(Some(ColumnSet::Dyadic(DyadicPairs::new(p, q)?)));
    }

    let pairs: Vec<EqualityPair> = query
        .domain
        .iter()
        .flatten()
        .flat_map(|d| paired(&d.key, d.values.as_ref()))
        .collect();

    if pairs.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ColumnSet::Monadic(pairs)))
    }
}

/// Checks the value of every pair against the known key and co-key values.
///
/// Keys are not looked at here; they are columns and were validated as such.
pub fn validate_values<A>(set: Option<ColumnSet>, allowlist: &A) -> Result<Option<ColumnSet>>
where
    A: Allowlist + ?Sized,
{
    if let Some(set) = &set {
        if let Some(invalid) = set.pairs().find(|pair| !allowlist.allows(pair.value())) {
            return Err(DataseriesError::InvalidValue(invalid.value().to_string()));
        }
    }
    Ok(set)
}

// ------------- Tree -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connector::And => write!(f, "AND"),
            Connector::Or => write!(f, "OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Leaf(EqualityPair),
    Node {
        connector: Connector,
        left: Box<Condition>,
        right: Box<Condition>,
    },
}

impl Condition {
    pub fn join(connector: Connector, left: Condition, right: Condition) -> Self {
        Condition::Node { connector, left: Box::new(left), right: Box::new(right) }
    }
    pub fn or(left: Condition, right: Condition) -> Self {
        Self::join(Connector::Or, left, right)
    }
    pub fn and(left: Condition, right: Condition) -> Self {
        Self::join(Connector::And, left, right)
    }
    /// Number of connectors on the longest path from the root to a leaf.
    pub fn depth(&self) -> usize {
        match self {
            Condition::Leaf(_) => 0,
            Condition::Node { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Joins the pairs with OR into a balanced tree, `None` for no pairs.
///
/// The list is split at `n / 2`, so for odd counts the left half is the
/// smaller one.
pub fn or_tree(mut pairs: Vec<EqualityPair>) -> Option<Condition> {
    match pairs.len() {
        0 => None,
        1 => pairs.pop().map(Condition::Leaf),
        n => {
            let right = pairs.split_off(n / 2);
            Some(Condition::or(or_tree(pairs)?, or_tree(right)?))
        }
    }
}

/// The `WHERE` part of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    /// No restriction (`true`).
    True,
    Where(Condition),
}

/// Combines validated pairs into the final restriction for a table shape.
///
/// A dyadic set against a dyadic table requires one `p` match and one `q`
/// match. Against a monadic table every pair is ORed together, whatever the
/// set's shape. A monadic set against a dyadic table is refused.
pub fn combine(set: Option<ColumnSet>, shape: TableShape) -> Result<Restriction> {
    let Some(set) = set else {
        return Ok(Restriction::True);
    };
    match (set, shape) {
        (ColumnSet::Dyadic(dyad), TableShape::Dyadic) => {
            let (p, q) = dyad.into_parts();
            match (or_tree(p), or_tree(q)) {
                (Some(left), Some(right)) => Ok(Restriction::Where(Condition::and(left, right))),
                (None, _) => Err(DataseriesError::MissingRequiredSide(Side::P)),
                (_, None) => Err(DataseriesError::MissingRequiredSide(Side::Q)),
            }
        }
        (set, TableShape::Monadic) => Ok(or_tree(set.into_pairs()).map_or(Restriction::True, Restriction::Where)),
        (ColumnSet::Monadic(_), TableShape::Dyadic) => Err(DataseriesError::IncompatibleQueryTableType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CokeySide, DomainClause, DyadClause, KeySide};

    fn strings(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    fn dyad(p: Option<Vec<String>>, q: Option<Vec<String>>) -> RawQuery {
        RawQuery {
            dyad: Some(DyadClause {
                p: KeySide { key: "Key1".to_string(), values: p },
                q: CokeySide { cokey: "Key2".to_string(), values: q },
            }),
            ..Default::default()
        }
    }

    fn pairs(n: usize) -> Vec<EqualityPair> {
        (0..n).map(|i| EqualityPair::new("k", format!("v{i}"))).collect()
    }

    fn leaf(column: &str, value: &str) -> Condition {
        Condition::Leaf(EqualityPair::new(column, value))
    }

    // leaves from left to right
    fn leaves(condition: &Condition) -> Vec<&EqualityPair> {
        match condition {
            Condition::Leaf(pair) => vec![pair],
            Condition::Node { left, right, .. } => {
                let mut pairs = leaves(left);
                pairs.extend(leaves(right));
                pairs
            }
        }
    }

    #[test]
    fn domain_pairs_keep_entry_then_value_order() {
        let query = RawQuery {
            domain: Some(vec![
                DomainClause { key: "Key1".to_string(), values: strings(&["Val1", "Val2"]) },
                DomainClause { key: "Key2".to_string(), values: None },
                DomainClause { key: "Key3".to_string(), values: strings(&["Val3"]) },
            ]),
            ..Default::default()
        };
        let set = condition_pairs(&query).unwrap().unwrap();
        assert_eq!(
            set,
            ColumnSet::Monadic(vec![
                EqualityPair::new("Key1", "Val1"),
                EqualityPair::new("Key1", "Val2"),
                EqualityPair::new("Key3", "Val3"),
            ])
        );
    }

    #[test]
    fn valueless_domain_is_unrestricted() {
        let query = RawQuery {
            domain: Some(vec![
                DomainClause { key: "Key1".to_string(), values: strings(&[]) },
                DomainClause { key: "Key2".to_string(), values: None },
            ]),
            ..Default::default()
        };
        assert_eq!(condition_pairs(&query).unwrap(), None);
        assert_eq!(condition_pairs(&RawQuery::default()).unwrap(), None);
    }

    #[test]
    fn dyad_requires_both_sides() {
        assert_eq!(
            condition_pairs(&dyad(None, strings(&["Val2"]))).unwrap_err(),
            DataseriesError::MissingRequiredSide(Side::P)
        );
        assert_eq!(
            condition_pairs(&dyad(strings(&["Val1"]), strings(&[]))).unwrap_err(),
            DataseriesError::MissingRequiredSide(Side::Q)
        );
        assert_eq!(
            condition_pairs(&dyad(None, None)).unwrap_err(),
            DataseriesError::MissingRequiredSide(Side::P)
        );
    }

    #[test]
    fn dyad_pairs_keys_and_cokeys() {
        let set = condition_pairs(&dyad(strings(&["a", "b"]), strings(&["c"]))).unwrap().unwrap();
        let ColumnSet::Dyadic(dyad) = set else { panic!("expected a dyadic set") };
        assert_eq!(dyad.p(), &[EqualityPair::new("Key1", "a"), EqualityPair::new("Key1", "b")]);
        assert_eq!(dyad.q(), &[EqualityPair::new("Key2", "c")]);
    }

    #[test]
    fn unknown_value_is_named() {
        let set = ColumnSet::Monadic(vec![EqualityPair::new("k", "ok"), EqualityPair::new("k", "bad")]);
        let allowlist = vec!["ok".to_string(), "k".to_string()];
        assert_eq!(
            validate_values(Some(set), &allowlist).unwrap_err(),
            DataseriesError::InvalidValue("bad".to_string())
        );
    }

    #[test]
    fn keys_are_not_checked_as_values() {
        let set = ColumnSet::Monadic(vec![EqualityPair::new("not_a_value", "ok")]);
        let allowlist = vec!["ok".to_string()];
        assert!(validate_values(Some(set), &allowlist).is_ok());
    }

    #[test]
    fn no_restriction_always_validates() {
        let allowlist: Vec<String> = vec![];
        assert_eq!(validate_values(None, &allowlist).unwrap(), None);
    }

    #[test]
    fn or_tree_small_shapes() {
        assert_eq!(or_tree(vec![]), None);
        assert_eq!(or_tree(pairs(1)), Some(leaf("k", "v0")));
        assert_eq!(or_tree(pairs(2)), Some(Condition::or(leaf("k", "v0"), leaf("k", "v1"))));
        assert_eq!(
            or_tree(pairs(3)),
            Some(Condition::or(leaf("k", "v0"), Condition::or(leaf("k", "v1"), leaf("k", "v2"))))
        );
    }

    #[test]
    fn or_tree_is_balanced_and_ordered() {
        for n in 1..=300 {
            let tree = or_tree(pairs(n)).unwrap();
            let expected = (n as f64).log2().ceil() as usize;
            assert_eq!(tree.depth(), expected, "depth for {n} pairs");
            let values: Vec<&str> = leaves(&tree).iter().map(|p| p.value()).collect();
            let wanted: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
            assert_eq!(values, wanted);
        }
    }

    #[test]
    fn dyadic_set_on_dyadic_table_is_and_of_ors() {
        let set = ColumnSet::Dyadic(
            DyadicPairs::new(vec![EqualityPair::new("Key1", "Val1")], vec![EqualityPair::new("Key2", "Val2")]).unwrap(),
        );
        assert_eq!(
            combine(Some(set), TableShape::Dyadic).unwrap(),
            Restriction::Where(Condition::and(leaf("Key1", "Val1"), leaf("Key2", "Val2")))
        );
    }

    #[test]
    fn dyadic_set_on_monadic_table_degrades_to_or() {
        let set = ColumnSet::Dyadic(
            DyadicPairs::new(vec![EqualityPair::new("Key1", "Val1")], vec![EqualityPair::new("Key2", "Val2")]).unwrap(),
        );
        assert_eq!(
            combine(Some(set), TableShape::Monadic).unwrap(),
            Restriction::Where(Condition::or(leaf("Key1", "Val1"), leaf("Key2", "Val2")))
        );
    }

    #[test]
    fn monadic_set_on_dyadic_table_is_refused() {
        let set = ColumnSet::Monadic(pairs(2));
        assert_eq!(
            combine(Some(set), TableShape::Dyadic).unwrap_err(),
            DataseriesError::IncompatibleQueryTableType
        );
    }

    #[test]
    fn no_pairs_is_true_for_every_shape() {
        assert_eq!(combine(None, TableShape::Monadic).unwrap(), Restriction::True);
        assert_eq!(combine(None, TableShape::Dyadic).unwrap(), Restriction::True);
    }
}
