//! The series being served and everything the query engine needs to know
//! about them.
//!
//! Built once at startup: every series table is created and loaded, then the
//! key and co-key columns are scanned. A group's value allowlist is the union
//! of those values over all of its series.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use seahash::SeaHasher;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{Allowlist, SeriesMetadata};
use crate::error::{DataseriesError, Result};
use crate::query::TableShape;
use crate::settings::{table_name, ColumnInfo, ColumnLabel, Settings};
use crate::store::Store;

pub type ValueHasher = BuildHasherDefault<SeaHasher>;
pub type ValueSet = HashSet<String, ValueHasher>;

// ------------- Series -------------
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    group: String,
    category: Option<String>,
    metadata: BTreeMap<String, String>,
    shape: TableShape,
    table_name: String,
    columns: Arc<Vec<String>>,
    values: Arc<ValueSet>,
}

impl Series {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn group(&self) -> &str {
        &self.group
    }
    /// Description served to clients.
    pub fn describe(&self) -> SeriesInfo<'_> {
        SeriesInfo {
            name: &self.name,
            group: &self.group,
            category: self.category.as_deref(),
            shape: self.shape,
            metadata: &self.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeriesInfo<'a> {
    pub name: &'a str,
    pub group: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'a str>,
    #[serde(rename = "type")]
    pub shape: TableShape,
    pub metadata: &'a BTreeMap<String, String>,
}

impl SeriesMetadata for Series {
    fn table_name(&self) -> &str {
        &self.table_name
    }
    fn table_shape(&self) -> TableShape {
        self.shape
    }
    fn column_names(&self) -> &dyn Allowlist {
        &*self.columns
    }
    fn key_values(&self) -> &dyn Allowlist {
        &*self.values
    }
}

// ------------- Group -------------
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub name: String,
    pub dataseries: Vec<String>,
    /// Values of every key column, over all series of the group.
    pub domain_keys: BTreeMap<String, Vec<String>>,
    /// Values of every co-key column, over all series of the group.
    pub codomain_keys: BTreeMap<String, Vec<String>>,
}

impl Group {
    /// Known values of one key column.
    pub fn key_values(&self, key: &str) -> Result<&[String]> {
        self.domain_keys
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| DataseriesError::UnknownKey(key.to_string()))
    }
    /// Known values of one co-key column.
    pub fn cokey_values(&self, cokey: &str) -> Result<&[String]> {
        self.codomain_keys
            .get(cokey)
            .map(Vec::as_slice)
            .ok_or_else(|| DataseriesError::UnknownKey(cokey.to_string()))
    }
}

// ------------- Category -------------
/// Series sharing a category, across groups.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub name: String,
    pub dataseries: Vec<CategorySeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySeries {
    pub name: String,
    pub groups: Vec<String>,
}

impl Category {
    pub fn series_names(&self) -> Vec<&str> {
        self.dataseries.iter().map(|s| s.name.as_str()).collect()
    }
    pub fn series(&self, name: &str) -> Result<&CategorySeries> {
        self.dataseries
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DataseriesError::UnknownSeries(name.to_string()))
    }
}

// ------------- Catalog -------------
#[derive(Debug, Clone)]
pub struct Catalog {
    columns: Vec<ColumnInfo>,
    groups: Vec<Group>,
    series: Vec<Series>,
    categories: Vec<Category>,
}

impl Catalog {
    /// Creates and fills the series tables, then assembles the catalog.
    ///
    /// Tables that already exist are kept as they are unless the settings ask
    /// for old tables to be cleared. A series that fails to load leaves no
    /// table behind and stops the whole load.
    pub fn load(settings: &Settings, store: &Store) -> Result<Self> {
        let columns = settings.column_info()?;
        for group in &settings.groups {
            for series in &group.dataseries {
                let table = table_name(&group.name, &series.name);
                let exists = store.table_exists(&table)?;
                if exists && !settings.clear_old {
                    info!(table, "keeping existing table");
                    continue;
                }
                if exists {
                    store.drop_table(&table)?;
                }
                let path = settings.data_dir.join(&series.location);
                if let Err(e) = store.load_csv(&table, &columns, &path) {
                    warn!(series = %series.name, error = %e, "failed to load series");
                    return Err(e);
                }
            }
        }
        Self::assemble(settings, |table, column| store.distinct_values(table, column))
    }

    /// Builds the catalog from settings, asking `scan` for the distinct values
    /// of a column in a table.
    pub fn assemble<F>(settings: &Settings, mut scan: F) -> Result<Self>
    where
        F: FnMut(&str, &str) -> Result<Vec<String>>,
    {
        let columns = settings.column_info()?;
        let column_names = Arc::new(columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
        let labelled = |label: ColumnLabel| {
            columns.iter().filter(|c| c.label == label).map(|c| c.name.as_str()).collect::<Vec<_>>()
        };
        let keys = labelled(ColumnLabel::Key);
        let cokeys = labelled(ColumnLabel::Cokey);

        let mut groups = Vec::new();
        let mut all_series = Vec::new();
        for group in &settings.groups {
            let mut domain_keys: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            let mut codomain_keys: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for series in &group.dataseries {
                let table = table_name(&group.name, &series.name);
                for key in &keys {
                    domain_keys.entry(key.to_string()).or_default().extend(scan(&table, key)?);
                }
                for cokey in &cokeys {
                    codomain_keys.entry(cokey.to_string()).or_default().extend(scan(&table, cokey)?);
                }
            }

            let values: Arc<ValueSet> = Arc::new(
                domain_keys
                    .values()
                    .chain(codomain_keys.values())
                    .flatten()
                    .cloned()
                    .collect(),
            );
            for series in &group.dataseries {
                all_series.push(Series {
                    name: series.name.clone(),
                    group: group.name.clone(),
                    category: series.category.clone(),
                    metadata: series.metadata.clone(),
                    shape: series.shape,
                    table_name: table_name(&group.name, &series.name),
                    columns: Arc::clone(&column_names),
                    values: Arc::clone(&values),
                });
            }
            info!(group = %group.name, series = group.dataseries.len(), values = values.len(), "group ready");
            groups.push(Group {
                name: group.name.clone(),
                dataseries: group.dataseries.iter().map(|s| s.name.clone()).collect(),
                domain_keys: into_lists(domain_keys),
                codomain_keys: into_lists(codomain_keys),
            });
        }

        let categories = categorize(&all_series);
        Ok(Self { columns, groups, series: all_series, categories })
    }

    /// Column names grouped by label, e.g. `"range" => ["n1990", "n1991"]`.
    pub fn columns_by_label(&self) -> BTreeMap<&'static str, Vec<&str>> {
        let mut labelled: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
        for column in &self.columns {
            labelled.entry(column.label.as_str()).or_default().push(&column.name);
        }
        labelled
    }
    pub fn series(&self, name: &str) -> Result<&Series> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DataseriesError::UnknownSeries(name.to_string()))
    }
    pub fn group(&self, name: &str) -> Result<&Group> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| DataseriesError::UnknownGroup(name.to_string()))
    }
    pub fn category(&self, name: &str) -> Result<&Category> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DataseriesError::UnknownCategory(name.to_string()))
    }
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
    pub fn series_names(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.name.as_str()).collect()
    }
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }
}

// categories in order of first appearance
fn categorize(series: &[Series]) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for s in series {
        let Some(name) = &s.category else { continue };
        let entry = CategorySeries { name: s.name.clone(), groups: vec![s.group.clone()] };
        let Some(category) = categories.iter_mut().find(|c| &c.name == name) else {
            categories.push(Category { name: name.clone(), dataseries: vec![entry] });
            continue;
        };
        match category.dataseries.iter_mut().find(|d| d.name == s.name) {
            Some(known) => known.groups.push(s.group.clone()),
            None => category.dataseries.push(entry),
        }
    }
    categories
}

fn into_lists(map: BTreeMap<String, BTreeSet<String>>) -> BTreeMap<String, Vec<String>> {
    map.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
columns:
  - { name: origin, label: key }
  - { name: destination, label: cokey }
  - { name: "2000..2001", label: range, type: number, modifier: many }
groups:
  - name: Trade
    dataseries:
      - { name: Exports, location: exports.csv, type: dyadic, category: flows }
      - { name: Imports, location: imports.csv, type: dyadic }
  - name: Other
    dataseries:
      - { name: Misc, location: misc.csv, type: monadic, category: flows }
      - { name: Stock, location: stock.csv, type: monadic, category: levels }
"#;

    fn catalog() -> Catalog {
        let settings = Settings::from_yaml(YAML).unwrap();
        Catalog::assemble(&settings, |table, column| {
            Ok(match (table, column) {
                ("series_trade_exports", "origin") => vec!["NO".to_string(), "SE".to_string()],
                ("series_trade_imports", "origin") => vec!["DK".to_string(), "NO".to_string()],
                ("series_trade_exports", "destination") => vec!["CL".to_string()],
                ("series_other_misc", "origin") => vec!["XX".to_string()],
                _ => vec![],
            })
        })
        .unwrap()
    }

    #[test]
    fn group_values_are_merged() {
        let catalog = catalog();
        let trade = catalog.group("Trade").unwrap();
        assert_eq!(trade.domain_keys["origin"], vec!["DK", "NO", "SE"]);
        assert_eq!(trade.codomain_keys["destination"], vec!["CL"]);
        assert_eq!(trade.key_values("origin").unwrap(), ["DK", "NO", "SE"]);
        assert_eq!(trade.cokey_values("destination").unwrap(), ["CL"]);
        assert_eq!(trade.key_values("destination").unwrap_err(), DataseriesError::UnknownKey("destination".to_string()));
        assert_eq!(trade.cokey_values("origin").unwrap_err(), DataseriesError::UnknownKey("origin".to_string()));
    }

    #[test]
    fn categories_collect_series_across_groups() {
        let catalog = catalog();
        assert_eq!(catalog.category_names(), vec!["flows", "levels"]);
        let flows = catalog.category("flows").unwrap();
        assert_eq!(flows.series_names(), vec!["Exports", "Misc"]);
        assert_eq!(flows.series("Misc").unwrap().groups, vec!["Other"]);
        assert_eq!(flows.series("Imports").unwrap_err(), DataseriesError::UnknownSeries("Imports".to_string()));
        assert_eq!(catalog.category("none").unwrap_err(), DataseriesError::UnknownCategory("none".to_string()));
        let json = serde_json::to_value(catalog.categories()).unwrap();
        assert_eq!(
            json[1],
            serde_json::json!({"name": "levels", "dataseries": [{"name": "Stock", "groups": ["Other"]}]})
        );
    }

    #[test]
    fn series_see_their_group_values() {
        let catalog = catalog();
        let exports = catalog.series("Exports").unwrap();
        assert_eq!(exports.table_name(), "series_trade_exports");
        assert_eq!(exports.table_shape(), TableShape::Dyadic);
        assert!(exports.key_values().allows("DK"));
        assert!(!exports.key_values().allows("XX"));
        assert!(exports.column_names().allows("n2001"));
        assert!(!exports.column_names().allows("2001"));
    }

    #[test]
    fn series_describe_themselves() {
        let catalog = catalog();
        let misc = catalog.series("Misc").unwrap();
        let json = serde_json::to_value(misc.describe()).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Misc", "group": "Other", "category": "flows", "type": "monadic", "metadata": {}}));
        assert_eq!(misc.group(), "Other");
    }

    #[test]
    fn names_are_listed_in_settings_order() {
        let catalog = catalog();
        assert_eq!(catalog.series_names(), vec!["Exports", "Imports", "Misc", "Stock"]);
        assert_eq!(catalog.group_names(), vec!["Trade", "Other"]);
    }

    #[test]
    fn columns_are_grouped_by_label() {
        let catalog = catalog();
        let labelled = catalog.columns_by_label();
        assert_eq!(labelled["key"], vec!["origin"]);
        assert_eq!(labelled["cokey"], vec!["destination"]);
        assert_eq!(labelled["range"], vec!["n2000", "n2001"]);
        assert!(!labelled.contains_key("special"));
    }

    #[test]
    fn unknown_names_are_errors() {
        let catalog = catalog();
        assert_eq!(catalog.series("Nope").unwrap_err(), DataseriesError::UnknownSeries("Nope".to_string()));
        assert_eq!(catalog.group("Nope").unwrap_err(), DataseriesError::UnknownGroup("Nope".to_string()));
    }
}
