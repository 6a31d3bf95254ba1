//! Settings file describing the columns shared by all series and the series
//! themselves, grouped.
//!
//! Read through the `config` crate, so YAML, TOML and JSON all work, and any
//! value can be overridden with `DATASERIES_<SECTION>__<KEY>` variables.
//!
//! ```yaml
//! server:
//!   bind: 127.0.0.1:8080
//! columns:
//!   - { name: country, label: key }
//!   - { name: 1990..2000, label: range, type: number, modifier: many }
//! groups:
//!   - name: Population
//!     dataseries:
//!       - { name: Total, location: data/total.csv, type: monadic }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{DataseriesError, Result};
use crate::query::TableShape;
use crate::range::spread_columns;

pub const ENV_PREFIX: &str = "DATASERIES";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref NOT_ALPHANUMERIC: Regex = Regex::new(r"[^A-Za-z0-9]").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Series locations are relative to this directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Drop and recreate series tables that already exist.
    #[serde(default)]
    pub clear_old: bool,
    pub columns: Vec<ColumnSettings>,
    #[serde(default)]
    pub groups: Vec<GroupSettings>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}
impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8080".to_string() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// KEY : the "domain" of a series, what a client searches against.
/// COKEY : the second coordinate of the domain of a dyadic series.
/// RANGE : a measurement or slice for every item of the domain.
/// SPECIAL : range-like data that is distinct in some way.
/// ANCHOR : the same value throughout the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnLabel {
    Key,
    Cokey,
    Range,
    Special,
    Anchor,
}

impl ColumnLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnLabel::Key => "key",
            ColumnLabel::Cokey => "cokey",
            ColumnLabel::Range => "range",
            ColumnLabel::Special => "special",
            ColumnLabel::Anchor => "anchor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
}

/// MANY : the name is a spread and stands for one column per number in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnModifier {
    Many,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSettings {
    pub name: String,
    pub label: ColumnLabel,
    #[serde(default, rename = "type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub modifier: Option<ColumnModifier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSettings {
    pub name: String,
    #[serde(default)]
    pub dataseries: Vec<SeriesSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesSettings {
    pub name: String,
    pub location: PathBuf,
    #[serde(rename = "type")]
    pub shape: TableShape,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A column as it exists in every series table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: ColumnType,
    pub label: ColumnLabel,
}

impl Settings {
    /// Reads the settings file at `path`, overlaid with the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from YAML text, without any environment overlay.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The columns of a series table, `many` columns expanded.
    pub fn column_info(&self) -> Result<Vec<ColumnInfo>> {
        let mut info = Vec::new();
        for column in &self.columns {
            let names = match column.modifier {
                Some(ColumnModifier::Many) => spread_columns(&column.name)?,
                None => vec![column.name.to_lowercase()],
            };
            info.extend(names.into_iter().map(|name| ColumnInfo {
                name,
                data_type: column.data_type,
                label: column.label,
            }));
        }
        Ok(info)
    }

    fn validate(&self) -> Result<()> {
        let info = self.column_info()?;
        if !info.iter().any(|c| c.label == ColumnLabel::Key) {
            return Err(DataseriesError::Settings("no column is labelled 'key'".to_string()));
        }
        let mut seen = HashSet::new();
        for column in &info {
            if !IDENTIFIER.is_match(&column.name) {
                return Err(DataseriesError::Settings(format!("'{}' is not a valid column name", column.name)));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(DataseriesError::Settings(format!("column '{}' is defined twice", column.name)));
            }
        }

        let mut groups = HashSet::new();
        let mut series = HashSet::new();
        let mut tables = HashSet::new();
        for group in &self.groups {
            if !groups.insert(group.name.as_str()) {
                return Err(DataseriesError::Settings(format!("group '{}' is defined twice", group.name)));
            }
            for s in &group.dataseries {
                if !series.insert(s.name.as_str()) {
                    return Err(DataseriesError::Settings(format!("series '{}' is defined twice", s.name)));
                }
                if !tables.insert(table_name(&group.name, &s.name)) {
                    return Err(DataseriesError::Settings(format!(
                        "series '{}' maps to an already used table name",
                        s.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The table holding a series, e.g. `series_population_total`.
pub fn table_name(group: &str, series: &str) -> String {
    format!(
        "series_{}_{}",
        NOT_ALPHANUMERIC.replace_all(group, ""),
        NOT_ALPHANUMERIC.replace_all(series, "")
    )
    .to_lowercase()
}
