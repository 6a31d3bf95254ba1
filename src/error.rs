use std::fmt;

use thiserror::Error;

/// The two sides of a dyadic restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    P,
    Q,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::P => write!(f, "p"),
            Side::Q => write!(f, "q"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataseriesError {
    #[error("Range spread is not properly formatted: '{0}'")]
    MalformedRangeSpread(String),
    #[error("Dyadic query is missing required values for '{0}'")]
    MissingRequiredSide(Side),
    #[error("Query contained an invalid column name: '{0}'")]
    InvalidColumnName(String),
    #[error("Query contained an invalid value: '{0}'")]
    InvalidValue(String),
    #[error("The query type and table type are incompatible")]
    IncompatibleQueryTableType,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Settings error: {0}")]
    Settings(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Unknown series: {0}")]
    UnknownSeries(String),
    #[error("Unknown group: {0}")]
    UnknownGroup(String),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Unknown key column: {0}")]
    UnknownKey(String),
}

impl DataseriesError {
    /// True for the errors caused by a malformed or disallowed client query.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedRangeSpread(_)
                | Self::MissingRequiredSide(_)
                | Self::InvalidColumnName(_)
                | Self::InvalidValue(_)
                | Self::IncompatibleQueryTableType
        )
    }
}

pub type Result<T> = std::result::Result<T, DataseriesError>;

// Helper conversions
impl From<rusqlite::Error> for DataseriesError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for DataseriesError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<std::io::Error> for DataseriesError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}
