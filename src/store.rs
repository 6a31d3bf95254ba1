//! SQLite store holding one table per series.
//!
//! Identifiers reaching this module come from validated settings; row data
//! only ever travels as bound parameters, and client queries only arrive as
//! SQL rendered from a [`crate::sql::CompiledQuery`].

// used for persistence
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{DataseriesError, Result};
use crate::settings::{ColumnInfo, ColumnType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

impl From<Option<PathBuf>> for PersistenceMode {
    fn from(path: Option<PathBuf>) -> Self {
        path.map_or(PersistenceMode::InMemory, PersistenceMode::File)
    }
}

/// Result rows with every cell rendered as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Rows {
    /// Headed CSV, NULL as an empty field.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        let header: Vec<String> = self.columns.iter().map(String::as_str).map(csv_field).collect();
        csv.push_str(&header.join(","));
        csv.push('\n');
        for row in &self.rows {
            let fields: Vec<String> =
                row.iter().map(|cell| cell.as_deref().map(csv_field).unwrap_or_default()).collect();
            csv.push_str(&fields.join(","));
            csv.push('\n');
        }
        csv
    }
}

// ------------- Store -------------
pub struct Store {
    connection: Mutex<Connection>,
}

impl Store {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        info!(?mode, "store opened");
        Ok(Self { connection: Mutex::new(connection) })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|e| DataseriesError::Persistence(format!("lock poisoned: {e}")))
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.connection()?.query_row(
            "select count(*) from sqlite_master where type = 'table' and name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.connection()?.execute_batch(&format!("drop table if exists {table};"))?;
        debug!(table, "table dropped");
        Ok(())
    }

    /// Creates `table` and fills it from a headed, comma separated file,
    /// returning the row count.
    ///
    /// Fields are matched to `columns` by position. Empty fields become NULL.
    /// Creation and inserts share one transaction, so a file that fails to
    /// load leaves no table behind.
    pub fn load_csv(&self, table: &str, columns: &[ColumnInfo], path: &Path) -> Result<usize> {
        let mut reader = BufReader::new(File::open(path).map_err(|e| {
            DataseriesError::Io(format!("{}: {e}", path.display()))
        })?);
        let mut line = 0;
        // header
        if read_record(&mut reader, &mut line)?.is_none() {
            return Err(DataseriesError::Io(format!("{}: file is empty", path.display())));
        }

        let width = columns.len();
        let placeholders = vec!["?"; width].join(", ");
        let mut connection = self.connection()?;
        let transaction = connection.transaction()?;
        create_table(&transaction, table, columns)?;
        let mut loaded = 0;
        {
            let mut insert = transaction.prepare(&format!("insert into {table} values ({placeholders})"))?;
            loop {
                let first_line = line + 1;
                let Some(record) = read_record(&mut reader, &mut line)? else {
                    break;
                };
                if record.trim().is_empty() {
                    continue;
                }
                let fields = split_csv_record(&record);
                if fields.len() != width {
                    return Err(DataseriesError::Io(format!(
                        "{}:{}: expected {} fields, found {}",
                        path.display(),
                        first_line,
                        width,
                        fields.len()
                    )));
                }
                insert.execute(params_from_iter(fields.iter()))?;
                loaded += 1;
            }
        }
        transaction.commit()?;
        info!(table, rows = loaded, file = %path.display(), "series loaded");
        Ok(loaded)
    }

    /// Every distinct non-null value of `column`, sorted.
    pub fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(&format!(
            "select distinct {column} from {table} where {column} is not null order by 1"
        ))?;
        let values = statement
            .query_map([], |row| Ok(render(row.get_ref(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values.into_iter().flatten().collect())
    }

    /// Runs a single query and collects its rows.
    pub fn query(&self, sql: &str) -> Result<Rows> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(sql)?;
        let columns: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let rows = statement
            .query_map([], |row| {
                (0..width)
                    .map(|i| Ok(render(row.get_ref(i)?)))
                    .collect::<rusqlite::Result<Vec<Option<String>>>>()
            })?
            .collect::<rusqlite::Result<Vec<Vec<Option<String>>>>>()?;
        debug!(rows = rows.len(), "query executed");
        Ok(Rows { columns, rows })
    }
}

fn create_table(connection: &Connection, table: &str, columns: &[ColumnInfo]) -> Result<()> {
    let definitions: Vec<String> = columns
        .iter()
        .map(|c| {
            let sql_type = match c.data_type {
                ColumnType::String => "text",
                ColumnType::Number => "real",
            };
            format!("{} {}", c.name, sql_type)
        })
        .collect();
    connection.execute_batch(&format!("create table {} ({});", table, definitions.join(", ")))?;
    debug!(table, "table created");
    Ok(())
}

fn render(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Reads the next CSV record, which spans several lines while a quoted
/// field is open. `line` counts the lines consumed so far.
fn read_record<R: BufRead>(reader: &mut R, line: &mut usize) -> Result<Option<String>> {
    let mut record = String::new();
    loop {
        let read = reader.read_line(&mut record)?;
        if read == 0 {
            return Ok(if record.is_empty() { None } else { Some(record) });
        }
        *line += 1;
        // an escaped quote counts twice, so an odd count means an open field
        if record.matches('"').count() % 2 == 0 {
            return Ok(Some(record));
        }
    }
}

/// Splits one CSV record. Double quotes group a field and `""` inside them is
/// a literal quote; empty fields are `None`.
fn split_csv_record(record: &str) -> Vec<Option<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = record.trim_end_matches(['\r', '\n']).chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
        .into_iter()
        .map(|f| if f.is_empty() { None } else { Some(f) })
        .collect()
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
