//! Driver abstraction
//!
//! The middleware never talks to a database client directly. Everything goes
//! through three small traits, one per level of the client API:
//!
//! - [`Driver`]: opens connections
//! - [`DriverConnection`]: runs plain SQL, prepares statements, controls
//!   transactions and exposes schema introspection and the DDL [`Platform`]
//! - [`DriverStatement`]: binds values and executes a prepared statement
//!
//! A [`Middleware`] wraps a driver into another driver, which is how the
//! logging chain in [`crate::database::logging`] is composed.
//!
//! The bundled implementation is [`SqliteDriver`], backed by `rusqlite`.

mod sqlite;

pub use sqlite::{SqliteConnection, SqliteDriver, SqlitePlatform, SqliteStatement};

use anyhow::Result;
use serde::Serialize;

use crate::database::schema::{Platform, Schema};
use crate::database::value::{ParamType, Value};

/// Parameters used to open a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Database file path; `None` opens an in-memory database
    pub path: Option<String>,
}

impl ConnectionParams {
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn file(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
        }
    }
}

/// Rows returned by a statement, plus the number of rows it changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of a named column in the given row
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// First column of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

#[cfg(feature = "display")]
impl ResultSet {
    /// Render as a rounded table with one column per result column
    pub fn to_table(&self) -> String {
        use tabled::builder::Builder;
        use tabled::settings::Style;

        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().cloned());
        for row in &self.rows {
            let record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            builder.push_record(record);
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        table.to_string()
    }
}

/// The last error reported by the native database handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeError {
    /// SQLSTATE-style code; `HY000` when the database does not provide one
    pub sqlstate: String,
    /// Database-specific error code
    pub driver_code: Option<i64>,
    pub message: String,
}

pub trait Driver {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn DriverConnection>>;
}

pub trait Middleware {
    fn wrap(&self, driver: Box<dyn Driver>) -> Box<dyn Driver>;
}

pub trait DriverConnection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement + '_>>;

    /// Run a statement that returns rows
    fn query(&self, sql: &str) -> Result<ResultSet>;

    /// Run a statement and return the number of affected rows
    fn exec(&self, sql: &str) -> Result<u64>;

    fn begin_transaction(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn roll_back(&self) -> Result<()>;

    /// Read the live schema
    fn introspect_schema(&self) -> Result<Schema>;

    fn platform(&self) -> &dyn Platform;

    /// Last error reported by the native handle, if any
    fn native_error(&self) -> Option<NativeError>;
}

pub trait DriverStatement {
    /// Bind a value to a one-based parameter position
    fn bind_value(&mut self, position: usize, value: Value, param_type: ParamType) -> Result<()>;

    fn execute(&mut self) -> Result<ResultSet>;
}

#[cfg(all(test, feature = "display"))]
mod tests {
    use super::*;

    #[test]
    fn test_to_table() {
        let rows = ResultSet {
            columns: vec!["uid".to_string(), "uname".to_string()],
            rows: vec![
                vec![Value::Integer(1), Value::Text("admin".to_string())],
                vec![Value::Integer(2), Value::Null],
            ],
            rows_affected: 0,
        };
        let table = rows.to_table();
        assert!(table.contains("uname"));
        assert!(table.contains("admin"));
        assert!(table.contains("NULL"));
    }
}
