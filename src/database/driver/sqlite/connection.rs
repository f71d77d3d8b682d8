//! SQLite connection and prepared statements

use anyhow::{anyhow, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use std::cell::RefCell;

use super::introspect;
use super::platform::SqlitePlatform;
use crate::database::driver::{DriverConnection, DriverStatement, NativeError, ResultSet};
use crate::database::schema::{Platform, Schema};
use crate::database::value::{ParamType, Value};

/// SQLite has no SQLSTATE codes; this is the general error class reported instead.
const GENERAL_SQLSTATE: &str = "HY000";

/// A raw SQLite connection
///
/// Remembers the last native error so that callers can inspect it after a
/// failed operation.
pub struct SqliteConnection {
    conn: Connection,
    last_error: RefCell<Option<NativeError>>,
    platform: SqlitePlatform,
}

impl SqliteConnection {
    /// Open a database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| anyhow!("Failed to open database at '{}': {}", p, e))?,
            None => Connection::open_in_memory()
                .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?,
        };

        let db = SqliteConnection {
            conn,
            last_error: RefCell::new(None),
            platform: SqlitePlatform,
        };
        db.configure()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn configure(&self) -> Result<()> {
        // In-memory databases report "memory" here and keep that mode
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to set journal mode: {}", e))?;

        self.conn
            .execute("PRAGMA synchronous=NORMAL", [])
            .map_err(|e| anyhow!("Failed to set synchronous mode: {}", e))?;

        self.conn
            .execute("PRAGMA temp_store=MEMORY", [])
            .map_err(|e| anyhow!("Failed to set temp store: {}", e))?;

        self.conn
            .execute("PRAGMA foreign_keys=ON", [])
            .map_err(|e| anyhow!("Failed to enable foreign keys: {}", e))?;

        Ok(())
    }
}

impl DriverConnection for SqliteConnection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement + '_>> {
        let stmt = record(&self.last_error, self.conn.prepare(sql), "prepare statement")?;
        Ok(Box::new(SqliteStatement {
            stmt,
            last_error: &self.last_error,
        }))
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        let mut stmt = record(&self.last_error, self.conn.prepare(sql), "prepare query")?;
        record(&self.last_error, collect_rows(&mut stmt), "run query")
    }

    fn exec(&self, sql: &str) -> Result<u64> {
        let affected = record(&self.last_error, self.conn.execute(sql, []), "execute SQL")?;
        Ok(affected as u64)
    }

    fn begin_transaction(&self) -> Result<()> {
        record(
            &self.last_error,
            self.conn.execute_batch("BEGIN"),
            "begin transaction",
        )
    }

    fn commit(&self) -> Result<()> {
        record(
            &self.last_error,
            self.conn.execute_batch("COMMIT"),
            "commit transaction",
        )
    }

    fn roll_back(&self) -> Result<()> {
        record(
            &self.last_error,
            self.conn.execute_batch("ROLLBACK"),
            "roll back transaction",
        )
    }

    fn introspect_schema(&self) -> Result<Schema> {
        record(
            &self.last_error,
            introspect::introspect(&self.conn),
            "introspect schema",
        )
    }

    fn platform(&self) -> &dyn Platform {
        &self.platform
    }

    fn native_error(&self) -> Option<NativeError> {
        self.last_error.borrow().clone()
    }
}

/// A prepared SQLite statement
pub struct SqliteStatement<'c> {
    stmt: rusqlite::Statement<'c>,
    last_error: &'c RefCell<Option<NativeError>>,
}

impl DriverStatement for SqliteStatement<'_> {
    fn bind_value(&mut self, position: usize, value: Value, param_type: ParamType) -> Result<()> {
        let value = value.coerce(param_type);
        let result = self.stmt.raw_bind_parameter(position, &value);
        record(self.last_error, result, "bind parameter")
    }

    fn execute(&mut self) -> Result<ResultSet> {
        let result = if self.stmt.column_count() > 0 {
            collect_rows(&mut self.stmt)
        } else {
            self.stmt.raw_execute().map(|affected| ResultSet {
                rows_affected: affected as u64,
                ..Default::default()
            })
        };
        record(self.last_error, result, "execute statement")
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn collect_rows(stmt: &mut rusqlite::Statement<'_>) -> rusqlite::Result<ResultSet> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let count = columns.len();

    let mut rows = stmt.raw_query();
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            values.push(from_value_ref(row.get_ref(i)?));
        }
        collected.push(values);
    }

    Ok(ResultSet {
        columns,
        rows: collected,
        rows_affected: 0,
    })
}

/// Remember the outcome of a native call and convert its error
fn record<T>(
    slot: &RefCell<Option<NativeError>>,
    result: rusqlite::Result<T>,
    action: &str,
) -> Result<T> {
    match result {
        Ok(value) => {
            slot.replace(None);
            Ok(value)
        }
        Err(e) => {
            slot.replace(Some(native_error(&e)));
            Err(anyhow!("Failed to {}: {}", action, e))
        }
    }
}

fn native_error(err: &rusqlite::Error) -> NativeError {
    let driver_code = match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(i64::from(e.extended_code)),
        _ => None,
    };
    NativeError {
        sqlstate: GENERAL_SQLSTATE.to_string(),
        driver_code,
        message: err.to_string(),
    }
}
