//! SQLite driver backed by `rusqlite`

mod connection;
mod introspect;
mod platform;

pub use connection::{SqliteConnection, SqliteStatement};
pub use platform::SqlitePlatform;

use anyhow::Result;

use super::{ConnectionParams, Driver, DriverConnection};

/// Driver opening [`SqliteConnection`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for SqliteDriver {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(SqliteConnection::open(params.path.as_deref())?))
    }
}
