//! Database module
//!
//! This module provides the managed database layer for sqlgate, organized into:
//!
//! - **core**: The managed [`Connection`] (write gating, table prefixing,
//!   transactions, SQL dump loading) and the schema synchronizer
//! - **driver**: Driver traits and the bundled SQLite driver
//! - **logging**: Query logger and the logging middleware chain
//! - **schema**: Schema model, comparator, DDL platform and JSON export
//! - **query_builder**: Incremental SQL builder bound to a connection
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/            # Connection facade
//! │   ├── connection   # safe/force gating, prefixing, events
//! │   ├── outcome      # WriteOutcome, QueryOutcome, ErrorInfo
//! │   ├── schema       # SchemaSynchronizer
//! │   └── sql_file     # dump splitting and statement prefixing
//! │
//! ├── driver/          # Driver / DriverConnection / DriverStatement
//! │   └── sqlite       # rusqlite-backed driver, introspection, DDL
//! │
//! ├── logging/         # QueryLogger, LoggingMiddleware decorators
//! │
//! ├── schema/          # Schema, Comparator, Platform, ExportVisitor
//! │
//! └── query_builder    # QueryBuilder
//! ```
//!
//! # Write Gating
//!
//! Writes issued through the connection only reach the database when the
//! connection is in safe mode, or when `force` was set for the next write.
//! Reads are never gated. Inside an explicit transaction the gate still
//! applies, but `force` is not used up until the transaction ends. Schema
//! synchronization bypasses the gate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlgate::config::GateConfig;
//! use sqlgate::database::{Connection, ParamTypes, Value};
//! use sqlgate::events::TracingPublisher;
//! use std::sync::Arc;
//!
//! let config = GateConfig::new(&None)?;
//! let conn = Connection::open(&config, Arc::new(TracingPublisher))?;
//!
//! // denied unless safe or forced
//! conn.set_force(true);
//! conn.insert_prefix("users", &[("uname", Value::from("admin"))], &ParamTypes::none());
//!
//! // reads are always allowed
//! let rows = conn.execute_query(
//!     &format!("SELECT uname FROM {}", conn.prefix("users")),
//!     &[],
//!     &ParamTypes::none(),
//! )?;
//! ```

pub mod core;
pub mod driver;
pub mod logging;
pub mod query_builder;
pub mod schema;
pub mod value;

// =============================================================================
// Connection
// =============================================================================

pub use core::{
    split_sql_dump, Connection, ErrorInfo, QueryOutcome, QueryResult, SchemaSynchronizer,
    StatementPrefixer, WriteOutcome,
};

// =============================================================================
// Drivers and logging
// =============================================================================

pub use driver::{
    ConnectionParams, Driver, DriverConnection, DriverStatement, Middleware, NativeError,
    ResultSet, SqliteDriver,
};
pub use logging::{LoggingMiddleware, QueryLogger, QueryRecord};

// =============================================================================
// Schema and query building
// =============================================================================

pub use query_builder::{QueryBuilder, QueryType};
pub use schema::{Column, ColumnType, Comparator, ExportVisitor, Schema, SchemaVisitor, Table};
pub use value::{ParamType, ParamTypes, Value};
