#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! sqlgate - a guarded database access layer
//!
//! sqlgate sits between an application and its relational database. Every
//! statement goes through a managed [`Connection`] that:
//!
//! - refuses writes unless the connection is in safe mode or the write was forced
//! - prepends a configured prefix to logical table names
//! - records each statement with its bound values and timing
//! - reports what it does through an injected [`EventPublisher`]
//!
//! On top of the connection sit an incremental query builder and a schema
//! synchronizer that brings a live database in line with a declared schema.
//! Schemas can be exported to, and imported from, JSON.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `sqlgate` binary | All above + `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only
//! sqlgate = { version = "0.3", default-features = false }
//!
//! # Default (CLI binary)
//! sqlgate = "0.3"
//! ```
//!
//! # Architecture
//!
//! - **[`database`]**: connection, drivers, logging chain, schema tooling, query builder
//! - **[`events`]**: event names and publishers
//! - **[`config`]**: configuration loading
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sqlgate::{Connection, GateConfig, ParamTypes, TracingPublisher, Value};
//! use std::sync::Arc;
//!
//! let config = GateConfig::new(&None)?;
//! let conn = Connection::open(&config, Arc::new(TracingPublisher))?;
//!
//! // writes are denied until the connection is safe
//! conn.set_safe(true);
//! conn.insert_prefix("users", &[("uname", Value::from("admin"))], &ParamTypes::none());
//!
//! // build a query against prefixed tables
//! let mut qb = conn.create_query_builder();
//! qb.select(&["uname"]).from_prefix("users", None).set_max_results(Some(10));
//! let result = qb.execute()?;
//!
//! // bring the database in line with a target schema, keeping tables it does not know
//! conn.schema_synchronizer().update_schema(&target, true)?;
//! ```

pub mod config;
pub mod database;
pub mod events;

// =============================================================================
// Configuration
// =============================================================================

pub use config::GateConfig;

// =============================================================================
// Database
// =============================================================================

pub use database::{
    Connection, ExportVisitor, ParamType, ParamTypes, QueryBuilder, QueryLogger, QueryOutcome,
    QueryResult, ResultSet, Schema, SchemaSynchronizer, Value, WriteOutcome,
};

// =============================================================================
// Events
// =============================================================================

pub use events::{EventPublisher, MemoryPublisher, NullPublisher, TracingPublisher};
