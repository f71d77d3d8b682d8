//! Core database infrastructure
//!
//! - `Connection`: the managed connection with write gating and prefixing
//! - `WriteOutcome` / `QueryOutcome`: what a gated operation did
//! - `SchemaSynchronizer`: brings the live schema in line with a target
//! - SQL dump splitting and table prefixing for `Connection::query_from_file`

mod connection;
mod outcome;
mod schema;
mod sql_file;

pub use connection::Connection;
pub use outcome::{ErrorInfo, QueryOutcome, QueryResult, WriteOutcome};
pub use schema::SchemaSynchronizer;
pub use sql_file::{split_sql_dump, StatementPrefixer};

pub(crate) use connection::starts_with_keyword;
