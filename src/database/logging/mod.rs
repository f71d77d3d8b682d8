//! Statement logging
//!
//! [`QueryLogger`] keeps a record of every statement with its bound values and
//! timing. [`LoggingMiddleware`] decorates a driver so that connections and
//! prepared statements report to the logger:
//!
//! ```text
//! LoggingDriver -> LoggingConnection -> LoggingStatement
//! ```
//!
//! The decorators never change results or swallow errors.

mod middleware;
mod query_logger;

pub use middleware::{LoggingConnection, LoggingDriver, LoggingMiddleware, LoggingStatement};
pub use query_logger::{QueryGuard, QueryLogger, QueryRecord};
