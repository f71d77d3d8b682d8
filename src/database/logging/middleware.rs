//! Logging decorators for the driver traits

use anyhow::Result;
use std::sync::Arc;

use super::QueryLogger;
use crate::database::driver::{
    ConnectionParams, Driver, DriverConnection, DriverStatement, Middleware, NativeError,
    ResultSet,
};
use crate::database::schema::{Platform, Schema};
use crate::database::value::{ParamType, Value};

/// Middleware that wraps a driver so that every executed statement is logged
#[derive(Clone)]
pub struct LoggingMiddleware {
    logger: Arc<QueryLogger>,
}

impl LoggingMiddleware {
    pub fn new(logger: Arc<QueryLogger>) -> Self {
        Self { logger }
    }
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, driver: Box<dyn Driver>) -> Box<dyn Driver> {
        Box::new(LoggingDriver {
            inner: driver,
            logger: self.logger.clone(),
        })
    }
}

pub struct LoggingDriver {
    inner: Box<dyn Driver>,
    logger: Arc<QueryLogger>,
}

impl Driver for LoggingDriver {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn DriverConnection>> {
        let inner = self.inner.connect(params)?;
        Ok(Box::new(LoggingConnection::new(inner, self.logger.clone())))
    }
}

/// Connection decorator timing `query` and `exec` and wrapping prepared statements
pub struct LoggingConnection {
    inner: Box<dyn DriverConnection>,
    logger: Arc<QueryLogger>,
}

impl LoggingConnection {
    pub fn new(inner: Box<dyn DriverConnection>, logger: Arc<QueryLogger>) -> Self {
        Self { inner, logger }
    }
}

impl DriverConnection for LoggingConnection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement + '_>> {
        let inner = self.inner.prepare(sql)?;
        Ok(Box::new(LoggingStatement {
            inner,
            logger: self.logger.as_ref(),
            sql: sql.to_string(),
            params: Vec::new(),
            types: Vec::new(),
        }))
    }

    fn query(&self, sql: &str) -> Result<ResultSet> {
        let _guard = self.logger.track(sql, None, None);
        self.inner.query(sql)
    }

    fn exec(&self, sql: &str) -> Result<u64> {
        let _guard = self.logger.track(sql, None, None);
        self.inner.exec(sql)
    }

    fn begin_transaction(&self) -> Result<()> {
        self.inner.begin_transaction()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn roll_back(&self) -> Result<()> {
        self.inner.roll_back()
    }

    fn introspect_schema(&self) -> Result<Schema> {
        self.inner.introspect_schema()
    }

    fn platform(&self) -> &dyn Platform {
        self.inner.platform()
    }

    fn native_error(&self) -> Option<NativeError> {
        self.inner.native_error()
    }
}

/// Statement decorator that collects bound values until execution
pub struct LoggingStatement<'c> {
    inner: Box<dyn DriverStatement + 'c>,
    logger: &'c QueryLogger,
    sql: String,
    params: Vec<Value>,
    types: Vec<ParamType>,
}

impl DriverStatement for LoggingStatement<'_> {
    fn bind_value(&mut self, position: usize, value: Value, param_type: ParamType) -> Result<()> {
        if position > 0 {
            let slot = position - 1;
            if self.params.len() <= slot {
                self.params.resize(slot + 1, Value::Null);
                self.types.resize(slot + 1, ParamType::default());
            }
            self.params[slot] = value.clone();
            self.types[slot] = param_type;
        }
        self.inner.bind_value(position, value, param_type)
    }

    fn execute(&mut self) -> Result<ResultSet> {
        let _guard = self
            .logger
            .track(&self.sql, Some(&self.params), Some(&self.types));
        self.inner.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::driver::SqliteDriver;
    use crate::events::{MemoryPublisher, QUERY_BEGIN, QUERY_COMPLETE};

    fn connect() -> (Box<dyn DriverConnection>, Arc<QueryLogger>, Arc<MemoryPublisher>) {
        let events = Arc::new(MemoryPublisher::new());
        let logger = Arc::new(QueryLogger::new(events.clone()));
        let driver = LoggingMiddleware::new(logger.clone()).wrap(Box::new(SqliteDriver::new()));
        let conn = driver.connect(&ConnectionParams::in_memory()).unwrap();
        (conn, logger, events)
    }

    #[test]
    fn test_exec_and_query_are_logged() {
        let (conn, logger, events) = connect();
        conn.exec("CREATE TABLE t (id INTEGER)").unwrap();
        conn.query("SELECT * FROM t").unwrap();

        assert_eq!(logger.current_index(), 2);
        assert_eq!(logger.get(1).unwrap().sql, "CREATE TABLE t (id INTEGER)");
        assert_eq!(logger.get(2).unwrap().sql, "SELECT * FROM t");
        assert_eq!(events.count(QUERY_BEGIN), 2);
        assert_eq!(events.count(QUERY_COMPLETE), 2);
    }

    #[test]
    fn test_statement_logs_bound_values() {
        let (conn, logger, _) = connect();
        conn.exec("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();

        let mut stmt = conn.prepare("INSERT INTO t (id, name) VALUES (?, ?)").unwrap();
        stmt.bind_value(2, Value::from("a"), ParamType::String).unwrap();
        stmt.bind_value(1, Value::from(7), ParamType::Integer).unwrap();
        assert_eq!(stmt.execute().unwrap().rows_affected, 1);

        let record = logger.get(2).unwrap();
        assert_eq!(record.params, Some(vec![Value::from(7), Value::from("a")]));
        assert_eq!(
            record.types,
            Some(vec![ParamType::Integer, ParamType::String])
        );
    }

    #[test]
    fn test_failure_is_propagated_and_still_timed() {
        let (conn, logger, events) = connect();
        let err = conn.exec("INSERT INTO missing VALUES (1)").unwrap_err();
        assert!(err.to_string().contains("missing"));

        assert_eq!(logger.current_index(), 1);
        assert_eq!(events.count(QUERY_COMPLETE), 1);
        assert!(conn.native_error().is_some());
    }

    #[test]
    fn test_transactions_are_not_logged() {
        let (conn, logger, _) = connect();
        conn.begin_transaction().unwrap();
        conn.commit().unwrap();
        assert_eq!(logger.current_index(), 0);
    }
}
