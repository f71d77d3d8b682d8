//! The managed connection
//!
//! [`Connection`] is the single authority over whether a write reaches the
//! database. Writes run only while the connection is `safe`, or once after
//! `force` was set. Reads are always allowed.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use super::outcome::{ErrorInfo, QueryOutcome, WriteOutcome};
use super::schema::SchemaSynchronizer;
use super::sql_file::{split_sql_dump, StatementPrefixer};
use crate::config::GateConfig;
use crate::database::driver::{
    ConnectionParams, DriverConnection, Middleware, ResultSet, SqliteDriver,
};
use crate::database::logging::{LoggingMiddleware, QueryLogger};
use crate::database::query_builder::QueryBuilder;
use crate::database::schema::{Platform, Schema};
use crate::database::value::{ParamType, ParamTypes, Value};
use crate::events::{EventPublisher, EXCEPTION, QUERY_END, QUERY_START};

/// A database connection with write gating and table prefixing
///
/// The gate state lives in [`Cell`]s, so a connection can be shared by
/// reference within one unit of work but not across threads.
pub struct Connection {
    inner: Box<dyn DriverConnection>,
    prefix: String,
    safe: Cell<bool>,
    force: Cell<bool>,
    transaction_active: Cell<bool>,
    events: Arc<dyn EventPublisher>,
    logger: Arc<QueryLogger>,
}

impl Connection {
    /// Wrap an already opened driver connection
    ///
    /// `inner` should report to `logger`, usually by having been opened
    /// through a [`LoggingMiddleware`] built on the same logger.
    pub fn new(
        inner: Box<dyn DriverConnection>,
        prefix: &str,
        events: Arc<dyn EventPublisher>,
        logger: Arc<QueryLogger>,
    ) -> Self {
        Self {
            inner,
            prefix: prefix.to_string(),
            safe: Cell::new(false),
            force: Cell::new(false),
            transaction_active: Cell::new(false),
            events,
            logger,
        }
    }

    /// Open the configured SQLite database behind the logging middleware
    ///
    /// Failures are reported without the underlying details, which may
    /// contain connection parameters.
    pub fn open(config: &GateConfig, events: Arc<dyn EventPublisher>) -> Result<Self> {
        let logger = Arc::new(QueryLogger::new(events.clone()));
        logger.set_enabled(config.query_logging);

        let driver = LoggingMiddleware::new(logger.clone()).wrap(Box::new(SqliteDriver::new()));
        let params = match config.sqlite_path() {
            Some(path) => ConnectionParams::file(path),
            None => ConnectionParams::in_memory(),
        };
        let inner = driver.connect(&params).map_err(|e| {
            tracing::debug!(error = %e, "database connection failed");
            anyhow!("Cannot get database connection")
        })?;

        let conn = Self::new(inner, &config.prefix, events, logger);
        conn.set_safe(config.safe_writes);
        tracing::info!(prefix = %config.prefix, "database connection opened");
        Ok(conn)
    }

    /// Open an in-memory database with query logging enabled
    pub fn open_in_memory(prefix: &str, events: Arc<dyn EventPublisher>) -> Result<Self> {
        let config = GateConfig {
            prefix: prefix.to_string(),
            database_path: crate::config::IN_MEMORY.to_string(),
            query_logging: true,
            safe_writes: false,
        };
        Self::open(&config, events)
    }

    pub fn set_safe(&self, safe: bool) {
        self.safe.set(safe);
    }

    pub fn safe(&self) -> bool {
        self.safe.get()
    }

    /// Allow the next write even if the connection is not safe
    pub fn set_force(&self, force: bool) {
        self.force.set(force);
    }

    pub fn force(&self) -> bool {
        self.force.get()
    }

    pub fn transaction_active(&self) -> bool {
        self.transaction_active.get()
    }

    /// Prefixed table name; the bare prefix for an empty table name
    pub fn prefix(&self, table: &str) -> String {
        if table.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}_{}", self.prefix, table)
        }
    }

    /// Quote a column name with backticks
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    pub fn logger(&self) -> &Arc<QueryLogger> {
        &self.logger
    }

    pub fn platform(&self) -> &dyn Platform {
        self.inner.platform()
    }

    /// Read the live schema of the database
    pub fn introspect_schema(&self) -> Result<Schema> {
        self.inner.introspect_schema()
    }

    pub fn create_query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    pub fn schema_synchronizer(&self) -> SchemaSynchronizer<'_> {
        SchemaSynchronizer::new(self)
    }

    /// Insert one row
    ///
    /// An empty `data` produces `INSERT INTO table () VALUES ()`.
    pub fn insert(&self, table: &str, data: &[(&str, Value)], types: &ParamTypes) -> WriteOutcome {
        let columns: Vec<&str> = data.iter().map(|(c, _)| *c).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        let params: Vec<Value> = data.iter().map(|(_, v)| v.clone()).collect();
        self.gated_write(&sql, &params, &types.resolve(&columns))
    }

    /// Update rows matching every criterion
    ///
    /// A `Value::Null` criterion renders `IS NULL`. Without criteria every row
    /// is updated.
    pub fn update(
        &self,
        table: &str,
        data: &[(&str, Value)],
        criteria: &[(&str, Value)],
        types: &ParamTypes,
    ) -> WriteOutcome {
        let mut columns: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        let set: Vec<String> = data
            .iter()
            .map(|(column, value)| {
                columns.push(*column);
                params.push(value.clone());
                format!("{} = ?", self.quote_identifier(column))
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", table, set.join(", "));
        let conditions = self.conditions(criteria, &mut columns, &mut params);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        self.gated_write(&sql, &params, &types.resolve(&columns))
    }

    /// Delete rows matching every criterion
    ///
    /// Without criteria every row is deleted.
    pub fn delete(&self, table: &str, criteria: &[(&str, Value)], types: &ParamTypes) -> WriteOutcome {
        let mut columns: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        let mut sql = format!("DELETE FROM {}", table);
        let conditions = self.conditions(criteria, &mut columns, &mut params);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        self.gated_write(&sql, &params, &types.resolve(&columns))
    }

    fn conditions<'c>(
        &self,
        criteria: &[(&'c str, Value)],
        columns: &mut Vec<&'c str>,
        params: &mut Vec<Value>,
    ) -> Vec<String> {
        criteria
            .iter()
            .map(|(column, value)| {
                let quoted = self.quote_identifier(column);
                if value.is_null() {
                    format!("{} IS NULL", quoted)
                } else {
                    columns.push(*column);
                    params.push(value.clone());
                    format!("{} = ?", quoted)
                }
            })
            .collect()
    }

    pub fn insert_prefix(
        &self,
        table: &str,
        data: &[(&str, Value)],
        types: &ParamTypes,
    ) -> WriteOutcome {
        self.insert(&self.prefix(table), data, types)
    }

    pub fn update_prefix(
        &self,
        table: &str,
        data: &[(&str, Value)],
        criteria: &[(&str, Value)],
        types: &ParamTypes,
    ) -> WriteOutcome {
        self.update(&self.prefix(table), data, criteria, types)
    }

    pub fn delete_prefix(
        &self,
        table: &str,
        criteria: &[(&str, Value)],
        types: &ParamTypes,
    ) -> WriteOutcome {
        self.delete(&self.prefix(table), criteria, types)
    }

    /// Run a write statement through the safety gate
    ///
    /// Table names in `sql` are used as given; no prefix is applied.
    pub fn execute_statement(&self, sql: &str, params: &[Value], types: &ParamTypes) -> WriteOutcome {
        self.gated_write(sql, params, &types.as_positional())
    }

    fn gated_write(&self, sql: &str, params: &[Value], types: &[ParamType]) -> WriteOutcome {
        if !self.safe.get() && !self.force.get() {
            tracing::debug!(sql, "write denied, connection is neither safe nor forced");
            return WriteOutcome::Denied;
        }
        if !self.transaction_active.get() {
            self.force.set(false);
        }

        self.events.publish(QUERY_START, json!({ "sql": sql }));
        let outcome = match self.run_statement(sql, params, types) {
            Ok(affected) => WriteOutcome::Written(affected),
            Err(e) => {
                self.publish_exception(sql, &e);
                WriteOutcome::Failed(e)
            }
        };
        self.events.publish(QUERY_END, json!({ "sql": sql }));
        outcome
    }

    /// Run a read statement; errors are returned to the caller
    pub fn execute_query(&self, sql: &str, params: &[Value], types: &ParamTypes) -> Result<ResultSet> {
        self.run_query(sql, params, &types.as_positional())
    }

    /// Alias of [`safe_query`](Self::safe_query)
    pub fn query(&self, sql: &str, params: &[Value], types: &ParamTypes) -> QueryOutcome {
        self.safe_query(sql, params, types)
    }

    /// Run any statement, dispatching on its leading keyword
    ///
    /// `SELECT` statements are always allowed and return rows. Anything else is
    /// a write and is subject to the safety gate.
    pub fn safe_query(&self, sql: &str, params: &[Value], types: &ParamTypes) -> QueryOutcome {
        let select = is_select(sql);
        if !select {
            if !self.safe.get() && !self.force.get() {
                tracing::debug!(sql, "write denied, connection is neither safe nor forced");
                return QueryOutcome::Denied;
            }
            if !self.transaction_active.get() {
                self.force.set(false);
            }
        }

        let types = types.as_positional();
        self.events.publish(QUERY_START, json!({ "sql": sql }));
        let outcome = if select {
            match self.run_query(sql, params, &types) {
                Ok(rows) => QueryOutcome::Rows(rows),
                Err(e) => {
                    self.publish_exception(sql, &e);
                    QueryOutcome::Failed(e)
                }
            }
        } else {
            match self.run_statement(sql, params, &types) {
                Ok(affected) => QueryOutcome::Affected(affected),
                Err(e) => {
                    self.publish_exception(sql, &e);
                    QueryOutcome::Failed(e)
                }
            }
        };
        self.events.publish(QUERY_END, json!({ "sql": sql }));
        outcome
    }

    /// Run a statement without the safety gate, returning the first error
    pub(crate) fn execute_unchecked(&self, sql: &str) -> Result<u64> {
        self.events.publish(QUERY_START, json!({ "sql": sql }));
        let result = self.inner.exec(sql);
        self.events.publish(QUERY_END, json!({ "sql": sql }));
        result
    }

    fn run_statement(&self, sql: &str, params: &[Value], types: &[ParamType]) -> Result<u64> {
        if params.is_empty() {
            return self.inner.exec(sql);
        }
        let mut stmt = self.inner.prepare(sql)?;
        for (i, value) in params.iter().enumerate() {
            let param_type = types.get(i).copied().unwrap_or_default();
            stmt.bind_value(i + 1, value.clone(), param_type)?;
        }
        Ok(stmt.execute()?.rows_affected)
    }

    fn run_query(&self, sql: &str, params: &[Value], types: &[ParamType]) -> Result<ResultSet> {
        if params.is_empty() {
            return self.inner.query(sql);
        }
        let mut stmt = self.inner.prepare(sql)?;
        for (i, value) in params.iter().enumerate() {
            let param_type = types.get(i).copied().unwrap_or_default();
            stmt.bind_value(i + 1, value.clone(), param_type)?;
        }
        stmt.execute()
    }

    fn publish_exception(&self, sql: &str, error: &anyhow::Error) {
        self.events.publish(
            EXCEPTION,
            json!({ "sql": sql, "error": error.to_string() }),
        );
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.transaction_active.set(true);
        self.inner.begin_transaction()
    }

    /// Commit; also clears `force`
    pub fn commit(&self) -> Result<()> {
        self.transaction_active.set(false);
        self.force.set(false);
        self.inner.commit()
    }

    /// Roll back; also clears `force`
    pub fn roll_back(&self) -> Result<()> {
        self.transaction_active.set(false);
        self.force.set(false);
        self.inner.roll_back()
    }

    /// Run every table statement of a SQL dump file through [`safe_query`](Self::safe_query)
    ///
    /// Table names are prefixed. Statements other than `INSERT INTO`,
    /// `CREATE TABLE`, `ALTER TABLE`, `UPDATE` and `DROP TABLE` are skipped.
    /// Returns `false` only if the file could not be read.
    pub fn query_from_file<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read SQL file");
                return false;
            }
        };
        let prefixer = match StatementPrefixer::new(&self.prefix) {
            Ok(prefixer) => prefixer,
            Err(e) => {
                tracing::warn!(error = %e, "cannot prepare statement prefixing");
                return false;
            }
        };

        let statements = split_sql_dump(content.trim());
        let mut executed = 0usize;
        for statement in &statements {
            match prefixer.prefix_statement(statement) {
                Some(sql) => {
                    if let QueryOutcome::Failed(e) = self.safe_query(&sql, &[], &ParamTypes::none()) {
                        tracing::debug!(sql, error = %e, "statement from SQL file failed");
                    }
                    executed += 1;
                }
                None => tracing::debug!(statement, "skipping statement"),
            }
        }
        tracing::info!(
            path = %path.display(),
            total = statements.len(),
            executed,
            "loaded SQL file"
        );
        true
    }

    /// Last native error of the underlying connection, empty when there is none
    pub fn error_info(&self) -> ErrorInfo {
        self.inner
            .native_error()
            .map(ErrorInfo::from)
            .unwrap_or_default()
    }

    /// SQLSTATE of the last native error
    pub fn error_code(&self) -> Option<String> {
        self.inner.native_error().map(|e| e.sqlstate)
    }
}

/// Whether the statement starts with `SELECT`, ignoring case and leading whitespace
pub(crate) fn is_select(sql: &str) -> bool {
    starts_with_keyword(sql, "select")
}

pub(crate) fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.trim_start()
        .get(..keyword.len())
        .map(|head| head.eq_ignore_ascii_case(keyword))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemoryPublisher, QUERY_BEGIN, QUERY_COMPLETE};
    use std::io::Write;

    fn setup() -> (Connection, Arc<MemoryPublisher>) {
        let events = Arc::new(MemoryPublisher::new());
        let conn = Connection::open_in_memory("xo", events.clone()).unwrap();
        conn.set_safe(true);
        assert!(conn
            .execute_statement(
                "CREATE TABLE t (id INTEGER, name TEXT, level INTEGER)",
                &[],
                &ParamTypes::none()
            )
            .rows_affected()
            == 0);
        conn.set_safe(false);
        events.clear();
        (conn, events)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.execute_query(&format!("SELECT COUNT(*) FROM {}", table), &[], &ParamTypes::none())
            .unwrap()
            .scalar()
            .and_then(Value::as_i64)
            .unwrap()
    }

    fn last_record(conn: &Connection) -> crate::database::logging::QueryRecord {
        conn.logger().get(conn.logger().current_index()).unwrap()
    }

    #[test]
    fn test_prefix() {
        let (conn, _) = setup();
        assert_eq!(conn.prefix("users"), "xo_users");
        assert_eq!(conn.prefix(""), "xo");
    }

    #[test]
    fn test_quote_identifier() {
        let (conn, _) = setup();
        assert_eq!(conn.quote_identifier("level"), "`level`");
        assert_eq!(conn.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_denied_write_does_not_reach_driver() {
        let (conn, events) = setup();
        let before = conn.logger().current_index();

        let outcome = conn.execute_statement("DELETE FROM t", &[], &ParamTypes::none());
        assert!(outcome.is_denied());
        assert_eq!(outcome.rows_affected(), 0);
        assert_eq!(conn.logger().current_index(), before);
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_safe_write_reports_rows() {
        let (conn, _) = setup();
        conn.set_safe(true);
        let outcome = conn.execute_statement(
            "INSERT INTO t (id) VALUES (1), (2)",
            &[],
            &ParamTypes::none(),
        );
        assert!(matches!(outcome, WriteOutcome::Written(2)));
        assert!(conn.safe());
    }

    #[test]
    fn test_force_is_consumed_by_one_write() {
        let (conn, _) = setup();
        conn.set_force(true);
        let first = conn.insert("t", &[("id", Value::from(1))], &ParamTypes::none());
        assert!(matches!(first, WriteOutcome::Written(1)));
        assert!(!conn.force());

        let second = conn.insert("t", &[("id", Value::from(2))], &ParamTypes::none());
        assert!(second.is_denied());
        assert_eq!(count(&conn, "t"), 1);
    }

    #[test]
    fn test_force_is_consumed_by_failed_write() {
        let (conn, events) = setup();
        conn.set_force(true);
        let outcome = conn.insert("missing", &[("id", Value::from(1))], &ParamTypes::none());
        assert!(outcome.is_failed());
        assert_eq!(outcome.rows_affected(), 0);
        assert!(!conn.force());
        assert_eq!(events.count(EXCEPTION), 1);
        assert_eq!(events.count(QUERY_END), 1);
    }

    #[test]
    fn test_force_survives_inside_transaction() {
        let (conn, _) = setup();
        conn.begin_transaction().unwrap();
        assert!(conn.transaction_active());
        conn.set_force(true);

        for id in 1..=3 {
            let outcome = conn.insert("t", &[("id", Value::from(id))], &ParamTypes::none());
            assert_eq!(outcome.rows_affected(), 1);
        }
        assert!(conn.force());

        conn.commit().unwrap();
        assert!(!conn.force());
        assert!(!conn.transaction_active());
        assert_eq!(count(&conn, "t"), 3);
    }

    #[test]
    fn test_roll_back_clears_state() {
        let (conn, _) = setup();
        conn.begin_transaction().unwrap();
        conn.set_force(true);
        conn.insert("t", &[("id", Value::from(1))], &ParamTypes::none());
        conn.roll_back().unwrap();

        assert!(!conn.force());
        assert!(!conn.transaction_active());
        assert_eq!(count(&conn, "t"), 0);
    }

    #[test]
    fn test_insert_sql_and_params() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.insert("t", &[("level", Value::from(5))], &ParamTypes::none());

        let record = last_record(&conn);
        assert_eq!(record.sql, "INSERT INTO t (`level`) VALUES (?)");
        assert_eq!(record.params, Some(vec![Value::from(5)]));
    }

    #[test]
    fn test_insert_prefix() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.execute_statement("CREATE TABLE xo_t (level INTEGER)", &[], &ParamTypes::none());
        let outcome = conn.insert_prefix("t", &[("level", Value::from(5))], &ParamTypes::none());
        assert_eq!(outcome.rows_affected(), 1);
        assert_eq!(last_record(&conn).sql, "INSERT INTO xo_t (`level`) VALUES (?)");
    }

    #[test]
    fn test_update_with_null_criteria() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.execute_statement("INSERT INTO t (id, name) VALUES (NULL, 'x'), (1, 'y')", &[], &ParamTypes::none());

        let outcome = conn.update(
            "t",
            &[("name", Value::from("a"))],
            &[("id", Value::Null)],
            &ParamTypes::none(),
        );
        assert_eq!(outcome.rows_affected(), 1);

        let record = last_record(&conn);
        assert_eq!(record.sql, "UPDATE t SET `name` = ? WHERE `id` IS NULL");
        assert_eq!(record.params, Some(vec![Value::from("a")]));
    }

    #[test]
    fn test_update_with_bound_criteria() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.execute_statement("INSERT INTO t (id, name) VALUES (1, 'x'), (2, 'y')", &[], &ParamTypes::none());

        let outcome = conn.update_prefix(
            "",
            &[("name", Value::from("z"))],
            &[("id", Value::from(2))],
            &ParamTypes::none(),
        );
        // "xo" does not exist
        assert!(outcome.is_failed());

        let outcome = conn.update(
            "t",
            &[("name", Value::from("z"))],
            &[("id", Value::from(2)), ("name", Value::from("y"))],
            &ParamTypes::none(),
        );
        assert_eq!(outcome.rows_affected(), 1);
        assert_eq!(
            last_record(&conn).sql,
            "UPDATE t SET `name` = ? WHERE `id` = ? AND `name` = ?"
        );
    }

    #[test]
    fn test_delete() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.execute_statement("INSERT INTO t (id) VALUES (NULL), (1), (2)", &[], &ParamTypes::none());

        let outcome = conn.delete("t", &[("id", Value::Null)], &ParamTypes::none());
        assert_eq!(outcome.rows_affected(), 1);
        assert_eq!(last_record(&conn).sql, "DELETE FROM t WHERE `id` IS NULL");

        let outcome = conn.delete("t", &[], &ParamTypes::none());
        assert_eq!(outcome.rows_affected(), 2);
        assert_eq!(count(&conn, "t"), 0);
    }

    #[test]
    fn test_named_types_are_applied() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.insert(
            "t",
            &[("name", Value::from(7)), ("level", Value::from("9"))],
            &ParamTypes::named(&[("level", ParamType::Integer)]),
        );

        let record = last_record(&conn);
        assert_eq!(record.types, Some(vec![ParamType::Auto, ParamType::Integer]));

        let rows = conn
            .execute_query("SELECT typeof(name), typeof(level) FROM t", &[], &ParamTypes::none())
            .unwrap();
        assert_eq!(rows.rows[0], vec![Value::from("text"), Value::from("integer")]);
    }

    #[test]
    fn test_untyped_values_keep_storage_class() {
        let (conn, _) = setup();
        conn.set_safe(true);
        conn.execute_statement("CREATE TABLE k (v, flag INTEGER)", &[], &ParamTypes::none());
        let outcome = conn.insert(
            "k",
            &[("v", Value::from(5)), ("flag", Value::from(false))],
            &ParamTypes::none(),
        );
        assert_eq!(outcome.rows_affected(), 1);

        let rows = conn
            .execute_query(
                "SELECT typeof(v), v, typeof(flag), flag FROM k",
                &[],
                &ParamTypes::none(),
            )
            .unwrap();
        assert_eq!(
            rows.rows[0],
            vec![
                Value::from("integer"),
                Value::Integer(5),
                Value::from("integer"),
                Value::Integer(0),
            ]
        );

        let matched = conn
            .execute_query(
                "SELECT COUNT(*) FROM k WHERE v = ?",
                &[Value::from(5)],
                &ParamTypes::none(),
            )
            .unwrap();
        assert_eq!(matched.scalar(), Some(&Value::Integer(1)));

        let bound = conn.safe_query("SELECT typeof(?)", &[Value::from(5)], &ParamTypes::none());
        assert_eq!(bound.rows().unwrap().scalar(), Some(&Value::from("integer")));
    }

    #[test]
    fn test_safe_query_select_is_always_allowed() {
        let (conn, _) = setup();
        let outcome = conn.safe_query("  select 1", &[], &ParamTypes::none());
        let rows = outcome.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.scalar(), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_safe_query_write_is_gated() {
        let (conn, events) = setup();
        let outcome = conn.query("DELETE FROM t", &[], &ParamTypes::none());
        assert!(outcome.is_denied());
        assert!(events.events().is_empty());

        conn.set_force(true);
        let outcome = conn.query(
            "INSERT INTO t (id) VALUES (?)",
            &[Value::from(1)],
            &ParamTypes::positional(&[ParamType::Integer]),
        );
        assert!(matches!(outcome, QueryOutcome::Affected(1)));
        assert!(!conn.force());
    }

    #[test]
    fn test_safe_query_failure() {
        let (conn, events) = setup();
        let outcome = conn.safe_query("SELECT * FROM missing", &[], &ParamTypes::none());
        assert!(outcome.is_failed());
        assert!(outcome.into_legacy().is_none());
        assert_eq!(events.count(EXCEPTION), 1);
        let exception = events
            .events()
            .into_iter()
            .find(|e| e.name == EXCEPTION)
            .unwrap();
        assert!(exception.payload["error"].as_str().unwrap().contains("missing"));
    }

    #[test]
    fn test_event_order_for_gated_write() {
        let (conn, events) = setup();
        conn.set_safe(true);
        conn.insert("t", &[("id", Value::from(1))], &ParamTypes::none());
        assert_eq!(
            events.names(),
            vec![QUERY_START, QUERY_BEGIN, QUERY_COMPLETE, QUERY_END]
        );
    }

    #[test]
    fn test_query_from_file() {
        let (conn, _) = setup();
        conn.set_safe(true);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "# test dump\n\
             CREATE TABLE users (uid INTEGER, uname TEXT);\n\
             INSERT INTO users VALUES (1, 'a;b');\n\
             INSERT INTO `users` VALUES (2, 'c');\n\
             SELECT * FROM users;\n"
        )
        .unwrap();

        assert!(conn.query_from_file(file.path()));
        assert_eq!(count(&conn, "xo_users"), 2);
        let rows = conn
            .execute_query("SELECT uname FROM xo_users WHERE uid = 1", &[], &ParamTypes::none())
            .unwrap();
        assert_eq!(rows.scalar(), Some(&Value::from("a;b")));
    }

    #[test]
    fn test_query_from_missing_file() {
        let (conn, _) = setup();
        assert!(!conn.query_from_file("/nonexistent/dump.sql"));
    }

    #[test]
    fn test_error_info() {
        let (conn, _) = setup();
        assert!(conn.error_info().is_empty());
        assert_eq!(conn.error_code(), None);

        conn.set_safe(true);
        conn.execute_statement("INSERT INTO missing VALUES (1)", &[], &ParamTypes::none());
        let info = conn.error_info();
        assert_eq!(info.sqlstate, "HY000");
        assert!(info.message.contains("missing"));
        assert_eq!(conn.error_code().as_deref(), Some("HY000"));
    }

    #[test]
    fn test_open_failure_hides_details() {
        let config = GateConfig {
            database_path: "/nonexistent/dir/db.sqlite3".to_string(),
            ..GateConfig::default()
        };
        let err = Connection::open(&config, Arc::new(crate::events::NullPublisher))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Cannot get database connection");
    }

    #[test]
    fn test_is_select() {
        assert!(is_select("SELECT 1"));
        assert!(is_select("\n  sElEcT *"));
        assert!(!is_select("INSERT INTO t"));
        assert!(!is_select("sel"));
        assert!(!is_select("WITH x AS (SELECT 1) SELECT * FROM x"));
    }
}
