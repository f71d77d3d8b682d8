//! Per-statement query log

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::database::value::{ParamType, Value};
use crate::events::{EventPublisher, QUERY_BEGIN, QUERY_COMPLETE};

/// One logged statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub sql: String,
    pub params: Option<Vec<Value>>,
    pub types: Option<Vec<ParamType>>,
    /// Wall time in milliseconds; zero until the statement completed
    pub execution_ms: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct LoggerState {
    current_index: usize,
    queries: BTreeMap<usize, QueryRecord>,
    enabled: bool,
    start: Option<Instant>,
}

/// Records every statement that passes through the logging middleware
///
/// Indexes start at 1 and grow by one per logged statement. While the logger
/// is disabled nothing is recorded and the index stays where it is.
///
/// The logger is shared between the connection and the middleware, so its
/// state lives behind a mutex.
pub struct QueryLogger {
    state: Mutex<LoggerState>,
    events: Arc<dyn EventPublisher>,
}

impl QueryLogger {
    pub fn new(events: Arc<dyn EventPublisher>) -> Self {
        Self {
            state: Mutex::new(LoggerState {
                current_index: 0,
                queries: BTreeMap::new(),
                enabled: true,
                start: None,
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin timing a statement
    pub fn start_query(&self, sql: &str, params: Option<&[Value]>, types: Option<&[ParamType]>) {
        let payload = {
            let mut state = self.state();
            if !state.enabled {
                return;
            }
            state.current_index += 1;
            let index = state.current_index;
            let record = QueryRecord {
                sql: sql.to_string(),
                params: params.map(<[Value]>::to_vec),
                types: types.map(<[ParamType]>::to_vec),
                execution_ms: 0.0,
                started_at: Utc::now(),
            };
            let payload = json!({ "index": index, "query": &record });
            state.queries.insert(index, record);
            state.start = Some(Instant::now());
            payload
        };
        self.events.publish(QUERY_BEGIN, payload);
    }

    /// Stop timing the current statement
    ///
    /// Does nothing while disabled or before any statement was started.
    pub fn stop_query(&self) {
        let payload = {
            let mut state = self.state();
            if !state.enabled || state.current_index == 0 {
                return;
            }
            let elapsed = state
                .start
                .take()
                .map(|start| start.elapsed().as_secs_f64() * 1000.0)
                .unwrap_or(0.0);
            let index = state.current_index;
            let Some(record) = state.queries.get_mut(&index) else {
                return;
            };
            record.execution_ms = elapsed;
            tracing::debug!(
                index,
                sql = %record.sql,
                execution_ms = record.execution_ms,
                "query completed"
            );
            json!({ "index": index, "query": &*record })
        };
        self.events.publish(QUERY_COMPLETE, payload);
    }

    /// Start a statement and return a guard that stops it when dropped
    pub fn track(
        &self,
        sql: &str,
        params: Option<&[Value]>,
        types: Option<&[ParamType]>,
    ) -> QueryGuard<'_> {
        self.start_query(sql, params, types);
        QueryGuard { logger: self }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn current_index(&self) -> usize {
        self.state().current_index
    }

    /// Snapshot of all records, ordered by index
    pub fn queries(&self) -> Vec<(usize, QueryRecord)> {
        self.state()
            .queries
            .iter()
            .map(|(i, r)| (*i, r.clone()))
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<QueryRecord> {
        self.state().queries.get(&index).cloned()
    }

    /// Drop all records; the index keeps counting from where it was
    pub fn clear(&self) {
        let mut state = self.state();
        state.queries.clear();
        state.start = None;
    }
}

/// Stops the tracked statement on drop, including during unwinding
#[must_use = "the statement is stopped as soon as the guard is dropped"]
pub struct QueryGuard<'l> {
    logger: &'l QueryLogger,
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.logger.stop_query();
    }
}
