//! Event publishing
//!
//! The database layer reports what it does through an injected
//! [`EventPublisher`]. Publishing is observation only: nothing a publisher does
//! can influence the statement being executed.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::{Mutex, PoisonError};

/// Published right before a gated statement reaches the driver
pub const QUERY_START: &str = "core.database.query.start";
/// Published after a gated statement returned from the driver, successful or not
pub const QUERY_END: &str = "core.database.query.end";
/// Published by the query logger when a statement is about to run
pub const QUERY_BEGIN: &str = "core.database.query.begin";
/// Published by the query logger with the completed query record
pub const QUERY_COMPLETE: &str = "core.database.query.complete";
/// Published when a driver error was caught on a gated path
pub const EXCEPTION: &str = "core.exception";

/// Sink for named events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &str, payload: JsonValue);
}

/// Publisher that forwards every event to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: &str, payload: JsonValue) {
        if event == EXCEPTION {
            tracing::warn!(event, %payload, "database exception");
        } else {
            tracing::debug!(event, %payload);
        }
    }
}

/// Publisher that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: &str, _payload: JsonValue) {}
}

/// An event captured by [`MemoryPublisher`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: JsonValue,
}

/// Publisher that keeps every event in memory
///
/// Useful for debug tooling that wants to display the statements of a request
/// after the fact.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured events, oldest first
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of all captured events, oldest first
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Number of captured events with the given name
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name == name)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventPublisher for MemoryPublisher {
    fn publish(&self, event: &str, payload: JsonValue) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedEvent {
                name: event.to_string(),
                payload,
            });
    }
}
