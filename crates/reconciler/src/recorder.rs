//! Notifications about what the reconciler did to a source.

use std::sync::{Mutex, PoisonError};

use couchdb_source_apis::CouchDbSource;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Records events against a source. Fire and forget.
pub trait EventRecorder: Send + Sync {
    fn event(&self, source: &CouchDbSource, kind: EventKind, reason: &str, message: &str);
}

/// Recorder that only logs.
#[derive(Debug, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn event(&self, source: &CouchDbSource, kind: EventKind, reason: &str, message: &str) {
        match kind {
            EventKind::Normal => info!(
                namespace = source.namespace(),
                name = source.name(),
                reason,
                message,
                "Recorded event"
            ),
            EventKind::Warning => warn!(
                namespace = source.namespace(),
                name = source.name(),
                reason,
                message,
                "Recorded warning event"
            ),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub source: String,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// Recorder that keeps events in memory for assertions.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of all recorded events, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventRecorder for InMemoryRecorder {
    fn event(&self, source: &CouchDbSource, kind: EventKind, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                source: format!("{}/{}", source.namespace(), source.name()),
                kind,
                reason: reason.to_string(),
                message: message.to_string(),
            });
    }
}
