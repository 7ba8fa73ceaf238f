//! Audit sink implementations.
//!
//! Provides an in-memory ring buffer for testing and dev, and an append-only
//! JSON-lines file sink for persistence. Recording is best-effort: audit must
//! never block or fail the primary operation.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Namespace tag of the recording boundary (e.g. `client-queue`).
    pub namespace: String,
    /// Target module uid, where the command addressed one.
    pub uid: Option<String>,
    /// Command name as received on the wire.
    pub command: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Serialized command arguments.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Append-only JSON-lines audit sink.
pub struct JsonlAuditSink {
    writer: BufWriter<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the log file for appending.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&mut self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let written = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush());
                if let Err(e) = written {
                    tracing::error!(error = %e, "failed to append audit event");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode audit event"),
        }
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    event_id: impl Into<String>,
    namespace: impl Into<String>,
    uid: Option<String>,
    command: impl Into<String>,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: event_id.into(),
        namespace: namespace.into(),
        uid,
        command: command.into(),
        created_at_ms: now_ms(),
        payload,
    }
}
