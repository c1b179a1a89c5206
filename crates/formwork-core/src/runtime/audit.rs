// formwork-core/src/runtime/audit.rs
// ============================================================================
// Module: Formwork Audit Logging
// Description: Structured audit events for rendering, records, and settings.
// Purpose: Emit JSON-line audit logs without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every render, record write, install step, and settings change produces an
//! [`AuditEvent`]: an event label, a millisecond timestamp, and flat event
//! fields. Sinks serialize events as JSON lines to stderr or an append-only
//! file; the no-op sink discards them. Bearer tokens never appear in events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Inputs for a render audit event.
#[derive(Debug, Clone)]
pub struct RenderAuditParams {
    /// Request route.
    pub route: String,
    /// Resolved controller.
    pub controller: String,
    /// Response status.
    pub status: u16,
    /// Signed-in user id.
    pub user: Option<String>,
    /// Interface (`web` or `cli`).
    pub interface: &'static str,
    /// Render duration in milliseconds.
    pub elapsed_ms: u64,
}

impl AuditEvent {
    /// Creates an event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, fields: Value) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event,
            timestamp_ms,
            fields,
        }
    }

    /// Render pipeline outcome.
    #[must_use]
    pub fn render(params: RenderAuditParams) -> Self {
        Self::new(
            "render",
            json!({
                "route": params.route,
                "controller": params.controller,
                "status": params.status,
                "user": params.user,
                "interface": params.interface,
                "elapsed_ms": params.elapsed_ms,
            }),
        )
    }

    /// Committed record save.
    #[must_use]
    pub fn record_save(model: &str, id: i64, user: Option<&str>) -> Self {
        Self::new("record_save", json!({"model": model, "id": id, "user": user}))
    }

    /// Record deletion.
    #[must_use]
    pub fn record_delete(model: &str, id: i64, user: Option<&str>) -> Self {
        Self::new("record_delete", json!({"model": model, "id": id, "user": user}))
    }

    /// Table installation outcome for one model.
    #[must_use]
    pub fn install_model(model: &str, outcome: &str) -> Self {
        Self::new("install_model", json!({"model": model, "outcome": outcome}))
    }

    /// Settings change.
    #[must_use]
    pub fn settings_set(path: &str, deleted: bool, user: Option<&str>) -> Self {
        Self::new("settings_set", json!({"path": path, "deleted": deleted, "user": user}))
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for Formwork events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events.
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the labels of recorded events.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().map(|events| events.iter().map(|e| e.event).collect()).unwrap_or_default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn events_serialize_flat() {
        let event = AuditEvent::record_save("Crm/Customer", 4, Some("7"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "record_save");
        assert_eq!(value["model"], "Crm/Customer");
        assert_eq!(value["id"], 4);
        assert!(value["timestamp_ms"].as_u64().unwrap() > 0);
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(&AuditEvent::install_model("Crm/Customer", "created"));
        sink.record(&AuditEvent::settings_set("a/b", false, None));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "install_model");
    }

    #[test]
    fn memory_sink_collects_events() {
        let sink = MemoryAuditSink::new();
        sink.record(&AuditEvent::record_delete("Crm/Customer", 1, None));
        assert_eq!(sink.event_names(), vec!["record_delete"]);
    }
}
