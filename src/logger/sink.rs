//! Audit sink: the seam through which maintenance operations report checkpoints.
//!
//! Operations never format log lines themselves. They build an [`AuditEvent`]
//! and hand it to whatever sink the caller wired in: the JSONL activity log in
//! production, a [`MemorySink`] in tests, or [`NullSink`] when nothing should
//! be recorded.

#![allow(missing_docs)]

use std::path::Path;

use crate::core::config::AuditConfig;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// One audit checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event: EventType,
    pub severity: Severity,
    pub message: String,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub error_code: Option<String>,
}

impl AuditEvent {
    pub fn new(event: EventType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            event,
            severity,
            message: message.into(),
            path: None,
            size: None,
            error_code: None,
        }
    }

    pub fn info(event: EventType, message: impl Into<String>) -> Self {
        Self::new(event, Severity::Info, message)
    }

    pub fn warning(event: EventType, message: impl Into<String>) -> Self {
        Self::new(event, Severity::Warning, message)
    }

    pub fn error(event: EventType, message: impl Into<String>) -> Self {
        Self::new(event, Severity::Error, message)
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_string_lossy().into_owned());
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }
}

/// Destination for audit events.
pub trait AuditSink {
    fn emit(&mut self, event: AuditEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn emit(&mut self, _event: AuditEvent) {}
}

/// Sink that keeps events in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<AuditEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of one type, in emission order.
    pub fn of(&self, event: EventType) -> Vec<&AuditEvent> {
        self.events.iter().filter(|e| e.event == event).collect()
    }
}

impl AuditSink for MemorySink {
    fn emit(&mut self, event: AuditEvent) {
        self.events.push(event);
    }
}

/// Production sink: stamps events with the configured identifiers and appends
/// them to the JSONL activity log.
pub struct JsonlSink {
    writer: JsonlWriter,
    audit: AuditConfig,
}

impl JsonlSink {
    pub fn open(config: JsonlConfig, audit: AuditConfig) -> Self {
        Self {
            writer: JsonlWriter::open(config),
            audit,
        }
    }

    /// Degradation state of the underlying writer.
    pub fn state(&self) -> &str {
        self.writer.state()
    }

    pub fn flush(&mut self) {
        self.writer.flush();
    }
}

impl AuditSink for JsonlSink {
    fn emit(&mut self, event: AuditEvent) {
        let mut entry = LogEntry::new(&self.audit, event.event, event.severity, event.message);
        entry.path = event.path;
        entry.size = event.size;
        entry.error_code = event.error_code;
        self.writer.write_entry(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order_and_filters() {
        let mut sink = MemorySink::new();
        sink.emit(AuditEvent::info(EventType::RunStart, "start"));
        sink.emit(AuditEvent::warning(EventType::Discrepancy, "missing a"));
        sink.emit(AuditEvent::warning(EventType::Discrepancy, "missing b"));
        sink.emit(AuditEvent::info(EventType::RunSummary, "done"));

        assert_eq!(sink.events.len(), 4);
        let discrepancies = sink.of(EventType::Discrepancy);
        assert_eq!(discrepancies.len(), 2);
        assert_eq!(discrepancies[1].message, "missing b");
    }

    #[test]
    fn jsonl_sink_writes_stamped_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut config = JsonlConfig::at(&path);
        config.fallback_path = None;
        let audit = AuditConfig {
            source: "PipMirror".to_string(),
            ..AuditConfig::default()
        };
        let mut sink = JsonlSink::open(config, audit);

        sink.emit(
            AuditEvent::info(EventType::ArtifactDeleted, "deleted old wheel")
                .with_path(Path::new("/mirror/pkg-0.9.0-cp311-win_amd64.whl"))
                .with_size(42),
        );
        sink.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(parsed["source"], "PipMirror");
        assert_eq!(parsed["event"], "artifact_deleted");
        assert_eq!(parsed["event_id"], 1010);
        assert_eq!(parsed["size"], 42);
        assert!(
            parsed["path"]
                .as_str()
                .unwrap()
                .ends_with("pkg-0.9.0-cp311-win_amd64.whl")
        );
    }
}
