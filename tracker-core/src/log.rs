//! Logging capability
//!
//! Embedding applications may route tracker messages to their own sink by
//! implementing [`LogSink`]. Without one, messages go to `tracing` at the
//! level matching their [`Severity`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Message severity, ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Information,
    Verbose,
}

/// Destination for tracker log messages
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Forwards messages to the configured sink, or to `tracing`
#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl Logger {
    pub fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub fn log(&self, severity: Severity, message: &str) {
        if let Some(sink) = &self.sink {
            sink.log(severity, message);
            return;
        }

        match severity {
            Severity::Critical | Severity::Error => tracing::error!(target: "tracker", "{}", message),
            Severity::Warning => tracing::warn!(target: "tracker", "{}", message),
            Severity::Information => tracing::info!(target: "tracker", "{}", message),
            Severity::Verbose => tracing::debug!(target: "tracker", "{}", message),
        }
    }

    pub fn error(&self, message: &str) {
        self.log(Severity::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Severity::Warning, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Severity::Information, message);
    }
}

/// Sink that keeps every message in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: parking_lot::Mutex<Vec<(Severity, String)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().clone()
    }

    /// Messages at `severity` or more severe
    pub fn at_least(&self, severity: Severity) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(s, _)| *s <= severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, severity: Severity, message: &str) {
        self.entries.lock().push((severity, message.to_string()));
    }
}
