//! Strict / lenient validation
//!
//! A [`Validator`] carries the tracker's strict-mode switch. Every check takes
//! the message to log in lenient mode and the error to return in strict mode;
//! callers decide what "degrade gracefully" means (drop a field, drop the
//! whole trace) based on the returned `bool`.

use crate::error::{Result, TrackerError};
use crate::log::Logger;

#[derive(Debug, Clone)]
pub struct Validator {
    strict: bool,
    logger: Logger,
}

impl Validator {
    pub fn new(strict: bool, logger: Logger) -> Self {
        Self { strict, logger }
    }

    /// Strict validator that logs through `tracing`
    pub fn strict() -> Self {
        Self::new(true, Logger::default())
    }

    /// Lenient validator that logs through `tracing`
    pub fn lenient() -> Self {
        Self::new(false, Logger::default())
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Returns `Ok(true)` when `ok` holds. Otherwise fails in strict mode, or
    /// logs `warning` and returns `Ok(false)` in lenient mode.
    pub fn check(
        &self,
        ok: bool,
        warning: &str,
        error: impl FnOnce() -> TrackerError,
    ) -> Result<bool> {
        if ok {
            return Ok(true);
        }
        self.notify(warning, error())?;
        Ok(false)
    }

    /// Reports a violation: error in strict mode, warning otherwise
    pub fn notify(&self, warning: &str, error: TrackerError) -> Result<()> {
        if self.strict {
            return Err(error);
        }
        self.logger.warn(warning);
        Ok(())
    }

    /// Non-empty string check used for verbs, target fields and responses
    pub fn require_text(&self, value: &str, field: &str) -> Result<bool> {
        self.check(
            !value.is_empty(),
            &format!("Tracker: {} can't be null or empty, ignoring.", field),
            || TrackerError::validation(field, "can't be null or empty"),
        )
    }

    /// Not-NaN check used for scores and health
    pub fn require_number(&self, value: f32, field: &str) -> Result<bool> {
        self.check(
            !value.is_nan(),
            &format!("Tracker: {} can't be NaN, ignoring.", field),
            || TrackerError::ExtensionValue {
                key: field.to_string(),
                reason: "can't be null or NaN".to_string(),
            },
        )
    }

    /// Logs a warning when `value` falls outside `[0, 1]`; never rejects
    pub fn warn_unit_range(&self, value: f32, field: &str) {
        if !(0.0..=1.0).contains(&value) {
            self.logger.warn(&format!(
                "Tracker: {} recommended between 0 and 1 (Current: {})",
                field, value
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::log::{MemoryLogSink, Severity};

    #[test]
    fn test_strict_check_returns_error() {
        let v = Validator::strict();
        let err = v.require_text("", "verb").unwrap_err();
        assert_eq!(err.error_code(), "TRACE_VALIDATION");
        assert!(v.require_text("completed", "verb").unwrap());
    }

    #[test]
    fn test_lenient_check_logs_and_degrades() {
        let sink = Arc::new(MemoryLogSink::new());
        let v = Validator::new(false, Logger::new(Some(sink.clone())));

        assert!(!v.require_text("", "target id").unwrap());
        assert!(!v.require_number(f32::NAN, "score").unwrap());
        assert_eq!(sink.at_least(Severity::Warning).len(), 2);
    }

    #[test]
    fn test_unit_range_only_warns() {
        let sink = Arc::new(MemoryLogSink::new());
        let v = Validator::new(true, Logger::new(Some(sink.clone())));

        v.warn_unit_range(0.5, "score");
        assert!(sink.entries().is_empty());

        v.warn_unit_range(1.5, "score");
        assert!(sink.contains("score recommended between 0 and 1"));
    }
}
