//! Error types for tracker operations
//!
//! The tracker separates two kinds of failure:
//!
//! - **Caller errors** are returned immediately: a malformed trace, an unknown
//!   vocabulary term under strict mode, or an operation that is invalid for the
//!   current session state (e.g. enqueueing before `start()`).
//! - **Delivery failures** are never returned from `flush()`. Transport
//!   capabilities report them as [`TrackerError::Transport`], and the pipeline
//!   absorbs them into its backlog tiers and the `connected` flag.
//!
//! Every variant has a stable error code and a category so that embedding
//! applications can switch on them without matching message text.
//!
//! # Example
//!
//! ```rust
//! use tracker_core::error::{ErrorCategory, TrackerError};
//!
//! fn report(err: &TrackerError) {
//!     match err.category() {
//!         ErrorCategory::Validation => println!("bad trace: {}", err),
//!         ErrorCategory::State => println!("call start() first"),
//!         _ => println!("{}: {}", err.error_code(), err),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed trace field or extension
    Validation,
    /// Unknown verb or target type under strict mode
    Vocabulary,
    /// Operation invalid for the current session state
    State,
    /// Collector unreachable or rejected a request
    Transport,
    /// Storage capability failed
    Storage,
    /// Configuration problem
    Configuration,
    /// Internal error
    Internal,
}

/// Errors that can occur in tracker operations
#[derive(Error, Debug)]
pub enum TrackerError {
    // ═══════════════════════════════════════════════════════════════════════
    // Trace validation errors
    // ═══════════════════════════════════════════════════════════════════════

    /// A required trace field is missing or invalid
    #[error("Invalid trace field '{field}': {reason}")]
    TraceValidation { field: String, reason: String },

    /// Extension key is empty
    #[error("Extension key is null or empty.")]
    ExtensionKey,

    /// Extension value is empty or not a number
    #[error("Invalid value for extension '{key}': {reason}")]
    ExtensionValue { key: String, reason: String },

    /// A CSV trace line could not be parsed
    #[error("Malformed CSV trace: {reason}")]
    CsvParse { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Vocabulary errors (strict mode, JSON/xAPI only)
    // ═══════════════════════════════════════════════════════════════════════

    /// Term has no canonical URI in the known vocabulary
    #[error("Unknown definition for {kind}: '{value}'")]
    Vocabulary { kind: VocabularyKind, value: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Session state errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Trace enqueued before the tracker was started
    #[error("Tracker has not been started. Call start() before emitting traces.")]
    SessionNotStarted,

    /// A required capability (transport, storage) was not configured
    #[error("Capability not configured: {capability}")]
    CapabilityMissing { capability: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Delivery errors (absorbed by the pipeline, never returned from flush)
    // ═══════════════════════════════════════════════════════════════════════

    /// Transport failed or the collector answered with a non-allowed code
    #[error("Transport failure ({status}): {message}")]
    Transport { status: u16, message: String },

    /// Storage capability failed
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    Internal { reason: String },
}

/// Which vocabulary table a lookup failed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyKind {
    Verb,
    TargetType,
}

impl std::fmt::Display for VocabularyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VocabularyKind::Verb => write!(f, "verb"),
            VocabularyKind::TargetType => write!(f, "target type"),
        }
    }
}

impl TrackerError {
    /// Shorthand for a [`TrackerError::TraceValidation`]
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        TrackerError::TraceValidation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error might succeed on retry
    ///
    /// Only delivery-side failures are recoverable; validation and state
    /// errors need different input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrackerError::Transport { .. } | TrackerError::Storage { .. } | TrackerError::Io { .. }
        )
    }

    /// Returns true if this error was caused by the trace the caller supplied
    pub fn is_trace_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Vocabulary
        )
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            TrackerError::TraceValidation { .. }
            | TrackerError::ExtensionKey
            | TrackerError::ExtensionValue { .. }
            | TrackerError::CsvParse { .. } => ErrorCategory::Validation,

            TrackerError::Vocabulary { .. } => ErrorCategory::Vocabulary,

            TrackerError::SessionNotStarted | TrackerError::CapabilityMissing { .. } => {
                ErrorCategory::State
            }

            TrackerError::Transport { .. } => ErrorCategory::Transport,

            TrackerError::Storage { .. } | TrackerError::Io { .. } => ErrorCategory::Storage,

            TrackerError::InvalidConfig { .. } | TrackerError::Json(_) => {
                ErrorCategory::Configuration
            }

            TrackerError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            TrackerError::TraceValidation { .. } => "TRACE_VALIDATION",
            TrackerError::ExtensionKey => "EXTENSION_KEY",
            TrackerError::ExtensionValue { .. } => "EXTENSION_VALUE",
            TrackerError::CsvParse { .. } => "CSV_PARSE",
            TrackerError::Vocabulary { .. } => "UNKNOWN_VOCABULARY",
            TrackerError::SessionNotStarted => "SESSION_NOT_STARTED",
            TrackerError::CapabilityMissing { .. } => "CAPABILITY_MISSING",
            TrackerError::Transport { .. } => "TRANSPORT_FAILURE",
            TrackerError::Storage { .. } => "STORAGE_ERROR",
            TrackerError::InvalidConfig { .. } => "INVALID_CONFIG",
            TrackerError::Json(_) => "JSON_ERROR",
            TrackerError::Io { .. } => "IO_ERROR",
            TrackerError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Converts this error to a JSON-serializable response object
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                recoverable: self.is_recoverable(),
            },
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io {
            message: err.to_string(),
        }
    }
}

/// JSON-serializable error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail for JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "SESSION_NOT_STARTED")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
    /// Whether retry might succeed
    pub recoverable: bool,
}
