//! # Tracker Core
//!
//! Client-side learning-analytics tracker. Applications emit small
//! structured traces ("player completed level 1 with score 0.8"); the tracker
//! queues them, batches them, serializes them as CSV, JSON, xAPI or XML, and
//! delivers them to a remote collector or to local storage.
//!
//! - **Nothing is lost on a bad connection**: failed batches wait in a
//!   backlog and are retried, in order, on the next flush
//! - **Callers are never blocked by delivery**: only malformed traces and
//!   out-of-order calls (tracing before `start()`) return errors
//! - **Everything external is a capability**: HTTP transport, storage and
//!   logging are traits supplied at construction
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tracker_core::{
//!     Capabilities, MockTransport, StorageType, TraceFormat, Tracker, TrackerConfig,
//! };
//!
//! let transport = Arc::new(MockTransport::always(
//!     200,
//!     r#"{"authToken":"t0k","actor":{"name":"player"},"objectId":"http://example.org/demo"}"#,
//! ));
//! let config = TrackerConfig::default()
//!     .with_storage_type(StorageType::Net)
//!     .with_trace_format(TraceFormat::Xapi)
//!     .with_tracking_code("demo-code");
//! let caps = Capabilities::builder().transport(transport.clone()).build();
//!
//! let tracker = Tracker::new(config, caps).unwrap();
//! tracker.start();
//! assert!(tracker.is_active());
//!
//! tracker.set_success(true);
//! tracker.action_trace("completed", "level", "Level1").unwrap();
//! tracker.flush();
//!
//! let sent = transport.requests_to("/track");
//! assert_eq!(sent.len(), 1);
//! assert!(sent[0].body.contains("http://example.org/demo/Level1"));
//! ```

pub mod config;
pub mod error;
pub mod extensions;
pub mod global;
pub mod log;
pub mod pipeline;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod trace;
pub mod tracker;
pub mod transport;
pub mod worker;

// Re-export main types
pub use config::{Capabilities, CapabilitiesBuilder, FlushMode, StorageType, TrackerConfig};
pub use error::{ErrorCategory, Result, TrackerError, VocabularyKind};
pub use extensions::PendingExtensions;
pub use log::{LogSink, Logger, MemoryLogSink, Severity};
pub use pipeline::{DeliveryPipeline, FlushOutcome, FlushReport, PipelineStats};
pub use serializer::{serialize, SerializeContext, TraceFormat};
pub use session::{SessionContext, SessionFlags, SessionPhase};
pub use storage::{AppendStorage, DataStorage, FileStorage, InMemoryStorage};
pub use trace::{
    ExtensionValue, Extensions, QueueStats, TraceEvent, TraceEventBuilder, TraceQueue,
    TraceResult, Validator, Verb,
};
pub use tracker::{Tracker, TrackerStats};
pub use transport::{Method, MockTransport, Request, Response, Transport};
pub use worker::FlushWorker;
