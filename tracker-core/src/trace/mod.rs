//! Trace model
//!
//! - [`event`]: trace events, results and extension values
//! - [`vocab`]: known verbs, target types and extension keys with their URIs
//! - [`validate`]: strict / lenient validation
//! - [`queue`]: the thread-safe live queue

pub mod event;
pub mod queue;
pub mod validate;
pub mod vocab;

pub use event::{
    ExtensionValue, Extensions, Timestamp, TraceEvent, TraceEventBuilder, TraceResult,
    TraceTarget, TraceVerb,
};
pub use queue::{QueueStats, TraceQueue};
pub use validate::Validator;
pub use vocab::Verb;
