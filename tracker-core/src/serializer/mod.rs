//! Trace serialization
//!
//! [`serialize`] turns a batch of events into the text of one of four wire
//! formats:
//!
//! | Format | Item | Batch |
//! |--------|------|-------|
//! | CSV  | `timestamp,verb,type,id[,key,value]*` | lines joined and terminated by CRLF |
//! | JSON | `{actor, event, target, result?, timestamp}` | `[\r\n` … `,\r\n` … `\r\n]` |
//! | xAPI | `{actor, verb, object, result?, timestamp}` | same array wrapping as JSON |
//! | XML  | `<TrackEvent … />` | `<TrackEvents>` element, one event per line |
//!
//! Serialization is pure: the session supplies the actor and object-id prefix
//! through a [`SerializeContext`].

pub mod csv;
mod json;
mod xml;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TrackerError, VocabularyKind};
use crate::trace::event::TraceEvent;
use crate::trace::validate::Validator;

use json::Profile;

/// Wire format of serialized batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    #[default]
    Csv,
    Json,
    Xapi,
    Xml,
}

impl TraceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceFormat::Csv => "csv",
            TraceFormat::Json => "json",
            TraceFormat::Xapi => "xapi",
            TraceFormat::Xml => "xml",
        }
    }

    /// JSON and xAPI require verbs and target types from the known vocabulary
    /// under strict mode
    pub fn enforces_vocabulary(&self) -> bool {
        matches!(self, TraceFormat::Json | TraceFormat::Xapi)
    }

    /// Formats whose batches are JSON arrays
    pub fn is_json_array(&self) -> bool {
        self.enforces_vocabulary()
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceFormat {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(TraceFormat::Csv),
            "json" => Ok(TraceFormat::Json),
            "xapi" => Ok(TraceFormat::Xapi),
            "xml" => Ok(TraceFormat::Xml),
            other => Err(TrackerError::InvalidConfig {
                reason: format!("unknown trace format '{}'", other),
            }),
        }
    }
}

/// Session data the JSON and xAPI writers attach to each record
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeContext<'a> {
    /// Actor object from the connect handshake; `{}` when absent
    pub actor: Option<&'a Value>,
    /// Prepended to target ids while an actor is present
    pub object_prefix: &'a str,
}

impl<'a> SerializeContext<'a> {
    /// No actor: ids are written raw
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn object_id(&self, id: &str) -> String {
        match self.actor {
            Some(_) => format!("{}{}", self.object_prefix, id),
            None => id.to_string(),
        }
    }
}

/// Checks an event against the known vocabulary.
///
/// Fails in strict mode for an unknown verb or target type, logs a warning in
/// lenient mode. Returns `Ok(false)` when a term was unknown.
pub fn check_vocabulary(event: &TraceEvent, validator: &Validator) -> Result<bool> {
    let verb_ok = validator.check(
        event.verb.known().is_some(),
        &format!("Tracker: Unknown definition for verb: {}", event.verb.as_str()),
        || TrackerError::Vocabulary {
            kind: VocabularyKind::Verb,
            value: event.verb.as_str().to_string(),
        },
    )?;
    let type_ok = validator.check(
        event.target.is_known_type(),
        &format!(
            "Tracker: Unknown definition for target type: {}",
            event.target.kind
        ),
        || TrackerError::Vocabulary {
            kind: VocabularyKind::TargetType,
            value: event.target.kind.clone(),
        },
    )?;
    Ok(verb_ok && type_ok)
}

/// Serializes a batch in the given format.
///
/// For JSON and xAPI every event is first checked with [`check_vocabulary`];
/// unknown terms are written as their raw strings when the validator is
/// lenient. CSV and XML never check vocabulary.
pub fn serialize(
    events: &[TraceEvent],
    format: TraceFormat,
    ctx: &SerializeContext<'_>,
    validator: &Validator,
) -> Result<String> {
    match format {
        TraceFormat::Csv => Ok(csv::batch_to_csv(events)),
        TraceFormat::Xml => {
            let records: Vec<String> = events.iter().map(xml::event_to_xml).collect();
            Ok(xml::wrap_document(&records))
        }
        TraceFormat::Json | TraceFormat::Xapi => {
            let profile = if format == TraceFormat::Json {
                Profile::Json
            } else {
                Profile::Xapi
            };
            let mut records = Vec::with_capacity(events.len());
            for event in events {
                check_vocabulary(event, validator)?;
                records.push(json::event_to_json(event, ctx, profile)?);
            }
            Ok(json::wrap_array(&records))
        }
    }
}
