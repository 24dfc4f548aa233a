//! JSON and xAPI trace encoding
//!
//! Both profiles share one record shape; they differ in key names
//! (`event`/`target` vs `verb`/`object`), in whether extension keys are
//! mapped to vocabulary URIs, and in layout (xAPI records are pretty-printed).

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use super::SerializeContext;
use crate::error::Result;
use crate::trace::event::{iso_timestamp, Extensions, TraceEvent, TraceResult};
use crate::trace::vocab;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Profile {
    Json,
    Xapi,
}

struct Actor<'a>(Option<&'a Value>);

impl Serialize for Actor<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Some(actor) => actor.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

#[derive(Serialize)]
struct VerbRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct Definition<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ObjectRef<'a> {
    id: String,
    definition: Definition<'a>,
}

#[derive(Serialize)]
struct Score {
    raw: f32,
}

struct MappedExtensions<'a> {
    extensions: &'a Extensions,
    map_keys: bool,
}

impl Serialize for MappedExtensions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.extensions.len()))?;
        for (key, value) in self.extensions.iter() {
            let key = if self.map_keys {
                vocab::extension_uri(key).unwrap_or(key)
            } else {
                key
            };
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct ResultRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<MappedExtensions<'a>>,
}

impl<'a> ResultRef<'a> {
    fn from_result(result: &'a TraceResult, profile: Profile) -> Option<Self> {
        if result.is_empty() {
            return None;
        }
        Some(Self {
            success: result.success,
            completion: result.completion,
            response: result.response.as_deref(),
            score: result.score.map(|raw| Score { raw }),
            extensions: (!result.extensions.is_empty()).then(|| MappedExtensions {
                extensions: &result.extensions,
                map_keys: profile == Profile::Xapi,
            }),
        })
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    actor: Actor<'a>,
    event: VerbRef<'a>,
    target: ObjectRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultRef<'a>>,
    timestamp: String,
}

#[derive(Serialize)]
struct XapiRecord<'a> {
    actor: Actor<'a>,
    verb: VerbRef<'a>,
    object: ObjectRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultRef<'a>>,
    timestamp: String,
}

pub(crate) fn event_to_json(
    event: &TraceEvent,
    ctx: &SerializeContext<'_>,
    profile: Profile,
) -> Result<String> {
    let actor = Actor(ctx.actor);
    let verb = VerbRef { id: event.verb.id() };
    let object = ObjectRef {
        id: ctx.object_id(&event.target.id),
        definition: Definition {
            kind: event.target.type_id(),
        },
    };
    let result = ResultRef::from_result(&event.result, profile);
    let timestamp = iso_timestamp(event.timestamp);

    let text = match profile {
        Profile::Json => serde_json::to_string(&JsonRecord {
            actor,
            event: verb,
            target: object,
            result,
            timestamp,
        })?,
        Profile::Xapi => serde_json::to_string_pretty(&XapiRecord {
            actor,
            verb,
            object,
            result,
            timestamp,
        })?,
    };
    Ok(text)
}

/// Wraps records as `[\r\n` + records joined by `,\r\n` + `\r\n]`
pub(crate) fn wrap_array(records: &[String]) -> String {
    format!("[\r\n{}\r\n]", records.join(",\r\n"))
}
