//! Trace event model
//!
//! A [`TraceEvent`] is one recorded occurrence: a verb applied to a target,
//! optionally carrying a [`TraceResult`]. The actor is not part of the event;
//! it belongs to the session and is attached by the serializer.
//!
//! Events are built through [`TraceEventBuilder`], which runs every field
//! through a [`Validator`]. In strict mode an invalid field is an error; in
//! lenient mode it is logged and either the field or the whole trace is
//! dropped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{TimeZone, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::validate::Validator;
use super::vocab::{self, keys, Verb};
use crate::error::{Result, TrackerError};
use crate::serializer::csv::parse_csv_line;

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// ISO-8601 rendering with millisecond precision and a `Z` suffix
pub fn iso_timestamp(ts: Timestamp) -> String {
    match Utc.timestamp_millis_opt(ts).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => "1970-01-01T00:00:00.000Z".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Extension values
// ═══════════════════════════════════════════════════════════════════════════

/// Value attached to an extension key
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    BoolMap(BTreeMap<String, bool>),
}

impl ExtensionValue {
    /// False for empty strings and NaN numbers
    pub fn is_present(&self) -> bool {
        match self {
            ExtensionValue::String(s) => !s.is_empty(),
            ExtensionValue::Float(f) => !f.is_nan(),
            ExtensionValue::Double(d) => !d.is_nan(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExtensionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ExtensionValue::Float(f) => Some(*f),
            ExtensionValue::Double(d) => Some(*d as f32),
            ExtensionValue::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    /// Plain-text rendering used by the CSV writer (before escaping)
    pub fn to_csv_field(&self) -> String {
        match self {
            ExtensionValue::Bool(b) => b.to_string(),
            ExtensionValue::Int(i) => i.to_string(),
            ExtensionValue::Float(f) => f.to_string(),
            ExtensionValue::Double(d) => d.to_string(),
            ExtensionValue::String(s) => s.clone(),
            ExtensionValue::BoolMap(map) => map
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("-"),
        }
    }

    /// Best-effort inverse of [`to_csv_field`](Self::to_csv_field).
    ///
    /// CSV carries no type information, so `1` reads back as `Int`, `0.5` as
    /// `Double` and `a=true-b=false` as a `BoolMap`.
    pub fn from_csv_field(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            return ExtensionValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return ExtensionValue::Bool(false);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ExtensionValue::Int(i);
        }
        if let Ok(d) = raw.parse::<f64>() {
            if d.is_finite() {
                return ExtensionValue::Double(d);
            }
        }
        if let Some(map) = parse_bool_map(raw) {
            return ExtensionValue::BoolMap(map);
        }
        ExtensionValue::String(raw.to_string())
    }
}

fn parse_bool_map(raw: &str) -> Option<BTreeMap<String, bool>> {
    let mut map = BTreeMap::new();
    for entry in raw.split('-') {
        let (k, v) = entry.split_once('=')?;
        if k.is_empty() {
            return None;
        }
        map.insert(k.to_string(), v.parse::<bool>().ok()?);
    }
    Some(map)
}

impl Serialize for ExtensionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ExtensionValue::Bool(b) => serializer.serialize_bool(*b),
            ExtensionValue::Int(i) => serializer.serialize_i64(*i),
            ExtensionValue::Float(f) => serializer.serialize_f32(*f),
            ExtensionValue::Double(d) => serializer.serialize_f64(*d),
            ExtensionValue::String(s) => serializer.serialize_str(s),
            ExtensionValue::BoolMap(map) => map.serialize(serializer),
        }
    }
}

impl fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_csv_field())
    }
}

impl From<bool> for ExtensionValue {
    fn from(v: bool) -> Self {
        ExtensionValue::Bool(v)
    }
}

impl From<i32> for ExtensionValue {
    fn from(v: i32) -> Self {
        ExtensionValue::Int(v.into())
    }
}

impl From<i64> for ExtensionValue {
    fn from(v: i64) -> Self {
        ExtensionValue::Int(v)
    }
}

impl From<f32> for ExtensionValue {
    fn from(v: f32) -> Self {
        ExtensionValue::Float(v)
    }
}

impl From<f64> for ExtensionValue {
    fn from(v: f64) -> Self {
        ExtensionValue::Double(v)
    }
}

impl From<&str> for ExtensionValue {
    fn from(v: &str) -> Self {
        ExtensionValue::String(v.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(v: String) -> Self {
        ExtensionValue::String(v)
    }
}

impl From<BTreeMap<String, bool>> for ExtensionValue {
    fn from(v: BTreeMap<String, bool>) -> Self {
        ExtensionValue::BoolMap(v)
    }
}

impl From<HashMap<String, bool>> for ExtensionValue {
    fn from(v: HashMap<String, bool>) -> Self {
        ExtensionValue::BoolMap(v.into_iter().collect())
    }
}

/// Insertion-ordered extension map; re-inserting a key replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions {
    entries: Vec<(String, ExtensionValue)>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ExtensionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<ExtensionValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtensionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Serialize for Extensions {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<ExtensionValue>> FromIterator<(K, V)> for Extensions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ext = Extensions::new();
        for (k, v) in iter {
            ext.insert(k, v);
        }
        ext
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Event parts
// ═══════════════════════════════════════════════════════════════════════════

/// Verb of a trace; known verbs are normalized to lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceVerb {
    raw: String,
    known: Option<Verb>,
}

impl TraceVerb {
    pub fn new(verb: &str) -> Self {
        match verb.parse::<Verb>() {
            Ok(known) => Self {
                raw: known.as_str().to_string(),
                known: Some(known),
            },
            Err(()) => Self {
                raw: verb.to_string(),
                known: None,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn known(&self) -> Option<Verb> {
        self.known
    }

    /// Canonical URI when known, else the raw verb
    pub fn id(&self) -> &str {
        match self.known {
            Some(v) => v.uri(),
            None => &self.raw,
        }
    }
}

impl From<Verb> for TraceVerb {
    fn from(v: Verb) -> Self {
        Self {
            raw: v.as_str().to_string(),
            known: Some(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceTarget {
    pub kind: String,
    pub id: String,
}

impl TraceTarget {
    /// Canonical URI of the type when known, else the raw type
    pub fn type_id(&self) -> &str {
        vocab::target_type_uri(&self.kind).unwrap_or(&self.kind)
    }

    pub fn is_known_type(&self) -> bool {
        vocab::target_type_uri(&self.kind).is_some()
    }
}

/// Optional outcome of a trace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceResult {
    pub success: Option<bool>,
    pub completion: Option<bool>,
    pub response: Option<String>,
    pub score: Option<f32>,
    pub extensions: Extensions,
}

impl TraceResult {
    pub fn is_empty(&self) -> bool {
        self.success.is_none()
            && self.completion.is_none()
            && self.response.is_none()
            && self.score.is_none()
            && self.extensions.is_empty()
    }

    /// Merges extensions into this result.
    ///
    /// The keys `success`, `completion`, `response` and `score` are lifted into
    /// their dedicated fields; anything else lands in `extensions`, replacing
    /// an existing value under the same key.
    pub fn merge_extensions(&mut self, extensions: &Extensions, validator: &Validator) -> Result<()> {
        for (key, value) in extensions.iter() {
            if !validator.check(
                !key.is_empty(),
                "Tracker: Extension key is null or empty. Ignoring extension.",
                || TrackerError::ExtensionKey,
            )? {
                continue;
            }
            if !validator.check(
                value.is_present(),
                &format!("Tracker: Extension '{}' has an empty value. Ignoring.", key),
                || TrackerError::ExtensionValue {
                    key: key.to_string(),
                    reason: "value can't be empty or NaN".to_string(),
                },
            )? {
                continue;
            }

            match key.to_ascii_lowercase().as_str() {
                keys::SUCCESS => {
                    if let Some(b) = typed(value.as_bool(), key, "expected a bool", validator)? {
                        self.success = Some(b);
                    }
                }
                keys::COMPLETION => {
                    if let Some(b) = typed(value.as_bool(), key, "expected a bool", validator)? {
                        self.completion = Some(b);
                    }
                }
                keys::RESPONSE => {
                    let text = match value {
                        ExtensionValue::String(s) => Some(s.clone()),
                        _ => None,
                    };
                    if let Some(s) = typed(text, key, "expected a string", validator)? {
                        self.response = Some(s);
                    }
                }
                keys::SCORE => {
                    if let Some(score) = typed(value.as_f32(), key, "expected a number", validator)? {
                        validator.warn_unit_range(score, "score");
                        self.score = Some(score);
                    }
                }
                _ => self.extensions.insert(key, value.clone()),
            }
        }
        Ok(())
    }
}

fn typed<T>(value: Option<T>, key: &str, reason: &str, validator: &Validator) -> Result<Option<T>> {
    if value.is_none() {
        validator.notify(
            &format!("Tracker: Extension '{}' {}. Ignoring.", key, reason),
            TrackerError::ExtensionValue {
                key: key.to_string(),
                reason: reason.to_string(),
            },
        )?;
    }
    Ok(value)
}

// ═══════════════════════════════════════════════════════════════════════════
// Trace event
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub timestamp: Timestamp,
    pub verb: TraceVerb,
    pub target: TraceTarget,
    pub result: TraceResult,
}

impl TraceEvent {
    pub fn builder(
        verb: impl Into<String>,
        kind: impl Into<String>,
        id: impl Into<String>,
    ) -> TraceEventBuilder {
        TraceEventBuilder::new(verb, kind, id)
    }

    /// Builds an event with strict validation and no result
    pub fn new(verb: &str, kind: &str, id: &str) -> Result<Self> {
        Self::builder(verb, kind, id)
            .build(&Validator::strict())?
            .ok_or_else(|| TrackerError::Internal {
                reason: "strict validation dropped a trace".to_string(),
            })
    }

    /// Rebuilds an event from one line written by the CSV serializer.
    ///
    /// Layout: `timestamp,verb,type,id[,key,value]*`. The keys `success`,
    /// `completion`, `response` and `score` go back into the result fields.
    pub fn from_csv_line(line: &str) -> Result<Self> {
        let parts = parse_csv_line(line.trim_end_matches(['\r', '\n']));
        if parts.len() < 4 {
            return Err(TrackerError::CsvParse {
                reason: format!("expected at least 4 fields, found {}", parts.len()),
            });
        }
        if (parts.len() - 4) % 2 != 0 {
            return Err(TrackerError::CsvParse {
                reason: "result fields must come in key,value pairs".to_string(),
            });
        }

        let timestamp = parts[0].parse::<Timestamp>().map_err(|e| TrackerError::CsvParse {
            reason: format!("invalid timestamp '{}': {}", parts[0], e),
        })?;

        let mut extensions = Extensions::new();
        for pair in parts[4..].chunks(2) {
            let (key, raw) = (pair[0].as_str(), pair[1].as_str());
            let value = match key {
                keys::RESPONSE => ExtensionValue::String(raw.to_string()),
                keys::SCORE => raw.parse::<f32>().map(ExtensionValue::Float).map_err(|e| {
                    TrackerError::CsvParse {
                        reason: format!("invalid score '{}': {}", raw, e),
                    }
                })?,
                _ => ExtensionValue::from_csv_field(raw),
            };
            extensions.insert(key, value);
        }

        let mut event = Self::builder(parts[1].as_str(), parts[2].as_str(), parts[3].as_str())
            .timestamp(timestamp)
            .build(&Validator::strict())?
            .ok_or_else(|| TrackerError::Internal {
                reason: "strict validation dropped a trace".to_string(),
            })?;
        event.result.merge_extensions(&extensions, &Validator::strict())?;
        Ok(event)
    }
}

/// Validating builder for [`TraceEvent`]
#[derive(Debug, Clone)]
pub struct TraceEventBuilder {
    verb: String,
    kind: String,
    id: String,
    timestamp: Option<Timestamp>,
    success: Option<bool>,
    completion: Option<bool>,
    response: Option<String>,
    score: Option<f32>,
    extensions: Extensions,
}

impl TraceEventBuilder {
    pub fn new(verb: impl Into<String>, kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            kind: kind.into(),
            id: id.into(),
            timestamp: None,
            success: None,
            completion: None,
            response: None,
            score: None,
            extensions: Extensions::new(),
        }
    }

    /// Overrides the construction timestamp
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn completion(mut self, completion: bool) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key, value);
        self
    }

    /// Validates and builds the event.
    ///
    /// Returns `Ok(None)` when lenient validation dropped the whole trace.
    pub fn build(self, validator: &Validator) -> Result<Option<TraceEvent>> {
        let key_fields_ok = validator.require_text(&self.verb, "verb")?
            && validator.require_text(&self.kind, "target type")?
            && validator.require_text(&self.id, "target id")?;
        if !key_fields_ok {
            return Ok(None);
        }

        let mut result = TraceResult {
            success: self.success,
            completion: self.completion,
            ..TraceResult::default()
        };

        if let Some(response) = self.response {
            if validator.require_text(&response, "response")? {
                result.response = Some(response);
            }
        }

        if let Some(score) = self.score {
            if validator.require_number(score, "score")? {
                validator.warn_unit_range(score, "score");
                result.score = Some(score);
            }
        }

        result.merge_extensions(&self.extensions, validator)?;

        Ok(Some(TraceEvent {
            timestamp: self.timestamp.unwrap_or_else(now_millis),
            verb: TraceVerb::new(&self.verb),
            target: TraceTarget {
                kind: self.kind,
                id: self.id,
            },
            result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::log::{Logger, MemoryLogSink};

    fn lenient_with_sink() -> (Validator, Arc<MemoryLogSink>) {
        let sink = Arc::new(MemoryLogSink::new());
        (Validator::new(false, Logger::new(Some(sink.clone()))), sink)
    }

    #[test]
    fn test_known_verb_is_lowercased() {
        let event = TraceEvent::new("Completed", "level", "Level1").unwrap();
        assert_eq!(event.verb.as_str(), "completed");
        assert_eq!(event.verb.known(), Some(Verb::Completed));
        assert_eq!(event.verb.id(), "http://adlnet.gov/expapi/verbs/completed");
    }

    #[test]
    fn test_unknown_verb_passes_through() {
        let event = TraceEvent::new("Danced", "npc", "Bob").unwrap();
        assert_eq!(event.verb.as_str(), "Danced");
        assert_eq!(event.verb.id(), "Danced");
        assert!(event.target.is_known_type());
    }

    #[test]
    fn test_strict_rejects_empty_key_fields() {
        let err = TraceEvent::new("", "level", "L1").unwrap_err();
        assert_eq!(err.error_code(), "TRACE_VALIDATION");
        assert!(TraceEvent::new("completed", "", "L1").is_err());
        assert!(TraceEvent::new("completed", "level", "").is_err());
    }

    #[test]
    fn test_lenient_drops_whole_trace() {
        let (v, sink) = lenient_with_sink();
        let event = TraceEvent::builder("completed", "level", "").build(&v).unwrap();
        assert!(event.is_none());
        assert!(sink.contains("target id"));
    }

    #[test]
    fn test_lenient_drops_invalid_field_only() {
        let (v, _sink) = lenient_with_sink();
        let event = TraceEvent::builder("selected", "menu", "start")
            .score(f32::NAN)
            .response("")
            .success(true)
            .build(&v)
            .unwrap()
            .unwrap();
        assert_eq!(event.result.score, None);
        assert_eq!(event.result.response, None);
        assert_eq!(event.result.success, Some(true));
    }

    #[test]
    fn test_strict_rejects_nan_score() {
        let err = TraceEvent::builder("progressed", "level", "L1")
            .score(f32::NAN)
            .build(&Validator::strict())
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTENSION_VALUE");
    }

    #[test]
    fn test_out_of_range_score_is_kept_with_warning() {
        let (v, sink) = lenient_with_sink();
        let event = TraceEvent::builder("progressed", "level", "L1")
            .score(3.0)
            .build(&v)
            .unwrap()
            .unwrap();
        assert_eq!(event.result.score, Some(3.0));
        assert!(sink.contains("recommended between 0 and 1"));
    }

    #[test]
    fn test_special_extension_keys_are_lifted() {
        let event = TraceEvent::builder("completed", "quest", "Q1")
            .extension("success", true)
            .extension("score", 0.75f32)
            .extension("response", "yes")
            .extension("mana", 12)
            .build(&Validator::strict())
            .unwrap()
            .unwrap();

        assert_eq!(event.result.success, Some(true));
        assert_eq!(event.result.score, Some(0.75));
        assert_eq!(event.result.response.as_deref(), Some("yes"));
        assert_eq!(event.result.extensions.len(), 1);
        assert_eq!(event.result.extensions.get("mana"), Some(&ExtensionValue::Int(12)));
    }

    #[test]
    fn test_mistyped_special_key_is_rejected_in_strict() {
        let err = TraceEvent::builder("completed", "quest", "Q1")
            .extension("success", "maybe")
            .build(&Validator::strict())
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTENSION_VALUE");
    }

    #[test]
    fn test_extensions_keep_insertion_order() {
        let mut ext = Extensions::new();
        ext.insert("b", 1);
        ext.insert("a", 2);
        ext.insert("b", 3);
        let keys: Vec<_> = ext.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(ext.get("b"), Some(&ExtensionValue::Int(3)));
        assert_eq!(serde_json::to_string(&ext).unwrap(), r#"{"b":3,"a":2}"#);
    }

    #[test]
    fn test_bool_map_csv_rendering() {
        let mut map = BTreeMap::new();
        map.insert("door".to_string(), true);
        map.insert("key".to_string(), false);
        let value = ExtensionValue::from(map.clone());
        assert_eq!(value.to_csv_field(), "door=true-key=false");
        assert_eq!(ExtensionValue::from_csv_field("door=true-key=false"), value);
    }

    #[test]
    fn test_from_csv_field_inference() {
        assert_eq!(ExtensionValue::from_csv_field("true"), ExtensionValue::Bool(true));
        assert_eq!(ExtensionValue::from_csv_field("42"), ExtensionValue::Int(42));
        assert_eq!(ExtensionValue::from_csv_field("0.5"), ExtensionValue::Double(0.5));
        assert_eq!(
            ExtensionValue::from_csv_field("cave-entrance"),
            ExtensionValue::String("cave-entrance".to_string())
        );
    }

    #[test]
    fn test_from_csv_line() {
        let event = TraceEvent::from_csv_line(
            "1500000000000,completed,level,Level\\,1,success,true,score,0.5,mana,3\r\n",
        )
        .unwrap();
        assert_eq!(event.timestamp, 1_500_000_000_000);
        assert_eq!(event.target.id, "Level,1");
        assert_eq!(event.result.success, Some(true));
        assert_eq!(event.result.score, Some(0.5));
        assert_eq!(event.result.extensions.get("mana"), Some(&ExtensionValue::Int(3)));
    }

    #[test]
    fn test_from_csv_line_rejects_short_or_unpaired() {
        assert!(TraceEvent::from_csv_line("1,completed,level").is_err());
        assert!(TraceEvent::from_csv_line("1,completed,level,L1,success").is_err());
        assert!(TraceEvent::from_csv_line("now,completed,level,L1").is_err());
    }

    #[test]
    fn test_iso_timestamp() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_500_000_000_123), "2017-07-14T02:40:00.123Z");
    }
}
