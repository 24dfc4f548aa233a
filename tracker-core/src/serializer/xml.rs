//! Minimal XML trace encoding
//!
//! Each event is a single self-closing `TrackEvent` element with timestamp,
//! event and target attributes. Result fields are not written: this is a
//! placeholder shape, not a full XML trace format.

use crate::trace::event::TraceEvent;

pub(crate) fn event_to_xml(event: &TraceEvent) -> String {
    format!(
        "<TrackEvent timestamp=\"{}\" event=\"{}\" target=\"{},{}\" />",
        event.timestamp,
        escape_attr(event.verb.as_str()),
        escape_attr(&event.target.kind),
        escape_attr(&event.target.id),
    )
}

pub(crate) fn wrap_document(records: &[String]) -> String {
    format!("<TrackEvents>\r\n{}\r\n</TrackEvents>", records.join("\r\n"))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
