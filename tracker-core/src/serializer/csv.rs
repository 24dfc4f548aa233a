//! CSV trace encoding
//!
//! One line per event: `timestamp,verb,type,id` followed by `key,value`
//! pairs for the result fields and extensions. Commas and backslashes inside a
//! field are escaped with a backslash; there is no quoting.

use crate::trace::event::TraceEvent;
use crate::trace::vocab::keys;

const ESCAPE: char = '\\';
const SEPARATOR: char = ',';

/// Escapes separators and the escape character itself
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Splits a line on unescaped commas and unescapes each field
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(next) => current.push(next),
                None => current.push(ESCAPE),
            },
            SEPARATOR => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Renders one event as a CSV line, without the line terminator
pub fn event_to_csv(event: &TraceEvent) -> String {
    let mut fields: Vec<String> = vec![
        event.timestamp.to_string(),
        escape_field(event.verb.as_str()),
        escape_field(&event.target.kind),
        escape_field(&event.target.id),
    ];

    let result = &event.result;
    if let Some(success) = result.success {
        fields.push(keys::SUCCESS.to_string());
        fields.push(success.to_string());
    }
    if let Some(completion) = result.completion {
        fields.push(keys::COMPLETION.to_string());
        fields.push(completion.to_string());
    }
    if let Some(response) = &result.response {
        fields.push(keys::RESPONSE.to_string());
        fields.push(escape_field(response));
    }
    if let Some(score) = result.score {
        fields.push(keys::SCORE.to_string());
        fields.push(score.to_string());
    }
    for (key, value) in result.extensions.iter() {
        fields.push(escape_field(key));
        fields.push(escape_field(&value.to_csv_field()));
    }

    fields.join(",")
}

/// CRLF-joined lines with a trailing CRLF
pub fn batch_to_csv(events: &[TraceEvent]) -> String {
    let mut out = String::new();
    for event in events {
        out.push_str(&event_to_csv(event));
        out.push_str("\r\n");
    }
    out
}
