use crate::serializer::TraceFormat;

/// Appends a serialized batch to the existing contents of the primary log.
///
/// JSON and xAPI logs hold a single top-level array: the previous closing
/// `\r\n]` becomes `,\r\n` and the new batch loses its opening `[\r\n`, so
/// the file stays one growing array. CSV and XML batches are concatenated.
pub fn merge_local_log(previous: &str, batch: &str, format: TraceFormat) -> String {
    if previous.is_empty() {
        return batch.to_string();
    }
    if !format.is_json_array() {
        return format!("{}{}", previous, batch);
    }

    let head = match previous.strip_suffix("\r\n]") {
        Some(open) => format!("{},\r\n", open),
        None => previous.replace("\r\n]", ",\r\n"),
    };
    let tail = batch.strip_prefix("[\r\n").unwrap_or(batch);
    format!("{}{}", head, tail)
}
