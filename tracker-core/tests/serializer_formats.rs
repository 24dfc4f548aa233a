//! Wire format checks across the four trace formats.

use serde_json::{json, Value};
use tracker_core::serializer::csv::{batch_to_csv, escape_field, parse_csv_line};
use tracker_core::{serialize, SerializeContext, TraceEvent, TraceFormat, Validator};

fn scored_event() -> TraceEvent {
    TraceEvent::builder("completed", "quest", "Find, the \"key\"")
        .timestamp(1_700_000_000_123)
        .success(true)
        .score(0.9)
        .extension("progress", 1.0f32)
        .extension("mana", 7)
        .build(&Validator::strict())
        .expect("valid trace")
        .expect("strict build never drops")
}

#[test]
fn csv_line_survives_commas_quotes_and_backslashes() {
    let event = scored_event();
    let text = batch_to_csv(std::slice::from_ref(&event));
    assert!(text.ends_with("\r\n"));

    let parsed = TraceEvent::from_csv_line(&text).expect("parse back");
    assert_eq!(parsed.target.id, "Find, the \"key\"");
    assert_eq!(parsed.result.success, Some(true));
    assert_eq!(parsed.result.score, Some(0.9));
    assert_eq!(parsed.timestamp, 1_700_000_000_123);

    let path = r"C:\saves,slot1";
    assert_eq!(parse_csv_line(&escape_field(path)), vec![path.to_string()]);
}

#[test]
fn csv_batch_of_nothing_is_empty() {
    assert_eq!(batch_to_csv(&[]), "");
}

#[test]
fn json_and_xapi_use_different_key_names() {
    let actor = json!({"name": "p1"});
    let ctx = SerializeContext {
        actor: Some(&actor),
        object_prefix: "http://example.org/g/",
    };
    let events = [scored_event()];

    let json_text = serialize(&events, TraceFormat::Json, &ctx, &Validator::strict()).unwrap();
    let records: Vec<Value> = serde_json::from_str(&json_text).unwrap();
    let record = &records[0];
    assert_eq!(record["actor"]["name"], "p1");
    assert_eq!(record["event"]["id"], "http://adlnet.gov/expapi/verbs/completed");
    assert_eq!(record["target"]["id"], "http://example.org/g/Find, the \"key\"");
    assert_eq!(record["result"]["success"], true);
    assert_eq!(record["result"]["extensions"]["progress"], 1.0);
    assert_eq!(record["timestamp"], "2023-11-14T22:13:20.123Z");

    let xapi_text = serialize(&events, TraceFormat::Xapi, &ctx, &Validator::strict()).unwrap();
    let records: Vec<Value> = serde_json::from_str(&xapi_text).unwrap();
    let record = &records[0];
    assert!(record.get("event").is_none());
    assert_eq!(record["verb"]["id"], "http://adlnet.gov/expapi/verbs/completed");
    assert_eq!(
        record["object"]["definition"]["type"],
        "https://w3id.org/xapi/seriousgames/activity-types/quest"
    );
    assert_eq!(
        record["result"]["extensions"]["https://w3id.org/xapi/seriousgames/extensions/progress"],
        1.0
    );
    // Unknown extension keys are written as given
    assert_eq!(record["result"]["extensions"]["mana"], 7);
}

#[test]
fn strict_serializer_rejects_unknown_vocabulary() {
    let event = TraceEvent::new("danced", "level", "L1").unwrap();
    let ctx = SerializeContext::anonymous();

    assert!(serialize(&[event.clone()], TraceFormat::Json, &ctx, &Validator::strict()).is_err());
    let text = serialize(&[event.clone()], TraceFormat::Json, &ctx, &Validator::lenient()).unwrap();
    assert!(text.contains("\"id\":\"danced\""));
    assert!(serialize(&[event], TraceFormat::Csv, &ctx, &Validator::strict()).is_ok());
}

#[test]
fn xml_document_wraps_each_event() {
    let events = [
        TraceEvent::builder("accessed", "screen", "<menu>")
            .timestamp(5)
            .build(&Validator::strict())
            .unwrap()
            .unwrap(),
        TraceEvent::builder("used", "item", "potion")
            .timestamp(6)
            .build(&Validator::strict())
            .unwrap()
            .unwrap(),
    ];
    let doc = serialize(
        &events,
        TraceFormat::Xml,
        &SerializeContext::anonymous(),
        &Validator::strict(),
    )
    .unwrap();

    assert_eq!(
        doc,
        "<TrackEvents>\r\n\
         <TrackEvent timestamp=\"5\" event=\"accessed\" target=\"screen,&lt;menu&gt;\" />\r\n\
         <TrackEvent timestamp=\"6\" event=\"used\" target=\"item,potion\" />\r\n\
         </TrackEvents>"
    );
}
