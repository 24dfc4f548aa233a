//! End-to-end flush behaviour: backlog tiers, ordering, local logs and
//! backups, driven through the public `Tracker` API with scripted transports.

use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tracker_core::{
    Capabilities, FlushOutcome, FlushReport, InMemoryStorage, MockTransport, StorageType,
    TraceFormat, Tracker, TrackerConfig,
};

const HANDSHAKE: &str = r#"{"authToken":"auth-1","playerId":"p1","objectId":"http://example.org/games/demo","actor":{"name":"p1","account":{"homePage":"http://example.org","name":"p1"}}}"#;

fn net_config() -> TrackerConfig {
    TrackerConfig::default()
        .with_storage_type(StorageType::Net)
        .with_trace_format(TraceFormat::Json)
        .with_tracking_code("code-1")
}

fn net_tracker(transport: &Arc<MockTransport>, config: TrackerConfig) -> Tracker {
    let caps = Capabilities::builder().transport(transport.clone()).build();
    Tracker::new(config, caps).unwrap()
}

/// Target ids of every record in a JSON batch
fn batch_ids(body: &str) -> Vec<String> {
    let records: Vec<Value> = serde_json::from_str(body).unwrap();
    records
        .iter()
        .map(|r| r["target"]["id"].as_str().unwrap().to_string())
        .collect()
}

fn track_bodies(transport: &MockTransport) -> Vec<String> {
    transport
        .requests_to("/proxy/gleaner/collector/track")
        .into_iter()
        .map(|r| r.body)
        .collect()
}

#[test]
fn inactive_session_buffers_raw_events() {
    let transport = Arc::new(MockTransport::always(500, "unavailable"));
    let tracker = net_tracker(&transport, net_config());
    tracker.start();
    assert!(tracker.is_started());
    assert!(!tracker.is_active());

    for id in ["a", "b", "c"] {
        tracker.action_trace("accessed", "area", id).unwrap();
        let outcome = tracker.flush();
        assert!(matches!(
            outcome,
            FlushOutcome::Completed(FlushReport { buffered: 1, .. })
        ));
        assert_eq!(tracker.queue_len(), 0);
    }

    let pipeline = tracker.pipeline();
    assert_eq!(pipeline.unlogged_events().len(), 3);
    assert!(pipeline.pending_batches().is_empty());
    assert!(!tracker.is_connected());
    // Every flush retried the handshake; nothing was tracked
    assert_eq!(transport.requests_to("/start/code-1").len(), 4);
    assert!(track_bodies(&transport).is_empty());
}

#[test]
fn batch_size_limits_each_flush() {
    let transport = Arc::new(MockTransport::always(200, HANDSHAKE));
    let tracker = net_tracker(&transport, net_config().with_batch_size(2));
    tracker.start();
    assert!(tracker.is_active());

    for id in ["e1", "e2", "e3", "e4", "e5"] {
        tracker.action_trace("accessed", "area", id).unwrap();
    }
    let outcome = tracker.flush();

    assert!(matches!(
        outcome,
        FlushOutcome::Completed(FlushReport { dequeued: 2, sent_batches: 1, deferred: false, .. })
    ));
    assert_eq!(tracker.queue_len(), 3);
    assert!(tracker.pipeline().pending_batches().is_empty());

    let bodies = track_bodies(&transport);
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        batch_ids(&bodies[0]),
        vec![
            "http://example.org/games/demo/e1",
            "http://example.org/games/demo/e2"
        ]
    );
}

#[test]
fn track_request_carries_auth_token() {
    let transport = Arc::new(MockTransport::always(200, HANDSHAKE));
    let tracker = net_tracker(&transport, net_config());
    tracker.start();
    tracker.action_trace("initialized", "game", "demo").unwrap();
    tracker.flush();

    let track = &transport.requests_to("/track")[0];
    assert_eq!(track.url, "https://rage.e-ucm.es/api/proxy/gleaner/collector/track");
    assert_eq!(track.headers.get("Authorization").map(String::as_str), Some("auth-1"));
    assert_eq!(
        track.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );
    assert!(tracker.is_connected());
}

#[test]
fn transient_failures_lose_nothing() {
    let transport = Arc::new(MockTransport::new());
    transport.push_reply(200, HANDSHAKE);
    for _ in 0..3 {
        transport.push_reply(503, "");
    }
    let tracker = net_tracker(&transport, net_config());
    tracker.start();

    for id in ["e1", "e2", "e3"] {
        tracker.action_trace("progressed", "level", id).unwrap();
        tracker.flush();
        assert!(!tracker.is_connected());
    }
    assert_eq!(tracker.pipeline().pending_batches().len(), 3);

    tracker.action_trace("progressed", "level", "e4").unwrap();
    let outcome = tracker.flush();
    assert!(matches!(
        outcome,
        FlushOutcome::Completed(FlushReport { sent_batches: 4, deferred: false, .. })
    ));
    assert!(tracker.is_connected());
    assert!(tracker.pipeline().pending_batches().is_empty());

    // One failed attempt per flush, then the full backlog in order
    let bodies = track_bodies(&transport);
    assert_eq!(bodies.len(), 7);
    let delivered: Vec<String> = bodies[3..].iter().flat_map(|b| batch_ids(b)).collect();
    assert_eq!(
        delivered,
        vec![
            "http://example.org/games/demo/e1",
            "http://example.org/games/demo/e2",
            "http://example.org/games/demo/e3",
            "http://example.org/games/demo/e4",
        ]
    );
}

#[test]
fn unlogged_events_go_out_before_pending_and_live() {
    let transport = Arc::new(MockTransport::new());
    transport.push_reply(500, ""); // handshake on start
    transport.push_reply(500, ""); // handshake on first flush
    transport.push_reply(200, HANDSHAKE); // handshake on second flush
    transport.push_reply(500, ""); // unlogged batch
    let tracker = net_tracker(&transport, net_config());
    tracker.start();

    tracker.action_trace("accessed", "area", "e1").unwrap();
    tracker.flush();
    assert_eq!(tracker.pipeline().unlogged_events().len(), 1);

    tracker.action_trace("accessed", "area", "e2").unwrap();
    tracker.flush();
    assert!(tracker.is_active());
    assert!(tracker.pipeline().unlogged_events().is_empty());
    assert_eq!(tracker.pipeline().pending_batches().len(), 2);

    tracker.action_trace("accessed", "area", "e3").unwrap();
    tracker.flush();
    assert!(tracker.pipeline().pending_batches().is_empty());

    let sent: Vec<Vec<String>> = track_bodies(&transport).iter().map(|b| batch_ids(b)).collect();
    assert_eq!(
        sent,
        vec![
            vec!["http://example.org/games/demo/e1"],
            vec!["http://example.org/games/demo/e1"],
            vec!["http://example.org/games/demo/e2"],
            vec!["http://example.org/games/demo/e3"],
        ]
    );
}

#[test]
fn local_json_log_stays_one_array() {
    let storage = Arc::new(InMemoryStorage::new());
    let config = TrackerConfig::default()
        .with_storage_type(StorageType::Local)
        .with_trace_format(TraceFormat::Json);
    let caps = Capabilities::builder().storage(storage.clone()).build();
    let tracker = Tracker::new(config, caps).unwrap();
    tracker.start();
    assert!(tracker.is_active());
    assert!(tracker.is_connected());

    tracker.action_trace("initialized", "game", "g1").unwrap();
    tracker.action_trace("accessed", "screen", "menu").unwrap();
    tracker.flush();
    tracker.action_trace("completed", "game", "g1").unwrap();
    tracker.flush();

    let log = storage.get("tracker_log").unwrap();
    assert!(log.starts_with("[\r\n"));
    assert!(log.ends_with("\r\n]"));
    // No actor in local mode, so ids are written raw
    assert_eq!(batch_ids(&log), vec!["g1", "menu", "g1"]);
}

#[test]
fn backup_is_written_even_when_delivery_fails() {
    let transport = Arc::new(MockTransport::new());
    transport.push_reply(200, HANDSHAKE);
    transport.set_fallback(500, "");
    let storage = Arc::new(InMemoryStorage::new());
    let caps = Capabilities::builder()
        .transport(transport.clone())
        .storage(storage.clone())
        .build();
    let tracker = Tracker::new(net_config().with_backup(true), caps).unwrap();
    tracker.start();

    tracker.set_score(0.5).unwrap();
    tracker.action_trace("completed", "quest", "q,1").unwrap();
    tracker.flush();

    assert_eq!(tracker.pipeline().pending_batches().len(), 1);
    let backup = storage.get("tracker_backup.csv").unwrap();
    assert!(backup.ends_with(",completed,quest,q\\,1,score,0.5\r\n"));
}

#[test]
fn backup_without_storage_is_logged_not_raised() {
    let transport = Arc::new(MockTransport::always(200, HANDSHAKE));
    let tracker = net_tracker(&transport, net_config().with_backup(true));
    tracker.start();
    tracker.action_trace("accessed", "area", "a").unwrap();

    let outcome = tracker.flush();
    assert!(matches!(
        outcome,
        FlushOutcome::Completed(FlushReport { backed_up: false, sent_batches: 1, .. })
    ));
}

#[test]
fn concurrent_flushes_never_duplicate_events() {
    let storage = Arc::new(InMemoryStorage::new());
    let config = TrackerConfig::default().with_batch_size(3);
    let caps = Capabilities::builder().storage(storage.clone()).build();
    let tracker = Arc::new(Tracker::new(config, caps).unwrap());
    tracker.start();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..50 {
                    tracker
                        .action_trace("accessed", "area", &format!("t{}-{}", t, i))
                        .unwrap();
                    tracker.flush();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    while tracker.queue_len() > 0 {
        tracker.flush();
    }

    let log = storage.get("tracker_log").unwrap();
    let mut ids: Vec<&str> = log
        .lines()
        .map(|line| line.rsplit(',').next().unwrap())
        .collect();
    assert_eq!(ids.len(), 200);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200);
}

#[test]
fn stop_then_restart_reconnects() {
    let transport = Arc::new(MockTransport::always(200, HANDSHAKE));
    let tracker = net_tracker(&transport, net_config());
    tracker.start();
    tracker.action_trace("accessed", "area", "a").unwrap();

    tracker.stop();
    assert!(!tracker.is_started());
    assert_eq!(tracker.queue_len(), 0);
    assert_eq!(tracker.flush(), FlushOutcome::NotStarted);

    tracker.start();
    assert!(tracker.is_active());
    // The second handshake authenticates with the token from the first
    let starts = transport.requests_to("/start/code-1");
    assert_eq!(starts.len(), 2);
    assert_eq!(
        starts[1].headers.get("Authorization").map(String::as_str),
        Some("Bearer auth-1")
    );
}
