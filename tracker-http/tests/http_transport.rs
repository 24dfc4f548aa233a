//! HttpTransport against a minimal in-process HTTP server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracker_core::{
    Capabilities, Method, Request, StorageType, TraceFormat, Tracker, TrackerConfig, Transport,
};
use tracker_http::HttpTransport;

/// Request line, lowercase header lines and body of one received request
#[derive(Debug)]
struct Received {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

fn read_request(stream: &mut TcpStream) -> Received {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end().to_string();
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(len) = lower.strip_prefix("content-length:") {
            content_length = len.trim().parse().unwrap();
        }
        headers.push(lower);
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    Received {
        request_line: request_line.trim_end().to_string(),
        headers,
        body: String::from_utf8(body).unwrap(),
    }
}

/// Serves the given `(status line, body)` replies, one connection each, and
/// reports every request it saw
fn serve(replies: Vec<(&'static str, &'static str)>) -> (u16, mpsc::Receiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in replies {
            let (mut stream, _) = listener.accept().unwrap();
            let received = read_request(&mut stream);
            tx.send(received).unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        }
    });
    (port, rx)
}

fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(5)).unwrap()
}

#[test]
fn allowed_response_carries_body_and_headers() {
    let (port, rx) = serve(vec![("200 OK", r#"{"status":"OK"}"#)]);
    let request = Request::new(Method::Post, format!("http://127.0.0.1:{}/api/track", port))
        .header("Authorization", "tok")
        .body("a,b,c");

    let response = transport().send(&request).unwrap();
    assert_eq!(response.status, 200);
    assert!(response.allowed);
    assert_eq!(response.body, r#"{"status":"OK"}"#);
    assert_eq!(response.message, "OK");
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );

    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received.request_line, "POST /api/track HTTP/1.1");
    assert!(received.headers.contains(&"authorization: tok".to_string()));
    assert_eq!(received.body, "a,b,c");
}

#[test]
fn disallowed_status_is_still_a_response() {
    let (port, _rx) = serve(vec![("404 Not Found", "")]);
    let request = Request::new(Method::Get, format!("http://127.0.0.1:{}/health", port));

    let response = transport().send(&request).unwrap();
    assert_eq!(response.status, 404);
    assert!(!response.allowed);
    assert_eq!(response.message, "Not Found");
}

#[test]
fn extra_allowed_codes_are_honoured() {
    let (port, _rx) = serve(vec![("204 No Content", "")]);
    let request = Request::new(Method::Delete, format!("http://127.0.0.1:{}/x", port))
        .allowed_codes(vec![200, 204]);

    assert!(transport().send(&request).unwrap().allowed);
}

#[test]
fn unreachable_host_is_an_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let request = Request::new(Method::Get, format!("http://127.0.0.1:{}/health", port));

    let err = transport().send(&request).unwrap_err();
    assert_eq!(err.error_code(), "TRANSPORT_FAILURE");
}

#[test]
fn tracker_delivers_through_http() {
    let (port, rx) = serve(vec![
        (
            "200 OK",
            r#"{"authToken":"srv-token","objectId":"http://example.org/g","actor":{"name":"p"}}"#,
        ),
        ("200 OK", "{}"),
    ]);
    let config = TrackerConfig::default()
        .with_secure(false)
        .with_host("127.0.0.1")
        .with_port(port)
        .with_storage_type(StorageType::Net)
        .with_trace_format(TraceFormat::Csv)
        .with_tracking_code("demo");
    let transport = HttpTransport::from_config(&config).unwrap();
    let caps = Capabilities::builder().transport(Arc::new(transport)).build();
    let tracker = Tracker::new(config, caps).unwrap();

    tracker.start();
    assert!(tracker.is_active());
    tracker.action_trace("initialized", "game", "demo").unwrap();
    tracker.flush();
    assert!(tracker.is_connected());
    assert!(tracker.pipeline().pending_batches().is_empty());

    let start = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        start.request_line,
        "POST /api/proxy/gleaner/collector/start/demo HTTP/1.1"
    );
    let track = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(track.headers.contains(&"authorization: srv-token".to_string()));
    assert!(track.body.ends_with(",initialized,game,demo\r\n"));
}
