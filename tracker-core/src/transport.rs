//! Transport capability
//!
//! The pipeline never talks HTTP itself. It builds a [`Request`] and hands it
//! to whatever [`Transport`] was configured: `tracker-http` provides a
//! blocking `reqwest` implementation, and [`MockTransport`] scripts responses
//! for tests.
//!
//! A transport returns `Err` only when no response was obtained at all
//! (connection refused, timeout). A response with a status outside the
//! request's allowed codes is still `Ok`, with `allowed == false`.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub allowed_codes: Vec<u16>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: String::new(),
            allowed_codes: vec![200],
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn allowed_codes(mut self, codes: Vec<u16>) -> Self {
        self.allowed_codes = codes;
        self
    }

    /// Builds the response a transport should return for `status`
    pub fn respond(&self, status: u16, body: impl Into<String>) -> Response {
        Response {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
            message: String::new(),
            allowed: self.allowed_codes.contains(&status),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Reason phrase or transport diagnostic
    pub message: String,
    /// `status` is one of the request's allowed codes
    pub allowed: bool,
}

/// Performs one HTTP exchange
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn send(&self, request: &Request) -> Result<Response>;
}

/// Builds collector requests from the configuration and sends them through
/// the optional transport capability
pub(crate) struct Collector<'a> {
    pub transport: Option<&'a dyn Transport>,
    pub config: &'a TrackerConfig,
}

impl<'a> Collector<'a> {
    pub fn request(&self, method: Method, path: &str) -> Request {
        Request::new(method, self.config.endpoint(path))
            .allowed_codes(self.config.allowed_codes.clone())
    }

    pub fn send(&self, request: &Request) -> Result<Response> {
        let transport = self.transport.ok_or_else(|| TrackerError::CapabilityMissing {
            capability: "transport".to_string(),
        })?;
        tracing::debug!(
            transport = transport.name(),
            method = request.method.as_str(),
            url = %request.url,
            "Sending collector request"
        );
        transport.send(request)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mock transport
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Scripted {
    Reply { status: u16, body: String },
    Unreachable,
}

/// Transport that replays scripted responses and records every request.
///
/// Scripted replies are consumed in order; once exhausted, every request gets
/// the fallback reply (200 with an empty body unless changed).
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Scripted>,
    requests: Mutex<Vec<Request>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Scripted::Reply {
                status: 200,
                body: String::new(),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request gets `status` and `body`
    pub fn always(status: u16, body: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.set_fallback(status, body);
        mock
    }

    /// Every request fails without a response
    pub fn unreachable() -> Self {
        let mock = Self::new();
        *mock.fallback.lock() = Scripted::Unreachable;
        mock
    }

    pub fn set_fallback(&self, status: u16, body: impl Into<String>) {
        *self.fallback.lock() = Scripted::Reply {
            status,
            body: body.into(),
        };
    }

    pub fn push_reply(&self, status: u16, body: impl Into<String>) {
        self.script.lock().push_back(Scripted::Reply {
            status,
            body: body.into(),
        });
    }

    pub fn push_unreachable(&self) {
        self.script.lock().push_back(Scripted::Unreachable);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Requests whose URL ends with `suffix`
    pub fn requests_to(&self, suffix: &str) -> Vec<Request> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn send(&self, request: &Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());
        match next {
            Scripted::Reply { status, body } => Ok(request.respond(status, body)),
            Scripted::Unreachable => Err(TrackerError::Transport {
                status: 0,
                message: format!("{} unreachable", request.url),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_follows_request_codes() {
        let request = Request::new(Method::Get, "http://x/health").allowed_codes(vec![200, 204]);
        assert!(request.respond(204, "").allowed);
        assert!(!request.respond(500, "").allowed);
    }

    #[test]
    fn test_mock_script_then_fallback() {
        let mock = MockTransport::always(503, "down");
        mock.push_reply(200, "ok");
        mock.push_unreachable();

        let req = Request::new(Method::Post, "http://x/track");
        assert!(mock.send(&req).unwrap().allowed);
        assert!(mock.send(&req).is_err());
        let last = mock.send(&req).unwrap();
        assert_eq!(last.status, 503);
        assert!(!last.allowed);
        assert_eq!(mock.requests_to("/track").len(), 3);
    }

    #[test]
    fn test_collector_without_transport() {
        let config = TrackerConfig::default();
        let collector = Collector {
            transport: None,
            config: &config,
        };
        let req = collector.request(Method::Get, "health");
        assert_eq!(req.url, "https://rage.e-ucm.es/api/health");
        assert_eq!(
            collector.send(&req).unwrap_err().error_code(),
            "CAPABILITY_MISSING"
        );
    }
}
