//! Session state machine
//!
//! ```text
//!            start()                  handshake ok + actor
//!   Idle ──────────────► Connecting ───────────────────────► Active (net)
//!     │                      ▲  │ non-allowed / unreachable
//!     │ start() [local]      │  └──────► stays Connecting, retried on flush
//!     ▼                      │
//!   Active (local)        flush()
//!
//!   any Started state ── stop() ──► Stopped
//! ```
//!
//! [`SessionFlags`] holds the three public booleans and can be read from any
//! thread. [`SessionContext`] holds what the connect handshake returned and is
//! only touched inside the pipeline's single-flight lock.

use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::Logger;
use crate::serializer::SerializeContext;
use crate::transport::{Collector, Method};

/// Coarse session state derived from the flags and the storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    StartedLocal,
    StartedNetConnecting,
    StartedNetActive,
    Stopped,
}

/// Started / Active / Connected flags
#[derive(Debug, Default)]
pub struct SessionFlags {
    started: AtomicBool,
    active: AtomicBool,
    connected: AtomicBool,
    stopped: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_started(&self, value: bool) {
        self.started.store(value, Ordering::Release);
        if value {
            self.stopped.store(false, Ordering::Release);
        }
    }

    pub(crate) fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub(crate) fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }

    /// Clears every flag and remembers that the session was stopped
    pub(crate) fn reset(&self) {
        self.started.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        self.stopped.store(true, Ordering::Release);
    }

    pub fn phase(&self, local: bool) -> SessionPhase {
        if !self.is_started() {
            if self.stopped.load(Ordering::Acquire) {
                return SessionPhase::Stopped;
            }
            return SessionPhase::Idle;
        }
        match (local, self.is_active()) {
            (true, _) => SessionPhase::StartedLocal,
            (false, true) => SessionPhase::StartedNetActive,
            (false, false) => SessionPhase::StartedNetConnecting,
        }
    }
}

/// Identity and addressing data for the current session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    /// Sent as `Bearer` on connect; replaced by the handshake's auth token,
    /// which then authorizes track requests
    pub user_token: Option<String>,
    pub player_id: Option<String>,
    pub tracking_code: String,
    /// Prefix for target ids, always ending in `/` once set
    pub object_prefix: String,
    pub actor: Option<Value>,
    /// Last status reported by the health endpoint
    pub health: Option<String>,
}

impl SessionContext {
    pub fn serialize_context(&self) -> SerializeContext<'_> {
        SerializeContext {
            actor: self.actor.as_ref(),
            object_prefix: &self.object_prefix,
        }
    }

    /// Runs the connect handshake and updates `flags`
    pub(crate) fn connect(&mut self, collector: &Collector<'_>, flags: &SessionFlags, logger: &Logger) {
        let path = format!("proxy/gleaner/collector/start/{}", self.tracking_code);
        let mut request = collector.request(Method::Post, &path);

        match (&self.user_token, &self.player_id) {
            (Some(token), _) if !token.is_empty() => {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            (_, Some(player)) if !player.is_empty() => {
                request = request
                    .header("Content-Type", "application/json")
                    .header("Accept", "application/json")
                    .body(serde_json::json!({ "anonymous": player }).to_string());
            }
            _ => {}
        }

        let response = match collector.send(&request) {
            Ok(response) if response.allowed => response,
            Ok(response) => {
                logger.error(&format!(
                    "Request Error: {}-{}",
                    response.status, response.message
                ));
                flags.set_active(false);
                flags.set_connected(false);
                return;
            }
            Err(e) => {
                logger.error(&format!("Request Error: {}", e));
                flags.set_active(false);
                flags.set_connected(false);
                return;
            }
        };

        let fields = HandshakeFields::parse(&response.body);

        if let Some(token) = fields.auth_token {
            logger.info(&format!("AuthToken= {}", token));
            self.user_token = Some(token);
            flags.set_connected(true);
        }
        if let Some(player) = fields.player_id {
            logger.info(&format!("PlayerId= {}", player));
            self.player_id = Some(player);
        }
        if let Some(session) = fields.session {
            logger.info(&format!("Session= {}", session));
        }
        if let Some(mut object_id) = fields.object_id {
            if !object_id.ends_with('/') {
                object_id.push('/');
            }
            logger.info(&format!("ObjectId= {}", object_id));
            self.object_prefix = object_id;
        }
        if let Some(actor) = fields.actor {
            logger.info(&format!("Actor= {}", actor));
            self.actor = Some(actor);
            flags.set_active(true);
        }
    }

    /// Queries the health endpoint; returns whether the response was allowed
    pub(crate) fn check_health(&mut self, collector: &Collector<'_>, logger: &Logger) -> bool {
        let request = collector.request(Method::Get, "health");
        match collector.send(&request) {
            Ok(response) if response.allowed => {
                if let Some(status) = extract_string(&response.body, "status") {
                    logger.info(&format!("Health Status={}", status));
                    self.health = Some(status);
                }
                true
            }
            Ok(response) => {
                logger.error(&format!(
                    "Request Error: {}-{}",
                    response.status, response.message
                ));
                false
            }
            Err(e) => {
                logger.error(&format!("Request Error: {}", e));
                false
            }
        }
    }

    /// Exchanges credentials for a user token; returns whether one was stored
    pub(crate) fn login(
        &mut self,
        username: &str,
        password: &str,
        collector: &Collector<'_>,
        logger: &Logger,
    ) -> bool {
        let body = serde_json::json!({ "username": username, "password": password });
        let request = collector
            .request(Method::Post, "login")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body.to_string());

        match collector.send(&request) {
            Ok(response) if response.allowed => match extract_string(&response.body, "token") {
                Some(token) => {
                    let token = token
                        .strip_prefix("Bearer ")
                        .map(str::to_string)
                        .unwrap_or(token);
                    logger.info(&format!("Token= {}", token));
                    self.user_token = Some(token);
                    true
                }
                None => false,
            },
            Ok(response) => {
                logger.error(&format!(
                    "Request Error: {}-{}",
                    response.status, response.message
                ));
                false
            }
            Err(e) => {
                logger.error(&format!("Request Error: {}", e));
                false
            }
        }
    }

    /// Forgets the actor; tokens and ids survive for the next start
    pub(crate) fn clear_actor(&mut self) {
        self.actor = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Response field extraction
// ═══════════════════════════════════════════════════════════════════════════

/// Fields the connect handshake may return
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandshakeFields {
    pub auth_token: Option<String>,
    pub player_id: Option<String>,
    pub session: Option<String>,
    pub object_id: Option<String>,
    pub actor: Option<Value>,
}

impl HandshakeFields {
    /// Extracts whatever fields are present; the body need not be valid JSON
    pub fn parse(body: &str) -> Self {
        Self {
            auth_token: extract_string(body, "authToken"),
            player_id: extract_string(body, "playerId"),
            session: extract_string(body, "session"),
            object_id: extract_string(body, "objectId"),
            actor: extract_object(body, "actor"),
        }
    }
}

/// Value of the first `"name":"value"` pair in `body`
pub fn extract_string(body: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"(?s)"{}"\s*:\s*"(.+?)""#, regex::escape(name))).ok()?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First `"name": { ... }` object in `body`, matched by balancing braces
/// outside string literals and then parsed as JSON
pub fn extract_object(body: &str, name: &str) -> Option<Value> {
    let key = Regex::new(&format!(r#""{}"\s*:\s*\{{"#, regex::escape(name))).ok()?;
    let found = key.find(body)?;
    let start = found.end() - 1;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in body[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&body[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}
