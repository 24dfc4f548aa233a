//! # Tracker HTTP
//!
//! Blocking [`Transport`] for `tracker-core` built on `reqwest`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracker_core::{Capabilities, StorageType, Tracker, TrackerConfig};
//! use tracker_http::HttpTransport;
//!
//! let config = TrackerConfig::default()
//!     .with_storage_type(StorageType::Net)
//!     .with_tracking_code("my-game");
//! let transport = HttpTransport::from_config(&config).unwrap();
//! let caps = Capabilities::builder().transport(Arc::new(transport)).build();
//!
//! let tracker = Tracker::new(config, caps).unwrap();
//! tracker.start();
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use tracker_core::{Method, Request, Response, Result, TrackerConfig, TrackerError, Transport};

/// `reqwest` blocking client behind the [`Transport`] trait
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tracker-http/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Transport {
                status: 0,
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Client using the configured request timeout
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(Duration::from_millis(config.timeout_ms))
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(e: reqwest::Error) -> TrackerError {
    TrackerError::Transport {
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        message: e.to_string(),
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    fn send(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(to_reqwest(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().map_err(transport_error)?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().map_err(transport_error)?;

        tracing::trace!(status = status.as_u16(), bytes = body.len(), "Collector replied");

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
            message: status.canonical_reason().unwrap_or_default().to_string(),
            allowed: request.allowed_codes.contains(&status.as_u16()),
        })
    }
}
