//! Tracker configuration and capability wiring

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::log::{LogSink, Logger};
use crate::serializer::TraceFormat;
use crate::storage::{AppendStorage, DataStorage};
use crate::transport::Transport;

/// Where flushed batches go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Remote collector over the transport capability
    Net,
    /// Primary log file in the storage capability
    #[default]
    Local,
}

/// Who runs the flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// `flush()` runs the cycle on the calling thread
    #[default]
    Synchronous,
    /// `flush()` hands a request to a dedicated worker thread
    Background,
}

/// Main tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Use https
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Collector host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Collector port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix of every collector endpoint
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Bearer token for the connect handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,

    /// Anonymous player id for the connect handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,

    /// Game tracking code
    #[serde(default)]
    pub tracking_code: String,

    #[serde(default)]
    pub storage_type: StorageType,

    #[serde(default)]
    pub trace_format: TraceFormat,

    /// Events per flush; 0 drains the whole queue
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Write every flushed batch to the backup file as CSV
    #[serde(default)]
    pub backup_enabled: bool,

    #[serde(default = "default_backup_file")]
    pub backup_file_name: String,

    /// Primary log file used in local storage mode
    #[serde(default = "default_log_file")]
    pub primary_log_file_name: String,

    /// Raise validation and vocabulary errors instead of logging them
    #[serde(default = "default_true")]
    pub strict_mode: bool,

    /// Response codes accepted from the collector
    #[serde(default = "default_allowed_codes")]
    pub allowed_codes: Vec<u16>,

    /// Request timeout for transports that support one
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub flush_mode: FlushMode,
}

fn default_true() -> bool { true }
fn default_host() -> String { "rage.e-ucm.es".to_string() }
fn default_port() -> u16 { 443 }
fn default_base_path() -> String { "/api/".to_string() }
fn default_batch_size() -> usize { 10 }
fn default_backup_file() -> String { "tracker_backup.csv".to_string() }
fn default_log_file() -> String { "tracker_log".to_string() }
fn default_allowed_codes() -> Vec<u16> { vec![200] }
fn default_timeout() -> u64 { 30_000 }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            secure: true,
            host: default_host(),
            port: default_port(),
            base_path: default_base_path(),
            user_token: None,
            player_id: None,
            tracking_code: String::new(),
            storage_type: StorageType::Local,
            trace_format: TraceFormat::Csv,
            batch_size: default_batch_size(),
            backup_enabled: false,
            backup_file_name: default_backup_file(),
            primary_log_file_name: default_log_file(),
            strict_mode: true,
            allowed_codes: default_allowed_codes(),
            timeout_ms: default_timeout(),
            flush_mode: FlushMode::Synchronous,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_type == StorageType::Net && self.host.trim().is_empty() {
            return Err(TrackerError::InvalidConfig {
                reason: "host is required for net storage".to_string(),
            });
        }
        if self.allowed_codes.is_empty() {
            return Err(TrackerError::InvalidConfig {
                reason: "allowed_codes can't be empty".to_string(),
            });
        }
        if self.storage_type == StorageType::Local && self.primary_log_file_name.is_empty() {
            return Err(TrackerError::InvalidConfig {
                reason: "primary_log_file_name is required for local storage".to_string(),
            });
        }
        if self.backup_enabled && self.backup_file_name.is_empty() {
            return Err(TrackerError::InvalidConfig {
                reason: "backup_file_name is required when backups are enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Full URL of a collector endpoint.
    ///
    /// The port is left out when it is the default for the scheme.
    pub fn endpoint(&self, path: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let default_port = if self.secure { 443 } else { 80 };
        let authority = if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        let base = self.base_path.trim_matches('/');
        let path = path.trim_start_matches('/');
        if base.is_empty() {
            format!("{}://{}/{}", scheme, authority, path)
        } else {
            format!("{}://{}/{}/{}", scheme, authority, base, path)
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_tracking_code(mut self, code: impl Into<String>) -> Self {
        self.tracking_code = code.into();
        self
    }

    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    pub fn with_player_id(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    pub fn with_trace_format(mut self, format: TraceFormat) -> Self {
        self.trace_format = format;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_allowed_codes(mut self, codes: Vec<u16>) -> Self {
        self.allowed_codes = codes;
        self
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Capabilities
// ═══════════════════════════════════════════════════════════════════════════

/// External collaborators the pipeline may use. Each one is optional and
/// resolved once at construction.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub transport: Option<Arc<dyn Transport>>,
    pub storage: Option<Arc<dyn DataStorage>>,
    pub append: Option<Arc<dyn AppendStorage>>,
    pub log_sink: Option<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("transport", &self.transport.as_ref().map(|t| t.name().to_string()))
            .field("storage", &self.storage.is_some())
            .field("append", &self.append.is_some())
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl Capabilities {
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder::default()
    }

    pub fn logger(&self) -> Logger {
        Logger::new(self.log_sink.clone())
    }
}

/// Builder for [`Capabilities`]
#[derive(Default)]
pub struct CapabilitiesBuilder {
    caps: Capabilities,
}

impl CapabilitiesBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.caps.transport = Some(transport);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn DataStorage>) -> Self {
        self.caps.storage = Some(storage);
        self
    }

    pub fn append(mut self, append: Arc<dyn AppendStorage>) -> Self {
        self.caps.append = Some(append);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.caps.log_sink = Some(sink);
        self
    }

    pub fn build(self) -> Capabilities {
        self.caps
    }
}
