#![cfg(feature = "net")]

//! Server configuration.
//!
//! Settings start from defaults, may be overlaid by a JSON file, and are
//! finally overlaid by `ZKP_*` environment variables.

use crate::net::transport::{
    TransportKind, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, DEFAULT_READ_BUFFER_BYTES,
};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SESSION_TTL_SECS: u64 = 300;
const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    /// The config file could not be read.
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    /// The config file is not valid JSON for [`ConfigFile`].
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    /// An environment variable could not be interpreted.
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Runtime settings for [`crate::net::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub listen: SocketAddr,
    /// Request framing.
    pub transport: TransportKind,
    /// Read buffer for [`TransportKind::Raw`].
    pub read_buffer_bytes: usize,
    /// Header limit for [`TransportKind::Http`].
    pub max_header_bytes: usize,
    /// Body limit for [`TransportKind::Http`].
    pub max_body_bytes: usize,
    /// Deadline for receiving a request.
    pub request_timeout: Duration,
    /// Lifetime of a session.
    pub session_ttl: Duration,
    /// Maximum live sessions.
    pub max_sessions: usize,
    /// Enables `POST /zkp/generate-proof`.
    pub debug_routes: bool,
    /// Includes the secret in `GET /zkp/initiate` responses.
    pub disclose_secret: bool,
    /// Directory for `keyPair.json` / `schnorrProof.json` artifacts.
    pub artifact_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Defaults bound to `listen`.
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            transport: TransportKind::Raw,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            debug_routes: false,
            disclose_secret: false,
            artifact_dir: None,
        }
    }

    /// Defaults overlaid with the JSON file at `path`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::default().with_file(file))
    }

    /// Applies every field present in `file`.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(listen) = file.listen {
            self.listen = listen;
        }
        if let Some(transport) = file.transport {
            self.transport = transport;
        }
        if let Some(bytes) = file.read_buffer_bytes {
            self.read_buffer_bytes = bytes;
        }
        if let Some(bytes) = file.max_header_bytes {
            self.max_header_bytes = bytes;
        }
        if let Some(bytes) = file.max_body_bytes {
            self.max_body_bytes = bytes;
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = file.session_ttl_secs {
            self.session_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_sessions {
            self.max_sessions = max;
        }
        if let Some(flag) = file.debug_routes {
            self.debug_routes = flag;
        }
        if let Some(flag) = file.disclose_secret {
            self.disclose_secret = flag;
        }
        if let Some(dir) = file.artifact_dir {
            self.artifact_dir = Some(dir);
        }
        self
    }

    /// Applies `ZKP_*` variables from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `ZKP_*` variables obtained through `lookup`.
    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(listen) = parse_var(&lookup, "ZKP_LISTEN")? {
            self.listen = listen;
        }
        if let Some(transport) = parse_var(&lookup, "ZKP_TRANSPORT")? {
            self.transport = transport;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ZKP_REQUEST_TIMEOUT_MS")? {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ZKP_SESSION_TTL_SECS")? {
            self.session_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&lookup, "ZKP_MAX_SESSIONS")? {
            self.max_sessions = max;
        }
        if let Some(flag) = parse_flag(&lookup, "ZKP_DEBUG_ROUTES")? {
            self.debug_routes = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "ZKP_DISCLOSE_SECRET")? {
            self.disclose_secret = flag;
        }
        if let Some(dir) = lookup("ZKP_ARTIFACT_DIR").filter(|v| !v.is_empty()) {
            self.artifact_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let listen = DEFAULT_LISTEN
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));
        Self::new(listen)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { key, value }),
        },
    }
}

/// On-disk configuration; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// See [`ServerConfig::listen`].
    pub listen: Option<SocketAddr>,
    /// See [`ServerConfig::transport`].
    pub transport: Option<TransportKind>,
    /// See [`ServerConfig::read_buffer_bytes`].
    pub read_buffer_bytes: Option<usize>,
    /// See [`ServerConfig::max_header_bytes`].
    pub max_header_bytes: Option<usize>,
    /// See [`ServerConfig::max_body_bytes`].
    pub max_body_bytes: Option<usize>,
    /// Request deadline in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Session lifetime in seconds.
    pub session_ttl_secs: Option<u64>,
    /// See [`ServerConfig::max_sessions`].
    pub max_sessions: Option<usize>,
    /// See [`ServerConfig::debug_routes`].
    pub debug_routes: Option<bool>,
    /// See [`ServerConfig::disclose_secret`].
    pub disclose_secret: Option<bool>,
    /// See [`ServerConfig::artifact_dir`].
    pub artifact_dir: Option<PathBuf>,
}
