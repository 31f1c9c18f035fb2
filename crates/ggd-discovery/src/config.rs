// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery client configuration.

use crate::candidate::{HostParameters, Selection};
use crate::session::{request_len, validate_thing_name, DiscoveryRequest, DEFAULT_DISCOVERY_PORT};
use crate::transport::Timeouts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Discovery client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Discovery service host name
    pub endpoint: String,

    /// Discovery service port (default: 8443)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Thing name to discover the core for
    pub thing_name: String,

    /// Scratch buffer capacity in bytes (default: 4096)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Connectivity entry to use; unset means probe automatically
    #[serde(default)]
    pub interface: Option<usize>,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout in milliseconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,

    /// Trust anchors for the discovery service (PEM); bundled roots otherwise
    #[serde(default)]
    pub root_ca_path: Option<PathBuf>,

    /// Client certificate chain (PEM)
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,

    /// Client private key (PEM)
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,

    /// Whole-discovery attempts before giving up
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_wait")]
    pub retry_wait_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_buffer_size() -> usize {
    4096
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_io_timeout() -> u64 {
    2000
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_wait() -> u64 {
    2000
}

impl DiscoveryConfig {
    /// Configuration with defaults for everything but the two required fields.
    pub fn new(endpoint: impl Into<String>, thing_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            port: default_port(),
            thing_name: thing_name.into(),
            buffer_size: default_buffer_size(),
            interface: None,
            connect_timeout_ms: default_connect_timeout(),
            io_timeout_ms: default_io_timeout(),
            root_ca_path: None,
            client_cert_path: None,
            client_key_path: None,
            attempts: default_attempts(),
            retry_wait_ms: default_retry_wait(),
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Selection mode implied by `interface`.
    pub fn selection(&self) -> Selection {
        match self.interface {
            Some(interface) => Selection::Manual(HostParameters { interface }),
            None => Selection::Automatic,
        }
    }

    /// Request described by this configuration.
    pub fn request(&self) -> DiscoveryRequest<'_> {
        DiscoveryRequest::new(&self.endpoint, self.port, &self.thing_name)
            .with_selection(self.selection())
    }

    /// Socket timeouts.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            io: Duration::from_millis(self.io_timeout_ms),
        }
    }

    /// Pause between attempts.
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    /// Read the configured PEM files.
    #[cfg(feature = "tls")]
    pub fn tls_credentials(&self) -> Result<crate::transport::TlsCredentials, ConfigError> {
        crate::transport::TlsCredentials::from_files(
            self.root_ca_path.as_deref(),
            self.client_cert_path.as_deref(),
            self.client_key_path.as_deref(),
        )
        .map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue("endpoint cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        validate_thing_name(&self.thing_name)
            .map_err(|e| ConfigError::InvalidValue(format!("thing_name: {}", e)))?;

        let required = request_len(&self.thing_name);
        if self.buffer_size < required {
            return Err(ConfigError::InvalidValue(format!(
                "buffer_size {} cannot hold the {} byte request",
                self.buffer_size, required
            )));
        }
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("timeouts cannot be 0".into()));
        }
        if self.attempts == 0 {
            return Err(ConfigError::InvalidValue("attempts cannot be 0".into()));
        }
        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(ConfigError::InvalidValue(
                "client_cert_path and client_key_path must be set together".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading or writing a file failed
    IoError(String),
    /// The file is not a valid configuration
    ParseError(String),
    /// The configuration could not be serialized
    SerializeError(String),
    /// A field holds an unusable value
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
