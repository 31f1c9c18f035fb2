// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ggd-discovery - Greengrass core discovery
//!
//! Finds the Greengrass core a device should connect to. Given a thing name
//! and the discovery service address, it fetches the discovery document over
//! one HTTP/1.1 GET, extracts the group certificate authority and picks a
//! reachable connectivity endpoint of the core.
//!
//! ## Design Constraints
//!
//! - **Bounded memory**: request and response share one fixed-capacity
//!   buffer owned by the session; it never grows
//! - **Zero-copy queries** on the received document; only the certificate
//!   is copied (and unescaped)
//! - **Blocking, single-threaded**: timeouts belong to the transport
//! - **All-or-nothing**: a [`HostAddressData`] is returned only on success
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |  discover() / DiscoverySession          |
//! +-----------------------------------------+
//!           v                    ^
//! +-------------------+ +-------------------+
//! |  header (length)  | |  body (streamer)  |
//! +-------------------+ +-------------------+
//!           v                    ^
//! +-------------------+ +-------------------+
//! |  json (extractor) | |  candidate        |
//! +-------------------+ +-------------------+
//!           v                    ^
//! +-----------------------------------------+
//! |  Transport (TLS / TCP / memory)         |
//! +-----------------------------------------+
//! ```
//!
//! ## Feature Flags
//!
//! - `tls` (default) -- rustls-based [`transport::TlsConnector`]
//!
//! ## Example
//!
//! ```ignore
//! use ggd_discovery::{DiscoveryConfig, DiscoverySession, TlsConnector};
//!
//! let config = DiscoveryConfig::from_file(Path::new("discovery.json"))?;
//! let connector = TlsConnector::new(&config.tls_credentials()?, config.timeouts())?;
//! let mut session = DiscoverySession::new(connector, config.buffer_size);
//! let core = session.discover(&config.request())?;
//! println!("{}:{}", core.host, core.port);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Candidate enumeration and selection
pub mod candidate;

/// Bounded body streaming
pub mod body;

/// Client configuration
pub mod config;

/// Error types
pub mod error;

/// Incremental HTTP header scanning
pub mod header;

/// JSON path lookups and certificate decoding
pub mod json;

/// Discovery session (request, response, result)
pub mod session;

/// Connector and connection abstraction
pub mod transport;

// Re-exports for convenience
pub use crate::candidate::{HostParameters, Selection};
pub use crate::config::{ConfigError, DiscoveryConfig};
pub use crate::error::{DiscoveryError, Result};
pub use crate::session::{
    discover, DiscoveryBuffer, DiscoveryRequest, DiscoverySession, HostAddressData,
};
#[cfg(feature = "tls")]
pub use crate::transport::{TlsConnector, TlsCredentials};
pub use crate::transport::{Connection, Connector, Endpoint, Link, TcpConnector, Timeouts};

/// Version of ggd-discovery
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
