// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for core discovery.

use std::io;
use thiserror::Error;

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Every way a discovery attempt can fail.
///
/// All variants are fatal to the current attempt. Whether to retry the whole
/// operation is the caller's decision; [`DiscoveryError::is_retryable`] gives
/// the usual answer.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Connect, send or receive failed on the transport.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// The HTTP response could not be interpreted (no content-length,
    /// no header boundary, unparseable length, body longer than advertised).
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    /// The caller-supplied buffer cannot hold the request or the document.
    #[error("buffer too small: capacity {capacity} bytes, {required} bytes required")]
    BufferTooSmall {
        /// Capacity of the buffer that was supplied
        capacity: usize,
        /// Size that would have been needed (lower bound when unknown)
        required: usize,
    },

    /// The discovery document is not valid JSON or holds an unusable value.
    #[error("invalid discovery document: {0}")]
    DocumentInvalid(String),

    /// A required path is absent from the document.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// The document was well formed but no connectivity entry was usable.
    #[error("no reachable core endpoint ({tried} candidates tried)")]
    NoReachableCandidate {
        /// Number of candidates that were examined
        tried: usize,
    },

    /// The request itself is unusable (rejected before any I/O).
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
}

impl DiscoveryError {
    /// Whether repeating the same call may succeed.
    ///
    /// Caller mistakes and a too-small buffer fail identically every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidRequest(_) | Self::BufferTooSmall { .. }
        )
    }
}
