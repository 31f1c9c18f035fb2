// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded body streamer.
//!
//! Streams the response body into a caller-owned, fixed-capacity buffer.
//! The running offset belongs to the caller, so [`fetch_chunk`] can be
//! called repeatedly on the same region without any hidden state.
//!
//! The expected size passed in is the *document size*: the body length
//! plus one byte reserved for a terminator, written once the body is
//! complete.

use crate::error::{DiscoveryError, Result};
use crate::header::ResponseHead;
use crate::transport::{Connection, Link};

/// Result of one [`fetch_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More body bytes are expected; call again.
    Incomplete,
    /// The whole body is in the buffer and the link is closed.
    Complete,
}

/// Pull one read's worth of body bytes into `buffer[*received..]`.
///
/// `document_size` is the body length plus one. On completion the byte at
/// `document_size - 1` is set to zero and the link is closed; on any error
/// the link is closed as well.
pub fn fetch_chunk<C: Connection>(
    link: &mut Link<C>,
    buffer: &mut [u8],
    received: &mut usize,
    document_size: usize,
) -> Result<Progress> {
    let result = pull(link, buffer, received, document_size);
    if !matches!(result, Ok(Progress::Incomplete)) {
        link.close();
    }
    result
}

fn pull<C: Connection>(
    link: &mut Link<C>,
    buffer: &mut [u8],
    received: &mut usize,
    document_size: usize,
) -> Result<Progress> {
    let capacity = buffer.len();
    let expected = document_size.saturating_sub(1);

    if *received >= capacity {
        log::warn!(
            "[body] buffer of {} bytes exhausted, document needs {}",
            capacity,
            document_size
        );
        return Err(DiscoveryError::BufferTooSmall {
            capacity,
            required: document_size,
        });
    }

    let n = link.recv(&mut buffer[*received..])?;
    if n == 0 {
        return Err(DiscoveryError::MalformedResponse(
            "stream ended before end of body",
        ));
    }
    *received += n;

    if *received > expected {
        log::debug!(
            "[body] received {} bytes, expected at most {}",
            *received,
            expected
        );
        return Err(DiscoveryError::MalformedResponse(
            "body longer than content-length",
        ));
    }

    if *received < expected {
        log::debug!("[body] received {} of {} bytes", *received, expected);
        return Ok(Progress::Incomplete);
    }

    let Some(terminator) = buffer.get_mut(expected) else {
        return Err(DiscoveryError::BufferTooSmall {
            capacity,
            required: document_size,
        });
    };
    *terminator = 0;
    log::debug!("[body] document complete ({} bytes)", expected);
    Ok(Progress::Complete)
}

/// Stream the whole body described by `head` into `buffer`.
///
/// Fails fast with [`DiscoveryError::BufferTooSmall`] when the document
/// cannot fit, before reading any body byte. Returns the body length.
pub fn receive_document<C: Connection>(
    link: &mut Link<C>,
    buffer: &mut [u8],
    head: ResponseHead,
) -> Result<usize> {
    let document_size = head.document_size();
    if document_size > buffer.len() {
        link.close();
        log::warn!(
            "[body] supplied buffer ({} bytes) cannot hold the {} byte discovery document; increase it",
            buffer.len(),
            document_size
        );
        return Err(DiscoveryError::BufferTooSmall {
            capacity: buffer.len(),
            required: document_size,
        });
    }

    let mut received = 0;
    loop {
        match fetch_chunk(link, buffer, &mut received, document_size)? {
            Progress::Complete => return Ok(received),
            Progress::Incomplete => {}
        }
    }
}
