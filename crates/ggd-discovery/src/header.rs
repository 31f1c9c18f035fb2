// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental HTTP response header scanner.
//!
//! The response header is never buffered. Bytes are pulled from the link one
//! at a time and pushed through a small state machine:
//!
//! ```text
//! Field --"content-length:"--> Length --10 bytes--> Boundary --CRLFCRLF--> Done
//!                                 \------------CRLFCRLF-------------------^
//! ```
//!
//! The field name is matched byte-exactly (no case folding) and a mismatch
//! restarts the match from the first byte of the name without re-examining
//! the mismatching byte. Servers that answer discovery requests emit the
//! lower-case spelling, which is all this scanner recognises.

use crate::error::{DiscoveryError, Result};
use crate::transport::{Connection, Link};
use heapless::Vec as BoundedVec;

/// Header field carrying the body length, as emitted by the discovery service.
pub const CONTENT_LENGTH_FIELD: &[u8] = b"content-length:";

/// Bytes captured after the field name to hold the decimal length.
pub const LENGTH_CAPTURE_WIDTH: usize = 10;

/// Upper bound on header bytes read before giving up.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_END: [u8; 4] = *b"\r\n\r\n";

/// What the header scan learned about the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    /// Declared body length in bytes
    pub content_length: usize,
}

impl ResponseHead {
    /// Bytes needed to hold the body plus its terminator.
    ///
    /// Saturates, so a length the scanner would have refused still reports
    /// a size no buffer can hold.
    pub const fn document_size(&self) -> usize {
        self.content_length.saturating_add(1)
    }
}

/// Byte-at-a-time matcher for a fixed field name.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    target: &'static [u8],
    matched: usize,
}

impl FieldMatcher {
    /// Matcher for `target` (must not be empty).
    pub const fn new(target: &'static [u8]) -> Self {
        Self { target, matched: 0 }
    }

    /// Feed one byte; `true` once the whole target has been seen.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.target.get(self.matched) == Some(&byte) {
            self.matched += 1;
            if self.matched == self.target.len() {
                self.matched = 0;
                return true;
            }
        } else {
            self.matched = 0;
        }
        false
    }

    /// Number of target bytes matched so far.
    pub fn matched(&self) -> usize {
        self.matched
    }
}

/// Four-byte sliding window looking for the end of the header section.
#[derive(Debug, Clone, Default)]
pub struct BoundaryWindow {
    window: [u8; 4],
    filled: usize,
}

impl BoundaryWindow {
    /// Feed one byte; `true` when the last four bytes are `CR LF CR LF`.
    pub fn push(&mut self, byte: u8) -> bool {
        self.window.copy_within(1.., 0);
        self.window[3] = byte;
        self.filled = (self.filled + 1).min(4);
        self.filled == 4 && self.window == HEADER_END
    }
}

#[derive(Debug, Clone)]
enum ScanState {
    Field(FieldMatcher),
    Length {
        captured: BoundedVec<u8, LENGTH_CAPTURE_WIDTH>,
        window: BoundaryWindow,
    },
    Boundary {
        content_length: usize,
        window: BoundaryWindow,
    },
    Done(ResponseHead),
}

/// Outcome of feeding one byte to a [`HeaderScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Keep feeding bytes.
    NeedMore,
    /// Header section finished; the next byte on the wire is body.
    Complete(ResponseHead),
}

/// Header scanner state machine.
#[derive(Debug, Clone)]
pub struct HeaderScanner {
    state: ScanState,
    consumed: usize,
}

impl Default for HeaderScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderScanner {
    /// Scanner looking for [`CONTENT_LENGTH_FIELD`].
    pub fn new() -> Self {
        Self::with_field(CONTENT_LENGTH_FIELD)
    }

    /// Scanner looking for a different length field spelling.
    pub fn with_field(field: &'static [u8]) -> Self {
        Self {
            state: ScanState::Field(FieldMatcher::new(field)),
            consumed: 0,
        }
    }

    /// Whether the length field has been matched.
    pub fn found_field(&self) -> bool {
        !matches!(self.state, ScanState::Field(_))
    }

    /// Header bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Advance the state machine by one byte.
    pub fn push(&mut self, byte: u8) -> Result<Scan> {
        self.consumed += 1;

        match &mut self.state {
            ScanState::Field(matcher) => {
                if matcher.push(byte) {
                    self.state = ScanState::Length {
                        captured: BoundedVec::new(),
                        window: BoundaryWindow::default(),
                    };
                }
            }
            ScanState::Length { captured, window } => {
                // Capacity is only reached on the last push below.
                let _ = captured.push(byte);
                let at_boundary = window.push(byte);

                if at_boundary || captured.is_full() {
                    let content_length = checked_length(parse_decimal(captured))?;
                    self.state = if at_boundary {
                        ScanState::Done(ResponseHead { content_length })
                    } else {
                        ScanState::Boundary {
                            content_length,
                            window: window.clone(),
                        }
                    };
                }
            }
            ScanState::Boundary {
                content_length,
                window,
            } => {
                if window.push(byte) {
                    self.state = ScanState::Done(ResponseHead {
                        content_length: *content_length,
                    });
                }
            }
            ScanState::Done(_) => {}
        }

        Ok(match self.state {
            ScanState::Done(head) => Scan::Complete(head),
            _ => Scan::NeedMore,
        })
    }
}

/// Decimal prefix of `bytes`, `strtoul`-style.
///
/// Leading ASCII whitespace and one `+` are skipped; parsing stops at the
/// first non-digit. Returns 0 when there are no digits or on overflow.
pub fn parse_decimal(bytes: &[u8]) -> usize {
    let mut rest = bytes;
    while let [first, tail @ ..] = rest {
        if !first.is_ascii_whitespace() {
            break;
        }
        rest = tail;
    }
    if let [b'+', tail @ ..] = rest {
        rest = tail;
    }

    let mut value: usize = 0;
    for &b in rest.iter().take_while(|b| b.is_ascii_digit()) {
        value = match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(usize::from(b - b'0')))
        {
            Some(v) => v,
            None => return 0,
        };
    }
    value
}

// Zero covers both "no digits" and overflow from parse_decimal.
fn checked_length(value: usize) -> Result<usize> {
    match value {
        0 => Err(DiscoveryError::MalformedResponse("unparseable content-length")),
        v if v.checked_add(1).is_none() => {
            Err(DiscoveryError::MalformedResponse("content-length too large"))
        }
        v => Ok(v),
    }
}

/// Read the response header from `link` and return the declared body length.
///
/// On any failure the link is closed before returning.
pub fn read_response_head<C: Connection>(link: &mut Link<C>) -> Result<ResponseHead> {
    let result = scan(link);
    if result.is_err() {
        link.close();
    }
    result
}

fn scan<C: Connection>(link: &mut Link<C>) -> Result<ResponseHead> {
    let mut scanner = HeaderScanner::new();
    let mut byte = [0u8; 1];

    loop {
        if scanner.consumed() >= MAX_HEADER_BYTES {
            return Err(DiscoveryError::MalformedResponse("header section too long"));
        }

        if link.recv(&mut byte)? != 1 {
            return Err(DiscoveryError::MalformedResponse(if scanner.found_field() {
                "stream ended before end of header"
            } else {
                "content-length field not found"
            }));
        }

        if let Scan::Complete(head) = scanner.push(byte[0])? {
            log::debug!(
                "[header] content-length {} after {} header bytes",
                head.content_length,
                scanner.consumed()
            );
            return Ok(head);
        }
    }
}
