// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON field extraction for the discovery document.
//!
//! Queries take a bracketed dot-path such as
//! `GGGroups[0].Cores[0].Connectivity[2].HostAddress` and return a slice of
//! the original document text. String values come back without their quotes
//! and with escape sequences left as they are on the wire; nothing is copied
//! or decoded. Walking the path uses `serde_json`'s borrowed [`RawValue`],
//! so each step only skims the enclosing object or array.
//!
//! The one decoding step is [`decode_certificate`], which works on a private
//! copy of the certificate value.

use crate::error::{DiscoveryError, Result};
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::value::RawValue;
use std::fmt;

/// Path of the group certificate authority.
///
/// Only the first CA of the first group is used.
pub const CERTIFICATE_PATH: &str = "GGGroups[0].CAs[0]";

/// Escape sequence rewritten to a newline byte in certificates.
pub const ESCAPED_NEWLINE: &[u8] = b"\\n";

/// Check that `document` is UTF-8 JSON and return it as text.
pub fn validate(document: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(document)
        .map_err(|e| DiscoveryError::DocumentInvalid(format!("not UTF-8: {}", e)))?;

    serde_json::from_str::<IgnoredAny>(text)
        .map_err(|e| DiscoveryError::DocumentInvalid(e.to_string()))?;

    Ok(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'p> {
    Key(&'p str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let path = path.strip_prefix('.').unwrap_or(path);
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };

        if !key.is_empty() {
            segments.push(Segment::Key(key));
        } else if rest.is_empty() {
            return None;
        }

        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            segments.push(Segment::Index(inner[..close].parse().ok()?));
            rest = &inner[close + 1..];
        }
    }

    Some(segments)
}

/// Seed selecting the first member named `.0` of an object.
struct Member<'k>(&'k str);

impl<'de> DeserializeSeed<'de> for Member<'_> {
    type Value = Option<&'de RawValue>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for Member<'_> {
    type Value = Option<&'de RawValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut map: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let mut found = None;
        while let Some(key) = map.next_key::<String>()? {
            if found.is_none() && key == self.0 {
                found = Some(map.next_value::<&'de RawValue>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(found)
    }
}

/// Seed selecting element `.0` of an array.
struct Element(usize);

impl<'de> DeserializeSeed<'de> for Element {
    type Value = Option<&'de RawValue>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for Element {
    type Value = Option<&'de RawValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
    ) -> std::result::Result<Self::Value, A::Error> {
        let mut found = None;
        let mut index = 0;
        loop {
            if index == self.0 {
                match seq.next_element::<&'de RawValue>()? {
                    Some(value) => found = Some(value),
                    None => break,
                }
            } else if seq.next_element::<IgnoredAny>()?.is_none() {
                break;
            }
            index += 1;
        }
        Ok(found)
    }
}

/// Look up `path` in `document`.
///
/// Returns the value's text inside `document`: string contents without the
/// surrounding quotes, anything else verbatim. `None` when any step of the
/// path is missing, has the wrong type, or the path is not well formed.
pub fn search<'d>(document: &'d str, path: &str) -> Option<&'d str> {
    let mut current = document;

    for segment in parse_path(path)? {
        let mut de = serde_json::Deserializer::from_str(current);
        let step = match segment {
            Segment::Key(key) => Member(key).deserialize(&mut de),
            Segment::Index(index) => Element(index).deserialize(&mut de),
        };
        current = step.ok()??.get();
    }

    Some(unquote(current))
}

/// Like [`search`], failing with [`DiscoveryError::FieldNotFound`].
pub fn require<'d>(document: &'d str, path: &str) -> Result<&'d str> {
    search(document, path).ok_or_else(|| DiscoveryError::FieldNotFound(path.to_string()))
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

/// Rewrite every `\n` escape in `buf` to a newline byte, compacting in place.
///
/// Single forward pass: the read cursor never falls behind the write cursor
/// and every byte is read once. Returns the new length.
pub fn unescape_newlines(buf: &mut [u8]) -> usize {
    let len = buf.len();
    let mut read = 0;
    let mut write = 0;

    while read < len {
        if buf[read] == b'\\' && buf.get(read + 1) == Some(&b'n') {
            buf[write] = b'\n';
            read += 2;
        } else {
            buf[write] = buf[read];
            read += 1;
        }
        write += 1;
    }
    write
}

/// Decode the certificate value found at [`CERTIFICATE_PATH`].
///
/// Rejects values shorter than the trailing escape, drops a trailing `\n`
/// escape, and unescapes the rest into a freshly allocated buffer.
pub fn decode_certificate(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.as_bytes();
    if raw.len() < ESCAPED_NEWLINE.len() {
        return Err(DiscoveryError::DocumentInvalid(format!(
            "certificate value too short ({} bytes)",
            raw.len()
        )));
    }

    let mut cert = Vec::with_capacity(raw.len());
    cert.extend_from_slice(raw.strip_suffix(ESCAPED_NEWLINE).unwrap_or(raw));

    let len = unescape_newlines(&mut cert);
    cert.truncate(len);

    if cert.is_empty() {
        return Err(DiscoveryError::DocumentInvalid(
            "certificate value is empty".into(),
        ));
    }
    Ok(cert)
}
