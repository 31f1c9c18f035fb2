// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connectivity candidate enumeration and selection.
//!
//! A core lists its reachable endpoints under
//! `GGGroups[0].Cores[0].Connectivity[k]`. Entries are walked by index until
//! the `HostAddress` query for an index fails.
//!
//! ```text
//! Automatic: Enumerate -> Validate -> Probe -> Selected
//!                ^            |          |
//!                +------------+----------+   (next candidate)
//!            Enumerate exhausted -> NoReachableCandidate
//!
//! Manual:    DirectLookup(interface) -> Selected | NoReachableCandidate
//! ```

use crate::error::{DiscoveryError, Result};
use crate::header::parse_decimal;
use crate::json;
use crate::transport::{Connector, Endpoint, Link};

/// Address never selected in automatic mode.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Path of the core whose connectivity list is inspected.
pub const CORE_PATH: &str = "GGGroups[0].Cores[0]";

/// Query for the host address of connectivity entry `index`.
pub fn host_address_path(index: usize) -> String {
    format!("{}.Connectivity[{}].HostAddress", CORE_PATH, index)
}

/// Query for the port number of connectivity entry `index`.
pub fn port_number_path(index: usize) -> String {
    format!("{}.Connectivity[{}].PortNumber", CORE_PATH, index)
}

/// Caller-chosen connectivity entry for manual selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostParameters {
    /// Index into the core's connectivity list
    pub interface: usize,
}

/// How a candidate is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Probe candidates in order; first one accepting a connection wins.
    #[default]
    Automatic,
    /// Use the given entry as-is, without probing.
    Manual(HostParameters),
}

/// One connectivity entry as found in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'d> {
    /// Position in the connectivity list
    pub index: usize,
    /// Host address text, borrowed from the document
    pub host: &'d str,
    /// Port, `None` when missing or not a valid non-zero port
    pub port: Option<u16>,
}

/// A candidate with a usable port, chosen by [`select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected<'d> {
    /// Position in the connectivity list
    pub index: usize,
    /// Host address text, borrowed from the document
    pub host: &'d str,
    /// Port number
    pub port: u16,
}

impl<'d> Candidate<'d> {
    fn selected(self) -> Option<Selected<'d>> {
        Some(Selected {
            index: self.index,
            host: self.host,
            port: self.port?,
        })
    }
}

/// Parse a port number the way the length field is parsed.
pub fn parse_port(text: &str) -> Option<u16> {
    u16::try_from(parse_decimal(text.as_bytes()))
        .ok()
        .filter(|&port| port != 0)
}

/// Connectivity entry `index`, or `None` when it has no host address.
pub fn candidate_at(document: &str, index: usize) -> Option<Candidate<'_>> {
    let host = json::search(document, &host_address_path(index))?;
    let port = json::search(document, &port_number_path(index)).and_then(parse_port);
    Some(Candidate { index, host, port })
}

/// Whether automatic selection may use `host`.
pub fn is_valid_address(host: &str) -> bool {
    !host.is_empty() && host != LOOPBACK_ADDRESS
}

/// Iterator over connectivity entries, stopping at the first missing index.
#[derive(Debug, Clone)]
pub struct Candidates<'d> {
    document: &'d str,
    next: Option<usize>,
}

impl<'d> Candidates<'d> {
    /// Enumerate the entries of `document`.
    pub fn new(document: &'d str) -> Self {
        Self {
            document,
            next: Some(0),
        }
    }
}

impl<'d> Iterator for Candidates<'d> {
    type Item = Candidate<'d>;

    fn next(&mut self) -> Option<Candidate<'d>> {
        let index = self.next?;
        let candidate = candidate_at(self.document, index);
        self.next = candidate.map(|_| index + 1);
        candidate
    }
}

/// Choose the core endpoint to use.
///
/// In automatic mode each valid candidate is probed by opening (and
/// immediately closing) a connection that trusts `ca_pem`. In manual mode
/// the entry at the requested index is returned without any network I/O.
pub fn select<'d, C: Connector>(
    document: &'d str,
    selection: Selection,
    ca_pem: &[u8],
    connector: &mut C,
) -> Result<Selected<'d>> {
    match selection {
        Selection::Manual(params) => {
            let selected = candidate_at(document, params.interface).and_then(Candidate::selected);
            match selected {
                Some(selected) => {
                    log::info!(
                        "[select] using interface {} -> {}:{}",
                        params.interface,
                        selected.host,
                        selected.port
                    );
                    Ok(selected)
                }
                None => {
                    log::warn!("[select] no usable interface {}", params.interface);
                    Err(DiscoveryError::NoReachableCandidate { tried: 0 })
                }
            }
        }
        Selection::Automatic => probe_in_order(document, ca_pem, connector),
    }
}

fn probe_in_order<'d, C: Connector>(
    document: &'d str,
    ca_pem: &[u8],
    connector: &mut C,
) -> Result<Selected<'d>> {
    let mut tried = 0;

    for candidate in Candidates::new(document) {
        tried += 1;

        if !is_valid_address(candidate.host) {
            log::debug!(
                "[select] skipping candidate {} ({:?})",
                candidate.index,
                candidate.host
            );
            continue;
        }
        let Some(selected) = candidate.selected() else {
            log::warn!(
                "[select] candidate {} ({}) has no usable port",
                candidate.index,
                candidate.host
            );
            continue;
        };

        let endpoint = Endpoint::with_trust(selected.host, selected.port, ca_pem);
        match connector.connect(&endpoint) {
            Ok(conn) => {
                Link::new(conn).close();
                log::info!(
                    "[select] candidate {} reachable at {}",
                    selected.index,
                    endpoint
                );
                return Ok(selected);
            }
            Err(e) => log::debug!("[select] probe {} failed: {}", endpoint, e),
        }
    }

    log::warn!("[select] none of {} candidates reachable", tried);
    Err(DiscoveryError::NoReachableCandidate { tried })
}
