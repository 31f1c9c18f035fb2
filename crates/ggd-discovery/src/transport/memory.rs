// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted in-memory transport (for testing).
//!
//! Each `(host, port)` pair is given a [`Route`]: either the connection is
//! refused, or every connection gets a fresh copy of a scripted byte stream
//! delivered in the given chunks. The connector keeps a journal of connect
//! attempts, sent bytes and disconnects that tests can inspect.

use super::{Connection, Connector, Endpoint};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Behaviour of one scripted endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Connection attempts fail with `ConnectionRefused`.
    Refuse,
    /// Connections deliver `chunks`, one `recv` call never crossing a chunk.
    Respond {
        /// Byte chunks in delivery order
        chunks: Vec<Vec<u8>>,
        /// Report `ConnectionReset` instead of end-of-stream after the last chunk
        fail_at_end: bool,
    },
}

impl Route {
    /// Route refusing every connection.
    pub fn refuse() -> Self {
        Self::Refuse
    }

    /// Route delivering `chunks` then end-of-stream.
    pub fn respond(chunks: Vec<Vec<u8>>) -> Self {
        Self::Respond {
            chunks,
            fail_at_end: false,
        }
    }

    /// Route delivering `bytes` split into pieces of at most `chunk` bytes.
    pub fn respond_chunked(bytes: &[u8], chunk: usize) -> Self {
        Self::respond(bytes.chunks(chunk.max(1)).map(<[u8]>::to_vec).collect())
    }

    /// Route delivering `chunks` then failing the next read.
    pub fn respond_then_fail(chunks: Vec<Vec<u8>>) -> Self {
        Self::Respond {
            chunks,
            fail_at_end: true,
        }
    }
}

#[derive(Debug, Default)]
struct Journal {
    connects: Vec<(String, u16)>,
    trusted: Vec<Option<Vec<u8>>>,
    sent: Vec<u8>,
    disconnects: usize,
}

/// In-memory [`Connector`] driven by per-endpoint routes.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    routes: Vec<(String, u16, Route)>,
    journal: Rc<RefCell<Journal>>,
}

impl MemoryConnector {
    /// Connector without routes; every connect is refused.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the route for `host:port`.
    pub fn route(mut self, host: &str, port: u16, route: Route) -> Self {
        self.routes.retain(|(h, p, _)| !(h == host && *p == port));
        self.routes.push((host.to_string(), port, route));
        self
    }

    /// Every connect attempt so far, in order.
    pub fn connect_attempts(&self) -> Vec<(String, u16)> {
        self.journal.borrow().connects.clone()
    }

    /// Trust anchor passed with each connect attempt, in order.
    pub fn trust_used(&self) -> Vec<Option<Vec<u8>>> {
        self.journal.borrow().trusted.clone()
    }

    /// All bytes sent over every connection.
    pub fn sent(&self) -> Vec<u8> {
        self.journal.borrow().sent.clone()
    }

    /// Number of connections torn down.
    pub fn disconnects(&self) -> usize {
        self.journal.borrow().disconnects
    }

    /// Forget recorded activity, keeping the routes.
    pub fn clear_journal(&self) {
        *self.journal.borrow_mut() = Journal::default();
    }
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&mut self, endpoint: &Endpoint<'_>) -> io::Result<MemoryConnection> {
        {
            let mut journal = self.journal.borrow_mut();
            journal
                .connects
                .push((endpoint.host.to_string(), endpoint.port));
            journal.trusted.push(endpoint.trust.map(<[u8]>::to_vec));
        }

        let route = self
            .routes
            .iter()
            .find(|(h, p, _)| h == endpoint.host && *p == endpoint.port)
            .map(|(_, _, route)| route);

        match route {
            Some(Route::Respond {
                chunks,
                fail_at_end,
            }) => Ok(MemoryConnection {
                chunks: chunks.iter().filter(|c| !c.is_empty()).cloned().collect(),
                offset: 0,
                fail_at_end: *fail_at_end,
                open: true,
                journal: Rc::clone(&self.journal),
            }),
            Some(Route::Refuse) | None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no route to {}", endpoint),
            )),
        }
    }
}

/// Connection produced by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryConnection {
    chunks: VecDeque<Vec<u8>>,
    offset: usize,
    fail_at_end: bool,
    open: bool,
    journal: Rc<RefCell<Journal>>,
}

impl Connection for MemoryConnection {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.journal.borrow_mut().sent.extend_from_slice(data);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }

        let Some(chunk) = self.chunks.front() else {
            return if self.fail_at_end {
                Err(io::ErrorKind::ConnectionReset.into())
            } else {
                Ok(0)
            };
        };

        let n = buf.len().min(chunk.len() - self.offset);
        buf[..n].copy_from_slice(&chunk[self.offset..self.offset + n]);
        self.offset += n;

        if self.offset == chunk.len() {
            self.chunks.pop_front();
            self.offset = 0;
        }
        Ok(n)
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.journal.borrow_mut().disconnects += 1;
        }
    }
}
