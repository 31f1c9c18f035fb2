// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction for discovery
//!
//! Discovery needs four primitives from the network layer: connect, send,
//! receive and disconnect. They are split over two traits so that a
//! connector (which knows credentials and timeouts) can hand out any number
//! of independent connections:
//!
//! - [`Connector`] opens a [`Connection`] to an [`Endpoint`]
//! - [`Connection`] moves bytes and is torn down with `disconnect`
//!
//! ## Design Principles
//!
//! - **Blocking I/O** - timeouts live in the connector, not in the caller
//! - **Caller-owned buffers** - `recv` fills a slice, never allocates
//! - **Guaranteed teardown** - [`Link`] disconnects on every exit path

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub mod memory;
#[cfg(feature = "tls")]
pub mod tls;

pub use memory::{MemoryConnection, MemoryConnector, Route};
#[cfg(feature = "tls")]
pub use tls::{TlsConnection, TlsConnector, TlsCredentials};

/// Remote endpoint to connect to.
#[derive(Clone, Copy)]
pub struct Endpoint<'a> {
    /// Host name or textual IP address
    pub host: &'a str,
    /// TCP port
    pub port: u16,
    /// PEM certificate authority to trust for this connection only.
    ///
    /// `None` means the connector's configured trust anchors.
    pub trust: Option<&'a [u8]>,
}

impl<'a> Endpoint<'a> {
    /// Endpoint using the connector's default trust anchors.
    pub const fn new(host: &'a str, port: u16) -> Self {
        Self {
            host,
            port,
            trust: None,
        }
    }

    /// Endpoint trusting only `ca_pem`.
    pub const fn with_trust(host: &'a str, port: u16, ca_pem: &'a [u8]) -> Self {
        Self {
            host,
            port,
            trust: Some(ca_pem),
        }
    }
}

impl fmt::Debug for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("trust", &self.trust.map(<[u8]>::len))
            .finish()
    }
}

impl fmt::Display for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One established byte stream.
pub trait Connection {
    /// Send bytes, returning how many were accepted.
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Receive up to `buf.len()` bytes (blocking).
    ///
    /// `Ok(0)` means the peer closed the stream.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Tear the connection down. Must be safe to call more than once.
    fn disconnect(&mut self);
}

/// Factory for connections.
pub trait Connector {
    /// Connection type produced by this connector
    type Conn: Connection;

    /// Open a connection to `endpoint` (blocking, bounded by the connector's timeout).
    fn connect(&mut self, endpoint: &Endpoint<'_>) -> io::Result<Self::Conn>;
}

/// Owning guard over an open connection.
///
/// The connection is disconnected exactly once, either by [`Link::close`]
/// or when the guard is dropped.
pub struct Link<C: Connection> {
    conn: Option<C>,
}

impl<C: Connection> Link<C> {
    /// Take ownership of an open connection.
    pub fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }

    /// Whether the connection has not been closed yet.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Send the whole of `data`.
    pub fn send_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        let conn = self.conn.as_mut().ok_or_else(not_connected)?;
        while !data.is_empty() {
            match conn.send(data)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection accepted no bytes",
                    ))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Receive into `buf`; fails once the link is closed.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn.as_mut().ok_or_else(not_connected)?.recv(buf)
    }

    /// Disconnect now. Later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.disconnect();
        }
    }
}

impl<C: Connection> Drop for Link<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connection> fmt::Debug for Link<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("open", &self.is_open())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "link already closed")
}

/// Connect and I/O timeouts shared by the socket connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on establishing the TCP connection
    pub connect: Duration,
    /// Read and write timeout once connected
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(2),
        }
    }
}

/// Resolve `host:port` and connect to the first address that answers.
pub(crate) fn open_tcp(host: &str, port: u16, timeouts: Timeouts) -> io::Result<TcpStream> {
    let mut last_err = None;

    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeouts.connect) {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                stream.set_read_timeout(Some(timeouts.io))?;
                stream.set_write_timeout(Some(timeouts.io))?;
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("[transport] connect {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}:{} resolved to no address", host, port),
        )
    }))
}

/// Plain TCP connector (no TLS).
///
/// Ignores [`Endpoint::trust`]. Meant for local responders and testing.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    timeouts: Timeouts,
}

impl TcpConnector {
    /// Create a connector with the given timeouts.
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&mut self, endpoint: &Endpoint<'_>) -> io::Result<TcpStream> {
        open_tcp(endpoint.host, endpoint.port, self.timeouts)
    }
}

impl Connection for TcpStream {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn disconnect(&mut self) {
        // Already-closed sockets report NotConnected; nothing to do then.
        let _ = self.shutdown(Shutdown::Both);
    }
}
