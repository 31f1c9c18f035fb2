// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS connector for discovery.
//!
//! Blocking rustls client over `std::net::TcpStream`. The discovery service
//! is reached with the configured trust anchors (a root CA file or the
//! bundled webpki roots) and an optional client certificate for mutual TLS.
//! Probes to a core endpoint pass the certificate authority taken from the
//! discovery document in [`Endpoint::trust`], which replaces the configured
//! anchors for that one connection.
//!
//! # Example
//!
//! ```ignore
//! use ggd_discovery::transport::{TlsConnector, TlsCredentials, Timeouts};
//!
//! let credentials = TlsCredentials::from_files(
//!     Some(Path::new("AmazonRootCA1.pem")),
//!     Some(Path::new("device.pem.crt")),
//!     Some(Path::new("private.pem.key")),
//! )?;
//! let connector = TlsConnector::new(&credentials, Timeouts::default())?;
//! ```

use super::{open_tcp, Connection, Connector, Endpoint, Timeouts};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;

/// PEM material used to build a [`TlsConnector`].
#[derive(Clone, Default)]
pub struct TlsCredentials {
    /// Trust anchors for the discovery endpoint; `None` uses webpki roots
    pub root_ca_pem: Option<Vec<u8>>,
    /// Client certificate chain (mutual TLS)
    pub client_cert_pem: Option<Vec<u8>>,
    /// Client private key (mutual TLS)
    pub client_key_pem: Option<Vec<u8>>,
}

impl TlsCredentials {
    /// Load whichever of the three PEM files are given.
    pub fn from_files(
        root_ca: Option<&Path>,
        client_cert: Option<&Path>,
        client_key: Option<&Path>,
    ) -> io::Result<Self> {
        Ok(Self {
            root_ca_pem: root_ca.map(std::fs::read).transpose()?,
            client_cert_pem: client_cert.map(std::fs::read).transpose()?,
            client_key_pem: client_key.map(std::fs::read).transpose()?,
        })
    }
}

impl fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("root_ca_pem", &self.root_ca_pem.as_ref().map(Vec::len))
            .field("client_cert_pem", &self.client_cert_pem.is_some())
            .field("client_key_pem", &self.client_key_pem.is_some())
            .finish()
    }
}

struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

/// Connector producing TLS connections.
pub struct TlsConnector {
    default_config: Arc<ClientConfig>,
    identity: Option<ClientIdentity>,
    timeouts: Timeouts,
}

impl TlsConnector {
    /// Build a connector from PEM credentials.
    pub fn new(credentials: &TlsCredentials, timeouts: Timeouts) -> io::Result<Self> {
        let identity = match (&credentials.client_cert_pem, &credentials.client_key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                let chain = parse_certificates(cert_pem)?;
                let key = PrivateKeyDer::from_pem_slice(key_pem)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Some(ClientIdentity { chain, key })
            }
            (None, None) => None,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "client certificate and key must be given together",
                ))
            }
        };

        let roots = match &credentials.root_ca_pem {
            Some(pem) => root_store_from_pem(pem)?,
            None => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                roots
            }
        };

        let default_config = Arc::new(client_config(roots, identity.as_ref())?);

        Ok(Self {
            default_config,
            identity,
            timeouts,
        })
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("mutual_tls", &self.identity.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Connector for TlsConnector {
    type Conn = TlsConnection;

    fn connect(&mut self, endpoint: &Endpoint<'_>) -> io::Result<TlsConnection> {
        let config = match endpoint.trust {
            Some(ca_pem) => Arc::new(client_config(
                root_store_from_pem(ca_pem)?,
                self.identity.as_ref(),
            )?),
            None => Arc::clone(&self.default_config),
        };

        let server_name = ServerName::try_from(endpoint.host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let tcp = open_tcp(endpoint.host, endpoint.port, self.timeouts)?;
        let conn = ClientConnection::new(config, server_name).map_err(io::Error::other)?;
        let mut stream = StreamOwned::new(conn, tcp);

        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock)?;
        }
        log::debug!("[tls] handshake complete with {}", endpoint);

        Ok(TlsConnection {
            stream,
            open: true,
        })
    }
}

/// A TLS-encrypted TCP connection.
pub struct TlsConnection {
    stream: StreamOwned<ClientConnection, TcpStream>,
    open: bool,
}

impl fmt::Debug for TlsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnection")
            .field("peer", &self.stream.sock.peer_addr().ok())
            .field("open", &self.open)
            .finish()
    }
}

impl Connection for TlsConnection {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(data)?;
        self.stream.flush()?;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn disconnect(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        self.stream.conn.send_close_notify();
        while self.stream.conn.wants_write() {
            match self.stream.conn.write_tls(&mut self.stream.sock) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }
}

fn parse_certificates(pem: &[u8]) -> io::Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "No certificates found in PEM data",
        ));
    }
    Ok(certs)
}

fn root_store_from_pem(pem: &[u8]) -> io::Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(pem)? {
        roots
            .add(cert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    }
    Ok(roots)
}

fn client_config(
    roots: RootCertStore,
    identity: Option<&ClientIdentity>,
) -> io::Result<ClientConfig> {
    let builder = ClientConfig::builder().with_root_certificates(roots);

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        None => Ok(builder.with_no_client_auth()),
    }
}
