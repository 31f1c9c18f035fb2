// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery session.
//!
//! One discovery runs these steps in order over a single scratch buffer:
//!
//! ```text
//! start_request        write GET into buffer, connect, send
//!   read_response_head scan header one byte at a time -> content-length
//!   receive_document   stream body into the same buffer (link closed)
//! host_address_from_document
//!                      validate JSON, decode CA, select candidate
//! ```
//!
//! [`discover`] chains them. The steps are public for callers that need to
//! drive the exchange themselves (for instance to size the buffer from the
//! advertised content-length before reading the body).

use crate::body::receive_document;
use crate::candidate::{self, Selection, CORE_PATH};
use crate::error::{DiscoveryError, Result};
use crate::header::read_response_head;
use crate::json::{self, CERTIFICATE_PATH};
use crate::transport::{Connector, Endpoint, Link};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Request path prefix; the thing name is appended.
pub const DISCOVERY_PATH: &str = "/greengrass/discover/thing/";

/// Default port of the discovery service.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8443;

const REQUEST_PREFIX: &str = "GET ";
const REQUEST_SUFFIX: &str = " HTTP/1.1\r\n\r\n";

/// Number of bytes the request for `thing_name` occupies.
pub fn request_len(thing_name: &str) -> usize {
    REQUEST_PREFIX.len() + DISCOVERY_PATH.len() + thing_name.len() + REQUEST_SUFFIX.len()
}

/// Fixed-capacity scratch region for one session.
///
/// Holds the outgoing request first, then the response body. Never grows.
#[derive(Clone, PartialEq, Eq)]
pub struct DiscoveryBuffer {
    bytes: Box<[u8]>,
}

impl DiscoveryBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Zero the whole buffer.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }
}

impl Deref for DiscoveryBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for DiscoveryBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for DiscoveryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Outcome of a successful discovery.
///
/// Everything is owned; nothing borrows from the scratch buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct HostAddressData {
    /// Selected core host address
    pub host: String,
    /// Selected core port
    pub port: u16,
    /// Group certificate authority (PEM bytes, newlines decoded).
    ///
    /// Never empty when present.
    pub certificate: Option<Vec<u8>>,
    /// `GGGroups[0].GGGroupId`, when the document carries it
    pub group_id: Option<String>,
    /// `thingArn` of the core, when the document carries it
    pub core_thing_arn: Option<String>,
}

impl HostAddressData {
    /// Certificate as PEM text, if present and valid UTF-8.
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Endpoint of the selected core, trusting the discovered CA.
    pub fn endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            host: &self.host,
            port: self.port,
            trust: self.certificate.as_deref(),
        }
    }
}

impl fmt::Debug for HostAddressData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAddressData")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("certificate", &self.certificate.as_ref().map(Vec::len))
            .field("group_id", &self.group_id)
            .field("core_thing_arn", &self.core_thing_arn)
            .finish()
    }
}

/// Inputs of one discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryRequest<'a> {
    /// Discovery service host
    pub endpoint_host: &'a str,
    /// Discovery service port
    pub endpoint_port: u16,
    /// Thing name whose core is looked up
    pub thing_name: &'a str,
    /// Candidate selection mode
    pub selection: Selection,
}

impl<'a> DiscoveryRequest<'a> {
    /// Automatic-selection request.
    pub fn new(endpoint_host: &'a str, endpoint_port: u16, thing_name: &'a str) -> Self {
        Self {
            endpoint_host,
            endpoint_port,
            thing_name,
            selection: Selection::Automatic,
        }
    }

    /// Set the selection mode.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

/// Check a thing name before it is placed on the request line.
pub fn validate_thing_name(thing_name: &str) -> Result<()> {
    if thing_name.is_empty() {
        return Err(DiscoveryError::InvalidRequest("thing name is empty"));
    }
    if !thing_name.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(DiscoveryError::InvalidRequest(
            "thing name contains non-printable characters",
        ));
    }
    Ok(())
}

/// Write the request line for `thing_name` at the start of `buffer`.
///
/// Returns the request length. Nothing is written when it does not fit.
pub fn write_request(buffer: &mut [u8], thing_name: &str) -> Result<usize> {
    validate_thing_name(thing_name)?;

    let required = request_len(thing_name);
    if required > buffer.len() {
        return Err(DiscoveryError::BufferTooSmall {
            capacity: buffer.len(),
            required,
        });
    }

    let mut at = 0;
    for part in [REQUEST_PREFIX, DISCOVERY_PATH, thing_name, REQUEST_SUFFIX] {
        buffer[at..at + part.len()].copy_from_slice(part.as_bytes());
        at += part.len();
    }
    Ok(at)
}

/// Connect to the discovery service and send the request for `thing_name`.
///
/// `buffer` carries the request; it is free for the response afterwards.
/// No connection is attempted when the request is rejected.
pub fn start_request<C: Connector>(
    connector: &mut C,
    endpoint: &Endpoint<'_>,
    thing_name: &str,
    buffer: &mut [u8],
) -> Result<Link<C::Conn>> {
    let len = write_request(buffer, thing_name)?;

    let conn = connector.connect(endpoint).map_err(|e| {
        log::warn!("[session] connect to {} failed: {}", endpoint, e);
        e
    })?;
    let mut link = Link::new(conn);
    link.send_all(&buffer[..len])?;

    log::debug!("[session] sent {} byte request to {}", len, endpoint);
    Ok(link)
}

/// Interpret a received discovery document.
///
/// Extracts and decodes the group CA, selects a core endpoint with
/// `selection` (probing through `connector` in automatic mode) and collects
/// the optional identifiers.
pub fn host_address_from_document<C: Connector>(
    document: &[u8],
    selection: Selection,
    connector: &mut C,
) -> Result<HostAddressData> {
    let text = json::validate(document)?;
    let certificate = json::decode_certificate(json::require(text, CERTIFICATE_PATH)?)?;

    let selected = candidate::select(text, selection, &certificate, connector)?;

    let group_id = json::search(text, "GGGroups[0].GGGroupId").map(str::to_string);
    let core_thing_arn = json::search(text, &format!("{}.thingArn", CORE_PATH)).map(str::to_string);

    Ok(HostAddressData {
        host: selected.host.to_string(),
        port: selected.port,
        certificate: Some(certificate),
        group_id,
        core_thing_arn,
    })
}

/// Run a complete discovery.
///
/// `buffer` is the session's scratch region; the document must fit in it
/// together with its terminator byte. Every connection opened here is closed
/// before returning, on success and on failure.
pub fn discover<C: Connector>(
    connector: &mut C,
    request: &DiscoveryRequest<'_>,
    buffer: &mut [u8],
) -> Result<HostAddressData> {
    let endpoint = Endpoint::new(request.endpoint_host, request.endpoint_port);

    let mut link = start_request(connector, &endpoint, request.thing_name, buffer)?;
    let head = read_response_head(&mut link)?;
    let length = receive_document(&mut link, buffer, head)?;
    drop(link);

    log::debug!("[session] received {} byte document from {}", length, endpoint);

    let data = host_address_from_document(&buffer[..length], request.selection, connector)?;
    log::info!(
        "[session] {} -> core {}:{}",
        request.thing_name,
        data.host,
        data.port
    );
    Ok(data)
}

/// A connector paired with the buffer it owns.
///
/// Each session has its own buffer, so independent sessions never share
/// scratch memory.
pub struct DiscoverySession<C: Connector> {
    connector: C,
    buffer: DiscoveryBuffer,
}

impl<C: Connector> DiscoverySession<C> {
    /// Create a session with a buffer of `capacity` bytes.
    pub fn new(connector: C, capacity: usize) -> Self {
        Self {
            connector,
            buffer: DiscoveryBuffer::with_capacity(capacity),
        }
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Borrow the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run [`discover`] on a freshly reset buffer.
    pub fn discover(&mut self, request: &DiscoveryRequest<'_>) -> Result<HostAddressData> {
        self.buffer.reset();
        discover(&mut self.connector, request, &mut self.buffer)
    }
}

impl<C: Connector> fmt::Debug for DiscoverySession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::HostParameters;
    use crate::transport::{MemoryConnector, Route};

    const SERVICE: &str = "greengrass-ats.iot.eu-west-1.amazonaws.com";

    const DOC: &str = r#"{"GGGroups":[{"GGGroupId":"group-7","Cores":[{"thingArn":"arn:aws:iot:eu-west-1:1:thing/core-7","Connectivity":[{"Id":"lo","HostAddress":"127.0.0.1","PortNumber":8883},{"Id":"eth0","HostAddress":"10.1.0.4","PortNumber":8883},{"Id":"wlan0","HostAddress":"10.2.0.4","PortNumber":"8884"}]}],"CAs":["-----BEGIN CERTIFICATE-----\nQUJD\n-----END CERTIFICATE-----\n"]}]}"#;

    fn response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn connector_for(body: &str) -> MemoryConnector {
        MemoryConnector::new()
            .route(SERVICE, 8443, Route::respond_chunked(&response(body), 7))
            .route("10.1.0.4", 8883, Route::refuse())
            .route("10.2.0.4", 8884, Route::respond(vec![]))
    }

    fn request() -> DiscoveryRequest<'static> {
        DiscoveryRequest::new(SERVICE, 8443, "sensor-01")
    }

    #[test]
    fn test_write_request_template() {
        let mut buffer = [0u8; 64];
        let len = write_request(&mut buffer, "sensor-01").unwrap();
        assert_eq!(
            &buffer[..len],
            b"GET /greengrass/discover/thing/sensor-01 HTTP/1.1\r\n\r\n"
        );
        assert_eq!(len, request_len("sensor-01"));
    }

    #[test]
    fn test_write_request_does_not_overflow() {
        let mut buffer = [0xEEu8; 20];
        let err = write_request(&mut buffer, "sensor-01").unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::BufferTooSmall {
                capacity: 20,
                required: 53
            }
        ));
        assert!(buffer.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_thing_name_validation() {
        assert!(validate_thing_name("core_1:a-b").is_ok());
        assert!(matches!(
            validate_thing_name(""),
            Err(DiscoveryError::InvalidRequest(_))
        ));
        assert!(validate_thing_name("two words").is_err());
        assert!(validate_thing_name("line\r\nbreak").is_err());
    }

    #[test]
    fn test_discover_end_to_end() {
        let mut connector = connector_for(DOC);
        let mut buffer = DiscoveryBuffer::with_capacity(1024);

        let data = discover(&mut connector, &request(), &mut buffer).unwrap();

        assert_eq!(data.host, "10.2.0.4");
        assert_eq!(data.port, 8884);
        assert_eq!(
            data.certificate_pem(),
            Some("-----BEGIN CERTIFICATE-----\nQUJD\n-----END CERTIFICATE-----")
        );
        assert_eq!(data.group_id.as_deref(), Some("group-7"));
        assert_eq!(
            data.core_thing_arn.as_deref(),
            Some("arn:aws:iot:eu-west-1:1:thing/core-7")
        );

        assert_eq!(
            connector.sent(),
            b"GET /greengrass/discover/thing/sensor-01 HTTP/1.1\r\n\r\n"
        );
        // Discovery connection and the successful probe.
        assert_eq!(connector.disconnects(), 2);
        assert_eq!(connector.trust_used()[0], None);
    }

    #[test]
    fn test_discover_twice_is_identical() {
        let mut session = DiscoverySession::new(connector_for(DOC), 1024);

        let first = session.discover(&request()).unwrap();
        let second = session.discover(&request()).unwrap();

        assert_eq!(first, second);
        assert_eq!(session.connector().disconnects(), 4);
    }

    #[test]
    fn test_manual_selection_skips_probe() {
        let mut connector = connector_for(DOC);
        let mut buffer = DiscoveryBuffer::with_capacity(1024);
        let request = request().with_selection(Selection::Manual(HostParameters { interface: 1 }));

        let data = discover(&mut connector, &request, &mut buffer).unwrap();

        assert_eq!((data.host.as_str(), data.port), ("10.1.0.4", 8883));
        assert_eq!(connector.connect_attempts().len(), 1);
        assert_eq!(connector.disconnects(), 1);
    }

    #[test]
    fn test_invalid_thing_name_opens_nothing() {
        let mut connector = connector_for(DOC);
        let mut buffer = DiscoveryBuffer::with_capacity(1024);
        let request = DiscoveryRequest::new(SERVICE, 8443, "bad name");

        let err = discover(&mut connector, &request, &mut buffer).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidRequest(_)));
        assert!(connector.connect_attempts().is_empty());
    }

    #[test]
    fn test_document_too_large_for_buffer() {
        let mut connector = connector_for(DOC);
        let mut buffer = DiscoveryBuffer::with_capacity(128);

        let err = discover(&mut connector, &request(), &mut buffer).unwrap_err();
        match err {
            DiscoveryError::BufferTooSmall { capacity, required } => {
                assert_eq!(capacity, 128);
                assert_eq!(required, DOC.len() + 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(connector.disconnects(), 1);
    }

    #[test]
    fn test_missing_content_length_tears_down() {
        let mut connector = MemoryConnector::new().route(
            SERVICE,
            8443,
            Route::respond(vec![b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec()]),
        );
        let mut buffer = DiscoveryBuffer::with_capacity(256);

        let err = discover(&mut connector, &request(), &mut buffer).unwrap_err();
        assert!(matches!(err, DiscoveryError::MalformedResponse(_)));
        assert_eq!(connector.disconnects(), 1);
    }

    #[test]
    fn test_document_without_certificate() {
        let body = r#"{"GGGroups":[{"Cores":[{"Connectivity":[]}]}]}"#;
        let mut connector = connector_for(body);
        let mut buffer = DiscoveryBuffer::with_capacity(256);

        let err = discover(&mut connector, &request(), &mut buffer).unwrap_err();
        assert!(matches!(err, DiscoveryError::FieldNotFound(ref p) if p == CERTIFICATE_PATH));
        assert_eq!(connector.disconnects(), 1);
    }

    #[test]
    fn test_document_not_json() {
        let mut connector = connector_for("<html>busy</html>");
        let mut buffer = DiscoveryBuffer::with_capacity(256);

        let err = discover(&mut connector, &request(), &mut buffer).unwrap_err();
        assert!(matches!(err, DiscoveryError::DocumentInvalid(_)));
    }

    #[test]
    fn test_no_candidates() {
        let body = r#"{"GGGroups":[{"Cores":[{"Connectivity":[]}],"CAs":["PEM\n"]}]}"#;
        let mut connector = connector_for(body);
        let mut buffer = DiscoveryBuffer::with_capacity(256);

        let err = discover(&mut connector, &request(), &mut buffer).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoReachableCandidate { tried: 0 }));
    }

    #[test]
    fn test_stepwise_matches_discover() {
        let mut connector = connector_for(DOC);
        let mut buffer = DiscoveryBuffer::with_capacity(1024);

        let mut link = start_request(
            &mut connector,
            &Endpoint::new(SERVICE, 8443),
            "sensor-01",
            &mut buffer,
        )
        .unwrap();
        let head = read_response_head(&mut link).unwrap();
        assert_eq!(head.content_length, DOC.len());

        let len = receive_document(&mut link, &mut buffer, head).unwrap();
        assert!(!link.is_open());
        assert_eq!(&buffer[..len], DOC.as_bytes());

        let data =
            host_address_from_document(&buffer[..len], Selection::Automatic, &mut connector)
                .unwrap();
        assert_eq!(data.endpoint().to_string(), "10.2.0.4:8884");
        assert!(data.endpoint().trust.is_some());
    }

    #[test]
    fn test_debug_output_is_compact() {
        let session = DiscoverySession::new(MemoryConnector::new(), 2048);
        assert!(format!("{:?}", session).contains("capacity: 2048"));
    }
}
