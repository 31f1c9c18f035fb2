// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Behavioural properties of discovery, checked over the in-memory transport.

use ggd_discovery::body::{fetch_chunk, receive_document, Progress};
use ggd_discovery::candidate::{select, HostParameters, Selection};
use ggd_discovery::header::{read_response_head, HeaderScanner, ResponseHead, Scan};
use ggd_discovery::json::{decode_certificate, unescape_newlines};
use ggd_discovery::transport::{MemoryConnection, MemoryConnector, Route};
use ggd_discovery::{
    discover, Connector, DiscoveryBuffer, DiscoveryError, DiscoveryRequest, Endpoint, Link,
};

const SERVICE: &str = "discovery.test";

fn open(route: Route) -> (MemoryConnector, Link<MemoryConnection>) {
    let mut connector = MemoryConnector::new().route(SERVICE, 8443, route);
    let conn = connector.connect(&Endpoint::new(SERVICE, 8443)).unwrap();
    (connector, Link::new(conn))
}

fn connectivity_doc(entries: &[(&str, u16)]) -> String {
    let list: Vec<String> = entries
        .iter()
        .map(|(host, port)| format!(r#"{{"HostAddress":"{}","PortNumber":"{}"}}"#, host, port))
        .collect();
    format!(
        r#"{{"GGGroups":[{{"Cores":[{{"thingArn":"arn:core","Connectivity":[{}]}}],"CAs":["-----BEGIN CERTIFICATE-----\nQ0E=\n-----END CERTIFICATE-----\n"]}}]}}"#,
        list.join(",")
    )
}

fn http_response(body: &str) -> Vec<u8> {
    format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

#[test]
fn test_matching_length_completes_with_terminator() {
    let mut rng = fastrand::Rng::with_seed(0x6767);

    for _ in 0..64 {
        let len = rng.usize(1..600);
        let body: Vec<u8> = (0..len).map(|_| rng.alphanumeric() as u8).collect();
        let chunk = rng.usize(1..=len);
        let (_, mut link) = open(Route::respond_chunked(&body, chunk));

        let document_size = len + 1;
        let mut buffer = vec![0xFFu8; document_size + rng.usize(0..16)];
        let mut received = 0;

        while fetch_chunk(&mut link, &mut buffer, &mut received, document_size).unwrap()
            == Progress::Incomplete
        {}

        assert_eq!(received, document_size - 1);
        assert_eq!(buffer[document_size - 1], 0);
        assert_eq!(&buffer[..len], &body[..]);
        assert!(!link.is_open());
    }
}

#[test]
fn test_excess_body_never_writes_past_capacity() {
    let mut rng = fastrand::Rng::with_seed(0x0bad);

    for _ in 0..32 {
        let declared = rng.usize(1..100);
        let sent = declared + rng.usize(1..50);
        let capacity = declared + 1 + rng.usize(0..8);

        // First chunk stays short of the declared length so the overrun
        // happens inside a single read.
        let split = rng.usize(0..declared);
        let (connector, mut link) = open(Route::respond(vec![
            vec![b'z'; split],
            vec![b'z'; sent - split],
        ]));

        let mut backing = vec![0u8; capacity + 8];
        let (buffer, guard) = backing.split_at_mut(capacity);
        let result = receive_document(
            &mut link,
            buffer,
            ResponseHead {
                content_length: declared,
            },
        );

        assert!(matches!(
            result,
            Err(DiscoveryError::MalformedResponse(_)) | Err(DiscoveryError::BufferTooSmall { .. })
        ));
        assert!(guard.iter().all(|&b| b == 0));
        assert_eq!(connector.disconnects(), 1);
    }
}

#[test]
fn test_field_match_restarts_after_false_start() {
    let mut scanner = HeaderScanner::new();
    let mut result = Scan::NeedMore;
    for &b in b"XcontentY-length:content-length: 42\r\n\r\n" {
        result = scanner.push(b).unwrap();
    }
    assert_eq!(
        result,
        Scan::Complete(ResponseHead { content_length: 42 })
    );

    let (_, mut link) = open(Route::respond(vec![
        b"HTTP/1.1 200 OK\r\nXcontentY-length: 9\r\ncontent-length: 17\r\n\r\n".to_vec(),
    ]));
    assert_eq!(read_response_head(&mut link).unwrap().content_length, 17);
}

#[test]
fn test_unescape_is_identity_on_clean_input() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..32 {
        let mut clean: Vec<u8> = (0..rng.usize(0..200))
            .map(|_| rng.alphanumeric() as u8)
            .collect();
        let original = clean.clone();
        let len = unescape_newlines(&mut clean);
        assert_eq!(&clean[..len], &original[..]);
    }
}

#[test]
fn test_unescape_shrinks_when_escapes_present() {
    let raw = "-----BEGIN CERTIFICATE-----\\nMIIBszCCAVmgAwIBAgIU\\n-----END CERTIFICATE-----\\n";
    let mut bytes = raw.as_bytes().to_vec();
    let len = unescape_newlines(&mut bytes);
    assert!(len < raw.len());
    assert_eq!(bytes[..len].iter().filter(|&&b| b == b'\n').count(), 3);

    let decoded = decode_certificate(raw).unwrap();
    assert!(decoded.len() <= raw.len());
    assert!(!decoded.ends_with(b"\n"));
}

#[test]
fn test_third_candidate_selected_when_first_two_fail() {
    let doc = connectivity_doc(&[("127.0.0.1", 8883), ("192.0.2.10", 8883), ("192.0.2.11", 8883)]);
    let mut connector = MemoryConnector::new().route("192.0.2.11", 8883, Route::respond(vec![]));

    let selected = select(&doc, Selection::Automatic, b"ca", &mut connector).unwrap();

    assert_eq!((selected.host, selected.port), ("192.0.2.11", 8883));
    assert_eq!(selected.index, 2);
}

#[test]
fn test_zero_candidates_is_no_reachable_candidate() {
    let body = connectivity_doc(&[]);
    let mut connector =
        MemoryConnector::new().route(SERVICE, 8443, Route::respond(vec![http_response(&body)]));
    let mut buffer = DiscoveryBuffer::with_capacity(1024);

    let err = discover(
        &mut connector,
        &DiscoveryRequest::new(SERVICE, 8443, "thing"),
        &mut buffer,
    )
    .unwrap_err();

    assert!(matches!(err, DiscoveryError::NoReachableCandidate { .. }));
    assert_eq!(connector.connect_attempts().len(), 1);
}

#[test]
fn test_manual_out_of_range_never_probes() {
    let doc = connectivity_doc(&[("192.0.2.10", 8883), ("192.0.2.11", 8883)]);

    for interface in [2, 3, usize::MAX] {
        let mut connector = MemoryConnector::new()
            .route("192.0.2.10", 8883, Route::respond(vec![]))
            .route("192.0.2.11", 8883, Route::respond(vec![]));

        let err = select(
            &doc,
            Selection::Manual(HostParameters { interface }),
            b"ca",
            &mut connector,
        )
        .unwrap_err();

        assert!(matches!(err, DiscoveryError::NoReachableCandidate { tried: 0 }));
        assert!(connector.connect_attempts().is_empty());
    }
}

#[test]
fn test_repeated_discovery_is_bit_identical() {
    let body = connectivity_doc(&[("127.0.0.1", 8883), ("192.0.2.11", 8883)]);
    let mut connector = MemoryConnector::new()
        .route(SERVICE, 8443, Route::respond_chunked(&http_response(&body), 13))
        .route("192.0.2.11", 8883, Route::respond(vec![]));
    let request = DiscoveryRequest::new(SERVICE, 8443, "thing");
    let mut buffer = DiscoveryBuffer::with_capacity(1024);

    let first = discover(&mut connector, &request, &mut buffer).unwrap();
    buffer.reset();
    let second = discover(&mut connector, &request, &mut buffer).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.certificate, second.certificate);
}

#[test]
fn test_every_failure_tears_down_discovery_connection() {
    let cases: Vec<Vec<u8>> = vec![
        b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec(),
        b"HTTP/1.1 200 OK\r\ncontent-length: abc\r\n\r\n{}".to_vec(),
        b"HTTP/1.1 200 OK\r\ncontent-length: 40\r\n\r\n{}".to_vec(),
        http_response("{\"GGGroups\":"),
        http_response("{\"GGGroups\":[]}"),
    ];

    for response in cases {
        let mut connector =
            MemoryConnector::new().route(SERVICE, 8443, Route::respond(vec![response]));
        let mut buffer = DiscoveryBuffer::with_capacity(256);

        let result = discover(
            &mut connector,
            &DiscoveryRequest::new(SERVICE, 8443, "thing"),
            &mut buffer,
        );

        assert!(result.is_err());
        assert_eq!(connector.connect_attempts().len(), connector.disconnects());
    }
}
