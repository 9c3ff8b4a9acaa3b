// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `source/http.rs`

use super::*;
use crate::endpoint::{RecordType, Ttl};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> HttpSource {
    HttpSource::new(&SourceConfig {
        http_server_url: format!("{}/records", server.uri()),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_endpoints_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"dnsName": "www.example.org", "recordType": "A", "targets": ["1.2.3.4"], "recordTTL": 300},
            {"dnsName": "txt.example.org", "recordType": "TXT", "targets": ["hello"], "labels": {"team": "dns"}}
        ])))
        .mount(&server)
        .await;

    let eps = source(&server).endpoints().await.unwrap();
    assert_eq!(eps.len(), 2);
    assert_eq!(eps[0].dns_name, "www.example.org");
    assert_eq!(eps[0].record_ttl, Ttl(300));
    assert_eq!(eps[1].record_type, RecordType::TXT);
    assert_eq!(eps[1].labels.get("team").map(String::as_str), Some("dns"));
}

#[tokio::test]
async fn test_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = source(&server).endpoints().await.unwrap_err();
    assert!(matches!(err, SourceError::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    assert!(matches!(
        source(&server).endpoints().await,
        Err(SourceError::Http { .. })
    ));
}

#[test]
fn test_missing_url() {
    assert!(matches!(
        HttpSource::new(&SourceConfig::default()),
        Err(SourceError::InvalidConfig(_))
    ));
}
