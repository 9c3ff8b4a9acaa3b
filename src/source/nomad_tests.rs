// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `nomad.rs`

use super::*;
use crate::endpoint::{RecordType, Ttl};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer, config: SourceConfig) -> NomadServiceSource {
    NomadServiceSource::new(&SourceConfig {
        nomad_address: server.uri(),
        ..config
    })
    .unwrap()
}

async fn mount_services(server: &MockServer, namespace: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .and(query_param("namespace", namespace))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_registrations(server: &MockServer, name: &str, addresses: &[&str]) {
    let body: Vec<serde_json::Value> = addresses
        .iter()
        .map(|a| json!({ "ServiceName": name, "Address": a, "Port": 8080 }))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/v1/service/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[test]
fn test_tags_to_annotations() {
    let tags = vec![
        "external-dns.hostname = web.example.org".to_string(),
        "external-dns.ttl=60".to_string(),
        "traefik.enable=true".to_string(),
        "external-dns.no-value".to_string(),
    ];
    let annotations = tags_to_annotations(&tags);
    assert_eq!(annotations.len(), 2);
    assert_eq!(
        annotations.get("external-dns.alpha.kubernetes.io/hostname").map(String::as_str),
        Some("web.example.org")
    );
    assert_eq!(
        annotations.get("external-dns.alpha.kubernetes.io/ttl").map(String::as_str),
        Some("60")
    );
}

#[tokio::test]
async fn test_hostname_tag_with_registered_addresses() {
    let server = MockServer::start().await;
    mount_services(
        &server,
        "*",
        json!([{
            "Namespace": "default",
            "Services": [
                { "ServiceName": "web", "Tags": ["external-dns.hostname=web.example.org", "external-dns.ttl=60"] },
                { "ServiceName": "untagged", "Tags": [] }
            ]
        }]),
    )
    .await;
    mount_registrations(&server, "web", &["10.0.0.2", "10.0.0.1", "10.0.0.2"]).await;

    let eps = source(&server, SourceConfig::default())
        .endpoints()
        .await
        .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "web.example.org");
    assert_eq!(eps[0].record_type, RecordType::A);
    assert_eq!(eps[0].targets.0, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(eps[0].record_ttl, Ttl(60));
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("service/default/web")
    );
}

#[tokio::test]
async fn test_target_tag_skips_registration_lookup() {
    let server = MockServer::start().await;
    mount_services(
        &server,
        "*",
        json!([{
            "Namespace": "default",
            "Services": [{
                "ServiceName": "web",
                "Tags": ["external-dns.hostname=web.example.org", "external-dns.target=lb.example.org"]
            }]
        }]),
    )
    .await;

    let eps = source(&server, SourceConfig::default())
        .endpoints()
        .await
        .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].record_type, RecordType::CNAME);
    assert_eq!(eps[0].targets.0, vec!["lb.example.org"]);
}

#[tokio::test]
async fn test_same_hostname_merged_across_services() {
    let server = MockServer::start().await;
    mount_services(
        &server,
        "*",
        json!([{
            "Namespace": "default",
            "Services": [
                { "ServiceName": "web-b", "Tags": ["external-dns.hostname=web.example.org"] },
                { "ServiceName": "web-a", "Tags": ["external-dns.hostname=web.example.org"] }
            ]
        }]),
    )
    .await;
    mount_registrations(&server, "web-a", &["10.0.0.1"]).await;
    mount_registrations(&server, "web-b", &["10.0.0.2"]).await;

    let eps = source(&server, SourceConfig::default())
        .endpoints()
        .await
        .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].targets.0, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("service/default/web-a")
    );
}

#[tokio::test]
async fn test_template_namespace_token_and_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .and(query_param("namespace", "prod"))
        .and(query_param("region", "eu"))
        .and(header("X-Nomad-Token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "Namespace": "prod",
            "Services": [{ "ServiceName": "api", "Tags": [] }]
        }])))
        .mount(&server)
        .await;
    mount_registrations(&server, "api", &["2001:db8::1"]).await;

    let config = SourceConfig {
        namespace: "prod".to_string(),
        nomad_token: Some("secret".to_string()),
        nomad_region: Some("eu".to_string()),
        fqdn_template: "{{ .Name }}.{{ .Namespace }}.example.org".to_string(),
        ..Default::default()
    };
    let eps = source(&server, config).endpoints().await.unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "api.prod.example.org");
    assert_eq!(eps[0].record_type, RecordType::AAAA);
}

#[tokio::test]
async fn test_upstream_error_fails_the_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = source(&server, SourceConfig::default())
        .endpoints()
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::HttpStatus { status: 403, .. }));
}

#[test]
fn test_invalid_address() {
    let config = SourceConfig {
        nomad_address: "not a url".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        NomadServiceSource::new(&config),
        Err(SourceError::InvalidConfig(_))
    ));
}
