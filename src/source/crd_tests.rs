// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `source/crd.rs`

use super::*;
use crate::crd::{DNSEndpointSpec, DNSEndpointStatus};
use crate::endpoint::Ttl;
use crate::source::fixtures::{informer, meta};

fn dns_endpoint(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    endpoints: Vec<Endpoint>,
) -> DNSEndpoint {
    let mut obj = DNSEndpoint::new(name, DNSEndpointSpec { endpoints });
    obj.metadata = meta(namespace, name, annotations);
    obj.metadata.generation = Some(2);
    obj.status = Some(DNSEndpointStatus {
        observed_generation: 1,
    });
    obj
}

fn raw(name: &str, record_type: RecordType, targets: &[&str]) -> Endpoint {
    Endpoint {
        dns_name: name.to_string(),
        record_type,
        targets: targets.iter().map(|t| (*t).to_string()).collect(),
        ..Default::default()
    }
}

async fn run(objects: Vec<DNSEndpoint>, config: &SourceConfig) -> Vec<Endpoint> {
    CrdSource::from_informer(informer(objects), config)
        .unwrap()
        .endpoints()
        .await
        .unwrap()
}

#[test]
fn test_legal_targets() {
    assert!(has_legal_targets(&raw("a.org", RecordType::A, &["1.2.3.4"])));
    assert!(!has_legal_targets(&raw("a.org", RecordType::CNAME, &["b.org."])));
    assert!(has_legal_targets(&raw("a.org", RecordType::TXT, &["any text."])));
    assert!(has_legal_targets(&raw("a.org", RecordType::MX, &["10 mail.org."])));
    assert!(has_legal_targets(&raw(
        "a.org",
        RecordType::NAPTR,
        &["100 10 \"u\" \"E2U+sip\" \"!^.*$!sip:info@example.org!\" ."]
    )));
    assert!(!has_legal_targets(&raw("a.org", RecordType::NAPTR, &["missing-dot"])));
}

#[tokio::test]
async fn test_endpoints_labelled_and_filtered() {
    let obj = dns_endpoint(
        "default",
        "records",
        &[],
        vec![
            raw("a.example.org", RecordType::A, &["1.2.3.4"]),
            raw("bad.example.org", RecordType::CNAME, &["target.example.org."]),
            raw("empty.example.org", RecordType::A, &[]),
        ],
    );
    let eps = run(vec![obj], &SourceConfig::default()).await;

    let names: Vec<&str> = eps.iter().map(|e| e.dns_name.as_str()).collect();
    assert_eq!(names, vec!["a.example.org", "empty.example.org"]);
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("crd/default/records")
    );
}

#[tokio::test]
async fn test_endpoints_merged_across_objects() {
    let a = dns_endpoint(
        "default",
        "a",
        &[],
        vec![raw("www.example.org", RecordType::A, &["1.2.3.4"])],
    );
    let b = dns_endpoint(
        "default",
        "b",
        &[],
        vec![raw("www.example.org", RecordType::A, &["1.2.3.5", "1.2.3.4"])],
    );
    let eps = run(vec![a, b], &SourceConfig::default()).await;
    assert_eq!(eps.len(), 1);
    let mut targets = eps[0].targets.0.clone();
    targets.sort();
    assert_eq!(targets, vec!["1.2.3.4", "1.2.3.5"]);
}

#[tokio::test]
async fn test_different_ttls_not_merged() {
    let mut with_ttl = raw("www.example.org", RecordType::A, &["1.2.3.5"]);
    with_ttl.record_ttl = Ttl(300);
    let obj = dns_endpoint(
        "default",
        "a",
        &[],
        vec![raw("www.example.org", RecordType::A, &["1.2.3.4"]), with_ttl],
    );
    assert_eq!(run(vec![obj], &SourceConfig::default()).await.len(), 2);
}

#[tokio::test]
async fn test_annotation_filter() {
    let kept = dns_endpoint(
        "default",
        "kept",
        &[("dnsync/enabled", "true")],
        vec![raw("kept.example.org", RecordType::A, &["1.2.3.4"])],
    );
    let dropped = dns_endpoint(
        "default",
        "dropped",
        &[],
        vec![raw("dropped.example.org", RecordType::A, &["1.2.3.4"])],
    );
    let config = SourceConfig {
        annotation_filter: "dnsync/enabled=true".to_string(),
        ..Default::default()
    };
    let eps = run(vec![kept, dropped], &config).await;
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "kept.example.org");
}
