// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `node.rs`

use super::*;
use crate::constants::{RESOURCE_LABEL_KEY, TARGET_ANNOTATION_KEY, TTL_ANNOTATION_KEY};
use crate::endpoint::Ttl;
use crate::source::fixtures::{informer, node, string_map};
use k8s_openapi::api::core::v1::NodeSpec;

async fn run(nodes: Vec<Node>, config: &SourceConfig) -> Result<Vec<Endpoint>, SourceError> {
    NodeSource::from_informer(informer(nodes), config)
        .unwrap()
        .endpoints()
        .await
}

#[tokio::test]
async fn test_external_ip_preferred() {
    let eps = run(
        vec![node("node1", &[("ExternalIP", "1.2.3.4"), ("InternalIP", "10.0.0.1")])],
        &SourceConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "node1");
    assert_eq!(eps[0].targets.0, vec!["1.2.3.4"]);
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("node/node1")
    );
}

#[tokio::test]
async fn test_internal_ip_fallback() {
    let eps = run(
        vec![node("node1", &[("InternalIP", "10.0.0.1")])],
        &SourceConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(eps[0].targets.0, vec!["10.0.0.1"]);
}

#[tokio::test]
async fn test_internal_ipv6_exposure() {
    let nodes = vec![node(
        "node1",
        &[("ExternalIP", "1.2.3.4"), ("InternalIP", "2001:db8::1")],
    )];
    let eps = run(nodes.clone(), &SourceConfig::default()).await.unwrap();
    assert_eq!(eps.len(), 2);
    assert_eq!(eps[1].record_type, RecordType::AAAA);

    let config = SourceConfig {
        expose_internal_ipv6: false,
        ..Default::default()
    };
    let eps = run(nodes, &config).await.unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].record_type, RecordType::A);
}

#[tokio::test]
async fn test_node_without_address_fails() {
    let err = run(vec![node("node1", &[])], &SourceConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::NodeWithoutAddress { node } if node == "node1"));
}

#[tokio::test]
async fn test_template_aggregates_nodes() {
    let config = SourceConfig {
        fqdn_template: "nodes.example.org".to_string(),
        ..Default::default()
    };
    let eps = run(
        vec![
            node("node1", &[("ExternalIP", "1.2.3.4")]),
            node("node2", &[("ExternalIP", "1.2.3.5")]),
        ],
        &config,
    )
    .await
    .unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "nodes.example.org");
    assert_eq!(eps[0].targets.0, vec!["1.2.3.4", "1.2.3.5"]);
}

#[tokio::test]
async fn test_unschedulable_excluded() {
    let mut cordoned = node("node1", &[("ExternalIP", "1.2.3.4")]);
    cordoned.spec = Some(NodeSpec {
        unschedulable: Some(true),
        ..Default::default()
    });
    assert!(run(vec![cordoned.clone()], &SourceConfig::default())
        .await
        .unwrap()
        .is_empty());

    let config = SourceConfig {
        exclude_unschedulable: false,
        ..Default::default()
    };
    assert_eq!(run(vec![cordoned], &config).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_annotations_and_filter() {
    let mut annotated = node("node1", &[("ExternalIP", "1.2.3.4")]);
    annotated.metadata.annotations = Some(string_map(&[
        (TARGET_ANNOTATION_KEY, "203.0.113.1"),
        (TTL_ANNOTATION_KEY, "10"),
        ("service.beta.kubernetes.io/external-traffic", "OnlyLocal"),
    ]));
    let other = node("node2", &[("ExternalIP", "1.2.3.5")]);

    let config = SourceConfig {
        annotation_filter: "service.beta.kubernetes.io/external-traffic in (Global, OnlyLocal)"
            .to_string(),
        ..Default::default()
    };
    let eps = run(vec![annotated, other], &config).await.unwrap();
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].targets.0, vec!["203.0.113.1"]);
    assert_eq!(eps[0].record_ttl, Ttl(10));
}
