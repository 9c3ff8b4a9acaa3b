// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ingress.rs`

use super::*;
use crate::constants::{
    ALB_DUALSTACK_ANNOTATION_KEY, HOSTNAME_ANNOTATION_KEY, INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY,
    RESOURCE_LABEL_KEY, TARGET_ANNOTATION_KEY,
};
use crate::endpoint::RecordType;
use crate::source::fixtures::{informer, meta};
use k8s_openapi::api::networking::v1::{
    IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec, IngressTLS,
};

fn ingress(
    name: &str,
    annotations: &[(&str, &str)],
    rule_hosts: &[&str],
    tls_hosts: &[&str],
    ips: &[&str],
    hostnames: &[&str],
) -> Ingress {
    let mut lb: Vec<IngressLoadBalancerIngress> = ips
        .iter()
        .map(|ip| IngressLoadBalancerIngress {
            ip: Some((*ip).to_string()),
            ..Default::default()
        })
        .collect();
    lb.extend(hostnames.iter().map(|h| IngressLoadBalancerIngress {
        hostname: Some((*h).to_string()),
        ..Default::default()
    }));
    Ingress {
        metadata: meta("default", name, annotations),
        spec: Some(IngressSpec {
            rules: Some(
                rule_hosts
                    .iter()
                    .map(|h| IngressRule {
                        host: Some((*h).to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            tls: Some(vec![IngressTLS {
                hosts: Some(tls_hosts.iter().map(|h| (*h).to_string()).collect()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus { ingress: Some(lb) }),
        }),
    }
}

async fn run(ingresses: Vec<Ingress>, config: &SourceConfig) -> Vec<Endpoint> {
    IngressSource::from_informer(informer(ingresses), config)
        .unwrap()
        .endpoints()
        .await
        .unwrap()
}

fn names(eps: &[Endpoint]) -> Vec<String> {
    let mut names: Vec<String> = eps.iter().map(|e| e.dns_name.clone()).collect();
    names.sort();
    names.dedup();
    names
}

#[tokio::test]
async fn test_rules_tls_and_annotation_hosts() {
    let ing = ingress(
        "web",
        &[(HOSTNAME_ANNOTATION_KEY, "annotated.example.org")],
        &["rule.example.org", ""],
        &["tls.example.org", "rule.example.org"],
        &["1.2.3.4"],
        &["lb.example.com"],
    );
    let eps = run(vec![ing], &SourceConfig::default()).await;

    assert_eq!(
        names(&eps),
        vec!["annotated.example.org", "rule.example.org", "tls.example.org"]
    );
    // one A and one CNAME per host
    assert_eq!(eps.len(), 6);
    assert!(eps.iter().all(|e| {
        e.labels.get(RESOURCE_LABEL_KEY).map(String::as_str) == Some("ingress/default/web")
    }));
}

#[tokio::test]
async fn test_ignore_flags() {
    let ing = ingress(
        "web",
        &[(HOSTNAME_ANNOTATION_KEY, "annotated.example.org")],
        &["rule.example.org"],
        &["tls.example.org"],
        &["1.2.3.4"],
        &[],
    );
    let config = SourceConfig {
        ignore_ingress_tls_spec: true,
        ignore_ingress_rules_spec: true,
        ..Default::default()
    };
    assert_eq!(names(&run(vec![ing.clone()], &config).await), vec!["annotated.example.org"]);

    let config = SourceConfig {
        ignore_hostname_annotation: true,
        ..Default::default()
    };
    assert_eq!(
        names(&run(vec![ing], &config).await),
        vec!["rule.example.org", "tls.example.org"]
    );
}

#[tokio::test]
async fn test_hostname_source_annotation() {
    let ing = ingress(
        "web",
        &[
            (HOSTNAME_ANNOTATION_KEY, "annotated.example.org"),
            (INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY, "annotation-only"),
        ],
        &["rule.example.org"],
        &[],
        &["1.2.3.4"],
        &[],
    );
    assert_eq!(
        names(&run(vec![ing], &SourceConfig::default()).await),
        vec!["annotated.example.org"]
    );

    let ing = ingress(
        "web",
        &[
            (HOSTNAME_ANNOTATION_KEY, "annotated.example.org"),
            (INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY, "defined-hosts-only"),
        ],
        &["rule.example.org"],
        &[],
        &["1.2.3.4"],
        &[],
    );
    assert_eq!(
        names(&run(vec![ing], &SourceConfig::default()).await),
        vec!["rule.example.org"]
    );
}

#[tokio::test]
async fn test_target_annotation_wins() {
    let ing = ingress(
        "web",
        &[(TARGET_ANNOTATION_KEY, "edge.example.net.")],
        &["rule.example.org"],
        &[],
        &["1.2.3.4"],
        &[],
    );
    let eps = run(vec![ing], &SourceConfig::default()).await;
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].record_type, RecordType::CNAME);
    assert_eq!(eps[0].targets.0, vec!["edge.example.net"]);
}

#[tokio::test]
async fn test_ingress_class_filter() {
    let mut nginx = ingress("a", &[], &["a.example.org"], &[], &["1.2.3.4"], &[]);
    if let Some(spec) = nginx.spec.as_mut() {
        spec.ingress_class_name = Some("nginx".to_string());
    }
    let legacy = ingress(
        "b",
        &[(INGRESS_CLASS_ANNOTATION_KEY, "traefik")],
        &["b.example.org"],
        &[],
        &["1.2.3.4"],
        &[],
    );
    let unclassed = ingress("c", &[], &["c.example.org"], &[], &["1.2.3.4"], &[]);

    let config = SourceConfig {
        ingress_class_names: vec!["nginx".to_string(), "traefik".to_string()],
        ..Default::default()
    };
    assert_eq!(
        names(&run(vec![nginx, legacy, unclassed], &config).await),
        vec!["a.example.org", "b.example.org"]
    );
}

#[tokio::test]
async fn test_dualstack_label() {
    let ing = ingress(
        "web",
        &[(ALB_DUALSTACK_ANNOTATION_KEY, "dualstack")],
        &["rule.example.org"],
        &[],
        &[],
        &["alb.amazonaws.com"],
    );
    let eps = run(vec![ing], &SourceConfig::default()).await;
    assert_eq!(
        eps[0].labels.get(DUALSTACK_LABEL_KEY).map(String::as_str),
        Some("true")
    );
}

#[tokio::test]
async fn test_template_when_no_hosts() {
    let ing = ingress("web", &[], &[], &[], &["1.2.3.4"], &[]);
    let config = SourceConfig {
        fqdn_template: "{{ .Name }}.ingress.example.org".to_string(),
        ..Default::default()
    };
    assert_eq!(
        names(&run(vec![ing], &config).await),
        vec!["web.ingress.example.org"]
    );
}
