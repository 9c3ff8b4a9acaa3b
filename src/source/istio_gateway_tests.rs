// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `istio_gateway.rs`

use super::*;
use crate::constants::{
    HOSTNAME_ANNOTATION_KEY, INGRESS_ANNOTATION_KEY, RESOURCE_LABEL_KEY, TARGET_ANNOTATION_KEY,
};
use crate::crd::{GatewayServer, GatewaySpec};
use crate::endpoint::RecordType;
use crate::source::fixtures::{informer, load_balancer, meta, string_map};
use k8s_openapi::api::core::v1::{ServiceSpec, ServiceStatus};
use k8s_openapi::api::networking::v1::{
    IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};

fn gateway(
    namespace: &str,
    name: &str,
    hosts: &[&str],
    annotations: &[(&str, &str)],
) -> Gateway {
    let mut gw = Gateway::new(
        name,
        GatewaySpec {
            selector: string_map(&[("istio", "ingressgateway")]),
            servers: vec![GatewayServer {
                hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
                port: None,
            }],
        },
    );
    gw.metadata = meta(namespace, name, annotations);
    gw
}

fn gateway_service(namespace: &str, name: &str, ips: &[&str], hostnames: &[&str]) -> Service {
    Service {
        metadata: meta(namespace, name, &[]),
        spec: Some(ServiceSpec {
            selector: Some(string_map(&[
                ("istio", "ingressgateway"),
                ("app", "istio-ingressgateway"),
            ])),
            type_: Some("LoadBalancer".to_string()),
            ..Default::default()
        }),
        status: Some(ServiceStatus {
            load_balancer: Some(load_balancer(ips, hostnames)),
            ..Default::default()
        }),
    }
}

fn ingress(namespace: &str, name: &str, ip: &str) -> Ingress {
    Ingress {
        metadata: meta(namespace, name, &[]),
        status: Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![IngressLoadBalancerIngress {
                    ip: Some(ip.to_string()),
                    ..Default::default()
                }]),
            }),
        }),
        ..Default::default()
    }
}

async fn run(
    gateways: Vec<Gateway>,
    services: Vec<Service>,
    ingresses: Vec<Ingress>,
    config: &SourceConfig,
) -> Vec<Endpoint> {
    GatewaySource::from_informers(
        informer(gateways),
        informer(services),
        informer(ingresses),
        config,
    )
    .unwrap()
    .endpoints()
    .await
    .unwrap()
}

#[test]
fn test_gateway_hosts() {
    let gw = gateway(
        "default",
        "gw",
        &["foo.example.org", "istio-system/bar.example.org", "*", ""],
        &[],
    );
    assert_eq!(gateway_hosts(&gw), vec!["foo.example.org", "bar.example.org"]);
}

#[test]
fn test_parse_ingress() {
    assert_eq!(parse_ingress("web"), Some((None, "web".to_string())));
    assert_eq!(
        parse_ingress("prod/web"),
        Some((Some("prod".to_string()), "web".to_string()))
    );
    assert_eq!(parse_ingress("a/b/c"), None);
}

#[tokio::test]
async fn test_targets_from_matching_service() {
    let eps = run(
        vec![gateway("default", "gw", &["foo.example.org"], &[])],
        vec![
            gateway_service("default", "ingressgateway", &["8.8.8.8"], &[]),
            gateway_service("default", "lb-host", &[], &["lb.example.com"]),
        ],
        vec![],
        &SourceConfig::default(),
    )
    .await;

    assert_eq!(eps.len(), 2);
    let a = eps.iter().find(|e| e.record_type == RecordType::A).unwrap();
    assert_eq!(a.dns_name, "foo.example.org");
    assert_eq!(a.targets.0, vec!["8.8.8.8"]);
    assert_eq!(
        a.labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("gateway/default/gw")
    );
    let cname = eps.iter().find(|e| e.record_type == RecordType::CNAME).unwrap();
    assert_eq!(cname.targets.0, vec!["lb.example.com"]);
}

#[tokio::test]
async fn test_service_selector_must_contain_gateway_selector() {
    let mut unrelated = gateway_service("default", "other", &["1.1.1.1"], &[]);
    unrelated.spec.as_mut().unwrap().selector = Some(string_map(&[("app", "other")]));
    let eps = run(
        vec![gateway("default", "gw", &["foo.example.org"], &[])],
        vec![unrelated],
        vec![],
        &SourceConfig::default(),
    )
    .await;
    assert!(eps.is_empty());
}

#[tokio::test]
async fn test_target_annotation_wins() {
    let eps = run(
        vec![gateway(
            "default",
            "gw",
            &["foo.example.org"],
            &[(TARGET_ANNOTATION_KEY, "1.2.3.4")],
        )],
        vec![gateway_service("default", "ingressgateway", &["8.8.8.8"], &[])],
        vec![],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].targets.0, vec!["1.2.3.4"]);
}

#[tokio::test]
async fn test_ingress_annotation() {
    let eps = run(
        vec![
            gateway(
                "default",
                "local",
                &["local.example.org"],
                &[(INGRESS_ANNOTATION_KEY, "web")],
            ),
            gateway(
                "default",
                "remote",
                &["remote.example.org"],
                &[(INGRESS_ANNOTATION_KEY, "edge/web")],
            ),
        ],
        vec![gateway_service("default", "ingressgateway", &["8.8.8.8"], &[])],
        vec![ingress("default", "web", "10.0.0.1"), ingress("edge", "web", "10.0.0.2")],
        &SourceConfig::default(),
    )
    .await;

    let local = eps.iter().find(|e| e.dns_name == "local.example.org").unwrap();
    assert_eq!(local.targets.0, vec!["10.0.0.1"]);
    let remote = eps.iter().find(|e| e.dns_name == "remote.example.org").unwrap();
    assert_eq!(remote.targets.0, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn test_hostname_annotation_and_ignore() {
    let gw = gateway(
        "default",
        "gw",
        &["foo.example.org"],
        &[(HOSTNAME_ANNOTATION_KEY, "extra.example.org")],
    );
    let services = vec![gateway_service("default", "ingressgateway", &["8.8.8.8"], &[])];

    let eps = run(vec![gw.clone()], services.clone(), vec![], &SourceConfig::default()).await;
    assert_eq!(eps.len(), 2);

    let config = SourceConfig {
        ignore_hostname_annotation: true,
        ..Default::default()
    };
    let eps = run(vec![gw], services, vec![], &config).await;
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "foo.example.org");
}

#[tokio::test]
async fn test_fqdn_template_fallback() {
    let config = SourceConfig {
        fqdn_template: "{{ .Name }}.{{ .Namespace }}.example.org".to_string(),
        ..Default::default()
    };
    let eps = run(
        vec![gateway("default", "gw", &[], &[])],
        vec![gateway_service("default", "ingressgateway", &["8.8.8.8"], &[])],
        vec![],
        &config,
    )
    .await;
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "gw.default.example.org");
}

async fn run_err(gateways: Vec<Gateway>, ingresses: Vec<Ingress>) -> SourceError {
    GatewaySource::from_informers(
        informer(gateways),
        informer(vec![gateway_service("default", "ingressgateway", &["8.8.8.8"], &[])]),
        informer(ingresses),
        &SourceConfig::default(),
    )
    .unwrap()
    .endpoints()
    .await
    .unwrap_err()
}

#[tokio::test]
async fn test_ingress_annotation_ingress_not_found() {
    let err = run_err(
        vec![gateway(
            "default",
            "gw",
            &["foo.example.org"],
            &[(INGRESS_ANNOTATION_KEY, "ingress2")],
        )],
        vec![ingress("default", "ingress1", "10.0.0.1")],
    )
    .await;
    assert!(matches!(
        err,
        SourceError::IngressNotFound { ref namespace, ref name, .. }
            if namespace == "default" && name == "ingress2"
    ));
}

#[tokio::test]
async fn test_ingress_annotation_invalid_reference() {
    let err = run_err(
        vec![gateway(
            "default",
            "gw",
            &["foo.example.org"],
            &[(INGRESS_ANNOTATION_KEY, "a/b/c")],
        )],
        vec![ingress("default", "ingress1", "10.0.0.1")],
    )
    .await;
    assert!(matches!(
        err,
        SourceError::InvalidIngressReference { ref reference, .. } if reference == "a/b/c"
    ));
    assert_eq!(err.kind(), "ingress_reference");
}
