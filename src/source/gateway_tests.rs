// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `gateway.rs`

use super::*;
use crate::constants::{
    CONTROLLER_ANNOTATION_KEY, HOSTNAME_ANNOTATION_KEY, RESOURCE_LABEL_KEY,
    SET_IDENTIFIER_ANNOTATION_KEY, TARGET_ANNOTATION_KEY, TTL_ANNOTATION_KEY,
};
use crate::crd::{
    AllowedRoutes, GatewayStatusAddress, HTTPRouteSpec, K8sGatewaySpec, K8sGatewayStatus,
    ParentReference, RouteCondition, RouteGroupKind, RouteNamespaces, RouteParentStatus,
    TCPRouteSpec,
};
use crate::endpoint::RecordType;
use crate::source::fixtures::{informer, meta, string_map};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

fn listener(name: &str, hostname: Option<&str>, port: i32, protocol: &str) -> Listener {
    Listener {
        name: name.to_string(),
        hostname: hostname.map(str::to_string),
        port,
        protocol: protocol.to_string(),
        allowed_routes: None,
    }
}

fn http_listener(hostname: Option<&str>) -> Listener {
    listener("http", hostname, 80, "HTTP")
}

fn gateway(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    listeners: Vec<Listener>,
    addresses: &[&str],
) -> K8sGateway {
    let mut gw = K8sGateway::new(
        name,
        K8sGatewaySpec {
            gateway_class_name: "test".to_string(),
            listeners,
        },
    );
    gw.metadata = meta(namespace, name, annotations);
    gw.status = Some(K8sGatewayStatus {
        addresses: addresses
            .iter()
            .map(|a| GatewayStatusAddress {
                type_: Some("IPAddress".to_string()),
                value: (*a).to_string(),
            })
            .collect(),
    });
    gw
}

fn parent(namespace: &str, name: &str) -> ParentReference {
    ParentReference {
        namespace: Some(namespace.to_string()),
        name: name.to_string(),
        ..Default::default()
    }
}

fn accepted(parents: Vec<ParentReference>) -> RouteStatus {
    RouteStatus {
        parents: parents
            .into_iter()
            .map(|parent_ref| RouteParentStatus {
                parent_ref,
                controller_name: "example.org/gateway".to_string(),
                conditions: vec![RouteCondition {
                    type_: "Accepted".to_string(),
                    status: "True".to_string(),
                }],
            })
            .collect(),
    }
}

fn http_route(
    namespace: &str,
    name: &str,
    annotations: &[(&str, &str)],
    hostnames: &[&str],
    parents: Vec<ParentReference>,
) -> HTTPRoute {
    let mut route = HTTPRoute::new(
        name,
        HTTPRouteSpec {
            parent_refs: parents.clone(),
            hostnames: hostnames.iter().map(|h| (*h).to_string()).collect(),
        },
    );
    route.metadata = meta(namespace, name, annotations);
    route.status = Some(accepted(parents));
    route
}

/// Let routes from every namespace attach to the listeners of `gw`.
fn allow_all(mut gw: K8sGateway) -> K8sGateway {
    for listener in &mut gw.spec.listeners {
        listener.allowed_routes = Some(AllowedRoutes {
            namespaces: Some(RouteNamespaces {
                from: Some("All".to_string()),
                selector: None,
            }),
            kinds: Vec::new(),
        });
    }
    gw
}

fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    let mut ns = Namespace::default();
    ns.metadata = meta("", name, &[]);
    ns.metadata.labels = Some(string_map(labels));
    ns
}

async fn run(
    routes: Vec<HTTPRoute>,
    gateways: Vec<K8sGateway>,
    config: &SourceConfig,
) -> Vec<Endpoint> {
    run_with_namespaces(routes, gateways, vec![namespace("default", &[])], config).await
}

async fn run_with_namespaces(
    routes: Vec<HTTPRoute>,
    gateways: Vec<K8sGateway>,
    namespaces: Vec<Namespace>,
    config: &SourceConfig,
) -> Vec<Endpoint> {
    let mut eps = HttpRouteSource::from_informers(
        informer(routes),
        informer(gateways),
        informer(namespaces),
        config,
    )
    .unwrap()
    .endpoints()
    .await
    .unwrap();
    eps.sort_by(|a, b| (&a.dns_name, &a.targets.0).cmp(&(&b.dns_name, &b.targets.0)));
    eps
}

fn summary(eps: &[Endpoint]) -> Vec<(String, Vec<String>)> {
    eps.iter()
        .map(|e| (e.dns_name.clone(), e.targets.0.clone()))
        .collect()
}

fn pair(name: &str, targets: &[&str]) -> (String, Vec<String>) {
    (
        name.to_string(),
        targets.iter().map(|t| (*t).to_string()).collect(),
    )
}

#[tokio::test]
async fn test_route_published_through_gateway() {
    let eps = run(
        vec![http_route(
            "default",
            "web",
            &[],
            &["web.example.internal"],
            vec![parent("default", "gw")],
        )],
        vec![gateway("default", "gw", &[], vec![http_listener(None)], &["1.2.3.4"])],
        &SourceConfig::default(),
    )
    .await;

    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].dns_name, "web.example.internal");
    assert_eq!(eps[0].record_type, RecordType::A);
    assert_eq!(eps[0].targets.0, vec!["1.2.3.4"]);
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("httproute/default/web")
    );
}

#[tokio::test]
async fn test_gateway_namespace_and_label_filters() {
    let mut labelled = allow_all(gateway(
        "infra",
        "labelled",
        &[],
        vec![http_listener(None)],
        &["1.2.3.4"],
    ));
    labelled.metadata.labels = Some(string_map(&[("public", "true")]));
    let other = allow_all(gateway("other", "plain", &[], vec![http_listener(None)], &["2.3.4.5"]));

    let routes = vec![http_route(
        "default",
        "web",
        &[],
        &["web.example.internal"],
        vec![parent("infra", "labelled"), parent("other", "plain")],
    )];

    let unfiltered = run(
        routes.clone(),
        vec![labelled.clone(), other.clone()],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(summary(&unfiltered), vec![pair("web.example.internal", &["1.2.3.4", "2.3.4.5"])]);

    let by_namespace = run(
        routes.clone(),
        vec![labelled.clone(), other.clone()],
        &SourceConfig {
            gateway_namespace: "other".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(summary(&by_namespace), vec![pair("web.example.internal", &["2.3.4.5"])]);

    let by_label = run(
        routes,
        vec![labelled, other],
        &SourceConfig {
            gateway_label_filter: "public=true".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(summary(&by_label), vec![pair("web.example.internal", &["1.2.3.4"])]);
}

#[tokio::test]
async fn test_route_filters_and_controller_annotation() {
    let gw = gateway("default", "gw", &[], vec![http_listener(None)], &["1.2.3.4"]);
    let routes = vec![
        http_route(
            "default",
            "match",
            &[("team", "web")],
            &["match.example.internal"],
            vec![parent("default", "gw")],
        ),
        http_route(
            "default",
            "other",
            &[("team", "db")],
            &["other.example.internal"],
            vec![parent("default", "gw")],
        ),
        http_route(
            "default",
            "foreign",
            &[("team", "web"), (CONTROLLER_ANNOTATION_KEY, "someone-else")],
            &["foreign.example.internal"],
            vec![parent("default", "gw")],
        ),
    ];

    let eps = run(
        routes,
        vec![gw],
        &SourceConfig {
            annotation_filter: "team=web".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(summary(&eps), vec![pair("match.example.internal", &["1.2.3.4"])]);
}

#[tokio::test]
async fn test_unaccepted_and_foreign_parents_are_skipped() {
    let gw = gateway("default", "gw", &[], vec![http_listener(None)], &["1.2.3.4"]);
    let mut pending = http_route(
        "default",
        "pending",
        &[],
        &["pending.example.internal"],
        vec![parent("default", "gw")],
    );
    pending.status.as_mut().unwrap().parents[0].conditions[0].status = "False".to_string();

    let mut service_parent = http_route(
        "default",
        "mesh",
        &[],
        &["mesh.example.internal"],
        vec![parent("default", "gw")],
    );
    service_parent.status.as_mut().unwrap().parents[0].parent_ref.kind =
        Some("Service".to_string());

    let missing = http_route(
        "default",
        "missing",
        &[],
        &["missing.example.internal"],
        vec![parent("default", "nope")],
    );

    let eps = run(
        vec![pending, service_parent, missing],
        vec![gw],
        &SourceConfig::default(),
    )
    .await;
    assert!(eps.is_empty());
}

#[tokio::test]
async fn test_section_name_and_port_select_listeners() {
    let gw = gateway(
        "default",
        "gw",
        &[],
        vec![
            listener("foo", Some("foo.example.internal"), 80, "HTTP"),
            listener("bar", Some("bar.example.internal"), 443, "HTTPS"),
            listener("qux", Some("qux.example.internal"), 8080, "TCP"),
        ],
        &["1.2.3.4"],
    );

    let mut by_section = parent("default", "gw");
    by_section.section_name = Some("foo".to_string());
    let mut by_port = parent("default", "gw");
    by_port.port = Some(443);

    let eps = run(
        vec![
            http_route("default", "section", &[], &[], vec![by_section]),
            http_route("default", "port", &[], &[], vec![by_port]),
        ],
        vec![gw.clone()],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(
        summary(&eps),
        vec![
            pair("bar.example.internal", &["1.2.3.4"]),
            pair("foo.example.internal", &["1.2.3.4"]),
        ]
    );

    // Without a section or port every HTTP-capable listener applies.
    let eps = run(
        vec![http_route("default", "all", &[], &[], vec![parent("default", "gw")])],
        vec![gw],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(eps.len(), 2);
}

#[tokio::test]
async fn test_wildcard_hostnames() {
    let wildcard_gw = gateway(
        "default",
        "wild",
        &[],
        vec![http_listener(Some("*.example.internal"))],
        &["1.2.3.4"],
    );
    let specific_gw = gateway(
        "default",
        "specific",
        &[],
        vec![http_listener(Some("foo.example.internal"))],
        &["2.3.4.5"],
    );

    let eps = run(
        vec![
            http_route(
                "default",
                "in-gateway",
                &[],
                &["foo.example.internal"],
                vec![parent("default", "wild")],
            ),
            http_route(
                "default",
                "in-route",
                &[],
                &["*.example.internal"],
                vec![parent("default", "specific")],
            ),
            http_route(
                "default",
                "in-both",
                &[],
                &["*.example.internal"],
                vec![parent("default", "wild")],
            ),
            http_route(
                "default",
                "elsewhere",
                &[],
                &["foo.example.org"],
                vec![parent("default", "wild")],
            ),
        ],
        vec![wildcard_gw, specific_gw],
        &SourceConfig::default(),
    )
    .await;

    assert_eq!(
        summary(&eps),
        vec![
            pair("*.example.internal", &["1.2.3.4"]),
            pair("foo.example.internal", &["1.2.3.4"]),
            pair("foo.example.internal", &["2.3.4.5"]),
        ]
    );
}

#[tokio::test]
async fn test_listener_hostname_used_when_route_has_none() {
    let named = gateway(
        "default",
        "named",
        &[],
        vec![http_listener(Some("foo.example.internal"))],
        &["1.2.3.4"],
    );
    let unnamed = gateway("default", "unnamed", &[], vec![http_listener(None)], &["2.3.4.5"]);

    let eps = run(
        vec![
            http_route("default", "to-named", &[], &[], vec![parent("default", "named")]),
            http_route("default", "to-unnamed", &[], &[], vec![parent("default", "unnamed")]),
        ],
        vec![named, unnamed],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(summary(&eps), vec![pair("foo.example.internal", &["1.2.3.4"])]);
}

#[tokio::test]
async fn test_hostname_annotation_and_template() {
    let gw = gateway("default", "gw", &[], vec![http_listener(None)], &["1.2.3.4"]);
    let routes = vec![
        http_route(
            "default",
            "annotated",
            &[(HOSTNAME_ANNOTATION_KEY, "annotation.example.internal")],
            &["spec.example.internal"],
            vec![parent("default", "gw")],
        ),
        http_route("default", "bare", &[], &[], vec![parent("default", "gw")]),
    ];

    let eps = run(routes.clone(), vec![gw.clone()], &SourceConfig::default()).await;
    let names: Vec<&str> = eps.iter().map(|e| e.dns_name.as_str()).collect();
    assert_eq!(names, vec!["annotation.example.internal", "spec.example.internal"]);

    let eps = run(
        routes.clone(),
        vec![gw.clone()],
        &SourceConfig {
            ignore_hostname_annotation: true,
            ..Default::default()
        },
    )
    .await;
    let names: Vec<&str> = eps.iter().map(|e| e.dns_name.as_str()).collect();
    assert_eq!(names, vec!["spec.example.internal"]);

    let eps = run(
        routes,
        vec![gw],
        &SourceConfig {
            fqdn_template: "{{.Name}}.zero.internal, {{.Name}}.one.internal".to_string(),
            ..Default::default()
        },
    )
    .await;
    let names: Vec<&str> = eps.iter().map(|e| e.dns_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "annotation.example.internal",
            "bare.one.internal",
            "bare.zero.internal",
            "spec.example.internal",
        ]
    );
}

#[tokio::test]
async fn test_gateway_ttl_caps_route_ttl() {
    let gw = gateway(
        "default",
        "gw",
        &[(TTL_ANNOTATION_KEY, "15s")],
        vec![http_listener(None)],
        &["1.2.3.4"],
    );
    let eps = run(
        vec![
            http_route("default", "none", &[], &["no-ttl.internal"], vec![parent("default", "gw")]),
            http_route(
                "default",
                "longer",
                &[(TTL_ANNOTATION_KEY, "20s")],
                &["longer-ttl.internal"],
                vec![parent("default", "gw")],
            ),
            http_route(
                "default",
                "shorter",
                &[(TTL_ANNOTATION_KEY, "5s")],
                &["shorter-ttl.internal"],
                vec![parent("default", "gw")],
            ),
        ],
        vec![gw],
        &SourceConfig::default(),
    )
    .await;

    let ttls: Vec<(&str, i64)> = eps
        .iter()
        .map(|e| (e.dns_name.as_str(), e.record_ttl.0))
        .collect();
    assert_eq!(
        ttls,
        vec![("longer-ttl.internal", 15), ("no-ttl.internal", 15), ("shorter-ttl.internal", 5)]
    );
}

#[tokio::test]
async fn test_route_inherits_gateway_provider_properties() {
    let gw = gateway(
        "default",
        "gw",
        &[
            (SET_IDENTIFIER_ANNOTATION_KEY, "gateway"),
            ("external-dns.alpha.kubernetes.io/webhook-property", "gateway"),
        ],
        vec![http_listener(None)],
        &["1.2.3.4"],
    );
    let eps = run(
        vec![
            http_route(
                "default",
                "own",
                &[
                    (SET_IDENTIFIER_ANNOTATION_KEY, "route"),
                    ("external-dns.alpha.kubernetes.io/webhook-property", "route"),
                ],
                &["with.internal"],
                vec![parent("default", "gw")],
            ),
            http_route(
                "default",
                "inherit",
                &[],
                &["without.internal"],
                vec![parent("default", "gw")],
            ),
        ],
        vec![gw],
        &SourceConfig::default(),
    )
    .await;

    let with = eps.iter().find(|e| e.dns_name == "with.internal").unwrap();
    assert_eq!(with.set_identifier, "route");
    assert_eq!(with.get_provider_specific_property("webhook/property"), Some("route"));
    let without = eps.iter().find(|e| e.dns_name == "without.internal").unwrap();
    assert_eq!(without.set_identifier, "gateway");
    assert_eq!(without.get_provider_specific_property("webhook/property"), Some("gateway"));
}

#[tokio::test]
async fn test_allowed_routes_namespaces() {
    let mut same = gateway("infra", "same", &[], vec![http_listener(None)], &["1.2.3.4"]);
    same.spec.listeners[0].allowed_routes = Some(AllowedRoutes {
        namespaces: Some(RouteNamespaces {
            from: Some("Same".to_string()),
            selector: None,
        }),
        kinds: Vec::new(),
    });
    let mut selected = gateway("infra", "selected", &[], vec![http_listener(None)], &["2.3.4.5"]);
    selected.spec.listeners[0].allowed_routes = Some(AllowedRoutes {
        namespaces: Some(RouteNamespaces {
            from: Some("Selector".to_string()),
            selector: Some(LabelSelector {
                match_labels: Some(string_map(&[("expose", "true")])),
                ..Default::default()
            }),
        }),
        kinds: Vec::new(),
    });

    let eps = run_with_namespaces(
        vec![
            http_route(
                "infra",
                "local",
                &[],
                &["local.example.internal"],
                vec![parent("infra", "same"), parent("infra", "selected")],
            ),
            http_route(
                "apps",
                "exposed",
                &[],
                &["exposed.example.internal"],
                vec![parent("infra", "same"), parent("infra", "selected")],
            ),
            http_route(
                "hidden",
                "hidden",
                &[],
                &["hidden.example.internal"],
                vec![parent("infra", "selected")],
            ),
            http_route(
                "unknown",
                "unknown",
                &[],
                &["unknown.example.internal"],
                vec![parent("infra", "selected")],
            ),
        ],
        vec![same, selected],
        vec![
            namespace("infra", &[]),
            namespace("apps", &[("expose", "true")]),
            namespace("hidden", &[("expose", "false")]),
        ],
        &SourceConfig::default(),
    )
    .await;

    assert_eq!(
        summary(&eps),
        vec![
            pair("exposed.example.internal", &["2.3.4.5"]),
            pair("local.example.internal", &["1.2.3.4"]),
        ]
    );
}

#[tokio::test]
async fn test_allowed_route_kinds() {
    let mut gw = gateway("default", "gw", &[], vec![http_listener(None)], &["1.2.3.4"]);
    gw.spec.listeners[0].allowed_routes = Some(AllowedRoutes {
        namespaces: None,
        kinds: vec![RouteGroupKind {
            group: None,
            kind: "GRPCRoute".to_string(),
        }],
    });
    let eps = run(
        vec![http_route(
            "default",
            "web",
            &[],
            &["web.example.internal"],
            vec![parent("default", "gw")],
        )],
        vec![gw],
        &SourceConfig::default(),
    )
    .await;
    assert!(eps.is_empty());
}

#[tokio::test]
async fn test_target_annotation_overrides_gateway_addresses() {
    let overridden = gateway(
        "default",
        "overridden",
        &[(TARGET_ANNOTATION_KEY, "4.3.2.1")],
        vec![http_listener(None)],
        &["1.2.3.4"],
    );
    let plain = gateway("default", "plain", &[], vec![http_listener(None)], &["2.3.4.5"]);

    let eps = run(
        vec![http_route(
            "default",
            "web",
            &[],
            &["test.example.internal"],
            vec![parent("default", "overridden"), parent("default", "plain")],
        )],
        vec![overridden, plain],
        &SourceConfig::default(),
    )
    .await;
    assert_eq!(
        summary(&eps),
        vec![pair("test.example.internal", &["2.3.4.5", "4.3.2.1"])]
    );
}

#[tokio::test]
async fn test_tcp_route_needs_tcp_listener() {
    let gw = gateway(
        "default",
        "gw",
        &[],
        vec![
            listener("web", Some("web.example.internal"), 80, "HTTP"),
            listener("db", Some("db.example.internal"), 5432, "TCP"),
        ],
        &["1.2.3.4"],
    );
    let mut route = TCPRoute::new(
        "db",
        TCPRouteSpec {
            parent_refs: vec![parent("default", "gw")],
        },
    );
    route.metadata = meta("default", "db", &[]);
    route.status = Some(accepted(vec![parent("default", "gw")]));

    let eps = TcpRouteSource::from_informers(
        informer(vec![route]),
        informer(vec![gw]),
        informer(vec![namespace("default", &[])]),
        &SourceConfig::default(),
    )
    .unwrap()
    .endpoints()
    .await
    .unwrap();

    assert_eq!(summary(&eps), vec![pair("db.example.internal", &["1.2.3.4"])]);
    assert_eq!(
        eps[0].labels.get(RESOURCE_LABEL_KEY).map(String::as_str),
        Some("tcproute/default/db")
    );
}

#[test]
fn test_matching_host() {
    assert_eq!(matching_host("", "a.example.org").as_deref(), Some("a.example.org"));
    assert_eq!(matching_host("A.Example.org", "").as_deref(), Some("a.example.org"));
    assert_eq!(
        matching_host("*.example.org", "a.example.org").as_deref(),
        Some("a.example.org")
    );
    assert_eq!(
        matching_host("a.example.org", "*.example.org").as_deref(),
        Some("a.example.org")
    );
    assert_eq!(
        matching_host("*.example.org", "*.a.example.org").as_deref(),
        Some("*.a.example.org")
    );
    assert_eq!(matching_host("*.example.org", "example.org"), None);
    assert_eq!(matching_host("a.example.org", "b.example.org"), None);
    assert_eq!(matching_host("1.2.3.4", ""), None);
    assert_eq!(matching_host("-bad-.example.org", ""), None);
}

#[test]
fn test_protocol_matches() {
    assert!(protocol_matches("HTTP", "HTTPS"));
    assert!(protocol_matches("HTTP", "TLS"));
    assert!(protocol_matches("TLS", "HTTP"));
    assert!(protocol_matches("TCP", "TCP"));
    assert!(!protocol_matches("HTTP", "TCP"));
    assert!(!protocol_matches("UDP", "TCP"));
}
