// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `selector.rs`

use crate::selector::{filter_by_annotations, map_contains, Requirement, Selector};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn create_test_service(name: &str, annotations: BTreeMap<String, String>) -> Arc<Service> {
    Arc::new(Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    })
}

#[test]
fn test_parse_all_operators() {
    let selector =
        Selector::parse("a, !b, c=1, d==2, e!=3, f in (x, y), g notin (z)").unwrap();
    assert_eq!(
        selector.requirements(),
        &[
            Requirement::Exists("a".to_string()),
            Requirement::DoesNotExist("b".to_string()),
            Requirement::Equals("c".to_string(), "1".to_string()),
            Requirement::Equals("d".to_string(), "2".to_string()),
            Requirement::NotEquals("e".to_string(), "3".to_string()),
            Requirement::In("f".to_string(), vec!["x".to_string(), "y".to_string()]),
            Requirement::NotIn("g".to_string(), vec!["z".to_string()]),
        ]
    );
}

#[test]
fn test_empty_selector_matches_everything() {
    let selector = Selector::parse("").unwrap();
    assert!(selector.is_empty());
    assert!(selector.matches(&BTreeMap::new()));
    assert!(selector.matches(&labels(&[("any", "thing")])));
}

#[test]
fn test_matching() {
    let l = labels(&[("kubernetes.io/ingress.class", "nginx"), ("team", "dns")]);

    let cases = [
        ("kubernetes.io/ingress.class=nginx", true),
        ("kubernetes.io/ingress.class=traefik", false),
        ("kubernetes.io/ingress.class!=traefik", true),
        ("missing!=value", true),
        ("team", true),
        ("!team", false),
        ("!missing", true),
        ("kubernetes.io/ingress.class in (nginx, internal)", true),
        ("kubernetes.io/ingress.class notin (nginx)", false),
        ("missing notin (a)", true),
        ("missing in (a)", false),
        ("team=dns,kubernetes.io/ingress.class=nginx", true),
        ("team=dns,kubernetes.io/ingress.class=other", false),
    ];
    for (expr, expected) in cases {
        let selector = Selector::parse(expr).unwrap();
        assert_eq!(selector.matches(&l), expected, "selector {expr:?}");
    }
}

#[test]
fn test_parse_errors() {
    for expr in ["a in (b", "=value", "a foo (b)", "a in (b) extra", "bad key=1", "a)"] {
        assert!(Selector::parse(expr).is_err(), "{expr:?} should not parse");
    }
}

#[test]
fn test_filter_by_annotations() {
    let selector = Selector::parse("kubernetes.io/ingress.class=nginx").unwrap();
    let items = vec![
        create_test_service(
            "matching",
            labels(&[("kubernetes.io/ingress.class", "nginx")]),
        ),
        create_test_service(
            "other",
            labels(&[("kubernetes.io/ingress.class", "traefik")]),
        ),
        create_test_service("none", BTreeMap::new()),
    ];

    let filtered = filter_by_annotations(items, &selector);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].metadata.name.as_deref(), Some("matching"));
}

#[test]
fn test_map_contains() {
    let svc = labels(&[("istio", "ingressgateway"), ("app", "gw")]);
    assert!(map_contains(&svc, &labels(&[("istio", "ingressgateway")])));
    assert!(!map_contains(&svc, &labels(&[("istio", "egressgateway")])));
    assert!(map_contains(&svc, &BTreeMap::new()));
}

#[test]
fn test_from_label_selector() {
    let selector = Selector::from_label_selector(&LabelSelector {
        match_labels: Some(labels(&[("team", "web")])),
        match_expressions: Some(vec![
            LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["prod".to_string(), "staging".to_string()]),
            },
            LabelSelectorRequirement {
                key: "legacy".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            },
        ]),
    })
    .unwrap();

    assert!(selector.matches(&labels(&[("team", "web"), ("env", "prod")])));
    assert!(!selector.matches(&labels(&[("team", "web"), ("env", "dev")])));
    assert!(!selector.matches(&labels(&[("team", "web"), ("env", "prod"), ("legacy", "")])));
    assert!(!selector.matches(&labels(&[("env", "prod")])));
}

#[test]
fn test_from_label_selector_rejects_bad_expressions() {
    let expr = |operator: &str, values: Option<Vec<String>>| LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "env".to_string(),
            operator: operator.to_string(),
            values,
        }]),
        ..Default::default()
    };
    assert!(Selector::from_label_selector(&expr("In", None)).is_err());
    assert!(Selector::from_label_selector(&expr("Near", None)).is_err());
    assert!(Selector::from_label_selector(&LabelSelector::default())
        .unwrap()
        .is_empty());
}
