// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `endpoint.rs`

use super::*;

fn targets(values: &[&str]) -> Targets {
    values.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_new_strips_trailing_dots() {
    let ep = Endpoint::new(
        "example.org.",
        RecordType::CNAME,
        vec!["foo.example.com.".to_string()],
    );
    assert_eq!(ep.dns_name, "example.org");
    assert_eq!(ep.targets, targets(&["foo.example.com"]));
    assert!(!ep.record_ttl.is_configured());
}

#[test]
fn test_has_valid_labels_rejects_long_label() {
    let long = "a".repeat(64);
    let ep = Endpoint::new(format!("{long}.example.org"), RecordType::A, vec![]);
    assert!(!ep.has_valid_labels());

    let ok = Endpoint::new(format!("{}.example.org", "a".repeat(63)), RecordType::A, vec![]);
    assert!(ok.has_valid_labels());
}

#[test]
fn test_targets_same() {
    let cases = [
        (vec!["8.8.8.8"], vec!["8.8.8.8"], true),
        (vec!["8.8.8.8", "8.8.4.4"], vec!["8.8.4.4", "8.8.8.8"], true),
        (vec!["example.org"], vec!["EXAMPLE.ORG"], true),
        (vec!["2001:db8::1"], vec!["2001:0db8:0:0:0:0:0:1"], true),
        (vec!["8.8.8.8"], vec!["8.8.4.4"], false),
        (vec!["8.8.8.8"], vec!["8.8.8.8", "8.8.4.4"], false),
        (vec!["example.org"], vec!["example.com"], false),
    ];
    for (a, b, expected) in cases {
        assert_eq!(
            targets(&a).same(&targets(&b)),
            expected,
            "same({a:?}, {b:?})"
        );
    }
}

#[test]
fn test_targets_is_less() {
    let cases = [
        (vec!["1.2.3.4"], vec!["1.2.3.4", "4.3.2.1"], true),
        (vec!["1.2.3.4", "4.3.2.1"], vec!["1.2.3.4"], false),
        (vec!["1.2.3.4"], vec!["1.2.3.5"], true),
        (vec!["1.2.3.5"], vec!["1.2.3.4"], false),
        (vec!["1.2.3.4"], vec!["1-2-3-4.example.com"], true),
        (vec!["1-2-3-4.example.com"], vec!["1.2.3.4"], false),
        (vec!["a.example.com"], vec!["b.example.com"], true),
        (vec!["10.0.0.2"], vec!["9.0.0.1"], false),
        (vec!["1.2.3.4"], vec!["1.2.3.4"], false),
    ];
    for (a, b, expected) in cases {
        assert_eq!(
            targets(&a).is_less(&targets(&b)),
            expected,
            "is_less({a:?}, {b:?})"
        );
    }
}

#[test]
fn test_sort_canonical_and_display() {
    let mut t = targets(&["b.example.com", "10.0.0.2", "10.0.0.1", "a.example.com"]);
    t.sort_canonical();
    assert_eq!(t.to_string(), "10.0.0.1;10.0.0.2;a.example.com;b.example.com");
}

#[test]
fn test_provider_specific_properties() {
    let mut ep = Endpoint::new("example.org", RecordType::A, vec!["1.2.3.4".to_string()])
        .with_provider_specific("alias", "true");
    assert_eq!(ep.get_provider_specific_property("alias"), Some("true"));

    ep.set_provider_specific_property("alias", "false");
    assert_eq!(ep.provider_specific.len(), 1);
    assert_eq!(ep.get_provider_specific_property("alias"), Some("false"));

    ep.set_provider_specific_property("aws/weight", "10");
    ep.delete_provider_specific_property("alias");
    assert_eq!(ep.get_provider_specific_property("alias"), None);
    assert_eq!(ep.provider_specific.len(), 1);
}

#[test]
fn test_check_endpoint_mx() {
    let valid = Endpoint::new(
        "example.org",
        RecordType::MX,
        vec!["10 mail.example.org".to_string()],
    );
    assert!(valid.check_endpoint());

    for target in ["mail.example.org", "abc mail.example.org", "70000 mail.example.org"] {
        let ep = Endpoint::new("example.org", RecordType::MX, vec![target.to_string()]);
        assert!(!ep.check_endpoint(), "{target} should be invalid");
    }
}

#[test]
fn test_check_endpoint_srv() {
    let valid = Endpoint::new(
        "_sip._tcp.example.org",
        RecordType::SRV,
        vec!["10 5 5060 sip.example.org".to_string()],
    );
    assert!(valid.check_endpoint());

    for target in ["10 5 sip.example.org", "10 5 99999 sip.example.org", "a b c d"] {
        let ep = Endpoint::new("_sip._tcp.example.org", RecordType::SRV, vec![target.to_string()]);
        assert!(!ep.check_endpoint(), "{target} should be invalid");
    }

    let txt = Endpoint::new("example.org", RecordType::TXT, vec!["anything".to_string()]);
    assert!(txt.check_endpoint());
}

#[test]
fn test_mx_target_parse() {
    let mx = MxTarget::parse("10 mail.example.org").unwrap();
    assert_eq!(mx.priority, 10);
    assert_eq!(mx.host, "mail.example.org");
}

#[test]
fn test_suitable_type() {
    assert_eq!(suitable_type("10.0.0.1"), RecordType::A);
    assert_eq!(suitable_type("2001:db8::1"), RecordType::AAAA);
    assert_eq!(suitable_type("lb.example.com"), RecordType::CNAME);
}

#[test]
fn test_remove_duplicates_keeps_first() {
    let eps = vec![
        Endpoint::new("a.example.org", RecordType::A, vec!["1.1.1.1".to_string()]),
        Endpoint::new("a.example.org", RecordType::A, vec!["2.2.2.2".to_string()]),
        Endpoint::new("a.example.org", RecordType::AAAA, vec!["::1".to_string()]),
        Endpoint::new("a.example.org", RecordType::A, vec!["3.3.3.3".to_string()])
            .with_set_identifier("blue"),
    ];
    let result = remove_duplicates(eps);
    assert_eq!(result.len(), 3);
    assert_eq!(result[0].targets, targets(&["1.1.1.1"]));
}

#[test]
fn test_merge_endpoints() {
    let eps = vec![
        Endpoint::new("a.example.org", RecordType::A, vec!["1.1.1.1".to_string()]),
        Endpoint::new(
            "a.example.org",
            RecordType::A,
            vec!["2.2.2.2".to_string(), "1.1.1.1".to_string()],
        ),
        Endpoint::new("a.example.org", RecordType::A, vec!["3.3.3.3".to_string()])
            .with_ttl(Ttl(60)),
        Endpoint::new("c.example.org", RecordType::CNAME, vec!["x.example.org".to_string()]),
        Endpoint::new("c.example.org", RecordType::CNAME, vec!["y.example.org".to_string()]),
    ];
    let result = merge_endpoints(eps);
    assert_eq!(result.len(), 4);
    assert_eq!(result[0].targets, targets(&["1.1.1.1", "2.2.2.2"]));
    assert_eq!(result[1].record_ttl, Ttl(60));
    assert_eq!(result[2].record_type, RecordType::CNAME);
    assert_eq!(result[3].record_type, RecordType::CNAME);
}

#[test]
fn test_filter_by_owner() {
    let eps = vec![
        Endpoint::new("a.example.org", RecordType::A, vec![]).with_label(OWNER_LABEL_KEY, "me"),
        Endpoint::new("b.example.org", RecordType::A, vec![]).with_label(OWNER_LABEL_KEY, "other"),
        Endpoint::new("c.example.org", RecordType::A, vec![]),
    ];
    let owned = filter_by_owner("me", eps);
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].dns_name, "a.example.org");
}

#[test]
fn test_json_wire_format() {
    let ep = Endpoint::new("example.org", RecordType::A, vec!["1.2.3.4".to_string()])
        .with_ttl(Ttl(300))
        .with_set_identifier("eu")
        .with_label("resource", "service/default/web")
        .with_provider_specific("alias", "true");
    let json = serde_json::to_value(&ep).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "dnsName": "example.org",
            "targets": ["1.2.3.4"],
            "recordType": "A",
            "setIdentifier": "eu",
            "recordTTL": 300,
            "labels": {"resource": "service/default/web"},
            "providerSpecific": [{"name": "alias", "value": "true"}],
        })
    );

    let minimal: Endpoint =
        serde_json::from_value(serde_json::json!({"dnsName": "x.org", "recordType": "TXT"}))
            .unwrap();
    assert_eq!(minimal.record_type, RecordType::TXT);
    assert!(minimal.targets.is_empty());
}

#[test]
fn test_record_type_from_str() {
    assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::AAAA);
    assert!("CAA".parse::<RecordType>().is_err());
}
