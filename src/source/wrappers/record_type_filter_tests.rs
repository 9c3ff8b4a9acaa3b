// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `record_type_filter.rs`

use super::*;
use crate::source::fixtures::{ep, StaticSource};

fn inner() -> Arc<dyn Source> {
    Arc::new(StaticSource::new(vec![
        ep("a.example.org", RecordType::A, &["1.2.3.4"]),
        ep("a.example.org", RecordType::AAAA, &["2001:db8::1"]),
        ep("c.example.org", RecordType::CNAME, &["a.example.org"]),
        ep("t.example.org", RecordType::TXT, &["hello"]),
    ]))
}

#[tokio::test]
async fn test_unmanaged_types_dropped() {
    let source = RecordTypeFilterSource::new(
        inner(),
        &[RecordType::A, RecordType::AAAA, RecordType::CNAME],
        &[],
    );
    let types: Vec<RecordType> = source
        .endpoints()
        .await
        .unwrap()
        .iter()
        .map(|e| e.record_type)
        .collect();
    assert_eq!(types, vec![RecordType::A, RecordType::AAAA, RecordType::CNAME]);
}

#[tokio::test]
async fn test_ipv4_suppression() {
    let source = RecordTypeFilterSource::new(
        inner(),
        &[RecordType::A, RecordType::AAAA, RecordType::CNAME],
        &[RecordType::A],
    );
    assert!(!source.allows(RecordType::A));
    let eps = source.endpoints().await.unwrap();
    assert!(eps.iter().all(|e| e.record_type != RecordType::A));
    assert_eq!(eps.len(), 2);
}
