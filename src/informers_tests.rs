// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `informers.rs`

use super::*;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::atomic::{AtomicUsize, Ordering};

fn service(name: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_from_store_exposes_state() {
    let (reader, mut writer) = kube::runtime::reflector::store::<Service>();
    writer.apply_watcher_event(&kube::runtime::watcher::Event::Apply(service("a")));
    writer.apply_watcher_event(&kube::runtime::watcher::Event::Apply(service("b")));

    let informer = Informer::from_store(reader);
    assert_eq!(informer.state().len(), 2);
}

#[test]
fn test_event_handlers_fan_out() {
    let (reader, _writer) = kube::runtime::reflector::store::<Service>();
    let informer = Informer::from_store(reader);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        informer.add_event_handler(Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }

    informer.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_event_handlers_len() {
    let handlers = EventHandlers::default();
    assert!(handlers.is_empty());
    handlers.add(Arc::new(|| {}));
    assert_eq!(handlers.len(), 1);
}
