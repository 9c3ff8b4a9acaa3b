// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `controller.rs`

use super::*;
use crate::constants::OWNER_LABEL_KEY;
use crate::endpoint::RecordType;
use crate::errors::SourceError;
use crate::informers::{EventHandler, EventHandlers};
use crate::provider::inmemory::InMemoryProvider;
use crate::source::fixtures::{ep, StaticSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

fn config() -> ControllerConfig {
    ControllerConfig {
        interval: Duration::from_secs(3600),
        min_event_sync_interval: Duration::from_millis(10),
        owner_id: "default".to_string(),
        ..ControllerConfig::default()
    }
}

fn desired() -> Arc<dyn Source> {
    Arc::new(StaticSource::new(vec![
        ep("a.example.org", RecordType::A, &["1.1.1.1"]),
        ep("b.example.com", RecordType::CNAME, &["a.example.org"]),
    ]))
}

#[tokio::test]
async fn test_run_once_applies_plan() {
    let provider = Arc::new(InMemoryProvider::default().with_records(vec![
        ep("stale.example.org", RecordType::A, &["9.9.9.9"]).with_label(OWNER_LABEL_KEY, "default"),
    ]));
    let controller = Controller::new(desired(), provider.clone(), config());

    let changes = controller.run_once().await.unwrap();
    assert_eq!(changes.create.len(), 2);
    assert_eq!(changes.delete.len(), 1);

    let names: Vec<String> = provider
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.dns_name)
        .collect();
    assert_eq!(names, vec!["a.example.org", "b.example.com"]);

    let again = controller.run_once().await.unwrap();
    assert!(again.is_empty(), "second pass should find nothing to do");
}

#[tokio::test]
async fn test_dry_run_leaves_provider_untouched() {
    let provider = Arc::new(InMemoryProvider::default());
    let controller = Controller::new(
        desired(),
        provider.clone(),
        ControllerConfig {
            dry_run: true,
            ..config()
        },
    );

    let changes = controller.run_once().await.unwrap();
    assert_eq!(changes.create.len(), 2);
    assert!(provider.records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_domain_filters_apply() {
    let provider = Arc::new(InMemoryProvider::new(DomainFilter::new(
        &["example.org".to_string(), "example.com".to_string()],
        &[],
    )));
    let controller = Controller::new(
        desired(),
        provider.clone(),
        ControllerConfig {
            domain_filter: DomainFilter::new(&["example.org".to_string()], &[]),
            ..config()
        },
    );

    let changes = controller.run_once().await.unwrap();
    assert_eq!(changes.create.len(), 1);
    assert_eq!(changes.create[0].dns_name, "a.example.org");
}

#[tokio::test]
async fn test_source_failure() {
    let controller = Controller::new(
        Arc::new(StaticSource::failing()),
        Arc::new(InMemoryProvider::default()),
        config(),
    );
    let err = controller.run_once().await.unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::InvalidConfig(_))));
}

/// Counts passes and exposes its handlers so tests can fire events.
#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
    handlers: EventHandlers,
}

#[async_trait]
impl Source for CountingSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.handlers.add(handler);
    }
}

async fn wait_for_calls(source: &CountingSource, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while source.calls.load(Ordering::SeqCst) < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_event_triggers_early_sync() {
    let source = Arc::new(CountingSource::default());
    let controller = Arc::new(Controller::new(
        source.clone(),
        Arc::new(InMemoryProvider::default()),
        ControllerConfig {
            events: true,
            ..config()
        },
    ));

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn({
        let controller = controller.clone();
        async move {
            controller
                .run(async {
                    let _ = stopped.await;
                })
                .await;
        }
    });

    wait_for_calls(&source, 1).await;
    assert_eq!(source.handlers.len(), 1);
    source.handlers.notify();
    wait_for_calls(&source, 2).await;

    let _ = stop.send(());
    task.await.unwrap();
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_events_disabled_registers_no_handler() {
    let source = Arc::new(CountingSource::default());
    let controller = Controller::new(
        source.clone(),
        Arc::new(InMemoryProvider::default()),
        config(),
    );
    controller.run(async {}).await;
    assert!(source.handlers.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}
