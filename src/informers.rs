// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reflector-backed object caches with change notification.
//!
//! Every Kubernetes source reads from an [`Informer`]: a reflector
//! [`Store`] kept current by a background watcher task, plus a list of
//! event handlers invoked whenever an object in the store is added,
//! modified or deleted. Sources never query the API server while
//! computing endpoints.

use crate::constants::CACHE_SYNC_TIMEOUT_SECS;
use crate::errors::SourceError;
use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Callback invoked when a watched object changes.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Shared list of event handlers.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventHandlers {
    pub fn add(&self, handler: EventHandler) {
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push(handler),
            Err(poisoned) => poisoned.into_inner().push(handler),
        }
    }

    /// Invoke every registered handler.
    pub fn notify(&self) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for handler in handlers {
            handler();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A synced, in-memory cache of one resource type.
#[derive(Clone)]
pub struct Informer<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
    handlers: EventHandlers,
}

impl<K> Informer<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    /// Start watching `api` and wait until the initial listing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::CacheSyncTimeout`] if the first listing does
    /// not complete within the sync timeout.
    pub async fn start(api: Api<K>, config: watcher::Config) -> Result<Self, SourceError> {
        Self::start_with_timeout(api, config, Duration::from_secs(CACHE_SYNC_TIMEOUT_SECS)).await
    }

    /// Same as [`Informer::start`] with an explicit sync timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::CacheSyncTimeout`] if the first listing does
    /// not complete within `timeout`.
    pub async fn start_with_timeout(
        api: Api<K>,
        config: watcher::Config,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        let (reader, writer) = reflector::store();
        let handlers = EventHandlers::default();

        let notify = handlers.clone();
        let watch_kind = kind.clone();
        let stream = reflector::reflector(writer, watcher(api, config))
            .default_backoff()
            .touched_objects();
        tokio::spawn(async move {
            stream
                .for_each(|event| {
                    match event {
                        Ok(_) => notify.notify(),
                        Err(e) => warn!("{watch_kind} watch error: {e}"),
                    }
                    futures::future::ready(())
                })
                .await;
            debug!("{watch_kind} watch stream ended");
        });

        let timed_out = || SourceError::CacheSyncTimeout {
            kind: kind.clone(),
            timeout_secs: timeout.as_secs(),
        };
        tokio::time::timeout(timeout, reader.wait_until_ready())
            .await
            .map_err(|_| timed_out())?
            .map_err(|_| timed_out())?;
        debug!("{kind} cache synced");

        Ok(Self {
            store: reader,
            handlers,
        })
    }
}

impl<K> Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    /// Wrap an already populated store.
    #[must_use]
    pub fn from_store(store: Store<K>) -> Self {
        Self {
            store,
            handlers: EventHandlers::default(),
        }
    }

    /// Snapshot of every cached object.
    #[must_use]
    pub fn state(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    #[must_use]
    pub fn store(&self) -> &Store<K> {
        &self.store
    }

    pub fn add_event_handler(&self, handler: EventHandler) {
        self.handlers.add(handler);
    }

    /// Invoke the registered handlers as if an object had changed.
    pub fn notify(&self) {
        self.handlers.notify();
    }
}

#[cfg(test)]
#[path = "informers_tests.rs"]
mod informers_tests;
