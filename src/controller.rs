// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The sync loop.
//!
//! Each pass reads the desired endpoints from the source, lets the provider
//! adjust them, plans against the provider's current records and applies
//! the result. Passes run every `interval`; with events enabled, a change
//! reported by a source brings the next pass forward, but never closer than
//! `min_event_sync_interval` to the start of the previous one.

use crate::constants::{DEFAULT_INTERVAL_SECS, DEFAULT_MIN_EVENT_SYNC_INTERVAL_SECS};
use crate::domain_filter::DomainFilter;
use crate::endpoint::{Endpoint, RecordType};
use crate::errors::SyncError;
use crate::metrics;
use crate::plan::{Changes, Plan, Policy};
use crate::provider::Provider;
use crate::source::Source;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Settings for the sync loop.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Time between two regular passes
    pub interval: Duration,
    /// Minimum time between the start of a pass and an event-triggered one
    pub min_event_sync_interval: Duration,
    /// Sync early when a source reports a change
    pub events: bool,
    /// Log the plan instead of applying it
    pub dry_run: bool,
    pub policy: Policy,
    /// Owner label written to and required on managed records
    pub owner_id: String,
    /// Record types the plan may touch
    pub managed_types: Vec<RecordType>,
    /// Domains dnsync manages
    pub domain_filter: DomainFilter,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            min_event_sync_interval: Duration::from_secs(DEFAULT_MIN_EVENT_SYNC_INTERVAL_SECS),
            events: false,
            dry_run: false,
            policy: Policy::Sync,
            owner_id: String::new(),
            managed_types: vec![RecordType::A, RecordType::AAAA, RecordType::CNAME],
            domain_filter: DomainFilter::default(),
        }
    }
}

pub struct Controller {
    source: Arc<dyn Source>,
    provider: Arc<dyn Provider>,
    config: ControllerConfig,
    wakeup: Arc<Notify>,
}

impl Controller {
    #[must_use]
    pub fn new(
        source: Arc<dyn Source>,
        provider: Arc<dyn Provider>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            source,
            provider,
            config,
            wakeup: Arc::new(Notify::new()),
        }
    }

    fn filter(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        let endpoints = self.config.domain_filter.apply(endpoints);
        self.provider.domain_filter().apply(endpoints)
    }

    /// Run one full sync pass and record its metrics.
    ///
    /// Returns the changes that were applied (or, in dry-run mode, that
    /// would have been).
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, or the provider fails
    /// to list or apply records.
    pub async fn run_once(&self) -> Result<Changes, SyncError> {
        let started = std::time::Instant::now();
        let result = self.sync().await;
        match &result {
            Ok(_) => metrics::record_sync_success(started.elapsed()),
            Err(e) => {
                if let SyncError::Source(source_error) = e {
                    metrics::record_source_error(source_error.kind());
                }
                metrics::record_sync_error(started.elapsed());
            }
        }
        result
    }

    async fn sync(&self) -> Result<Changes, SyncError> {
        let desired = self.source.endpoints().await?;
        metrics::record_source_endpoints(desired.len());

        let desired = self.provider.adjust_endpoints(self.filter(desired)).await?;
        let current = self.filter(self.provider.records().await?);
        metrics::record_provider_records(current.len());
        debug!(
            "Planning {} desired endpoints against {} current records",
            desired.len(),
            current.len()
        );

        let changes = Plan::calculate(
            &current,
            &desired,
            self.config.policy,
            &self.config.owner_id,
            &self.config.managed_types,
        );
        if changes.is_empty() {
            info!("All records are already up to date");
            return Ok(changes);
        }

        metrics::record_plan_changes("create", changes.create.len());
        metrics::record_plan_changes("update", changes.update_new.len());
        metrics::record_plan_changes("delete", changes.delete.len());

        if self.config.dry_run {
            for ep in &changes.create {
                info!("Would CREATE: {ep}");
            }
            for ep in &changes.update_new {
                info!("Would UPDATE: {ep}");
            }
            for ep in &changes.delete {
                info!("Would DELETE: {ep}");
            }
            return Ok(changes);
        }

        self.provider.apply_changes(&changes).await?;
        info!(
            "Applied {} creates, {} updates and {} deletes",
            changes.create.len(),
            changes.update_new.len(),
            changes.delete.len()
        );
        Ok(changes)
    }

    /// Sync until `shutdown` resolves.
    ///
    /// A failed pass is logged and retried on the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if self.config.events {
            let wakeup = self.wakeup.clone();
            self.source
                .add_event_handler(Arc::new(move || wakeup.notify_one()));
        }

        loop {
            let started = Instant::now();
            if let Err(e) = self.run_once().await {
                error!("Failed to sync records: {e}");
            }

            let next_tick = started + self.config.interval;
            let next = tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep_until(next_tick) => next_tick,
                () = self.wakeup.notified() => {
                    debug!("Source reported a change, scheduling an early sync");
                    (started + self.config.min_event_sync_interval).min(next_tick)
                }
            };

            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep_until(next) => {}
            }
        }
        info!("Controller stopped");
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
