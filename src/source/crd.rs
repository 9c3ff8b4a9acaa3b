// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DNSEndpoint` source.
//!
//! Publishes the endpoints listed in `DNSEndpoint` resources as they are,
//! after dropping entries whose targets are malformed for their type. Once
//! a resource has been read its `status.observedGeneration` is brought up
//! to date.

use super::{namespaced_api, CommonOptions, Source, SourceConfig};
use crate::constants::RESOURCE_LABEL_KEY;
use crate::crd::DNSEndpoint;
use crate::endpoint::{merge_endpoints, Endpoint, RecordType};
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, warn};

pub struct CrdSource {
    endpoints: Informer<DNSEndpoint>,
    options: CommonOptions,
    /// Used to patch status; `None` leaves status untouched
    client: Option<Client>,
}

impl CrdSource {
    /// Start the `DNSEndpoint` watcher and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let endpoints = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let mut source = Self::from_informer(endpoints, config)?;
        source.client = Some(client);
        Ok(source)
    }

    /// Build the source over an existing cache, without status updates.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter is malformed.
    pub fn from_informer(
        endpoints: Informer<DNSEndpoint>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            endpoints,
            options: CommonOptions::from_config(config)?,
            client: None,
        })
    }

    async fn update_observed_generation(&self, obj: &DNSEndpoint, generation: i64) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let api: Api<DNSEndpoint> = Api::namespaced(client.clone(), &namespace);
        let patch = json!({ "status": { "observedGeneration": generation } });
        match api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => debug!("Updated observedGeneration of DNSEndpoint {namespace}/{name} to {generation}"),
            Err(e) => warn!("Could not update observedGeneration of DNSEndpoint {namespace}/{name}: {e}"),
        }
    }
}

/// Whether every target is well formed for the record type.
///
/// NAPTR targets must be fully qualified; TXT and MX are free form; every
/// other type must not carry a trailing dot.
#[must_use]
pub fn has_legal_targets(ep: &Endpoint) -> bool {
    ep.targets.iter().all(|target| {
        let has_dot = target.ends_with('.');
        match ep.record_type {
            RecordType::TXT | RecordType::MX => true,
            RecordType::NAPTR => has_dot,
            _ => !has_dot,
        }
    })
}

#[async_trait]
impl Source for CrdSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let objects = self.options.filter(self.endpoints.state());
        let mut endpoints = Vec::new();

        for obj in objects {
            let namespace = obj.namespace().unwrap_or_default();
            let name = obj.name_any();
            for ep in &obj.spec.endpoints {
                let address_type = matches!(
                    ep.record_type,
                    RecordType::A | RecordType::AAAA | RecordType::CNAME
                );
                if address_type && ep.targets.is_empty() {
                    debug!(
                        "Endpoint {} of DNSEndpoint {namespace}/{name} has no targets; passing through for default targets",
                        ep.dns_name
                    );
                }
                if !has_legal_targets(ep) {
                    warn!(
                        "Endpoint {} of DNSEndpoint {namespace}/{name} has an illegal target format",
                        ep.dns_name
                    );
                    continue;
                }
                let mut ep = ep.clone();
                ep.labels.insert(
                    RESOURCE_LABEL_KEY.to_string(),
                    format!("crd/{namespace}/{name}"),
                );
                endpoints.push(ep);
            }

            let generation = obj.metadata.generation.unwrap_or_default();
            let observed = obj
                .status
                .as_ref()
                .map(|s| s.observed_generation)
                .unwrap_or_default();
            if observed != generation {
                self.update_observed_generation(&obj, generation).await;
            }
        }

        Ok(merge_endpoints(endpoints))
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for DNSEndpoint");
        self.endpoints.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
