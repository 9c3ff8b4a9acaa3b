// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node source.
//!
//! Publishes one A and/or AAAA record set per node name (or per name the
//! FQDN template yields). Addresses are the node's external IPs, falling
//! back to its internal IPs.

use super::{endpoints_for_hostname, CommonOptions, Source, SourceConfig};
use crate::annotations;
use crate::endpoint::{Endpoint, RecordType, Targets};
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::debug;

pub struct NodeSource {
    nodes: Informer<Node>,
    options: CommonOptions,
    exclude_unschedulable: bool,
    expose_internal_ipv6: bool,
}

impl NodeSource {
    /// Start the Node watcher and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let nodes = Informer::start(Api::all(client), watcher::Config::default()).await?;
        Self::from_informer(nodes, config)
    }

    /// Build the source over an existing cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informer(
        nodes: Informer<Node>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        let mut options = CommonOptions::from_config(config)?;
        // nodes are cluster scoped
        options.namespace.clear();
        Ok(Self {
            nodes,
            options,
            exclude_unschedulable: config.exclude_unschedulable,
            expose_internal_ipv6: config.expose_internal_ipv6,
        })
    }

    /// External IPs, else internal IPs. IPv6 internal addresses ride along
    /// with the external ones when enabled.
    fn node_addresses(&self, node: &Node) -> Result<Vec<String>, SourceError> {
        let mut external = Vec::new();
        let mut internal = Vec::new();
        let mut internal_ipv6 = Vec::new();
        let addresses = node.status.as_ref().and_then(|s| s.addresses.as_ref());
        for address in addresses.into_iter().flatten() {
            match address.type_.as_str() {
                "ExternalIP" => external.push(address.address.clone()),
                "InternalIP" => {
                    if matches!(address.address.parse::<IpAddr>(), Ok(IpAddr::V6(_))) {
                        internal_ipv6.push(address.address.clone());
                    }
                    internal.push(address.address.clone());
                }
                _ => {}
            }
        }

        if !external.is_empty() {
            if self.expose_internal_ipv6 {
                external.extend(internal_ipv6);
            }
            return Ok(external);
        }
        if !internal.is_empty() {
            return Ok(internal);
        }
        Err(SourceError::NodeWithoutAddress {
            node: node.name_any(),
        })
    }
}

#[async_trait]
impl Source for NodeSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let nodes = self.options.filter(self.nodes.state());
        let mut by_name: BTreeMap<(String, RecordType), Endpoint> = BTreeMap::new();

        for node in nodes {
            let annotations = node.annotations();
            if !annotations::controller_matches(annotations) {
                debug!(
                    "Skipping node {} because controller value does not match",
                    node.name_any()
                );
                continue;
            }
            let unschedulable = node
                .spec
                .as_ref()
                .and_then(|s| s.unschedulable)
                .unwrap_or(false);
            if unschedulable && self.exclude_unschedulable {
                debug!("Skipping node {} because it is unschedulable", node.name_any());
                continue;
            }

            let resource = format!("node/{}", node.name_any());
            let ttl = annotations::ttl(annotations, &resource);
            let (provider_specific, set_identifier) = annotations::provider_specific(annotations);

            let names = match self.options.fqdn_template.as_ref() {
                Some(template) => template.exec(&*node, "Node")?,
                None => vec![node.name_any()],
            };

            let mut targets = annotations::targets(annotations);
            if targets.is_empty() {
                targets = Targets::from(self.node_addresses(&node)?);
            }

            for name in names {
                let endpoints = endpoints_for_hostname(
                    &name,
                    &targets,
                    ttl,
                    &provider_specific,
                    &set_identifier,
                    &resource,
                );
                for ep in endpoints {
                    debug!("Adding endpoint {ep}");
                    match by_name.get_mut(&(ep.dns_name.clone(), ep.record_type)) {
                        Some(existing) => {
                            for target in ep.targets.0 {
                                if !existing.targets.contains(&target) {
                                    existing.targets.push(target);
                                }
                            }
                        }
                        None => {
                            by_name.insert((ep.dns_name.clone(), ep.record_type), ep);
                        }
                    }
                }
            }
        }

        Ok(by_name
            .into_values()
            .map(|mut ep| {
                ep.targets.sort_canonical();
                ep
            })
            .collect())
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for node");
        self.nodes.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod node_tests;
