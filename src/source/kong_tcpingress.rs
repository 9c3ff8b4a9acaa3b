// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kong `TCPIngress` source.
//!
//! Hostnames come from the `hostname` annotation and the SNI host of each
//! rule; targets from the `target` annotation or the load balancer status.

use super::istio_gateway::apply_template;
use super::{
    endpoints_for_hostname, namespaced_api, sort_targets, targets_from_load_balancer,
    CommonOptions, Source, SourceConfig,
};
use crate::annotations;
use crate::constants::DUALSTACK_LABEL_KEY;
use crate::crd::TCPIngress;
use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::debug;

pub struct TcpIngressSource {
    tcp_ingresses: Informer<TCPIngress>,
    options: CommonOptions,
}

impl TcpIngressSource {
    /// Start the `TCPIngress` watcher and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let tcp_ingresses = Informer::start(
            namespaced_api(client, &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        Self::from_informer(tcp_ingresses, config)
    }

    /// Build the source over an existing cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informer(
        tcp_ingresses: Informer<TCPIngress>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            tcp_ingresses,
            options: CommonOptions::from_config(config)?,
        })
    }

    fn hostnames(&self, ing: &TCPIngress) -> Result<Vec<String>, SourceError> {
        let mut hostnames = if self.options.ignore_hostname_annotation {
            Vec::new()
        } else {
            annotations::hostnames(ing.annotations())
        };
        for rule in &ing.spec.rules {
            if let Some(host) = rule.host.as_ref().filter(|h| !h.is_empty()) {
                if !hostnames.contains(host) {
                    hostnames.push(host.clone());
                }
            }
        }
        apply_template(
            hostnames,
            self.options.fqdn_template.as_ref(),
            self.options.combine_fqdn_and_annotation,
            ing,
            "TCPIngress",
        )
    }
}

#[async_trait]
impl Source for TcpIngressSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let tcp_ingresses = self.options.filter(self.tcp_ingresses.state());
        let mut endpoints = Vec::new();

        for ing in tcp_ingresses {
            let resource = format!(
                "tcpingress/{}/{}",
                ing.namespace().unwrap_or_default(),
                ing.name_any()
            );
            let annotations = ing.annotations();
            if !annotations::controller_matches(annotations) {
                debug!("Skipping {resource} because controller value does not match");
                continue;
            }

            let mut targets = annotations::targets(annotations);
            if targets.is_empty() {
                targets = targets_from_load_balancer(
                    ing.status.as_ref().and_then(|s| s.load_balancer.as_ref()),
                );
            }
            let ttl = annotations::ttl(annotations, &resource);
            let (provider_specific, set_identifier) = annotations::provider_specific(annotations);

            let mut ing_endpoints: Vec<Endpoint> = self
                .hostnames(&ing)?
                .iter()
                .flat_map(|host| {
                    endpoints_for_hostname(
                        host,
                        &targets,
                        ttl,
                        &provider_specific,
                        &set_identifier,
                        &resource,
                    )
                })
                .collect();
            if ing_endpoints.is_empty() {
                debug!("No endpoints could be generated from {resource}");
                continue;
            }

            if annotations::alb_dualstack(annotations) {
                for ep in &mut ing_endpoints {
                    ep.labels
                        .insert(DUALSTACK_LABEL_KEY.to_string(), "true".to_string());
                }
            }
            endpoints.extend(ing_endpoints);
        }

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for TCPIngress");
        self.tcp_ingresses.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "kong_tcpingress_tests.rs"]
mod kong_tcpingress_tests;
