// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ingress source.
//!
//! Hostnames come from `spec.rules[].host`, `spec.tls[].hosts` and the
//! `hostname` annotation; targets from the `target` annotation or the
//! ingress load balancer status.

use super::{
    endpoints_for_hostname, namespaced_api, set_resource_label, sort_targets, CommonOptions,
    Source, SourceConfig,
};
use crate::annotations::{self, IngressHostnameSource};
use crate::constants::{DUALSTACK_LABEL_KEY, INGRESS_CLASS_ANNOTATION_KEY};
use crate::endpoint::{Endpoint, Targets};
use crate::errors::SourceError;
use crate::fqdn::combine_with_templated_endpoints;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{Ingress, IngressStatus};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use std::collections::BTreeSet;
use tracing::debug;

pub struct IngressSource {
    ingresses: Informer<Ingress>,
    options: CommonOptions,
    ingress_class_names: BTreeSet<String>,
    ignore_ingress_tls_spec: bool,
    ignore_ingress_rules_spec: bool,
}

impl IngressSource {
    /// Start the Ingress watcher and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let ingresses = Informer::start(
            namespaced_api(client, &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        Self::from_informer(ingresses, config)
    }

    /// Build the source over an existing cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informer(
        ingresses: Informer<Ingress>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            ingresses,
            options: CommonOptions::from_config(config)?,
            ingress_class_names: config.ingress_class_names.iter().cloned().collect(),
            ignore_ingress_tls_spec: config.ignore_ingress_tls_spec,
            ignore_ingress_rules_spec: config.ignore_ingress_rules_spec,
        })
    }

    fn class_allowed(&self, ing: &Ingress) -> bool {
        if self.ingress_class_names.is_empty() {
            return true;
        }
        let class = ing
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.as_ref())
            .or_else(|| ing.annotations().get(INGRESS_CLASS_ANNOTATION_KEY));
        class.is_some_and(|c| self.ingress_class_names.contains(c))
    }

    fn endpoints_from_ingress(&self, ing: &Ingress) -> Vec<Endpoint> {
        let resource = resource_name(ing);
        let annotations = ing.annotations();
        let ttl = annotations::ttl(annotations, &resource);
        let mut targets = annotations::targets(annotations);
        if targets.is_empty() {
            targets = targets_from_ingress_status(ing.status.as_ref());
        }
        let (provider_specific, set_identifier) = annotations::provider_specific(annotations);

        let mut defined_hosts: Vec<String> = Vec::new();
        let spec = ing.spec.as_ref();
        if !self.ignore_ingress_rules_spec {
            for rule in spec.and_then(|s| s.rules.as_ref()).into_iter().flatten() {
                if let Some(host) = rule.host.as_ref().filter(|h| !h.is_empty()) {
                    defined_hosts.push(host.clone());
                }
            }
        }
        if !self.ignore_ingress_tls_spec {
            for tls in spec.and_then(|s| s.tls.as_ref()).into_iter().flatten() {
                for host in tls.hosts.iter().flatten().filter(|h| !h.is_empty()) {
                    defined_hosts.push(host.clone());
                }
            }
        }

        let annotation_hosts = if self.options.ignore_hostname_annotation {
            Vec::new()
        } else {
            annotations::hostnames(annotations)
        };

        let hostnames: Vec<String> = match annotations::ingress_hostname_source(annotations) {
            IngressHostnameSource::DefinedHostsOnly => defined_hosts,
            IngressHostnameSource::AnnotationOnly => annotation_hosts,
            IngressHostnameSource::All => {
                defined_hosts.into_iter().chain(annotation_hosts).collect()
            }
        };

        let mut seen = BTreeSet::new();
        hostnames
            .into_iter()
            .filter(|h| seen.insert(h.clone()))
            .flat_map(|host| {
                endpoints_for_hostname(
                    &host,
                    &targets,
                    ttl,
                    &provider_specific,
                    &set_identifier,
                    &resource,
                )
            })
            .collect()
    }

    fn endpoints_from_template(&self, ing: &Ingress) -> Result<Vec<Endpoint>, SourceError> {
        let Some(template) = self.options.fqdn_template.as_ref() else {
            return Ok(Vec::new());
        };
        let hostnames = template.exec(ing, "Ingress")?;
        let resource = resource_name(ing);
        let annotations = ing.annotations();
        let ttl = annotations::ttl(annotations, &resource);
        let mut targets = annotations::targets(annotations);
        if targets.is_empty() {
            targets = targets_from_ingress_status(ing.status.as_ref());
        }
        let (provider_specific, set_identifier) = annotations::provider_specific(annotations);
        Ok(hostnames
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
            .collect())
    }
}

#[async_trait]
impl Source for IngressSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let ingresses = self.options.filter(self.ingresses.state());
        let mut endpoints = Vec::new();

        for ing in ingresses {
            if !self.class_allowed(&ing) {
                debug!("Skipping ingress {} because of its ingress class", resource_name(&ing));
                continue;
            }
            if !annotations::controller_matches(ing.annotations()) {
                debug!(
                    "Skipping ingress {} because controller value does not match",
                    resource_name(&ing)
                );
                continue;
            }

            let mut ing_endpoints = combine_with_templated_endpoints(
                self.endpoints_from_ingress(&ing),
                self.options.fqdn_template.as_ref(),
                self.options.combine_fqdn_and_annotation,
                || self.endpoints_from_template(&ing),
            )?;

            if ing_endpoints.is_empty() {
                debug!("No endpoints could be generated from ingress {}", resource_name(&ing));
                continue;
            }

            set_resource_label(&mut ing_endpoints, &resource_name(&ing));
            if annotations::alb_dualstack(ing.annotations()) {
                debug!("Adding dualstack label to ingress {}", resource_name(&ing));
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
        debug!("Adding event handler for ingress");
        self.ingresses.add_event_handler(handler);
    }
}

fn resource_name(ing: &Ingress) -> String {
    format!("ingress/{}/{}", ing.namespace().unwrap_or_default(), ing.name_any())
}

/// IPs and hostnames advertised in an ingress status.
#[must_use]
pub fn targets_from_ingress_status(status: Option<&IngressStatus>) -> Targets {
    let mut targets = Targets::default();
    let ingresses = status
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    for lb in ingresses.into_iter().flatten() {
        if let Some(ip) = lb.ip.as_ref().filter(|ip| !ip.is_empty()) {
            targets.push(ip.clone());
        }
        if let Some(hostname) = lb.hostname.as_ref().filter(|h| !h.is_empty()) {
            targets.push(hostname.clone());
        }
    }
    targets
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
