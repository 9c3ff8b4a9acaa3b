// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Istio Gateway source.
//!
//! Hostnames come from `spec.servers[].hosts` and the `hostname`
//! annotation. Targets are resolved in order from:
//!
//! 1. the `target` annotation
//! 2. the load balancer of the Ingress named by the `ingress` annotation
//! 3. the load balancers of Services whose selector contains the gateway selector

use super::{
    endpoints_for_hostname, namespaced_api, sort_targets, CommonOptions, Source, SourceConfig,
};
use crate::annotations;
use crate::crd::Gateway;
use crate::endpoint::{Endpoint, Targets};
use crate::errors::SourceError;
use crate::fqdn::FqdnTemplate;
use crate::informers::{EventHandler, Informer};
use crate::selector::map_contains;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::debug;

/// Caches needed to resolve gateway targets.
#[derive(Clone)]
pub struct GatewayTargetResolver {
    pub services: Informer<Service>,
    pub ingresses: Informer<Ingress>,
    /// Namespace Services are looked up in; empty means all
    pub namespace: String,
}

impl GatewayTargetResolver {
    /// Targets of `gateway`, resolved as described in the module docs.
    ///
    /// # Errors
    ///
    /// Returns an error when the `ingress` annotation is malformed or names
    /// an Ingress that is not cached.
    pub fn targets(&self, gateway: &Gateway) -> Result<Targets, SourceError> {
        let annotations = gateway.annotations();
        let targets = annotations::targets(annotations);
        if !targets.is_empty() {
            return Ok(targets);
        }

        if let Some(reference) = annotations::ingress_reference(annotations) {
            return self.targets_from_ingress(reference, gateway);
        }

        let mut targets = Targets::default();
        for service in self.services.state() {
            if !self.namespace.is_empty()
                && service.namespace().as_deref() != Some(self.namespace.as_str())
            {
                continue;
            }
            let service_selector = service
                .spec
                .as_ref()
                .and_then(|s| s.selector.clone())
                .unwrap_or_default();
            if !map_contains(&service_selector, &gateway.spec.selector) {
                continue;
            }
            let ingresses = service
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref());
            for lb in ingresses.into_iter().flatten() {
                if let Some(target) = ip_or_hostname(lb.ip.as_deref(), lb.hostname.as_deref()) {
                    targets.push(target);
                }
            }
        }
        Ok(targets)
    }

    fn targets_from_ingress(
        &self,
        reference: &str,
        gateway: &Gateway,
    ) -> Result<Targets, SourceError> {
        let gw_namespace = gateway.namespace().unwrap_or_default();
        let resource = format!("gateway/{gw_namespace}/{}", gateway.name_any());
        let (namespace, name) =
            parse_ingress(reference).ok_or_else(|| SourceError::InvalidIngressReference {
                resource: resource.clone(),
                reference: reference.to_string(),
            })?;
        let namespace = namespace.unwrap_or(gw_namespace);

        let ingress = self
            .ingresses
            .state()
            .into_iter()
            .find(|i| i.name_any() == name && i.namespace().as_deref() == Some(namespace.as_str()))
            .ok_or_else(|| SourceError::IngressNotFound {
                resource,
                namespace: namespace.clone(),
                name: name.clone(),
            })?;

        let lbs = ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref());
        Ok(lbs
            .into_iter()
            .flatten()
            .filter_map(|lb| ip_or_hostname(lb.ip.as_deref(), lb.hostname.as_deref()))
            .collect())
    }
}

fn ip_or_hostname(ip: Option<&str>, hostname: Option<&str>) -> Option<String> {
    ip.filter(|ip| !ip.is_empty())
        .or(hostname.filter(|h| !h.is_empty()))
        .map(str::to_string)
}

/// Split an ingress reference into optional namespace and name.
///
/// Returns `None` when the reference has more than one `/`.
#[must_use]
pub fn parse_ingress(reference: &str) -> Option<(Option<String>, String)> {
    let parts: Vec<&str> = reference.split('/').collect();
    match parts.as_slice() {
        [name] => Some((None, (*name).to_string())),
        [namespace, name] => Some((Some((*namespace).to_string()), (*name).to_string())),
        _ => None,
    }
}

/// Server hosts with any `namespace/` prefix removed; `*` and empty hosts skipped.
#[must_use]
pub fn gateway_hosts(gateway: &Gateway) -> Vec<String> {
    gateway
        .spec
        .servers
        .iter()
        .flat_map(|server| server.hosts.iter())
        .filter(|host| !host.is_empty())
        .map(|host| match host.split_once('/') {
            Some((_, h)) => h.to_string(),
            None => host.clone(),
        })
        .filter(|host| host != "*")
        .collect()
}

pub struct GatewaySource {
    gateways: Informer<Gateway>,
    resolver: GatewayTargetResolver,
    options: CommonOptions,
}

impl GatewaySource {
    /// Start Gateway, Service and Ingress watchers and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let gateways = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let services = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let ingresses =
            Informer::start(namespaced_api(client, ""), watcher::Config::default()).await?;
        Self::from_informers(gateways, services, ingresses, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informers(
        gateways: Informer<Gateway>,
        services: Informer<Service>,
        ingresses: Informer<Ingress>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            gateways,
            resolver: GatewayTargetResolver {
                services,
                ingresses,
                namespace: config.namespace.clone(),
            },
            options: CommonOptions::from_config(config)?,
        })
    }

    fn hostnames(&self, gateway: &Gateway) -> Result<Vec<String>, SourceError> {
        let mut hostnames = gateway_hosts(gateway);
        if !self.options.ignore_hostname_annotation {
            hostnames.extend(annotations::hostnames(gateway.annotations()));
        }
        apply_template(
            hostnames,
            self.options.fqdn_template.as_ref(),
            self.options.combine_fqdn_and_annotation,
            gateway,
            "Gateway",
        )
    }
}

/// Template hostnames appended (combine) or used as a fallback.
pub(crate) fn apply_template<K: serde::Serialize + kube::Resource>(
    mut hostnames: Vec<String>,
    template: Option<&FqdnTemplate>,
    combine: bool,
    obj: &K,
    kind: &str,
) -> Result<Vec<String>, SourceError> {
    let Some(template) = template else {
        return Ok(hostnames);
    };
    if !combine && !hostnames.is_empty() {
        return Ok(hostnames);
    }
    let templated = template.exec(obj, kind)?;
    if combine {
        hostnames.extend(templated);
        Ok(hostnames)
    } else {
        Ok(templated)
    }
}

#[async_trait]
impl Source for GatewaySource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let gateways = self.options.filter(self.gateways.state());
        let mut endpoints = Vec::new();

        for gateway in gateways {
            let resource = format!(
                "gateway/{}/{}",
                gateway.namespace().unwrap_or_default(),
                gateway.name_any()
            );
            let annotations = gateway.annotations();
            if !annotations::controller_matches(annotations) {
                debug!("Skipping {resource} because controller value does not match");
                continue;
            }

            let hostnames = self.hostnames(&gateway)?;
            if hostnames.is_empty() {
                debug!("No hostnames could be generated from {resource}");
                continue;
            }

            let targets = self.resolver.targets(&gateway)?;
            let ttl = annotations::ttl(annotations, &resource);
            let (provider_specific, set_identifier) = annotations::provider_specific(annotations);

            let gw_endpoints: Vec<Endpoint> = hostnames
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
            if gw_endpoints.is_empty() {
                debug!("No endpoints could be generated from {resource}");
                continue;
            }
            endpoints.extend(gw_endpoints);
        }

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for Istio Gateway");
        self.gateways.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "istio_gateway_tests.rs"]
mod istio_gateway_tests;
