// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Istio VirtualService source.
//!
//! Each host of a virtual service is published with the targets of every
//! gateway the service is attached to that also exposes the host. Gateway
//! targets are resolved the same way as for the gateway source.

use super::istio_gateway::{apply_template, GatewayTargetResolver};
use super::{
    endpoints_for_hostname, namespaced_api, sort_targets, CommonOptions, Source, SourceConfig,
};
use crate::annotations;
use crate::crd::{Gateway, VirtualService};
use crate::endpoint::{Endpoint, Targets};
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

/// Gateway name reserved for the sidecar mesh.
const MESH_GATEWAY: &str = "mesh";

pub struct VirtualServiceSource {
    virtual_services: Informer<VirtualService>,
    gateways: Informer<Gateway>,
    resolver: GatewayTargetResolver,
    options: CommonOptions,
}

impl VirtualServiceSource {
    /// Start VirtualService, Gateway, Service and Ingress watchers and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let virtual_services = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
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
        Self::from_informers(virtual_services, gateways, services, ingresses, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informers(
        virtual_services: Informer<VirtualService>,
        gateways: Informer<Gateway>,
        services: Informer<Service>,
        ingresses: Informer<Ingress>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            virtual_services,
            gateways,
            resolver: GatewayTargetResolver {
                services,
                ingresses,
                namespace: config.namespace.clone(),
            },
            options: CommonOptions::from_config(config)?,
        })
    }

    fn find_gateway(&self, namespace: &str, name: &str) -> Option<std::sync::Arc<Gateway>> {
        self.gateways
            .state()
            .into_iter()
            .find(|gw| gw.name_any() == name && gw.namespace().as_deref() == Some(namespace))
    }

    /// Union of the targets of attached gateways that expose `host`.
    fn targets_for_host(&self, vs: &VirtualService, host: &str) -> Result<Targets, SourceError> {
        let vs_namespace = vs.namespace().unwrap_or_default();
        let mut targets = Targets::default();

        for reference in &vs.spec.gateways {
            if reference.is_empty() || reference == MESH_GATEWAY {
                continue;
            }
            let (namespace, name) = match reference.split_once('/') {
                Some((ns, name)) => (ns.to_string(), name.to_string()),
                None => (vs_namespace.clone(), reference.clone()),
            };
            if !self.options.namespace.is_empty() && namespace != self.options.namespace {
                continue;
            }
            let Some(gateway) = self.find_gateway(&namespace, &name) else {
                warn!(
                    "Gateway {namespace}/{name} referenced by virtual service {vs_namespace}/{} not found",
                    vs.name_any()
                );
                continue;
            };
            if !binds_to_gateway(vs, &gateway, host) {
                debug!(
                    "Virtual service {vs_namespace}/{} host {host} is not exposed by gateway {namespace}/{name}",
                    vs.name_any()
                );
                continue;
            }
            targets.extend(self.resolver.targets(&gateway)?.0);
        }
        Ok(targets)
    }

    fn hostnames(&self, vs: &VirtualService) -> Result<Vec<String>, SourceError> {
        let mut hostnames: Vec<String> = vs
            .spec
            .hosts
            .iter()
            .filter(|h| !h.is_empty() && h.as_str() != "*")
            .map(|h| match h.split_once('/') {
                Some((_, host)) => host.to_string(),
                None => h.clone(),
            })
            .collect();
        if !self.options.ignore_hostname_annotation {
            hostnames.extend(annotations::hostnames(vs.annotations()));
        }
        apply_template(
            hostnames,
            self.options.fqdn_template.as_ref(),
            self.options.combine_fqdn_and_annotation,
            vs,
            "VirtualService",
        )
    }
}

/// Whether `gateway` has a server exposing `host` to the virtual service's namespace.
///
/// Gateway hosts take the form `[namespace/]host` where namespace is `*`
/// (the default), `.` (the gateway's own namespace) or a namespace name, and
/// host may be `*` or a `*.suffix` wildcard.
#[must_use]
pub fn binds_to_gateway(vs: &VirtualService, gateway: &Gateway, host: &str) -> bool {
    let vs_namespace = vs.namespace().unwrap_or_default();
    let gw_namespace = gateway.namespace().unwrap_or_default();

    gateway
        .spec
        .servers
        .iter()
        .flat_map(|server| server.hosts.iter())
        .any(|gw_host| {
            let (namespace, gw_host) = gw_host.split_once('/').unwrap_or(("*", gw_host));
            let visible = namespace == "*"
                || namespace == vs_namespace
                || (namespace == "." && vs_namespace == gw_namespace);
            if !visible {
                return false;
            }
            if gw_host == "*" || gw_host == host {
                return true;
            }
            gw_host
                .strip_prefix('*')
                .is_some_and(|suffix| suffix.starts_with('.') && host.ends_with(suffix))
        })
}

#[async_trait]
impl Source for VirtualServiceSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let virtual_services = self.options.filter(self.virtual_services.state());
        let mut endpoints = Vec::new();

        for vs in virtual_services {
            let resource = format!(
                "virtualservice/{}/{}",
                vs.namespace().unwrap_or_default(),
                vs.name_any()
            );
            let annotations = vs.annotations();
            if !annotations::controller_matches(annotations) {
                debug!("Skipping {resource} because controller value does not match");
                continue;
            }

            let ttl = annotations::ttl(annotations, &resource);
            let (provider_specific, set_identifier) = annotations::provider_specific(annotations);
            let annotated_targets = annotations::targets(annotations);

            let mut vs_endpoints = Vec::new();
            for host in self.hostnames(&vs)? {
                let targets = if annotated_targets.is_empty() {
                    self.targets_for_host(&vs, &host)?
                } else {
                    annotated_targets.clone()
                };
                vs_endpoints.extend(endpoints_for_hostname(
                    &host,
                    &targets,
                    ttl,
                    &provider_specific,
                    &set_identifier,
                    &resource,
                ));
            }
            if vs_endpoints.is_empty() {
                debug!("No endpoints could be generated from {resource}");
                continue;
            }
            endpoints.extend(vs_endpoints);
        }

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for Istio VirtualService");
        self.virtual_services.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "istio_virtualservice_tests.rs"]
mod istio_virtualservice_tests;
