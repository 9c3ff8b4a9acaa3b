// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Traefik `IngressRoute` source.
//!
//! Reads `IngressRoute`, `IngressRouteTCP` and `IngressRouteUDP` objects,
//! both under `traefik.io` and under the older `traefik.containo.us` group.
//! Hostnames come from the `hostname` annotation and from the `Host`,
//! `HostHeader` and `HostSNI` matchers of each router rule; UDP routers have
//! no rules and only publish annotation hostnames. Targets come from the
//! `target` annotation only.

use super::{
    endpoints_for_hostname, namespaced_api, sort_targets, CommonOptions, Source, SourceConfig,
};
use crate::annotations;
use crate::constants::DUALSTACK_LABEL_KEY;
use crate::crd::{
    IngressRoute, IngressRouteTCP, IngressRouteUDP, LegacyIngressRoute, LegacyIngressRouteTCP,
    LegacyIngressRouteUDP,
};
use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// A Traefik router resource.
pub trait TraefikRouteResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind used in the `resource` label
    const RESOURCE_KIND: &'static str;

    /// Rules of every router.
    fn rules(&self) -> Vec<&str> {
        Vec::new()
    }
}

impl TraefikRouteResource for IngressRoute {
    const RESOURCE_KIND: &'static str = "ingressroute";

    fn rules(&self) -> Vec<&str> {
        self.spec.routes.iter().map(|r| r.match_.as_str()).collect()
    }
}

impl TraefikRouteResource for LegacyIngressRoute {
    const RESOURCE_KIND: &'static str = "ingressroute";

    fn rules(&self) -> Vec<&str> {
        self.spec.routes.iter().map(|r| r.match_.as_str()).collect()
    }
}

impl TraefikRouteResource for IngressRouteTCP {
    const RESOURCE_KIND: &'static str = "ingressroutetcp";

    fn rules(&self) -> Vec<&str> {
        self.spec.routes.iter().map(|r| r.match_.as_str()).collect()
    }
}

impl TraefikRouteResource for LegacyIngressRouteTCP {
    const RESOURCE_KIND: &'static str = "ingressroutetcp";

    fn rules(&self) -> Vec<&str> {
        self.spec.routes.iter().map(|r| r.match_.as_str()).collect()
    }
}

impl TraefikRouteResource for IngressRouteUDP {
    const RESOURCE_KIND: &'static str = "ingressrouteudp";
}

impl TraefikRouteResource for LegacyIngressRouteUDP {
    const RESOURCE_KIND: &'static str = "ingressrouteudp";
}

/// Caches of one API group. `None` when the group is disabled.
#[derive(Default)]
pub struct TraefikInformers {
    pub ingress_routes: Option<Informer<IngressRoute>>,
    pub ingress_routes_tcp: Option<Informer<IngressRouteTCP>>,
    pub ingress_routes_udp: Option<Informer<IngressRouteUDP>>,
    pub legacy_ingress_routes: Option<Informer<LegacyIngressRoute>>,
    pub legacy_ingress_routes_tcp: Option<Informer<LegacyIngressRouteTCP>>,
    pub legacy_ingress_routes_udp: Option<Informer<LegacyIngressRouteUDP>>,
}

pub struct TraefikSource {
    informers: TraefikInformers,
    options: CommonOptions,
}

async fn start<K: TraefikRouteResource>(
    client: &Client,
    namespace: &str,
) -> Result<Option<Informer<K>>, SourceError> {
    let informer = Informer::start(
        namespaced_api(client.clone(), namespace),
        watcher::Config::default(),
    )
    .await?;
    Ok(Some(informer))
}

impl TraefikSource {
    /// Start watchers for every enabled API group and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let ns = config.namespace.as_str();
        let mut informers = TraefikInformers::default();
        if !config.traefik_disable_new {
            informers.ingress_routes = start(&client, ns).await?;
            informers.ingress_routes_tcp = start(&client, ns).await?;
            informers.ingress_routes_udp = start(&client, ns).await?;
        }
        if !config.traefik_disable_legacy {
            informers.legacy_ingress_routes = start(&client, ns).await?;
            informers.legacy_ingress_routes_tcp = start(&client, ns).await?;
            informers.legacy_ingress_routes_udp = start(&client, ns).await?;
        }
        Self::from_informers(informers, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter is malformed.
    pub fn from_informers(
        informers: TraefikInformers,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            informers,
            options: CommonOptions::from_config(config)?,
        })
    }

    fn route_endpoints<K: TraefikRouteResource>(
        &self,
        informer: Option<&Informer<K>>,
    ) -> Vec<Endpoint> {
        let Some(informer) = informer else {
            return Vec::new();
        };
        let mut endpoints = Vec::new();

        for route in self.options.filter(informer.state()) {
            let resource = format!(
                "{}/{}/{}",
                K::RESOURCE_KIND,
                route.namespace().unwrap_or_default(),
                route.name_any()
            );
            let annotations = route.annotations();
            let targets = annotations::targets(annotations);
            let ttl = annotations::ttl(annotations, &resource);
            let (provider_specific, set_identifier) = annotations::provider_specific(annotations);

            let mut hostnames = if self.options.ignore_hostname_annotation {
                Vec::new()
            } else {
                annotations::hostnames(annotations)
            };
            for rule in route.rules() {
                hostnames.extend(
                    rule_hosts(rule)
                        .into_iter()
                        .filter(|h| *h != "*")
                        .map(str::to_string),
                );
            }

            let mut route_endpoints: Vec<Endpoint> = hostnames
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
            if route_endpoints.is_empty() {
                debug!("No endpoints could be generated from {resource}");
                continue;
            }

            if annotations::alb_dualstack(annotations) {
                for ep in &mut route_endpoints {
                    ep.labels
                        .insert(DUALSTACK_LABEL_KEY.to_string(), "true".to_string());
                }
            }
            debug!("Endpoints generated from {resource}: {}", route_endpoints.len());
            endpoints.extend(route_endpoints);
        }
        endpoints
    }
}

/// Hostnames named by the `Host`, `HostHeader` and `HostSNI` matchers of a rule.
pub fn rule_hosts(rule: &str) -> Vec<&str> {
    let mut hosts = Vec::new();
    let mut rest = rule;
    while let Some(pos) = rest.find("Host") {
        let after = &rest[pos + "Host".len()..];
        match matcher_arguments(after) {
            Some((arguments, remainder)) => {
                hosts.extend(backquoted_values(arguments));
                rest = remainder;
            }
            None => rest = after,
        }
    }
    hosts
}

/// Split the backquoted arguments of a matcher off the text following
/// `Host`. Returns the arguments and the text after the closing parenthesis.
fn matcher_arguments(text: &str) -> Option<(&str, &str)> {
    let text = text
        .strip_prefix("SNI")
        .or_else(|| text.strip_prefix("Header"))
        .unwrap_or(text);
    let arguments = text.trim_start().strip_prefix('(')?.trim_start();
    if !arguments.starts_with('`') {
        return None;
    }
    // The shortest run of arguments ending in a backquote then `)`.
    for (i, _) in arguments.match_indices('`').skip(1) {
        if let Some(remainder) = arguments[i + 1..].trim_start().strip_prefix(')') {
            return Some((&arguments[..=i], remainder));
        }
    }
    None
}

/// Non-empty backquoted values without commas.
fn backquoted_values(arguments: &str) -> Vec<&str> {
    let mut values = Vec::new();
    let mut rest = arguments;
    while let Some(open) = rest.find('`') {
        let tail = &rest[open + 1..];
        let Some(close) = tail.find('`') else {
            break;
        };
        let value = &tail[..close];
        if value.is_empty() || value.contains(',') {
            rest = &tail[close..];
        } else {
            values.push(value);
            rest = &tail[close + 1..];
        }
    }
    values
}

#[async_trait]
impl Source for TraefikSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let informers = &self.informers;
        let mut endpoints = self.route_endpoints(informers.ingress_routes.as_ref());
        endpoints.extend(self.route_endpoints(informers.legacy_ingress_routes.as_ref()));
        endpoints.extend(self.route_endpoints(informers.ingress_routes_tcp.as_ref()));
        endpoints.extend(self.route_endpoints(informers.legacy_ingress_routes_tcp.as_ref()));
        endpoints.extend(self.route_endpoints(informers.ingress_routes_udp.as_ref()));
        endpoints.extend(self.route_endpoints(informers.legacy_ingress_routes_udp.as_ref()));

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for Traefik routes");
        let informers = &self.informers;
        if let Some(i) = &informers.ingress_routes {
            i.add_event_handler(handler.clone());
        }
        if let Some(i) = &informers.ingress_routes_tcp {
            i.add_event_handler(handler.clone());
        }
        if let Some(i) = &informers.ingress_routes_udp {
            i.add_event_handler(handler.clone());
        }
        if let Some(i) = &informers.legacy_ingress_routes {
            i.add_event_handler(handler.clone());
        }
        if let Some(i) = &informers.legacy_ingress_routes_tcp {
            i.add_event_handler(handler.clone());
        }
        if let Some(i) = &informers.legacy_ingress_routes_udp {
            i.add_event_handler(handler);
        }
    }
}

#[cfg(test)]
#[path = "traefik_proxy_tests.rs"]
mod traefik_proxy_tests;
