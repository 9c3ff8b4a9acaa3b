// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway API route sources.
//!
//! One generic [`GatewayRouteSource`] serves every route kind. A route is
//! published through each parent gateway that accepted it: the route's
//! hostnames are intersected with the hostnames of the listeners it attaches
//! to, and each resulting host points at the gateway's addresses.
//!
//! A listener takes a route when:
//!
//! - the parent reference names it through `sectionName` (or names none),
//! - its protocol serves the route kind (`HTTPS` and `TLS` listeners take
//!   HTTP routes),
//! - its port equals the parent reference port, when one is given,
//! - its `allowedRoutes` admit the route's namespace and kind.
//!
//! Listener `*.` wildcards match more specific route hostnames; the more
//! specific of the two names is published.

use super::istio_gateway::apply_template;
use super::{
    endpoints_for_hostname, namespaced_api, sort_targets, CommonOptions, Source, SourceConfig,
};
use crate::annotations;
use crate::constants::{
    DUALSTACK_LABEL_KEY, GATEWAY_API_GROUP, GATEWAY_API_KIND, GATEWAY_ROUTE_ACCEPTED,
};
use crate::crd::{
    GRPCRoute, HTTPRoute, K8sGateway, Listener, RouteStatus, TCPRoute, TLSRoute, UDPRoute,
};
use crate::endpoint::{Endpoint, ProviderSpecific, Targets, Ttl};
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use crate::selector::Selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// A Gateway API route kind.
pub trait GatewayRoute:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Listener protocol serving this kind
    const PROTOCOL: &'static str;

    /// Hostnames declared in the route spec.
    fn hostnames(&self) -> &[String] {
        &[]
    }

    fn route_status(&self) -> Option<&RouteStatus>;
}

impl GatewayRoute for HTTPRoute {
    const PROTOCOL: &'static str = "HTTP";

    fn hostnames(&self) -> &[String] {
        &self.spec.hostnames
    }

    fn route_status(&self) -> Option<&RouteStatus> {
        self.status.as_ref()
    }
}

impl GatewayRoute for GRPCRoute {
    const PROTOCOL: &'static str = "HTTP";

    fn hostnames(&self) -> &[String] {
        &self.spec.hostnames
    }

    fn route_status(&self) -> Option<&RouteStatus> {
        self.status.as_ref()
    }
}

impl GatewayRoute for TLSRoute {
    const PROTOCOL: &'static str = "TLS";

    fn hostnames(&self) -> &[String] {
        &self.spec.hostnames
    }

    fn route_status(&self) -> Option<&RouteStatus> {
        self.status.as_ref()
    }
}

impl GatewayRoute for TCPRoute {
    const PROTOCOL: &'static str = "TCP";

    fn route_status(&self) -> Option<&RouteStatus> {
        self.status.as_ref()
    }
}

impl GatewayRoute for UDPRoute {
    const PROTOCOL: &'static str = "UDP";

    fn route_status(&self) -> Option<&RouteStatus> {
        self.status.as_ref()
    }
}

pub type HttpRouteSource = GatewayRouteSource<HTTPRoute>;
pub type GrpcRouteSource = GatewayRouteSource<GRPCRoute>;
pub type TlsRouteSource = GatewayRouteSource<TLSRoute>;
pub type TcpRouteSource = GatewayRouteSource<TCPRoute>;
pub type UdpRouteSource = GatewayRouteSource<UDPRoute>;

/// Endpoints for routes of kind `R` attached to Gateway API gateways.
pub struct GatewayRouteSource<R: GatewayRoute> {
    routes: Informer<R>,
    gateways: Informer<K8sGateway>,
    namespaces: Informer<Namespace>,
    options: CommonOptions,
    gateway_namespace: String,
    gateway_label_filter: Selector,
}

impl<R: GatewayRoute> GatewayRouteSource<R> {
    /// Start the route, gateway and namespace watchers and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let routes = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let gateways = Informer::start(
            namespaced_api(client.clone(), &config.gateway_namespace),
            watcher::Config::default(),
        )
        .await?;
        let namespaces = Informer::start(Api::all(client), watcher::Config::default()).await?;
        Self::from_informers(routes, gateways, namespaces, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informers(
        routes: Informer<R>,
        gateways: Informer<K8sGateway>,
        namespaces: Informer<Namespace>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            routes,
            gateways,
            namespaces,
            options: CommonOptions::from_config(config)?,
            gateway_namespace: config.gateway_namespace.clone(),
            gateway_label_filter: Selector::parse(&config.gateway_label_filter)?,
        })
    }

    fn kind() -> String {
        R::kind(&()).to_string()
    }

    /// Route hostnames; `[""]` when the route names none and attaches to
    /// whatever its listeners declare.
    fn hostnames(&self, route: &R) -> Result<Vec<String>, SourceError> {
        let mut hostnames = route.hostnames().to_vec();
        if !self.options.ignore_hostname_annotation {
            hostnames.extend(annotations::hostnames(route.annotations()));
        }
        let hostnames = apply_template(
            hostnames,
            self.options.fqdn_template.as_ref(),
            self.options.combine_fqdn_and_annotation,
            route,
            &Self::kind(),
        )?;
        if hostnames.is_empty() {
            return Ok(vec![String::new()]);
        }
        Ok(hostnames)
    }

    fn gateways(&self) -> HashMap<(String, String), Arc<K8sGateway>> {
        self.gateways
            .state()
            .into_iter()
            .filter(|gw| {
                self.gateway_namespace.is_empty()
                    || gw.namespace().as_deref() == Some(self.gateway_namespace.as_str())
            })
            .filter(|gw| self.gateway_label_filter.matches(gw.labels()))
            .map(|gw| ((gw.namespace().unwrap_or_default(), gw.name_any()), gw))
            .collect()
    }

    fn namespace_labels(&self) -> HashMap<String, BTreeMap<String, String>> {
        self.namespaces
            .state()
            .into_iter()
            .map(|ns| (ns.name_any(), ns.labels().clone()))
            .collect()
    }

    /// Whether `listener` of `gateway` admits `route`.
    fn route_is_allowed(
        gateway: &K8sGateway,
        listener: &Listener,
        route: &R,
        namespaces: &HashMap<String, BTreeMap<String, String>>,
    ) -> bool {
        let allowed = listener.allowed_routes.as_ref();
        let from_namespaces = allowed.and_then(|a| a.namespaces.as_ref());
        let route_namespace = route.namespace().unwrap_or_default();

        match from_namespaces.and_then(|n| n.from.as_deref()).unwrap_or("Same") {
            "All" => {}
            "Same" => {
                if gateway.namespace().unwrap_or_default() != route_namespace {
                    return false;
                }
            }
            "Selector" => {
                // A missing selector selects no namespace.
                let Some(selector) = from_namespaces.and_then(|n| n.selector.as_ref()) else {
                    return false;
                };
                let Ok(selector) = Selector::from_label_selector(selector) else {
                    debug!("Gateway {} has an invalid namespace selector", gateway.name_any());
                    return false;
                };
                let Some(labels) = namespaces.get(&route_namespace) else {
                    return false;
                };
                if !selector.matches(labels) {
                    return false;
                }
            }
            _ => return false,
        }

        let kinds = allowed.map(|a| a.kinds.as_slice()).unwrap_or_default();
        if kinds.is_empty() {
            return true;
        }
        let (group, kind) = (R::group(&()), R::kind(&()));
        kinds.iter().any(|gk| {
            gk.group.as_deref().unwrap_or(GATEWAY_API_GROUP) == group && gk.kind == kind
        })
    }

    /// Hosts the route resolves to, each with the addresses of its gateways.
    fn resolve(
        &self,
        route: &R,
        gateways: &HashMap<(String, String), Arc<K8sGateway>>,
        namespaces: &HashMap<String, BTreeMap<String, String>>,
    ) -> Result<BTreeMap<String, HostTargets>, SourceError> {
        let route_hosts = self.hostnames(route)?;
        let route_namespace = route.namespace().unwrap_or_default();
        let mut hosts: BTreeMap<String, HostTargets> = BTreeMap::new();

        let parents = route.route_status().map(|s| s.parents.as_slice());
        for parent in parents.unwrap_or_default() {
            let parent_ref = &parent.parent_ref;
            let group = parent_ref.group.as_deref().unwrap_or(GATEWAY_API_GROUP);
            let kind = parent_ref.kind.as_deref().unwrap_or(GATEWAY_API_KIND);
            if group != GATEWAY_API_GROUP || kind != GATEWAY_API_KIND {
                continue;
            }

            let namespace = parent_ref
                .namespace
                .clone()
                .unwrap_or_else(|| route_namespace.clone());
            let Some(gateway) = gateways.get(&(namespace, parent_ref.name.clone())) else {
                debug!("Gateway {} not found for {}", parent_ref.name, route.name_any());
                continue;
            };
            let accepted = parent
                .conditions
                .iter()
                .any(|c| c.type_ == GATEWAY_ROUTE_ACCEPTED && c.status == "True");
            if !accepted {
                debug!("Gateway {} has not accepted {}", parent_ref.name, route.name_any());
                continue;
            }

            let binding = GatewayBinding::from_gateway(gateway);
            let mut matched = false;
            for listener in &gateway.spec.listeners {
                if parent_ref
                    .section_name
                    .as_ref()
                    .is_some_and(|section| *section != listener.name)
                {
                    continue;
                }
                if !protocol_matches(R::PROTOCOL, &listener.protocol) {
                    continue;
                }
                if parent_ref.port.is_some_and(|port| port != listener.port) {
                    continue;
                }
                if !Self::route_is_allowed(gateway, listener, route, namespaces) {
                    continue;
                }

                let listener_host = listener.hostname.as_deref().unwrap_or_default();
                for route_host in &route_hosts {
                    if listener_host.is_empty() && route_host.is_empty() {
                        continue;
                    }
                    if let Some(host) = matching_host(listener_host, route_host) {
                        hosts.entry(host).or_default().add(&binding);
                        matched = true;
                    }
                }
            }
            if !matched {
                debug!(
                    "No listener of gateway {} matches {}",
                    parent_ref.name,
                    route.name_any()
                );
            }
        }
        Ok(hosts)
    }
}

/// What a gateway contributes to the hosts routed through it.
struct GatewayBinding {
    targets: Targets,
    ttl: Ttl,
    provider_specific: ProviderSpecific,
    set_identifier: String,
}

impl GatewayBinding {
    fn from_gateway(gateway: &K8sGateway) -> Self {
        let resource = format!(
            "gateway/{}/{}",
            gateway.namespace().unwrap_or_default(),
            gateway.name_any()
        );
        let annotations = gateway.annotations();
        let mut targets = annotations::targets(annotations);
        if targets.is_empty() {
            targets = gateway
                .status
                .iter()
                .flat_map(|s| &s.addresses)
                .map(|a| a.value.clone())
                .collect();
        }
        let (provider_specific, set_identifier) = annotations::provider_specific(annotations);
        Self {
            targets,
            ttl: annotations::ttl(annotations, &resource),
            provider_specific,
            set_identifier,
        }
    }
}

/// Targets and gateway defaults gathered for one host.
#[derive(Default)]
struct HostTargets {
    targets: Targets,
    gateway_ttl: Option<Ttl>,
    gateway_provider_specific: Option<(ProviderSpecific, String)>,
}

impl HostTargets {
    fn add(&mut self, binding: &GatewayBinding) {
        for target in binding.targets.iter() {
            if !self.targets.contains(target) {
                self.targets.push(target.clone());
            }
        }
        if binding.ttl.is_configured() {
            self.gateway_ttl = Some(match self.gateway_ttl {
                Some(ttl) => ttl.min(binding.ttl),
                None => binding.ttl,
            });
        }
        let has_properties =
            !binding.provider_specific.is_empty() || !binding.set_identifier.is_empty();
        if self.gateway_provider_specific.is_none() && has_properties {
            self.gateway_provider_specific = Some((
                binding.provider_specific.clone(),
                binding.set_identifier.clone(),
            ));
        }
    }

    /// The route TTL, capped by the gateway TTL.
    fn ttl(&self, route_ttl: Ttl) -> Ttl {
        match self.gateway_ttl {
            Some(gateway_ttl) if route_ttl.is_configured() => route_ttl.min(gateway_ttl),
            Some(gateway_ttl) => gateway_ttl,
            None => route_ttl,
        }
    }
}

/// Whether a listener protocol serves routes of `route_protocol`. HTTP,
/// HTTPS and TLS listeners all serve HTTP and TLS routes.
fn protocol_matches(route_protocol: &str, listener_protocol: &str) -> bool {
    protocol_family(route_protocol) == protocol_family(listener_protocol)
}

fn protocol_family(protocol: &str) -> &str {
    match protocol {
        "HTTP" | "HTTPS" | "TLS" => "HTTP",
        other => other,
    }
}

/// Host both a listener and a route hostname cover, if any.
///
/// An empty name matches anything. A `*.` wildcard matches more specific
/// names; the more specific name is returned.
fn matching_host(a: &str, b: &str) -> Option<String> {
    let mut a = canonical_host(a)?;
    let mut b = canonical_host(b)?;
    if a.is_empty() {
        return Some(b);
    }
    if b.is_empty() || a == b {
        return Some(a);
    }
    if b.len() < a.len() || (a.len() == b.len() && b.starts_with("*.")) {
        std::mem::swap(&mut a, &mut b);
    }
    if a.starts_with("*.") && b.ends_with(&a[1..]) {
        return Some(b);
    }
    None
}

/// Lowercased host, or `None` for IP addresses and invalid names.
fn canonical_host(host: &str) -> Option<String> {
    if host.is_empty() {
        return Some(String::new());
    }
    if host.parse::<IpAddr>().is_ok() || !is_dns1123_domain(host.trim_start_matches("*.")) {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

fn is_dns1123_domain(name: &str) -> bool {
    !name.is_empty() && name.len() <= 255 && name.split('.').all(is_dns1123_label)
}

fn is_dns1123_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if bytes.len() <= 63 => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        }
        _ => false,
    }
}

#[async_trait]
impl<R: GatewayRoute> Source for GatewayRouteSource<R> {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let gateways = self.gateways();
        let namespaces = self.namespace_labels();
        let kind = Self::kind().to_lowercase();
        let mut endpoints = Vec::new();

        for route in self.options.filter(self.routes.state()) {
            let resource = format!(
                "{kind}/{}/{}",
                route.namespace().unwrap_or_default(),
                route.name_any()
            );
            let annotations = route.annotations();
            if !annotations::controller_matches(annotations) {
                debug!("Skipping {resource} because controller value does not match");
                continue;
            }

            let hosts = self.resolve(&route, &gateways, &namespaces)?;
            if hosts.is_empty() {
                debug!("No gateway hosts resolved for {resource}");
                continue;
            }

            let route_ttl = annotations::ttl(annotations, &resource);
            let route_properties = annotations::provider_specific(annotations);
            let mut route_endpoints = Vec::new();
            for (host, host_targets) in &hosts {
                let (provider_specific, set_identifier) =
                    if route_properties.0.is_empty() && route_properties.1.is_empty() {
                        host_targets
                            .gateway_provider_specific
                            .as_ref()
                            .unwrap_or(&route_properties)
                    } else {
                        &route_properties
                    };
                route_endpoints.extend(endpoints_for_hostname(
                    host,
                    &host_targets.targets,
                    host_targets.ttl(route_ttl),
                    provider_specific,
                    set_identifier,
                    &resource,
                ));
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

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for {}", Self::kind());
        self.routes.add_event_handler(handler.clone());
        self.gateways.add_event_handler(handler.clone());
        self.namespaces.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
