// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource types read by dnsync.
//!
//! # Resource Types
//!
//! ## Owned
//!
//! - [`DNSEndpoint`] - Explicit list of DNS endpoints declared by users or other
//!   controllers (`externaldns.k8s.io/v1alpha1`)
//!
//! ## Third-party, read only
//!
//! - [`Gateway`] - Istio gateway (`networking.istio.io/v1`)
//! - [`VirtualService`] - Istio virtual service (`networking.istio.io/v1`)
//! - [`TCPIngress`] - Kong TCP ingress (`configuration.konghq.com/v1beta1`)
//! - [`K8sGateway`] - Gateway API gateway (`gateway.networking.k8s.io/v1`)
//! - [`HTTPRoute`], [`GRPCRoute`] - Gateway API routes (`gateway.networking.k8s.io/v1`)
//! - [`TLSRoute`], [`TCPRoute`], [`UDPRoute`] - Gateway API routes
//!   (`gateway.networking.k8s.io/v1alpha2`)
//! - [`IngressRoute`], [`IngressRouteTCP`], [`IngressRouteUDP`] - Traefik routes
//!   (`traefik.io/v1alpha1`), plus their `Legacy*` twins in `traefik.containo.us`
//!
//! Only the fields the sources consume are modelled; everything else in the
//! third-party objects is ignored on deserialization.
//!
//! # Example: Declaring endpoints
//!
//! ```rust,no_run
//! use dnsync::crd::DNSEndpointSpec;
//! use dnsync::endpoint::{Endpoint, RecordType};
//!
//! let spec = DNSEndpointSpec {
//!     endpoints: vec![Endpoint::new(
//!         "www.example.org",
//!         RecordType::A,
//!         vec!["192.0.2.10".to_string()],
//!     )],
//! };
//! ```

use crate::endpoint::Endpoint;
use k8s_openapi::api::core::v1::LoadBalancerStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `DNSEndpoint` is a list of DNS records to publish as is.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    plural = "dnsendpoints",
    namespaced,
    doc = "DNSEndpoint declares DNS records explicitly. Each entry of spec.endpoints is published to the configured provider unchanged apart from validation."
)]
#[kube(status = "DNSEndpointStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    /// Records to publish
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// `DNSEndpoint` status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointStatus {
    /// The generation observed by dnsync
    #[serde(default)]
    pub observed_generation: i64,
}

// ============================================================================
// Istio
// ============================================================================

/// Istio gateway spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1",
    kind = "Gateway",
    plural = "gateways",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Pod labels of the gateway workload
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub servers: Vec<GatewayServer>,
}

/// A listener of an Istio gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayServer {
    /// Hosts exposed by this listener, optionally prefixed with `namespace/`
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<GatewayPort>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPort {
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

/// Istio virtual service spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1",
    kind = "VirtualService",
    plural = "virtualservices",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Gateways the routes bind to; `mesh` means sidecars
    #[serde(default)]
    pub gateways: Vec<String>,
}

// ============================================================================
// Kong
// ============================================================================

/// Kong TCP ingress spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "configuration.konghq.com",
    version = "v1beta1",
    kind = "TCPIngress",
    plural = "tcpingresses",
    namespaced
)]
#[kube(status = "TCPIngressStatus")]
#[serde(rename_all = "camelCase")]
pub struct TCPIngressSpec {
    #[serde(default)]
    pub rules: Vec<TCPIngressRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TCPIngressRule {
    /// SNI host; empty for plain TCP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub port: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TCPIngressStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerStatus>,
}

// ============================================================================
// Gateway API
// ============================================================================

/// Gateway API gateway spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    root = "K8sGateway",
    plural = "gateways",
    namespaced
)]
#[kube(status = "K8sGatewayStatus")]
#[serde(rename_all = "camelCase")]
pub struct K8sGatewaySpec {
    #[serde(default)]
    pub gateway_class_name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// A gateway listener routes attach to
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Section name routes refer to
    #[serde(default)]
    pub name: String,
    /// Hostname or `*.` wildcard; unset matches every route hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: i32,
    /// `HTTP`, `HTTPS`, `TLS`, `TCP` or `UDP`
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
}

/// Routes a listener accepts
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<RouteNamespaces>,
    /// Route kinds; empty allows every kind
    #[serde(default)]
    pub kinds: Vec<RouteGroupKind>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// `All`, `Same` or `Selector`; `Same` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupKind {
    /// Defaults to `gateway.networking.k8s.io`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct K8sGatewayStatus {
    #[serde(default)]
    pub addresses: Vec<GatewayStatusAddress>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatusAddress {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    pub value: String,
}

/// Reference from a route to its parent gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Defaults to the namespace of the route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    /// Listener name; unset means every listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Status shared by every route kind
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

/// How one parent gateway handled the route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    #[serde(default)]
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<RouteCondition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

/// `HTTPRoute` spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    plural = "httproutes",
    namespaced
)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// `GRPCRoute` spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "GRPCRoute",
    plural = "grpcroutes",
    namespaced
)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct GRPCRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// `TLSRoute` spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "TLSRoute",
    plural = "tlsroutes",
    namespaced
)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct TLSRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    /// SNI hostnames
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// `TCPRoute` spec (subset); TCP routes carry no hostnames
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "TCPRoute",
    plural = "tcproutes",
    namespaced
)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct TCPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
}

/// `UDPRoute` spec (subset); UDP routes carry no hostnames
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "UDPRoute",
    plural = "udproutes",
    namespaced
)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
}

// ============================================================================
// Traefik
// ============================================================================

/// A Traefik router
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraefikRoute {
    /// Rule such as ``Host(`a.example.org`) && PathPrefix(`/api`)``
    #[serde(default, rename = "match")]
    pub match_: String,
}

/// Traefik `IngressRoute` spec (subset)
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRoute",
    plural = "ingressroutes",
    namespaced
)]
pub struct IngressRouteSpec {
    #[serde(default)]
    pub routes: Vec<TraefikRoute>,
}

/// Traefik `IngressRouteTCP` spec (subset); rules use `HostSNI`
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRouteTCP",
    plural = "ingressroutetcps",
    namespaced
)]
pub struct IngressRouteTCPSpec {
    #[serde(default)]
    pub routes: Vec<TraefikRoute>,
}

/// Traefik `IngressRouteUDP` spec; UDP routers have no rules
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRouteUDP",
    plural = "ingressrouteudps",
    namespaced
)]
pub struct IngressRouteUDPSpec {}

/// `IngressRoute` served under the pre-v3 `traefik.containo.us` group
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRoute",
    root = "LegacyIngressRoute",
    plural = "ingressroutes",
    namespaced
)]
pub struct LegacyIngressRouteSpec {
    #[serde(default)]
    pub routes: Vec<TraefikRoute>,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRouteTCP",
    root = "LegacyIngressRouteTCP",
    plural = "ingressroutetcps",
    namespaced
)]
pub struct LegacyIngressRouteTCPSpec {
    #[serde(default)]
    pub routes: Vec<TraefikRoute>,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRouteUDP",
    root = "LegacyIngressRouteUDP",
    plural = "ingressrouteudps",
    namespaced
)]
pub struct LegacyIngressRouteUDPSpec {}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
