// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint sources.
//!
//! A [`Source`] turns some upstream listing (Kubernetes objects held in
//! reflector stores, the Nomad service catalog, a remote HTTP server) into a
//! flat list of [`Endpoint`]s. Sources are stateless per call: everything
//! they need is read from their caches or fetched on demand.
//!
//! # Available Sources
//!
//! | name | reads |
//! |---|---|
//! | `service` | [`service::ServiceSource`] - Services, plus Pods and Nodes it needs |
//! | `ingress` | [`ingress::IngressSource`] - networking.k8s.io/v1 Ingresses |
//! | `pod` | [`pod::PodSource`] - Pods and the Nodes they run on |
//! | `node` | [`node::NodeSource`] - Nodes |
//! | `crd` | [`crd::CrdSource`] - `DNSEndpoint` custom resources |
//! | `istio-gateway` | [`istio_gateway::GatewaySource`] - Istio Gateways |
//! | `istio-virtualservice` | [`istio_virtualservice::VirtualServiceSource`] - VirtualServices |
//! | `kong-tcpingress` | [`kong_tcpingress::TcpIngressSource`] - Kong TCPIngresses |
//! | `gateway-httproute` | [`gateway::HttpRouteSource`] - Gateway API HTTPRoutes |
//! | `gateway-grpcroute` | [`gateway::GrpcRouteSource`] - Gateway API GRPCRoutes |
//! | `gateway-tlsroute` | [`gateway::TlsRouteSource`] - Gateway API TLSRoutes |
//! | `gateway-tcproute` | [`gateway::TcpRouteSource`] - Gateway API TCPRoutes |
//! | `gateway-udproute` | [`gateway::UdpRouteSource`] - Gateway API UDPRoutes |
//! | `traefik-proxy` | [`traefik_proxy::TraefikSource`] - Traefik HTTP, TCP and UDP routes |
//! | `nomad` | [`nomad::NomadServiceSource`] - Nomad service registrations |
//! | `http` | [`http::HttpSource`] - a remote server returning endpoints as JSON |
//!
//! Decorators in [`wrappers`] compose over any of them.

pub mod compatibility;
pub mod crd;
pub mod gateway;
pub mod http;
pub mod ingress;
pub mod istio_gateway;
pub mod istio_virtualservice;
pub mod kong_tcpingress;
pub mod node;
pub mod nomad;
pub mod pod;
pub mod service;
pub mod traefik_proxy;
pub mod wrappers;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::constants::{HTTP_REQUEST_TIMEOUT_SECS, RESOURCE_LABEL_KEY};
use crate::endpoint::{suitable_type, Endpoint, ProviderSpecific, RecordType, Targets, Ttl};
use crate::errors::SourceError;
use crate::fqdn::FqdnTemplate;
use crate::informers::EventHandler;
use crate::selector::{filter_by_annotations, filter_by_labels, Selector};
use async_trait::async_trait;
use compatibility::Compatibility;
use k8s_openapi::api::core::v1::LoadBalancerStatus;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Something that produces DNS endpoints.
#[async_trait]
pub trait Source: Send + Sync {
    /// Compute the endpoints this source currently wants published.
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError>;

    /// Register a callback fired whenever the underlying data changes.
    ///
    /// Sources without a change feed ignore the handler.
    fn add_event_handler(&self, _handler: EventHandler) {}
}

/// Every option a source may read.
///
/// Built once from the command line and handed to [`build_source`]; each
/// source picks the fields it cares about.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Namespace to watch; empty means all namespaces
    pub namespace: String,
    /// Annotation selector objects must match
    pub annotation_filter: String,
    /// Label selector objects must match
    pub label_filter: String,
    /// Ingress classes to process; empty means all
    pub ingress_class_names: Vec<String>,
    /// Template producing hostnames from an object
    pub fqdn_template: String,
    /// Use template hostnames in addition to annotation hostnames
    pub combine_fqdn_and_annotation: bool,
    pub ignore_hostname_annotation: bool,
    pub ignore_ingress_tls_spec: bool,
    pub ignore_ingress_rules_spec: bool,
    pub ignore_non_host_network_pods: bool,
    /// Publish the ClusterIP of `ClusterIP` services
    pub publish_internal: bool,
    /// Publish the host IP instead of the pod IP for headless services
    pub publish_host_ip: bool,
    pub always_publish_not_ready_addresses: bool,
    /// Service types to process; empty means all
    pub service_type_filter: Vec<String>,
    /// Legacy annotation scheme to fall back on
    pub compatibility: Option<Compatibility>,
    /// Publish `<pod-name>.<domain>` for every pod when set
    pub pod_source_domain: String,
    pub exclude_unschedulable: bool,
    pub expose_internal_ipv6: bool,
    /// Namespace of the gateways routes attach to; empty means all
    pub gateway_namespace: String,
    /// Label selector gateways must match
    pub gateway_label_filter: String,
    /// Skip the `traefik.containo.us` resources
    pub traefik_disable_legacy: bool,
    /// Skip the `traefik.io` resources
    pub traefik_disable_new: bool,
    /// Nomad API address, e.g. `http://127.0.0.1:4646`
    pub nomad_address: String,
    pub nomad_token: Option<String>,
    pub nomad_region: Option<String>,
    /// Server queried by the `http` source
    pub http_server_url: String,
    /// Timeout for every HTTP request a source makes
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            annotation_filter: String::new(),
            label_filter: String::new(),
            ingress_class_names: Vec::new(),
            fqdn_template: String::new(),
            combine_fqdn_and_annotation: false,
            ignore_hostname_annotation: false,
            ignore_ingress_tls_spec: false,
            ignore_ingress_rules_spec: false,
            ignore_non_host_network_pods: false,
            publish_internal: false,
            publish_host_ip: false,
            always_publish_not_ready_addresses: false,
            service_type_filter: Vec::new(),
            compatibility: None,
            pod_source_domain: String::new(),
            exclude_unschedulable: true,
            expose_internal_ipv6: true,
            gateway_namespace: String::new(),
            gateway_label_filter: String::new(),
            traefik_disable_legacy: false,
            traefik_disable_new: false,
            nomad_address: String::new(),
            nomad_token: None,
            nomad_region: None,
            http_server_url: String::new(),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Parsed form of the options shared by the Kubernetes sources.
#[derive(Clone, Debug)]
pub struct CommonOptions {
    pub namespace: String,
    pub annotation_filter: Selector,
    pub label_filter: Selector,
    pub fqdn_template: Option<FqdnTemplate>,
    pub combine_fqdn_and_annotation: bool,
    pub ignore_hostname_annotation: bool,
}

impl CommonOptions {
    /// Parse filters and template from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when a selector or the FQDN template is malformed.
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            namespace: config.namespace.clone(),
            annotation_filter: Selector::parse(&config.annotation_filter)?,
            label_filter: Selector::parse(&config.label_filter)?,
            fqdn_template: FqdnTemplate::parse(&config.fqdn_template)?,
            combine_fqdn_and_annotation: config.combine_fqdn_and_annotation,
            ignore_hostname_annotation: config.ignore_hostname_annotation,
        })
    }

    /// Apply namespace, label and annotation filters to a store snapshot.
    #[must_use]
    pub fn filter<K>(&self, items: Vec<Arc<K>>) -> Vec<Arc<K>>
    where
        K: Resource,
    {
        let items: Vec<Arc<K>> = if self.namespace.is_empty() {
            items
        } else {
            items
                .into_iter()
                .filter(|item| item.namespace().as_deref() == Some(self.namespace.as_str()))
                .collect()
        };
        let items = filter_by_labels(items, &self.label_filter);
        filter_by_annotations(items, &self.annotation_filter)
    }
}

/// `Api` over one namespace, or over all of them when `namespace` is empty.
#[must_use]
pub fn namespaced_api<K>(client: Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

/// Build A, AAAA and CNAME endpoints for `hostname` out of mixed targets.
///
/// Targets are grouped by [`suitable_type`]; each non-empty group becomes one
/// endpoint carrying the TTL, provider-specific properties, set identifier and
/// (when non-empty) the `resource` label. Hostnames with an over-long DNS
/// label produce nothing.
#[must_use]
pub fn endpoints_for_hostname(
    hostname: &str,
    targets: &Targets,
    ttl: Ttl,
    provider_specific: &ProviderSpecific,
    set_identifier: &str,
    resource: &str,
) -> Vec<Endpoint> {
    let mut a_targets = Vec::new();
    let mut aaaa_targets = Vec::new();
    let mut cname_targets = Vec::new();
    for target in targets.iter() {
        match suitable_type(target) {
            RecordType::A => a_targets.push(target.clone()),
            RecordType::AAAA => aaaa_targets.push(target.clone()),
            _ => cname_targets.push(target.clone()),
        }
    }

    let mut endpoints = Vec::new();
    for (record_type, group) in [
        (RecordType::A, a_targets),
        (RecordType::AAAA, aaaa_targets),
        (RecordType::CNAME, cname_targets),
    ] {
        if group.is_empty() {
            continue;
        }
        let mut ep = Endpoint::new(hostname, record_type, group)
            .with_ttl(ttl)
            .with_set_identifier(set_identifier);
        ep.provider_specific.clone_from(provider_specific);
        if !resource.is_empty() {
            ep.labels
                .insert(RESOURCE_LABEL_KEY.to_string(), resource.to_string());
        }
        if !ep.has_valid_labels() {
            error!("Skipping endpoint {hostname}: a DNS label is longer than 63 characters");
            continue;
        }
        endpoints.push(ep);
    }
    endpoints
}

/// IPs and hostnames advertised in a load balancer status.
#[must_use]
pub fn targets_from_load_balancer(status: Option<&LoadBalancerStatus>) -> Targets {
    let mut targets = Targets::default();
    for ingress in status
        .and_then(|s| s.ingress.as_ref())
        .into_iter()
        .flatten()
    {
        if let Some(ip) = ingress.ip.as_ref().filter(|ip| !ip.is_empty()) {
            targets.push(ip.clone());
        }
        if let Some(hostname) = ingress.hostname.as_ref().filter(|h| !h.is_empty()) {
            targets.push(hostname.clone());
        }
    }
    targets
}

/// Label every endpoint with the object it came from.
pub fn set_resource_label(endpoints: &mut [Endpoint], resource: &str) {
    for ep in endpoints {
        ep.labels
            .insert(RESOURCE_LABEL_KEY.to_string(), resource.to_string());
    }
}

/// Sort the targets of every endpoint.
pub fn sort_targets(endpoints: &mut [Endpoint]) {
    for ep in endpoints {
        ep.targets.sort_canonical();
    }
}

/// Names accepted by [`build_source`].
pub const SOURCE_NAMES: [&str; 16] = [
    "service",
    "ingress",
    "pod",
    "node",
    "crd",
    "istio-gateway",
    "istio-virtualservice",
    "kong-tcpingress",
    "gateway-httproute",
    "gateway-grpcroute",
    "gateway-tlsroute",
    "gateway-tcproute",
    "gateway-udproute",
    "traefik-proxy",
    "nomad",
    "http",
];

/// Whether the named source needs a Kubernetes client.
#[must_use]
pub fn needs_kubernetes(name: &str) -> bool {
    !matches!(name, "nomad" | "http")
}

fn require_client(client: Option<&Client>, name: &str) -> Result<Client, SourceError> {
    client.cloned().ok_or_else(|| {
        SourceError::InvalidConfig(format!("source {name} requires a Kubernetes client"))
    })
}

/// Build the named source.
///
/// Kubernetes-backed sources start their watchers and wait for the initial
/// listing before returning.
///
/// # Errors
///
/// Returns an error for unknown names, invalid configuration, missing
/// Kubernetes client, or caches that fail to sync.
pub async fn build_source(
    name: &str,
    config: &SourceConfig,
    client: Option<&Client>,
) -> Result<Arc<dyn Source>, SourceError> {
    info!("Building {name} source");
    let source: Arc<dyn Source> = match name {
        "service" => Arc::new(
            service::ServiceSource::new(require_client(client, name)?, config).await?,
        ),
        "ingress" => Arc::new(
            ingress::IngressSource::new(require_client(client, name)?, config).await?,
        ),
        "pod" => Arc::new(pod::PodSource::new(require_client(client, name)?, config).await?),
        "node" => Arc::new(node::NodeSource::new(require_client(client, name)?, config).await?),
        "crd" => Arc::new(crd::CrdSource::new(require_client(client, name)?, config).await?),
        "istio-gateway" => Arc::new(
            istio_gateway::GatewaySource::new(require_client(client, name)?, config).await?,
        ),
        "istio-virtualservice" => Arc::new(
            istio_virtualservice::VirtualServiceSource::new(require_client(client, name)?, config)
                .await?,
        ),
        "kong-tcpingress" => Arc::new(
            kong_tcpingress::TcpIngressSource::new(require_client(client, name)?, config).await?,
        ),
        "gateway-httproute" => Arc::new(
            gateway::HttpRouteSource::new(require_client(client, name)?, config).await?,
        ),
        "gateway-grpcroute" => Arc::new(
            gateway::GrpcRouteSource::new(require_client(client, name)?, config).await?,
        ),
        "gateway-tlsroute" => Arc::new(
            gateway::TlsRouteSource::new(require_client(client, name)?, config).await?,
        ),
        "gateway-tcproute" => Arc::new(
            gateway::TcpRouteSource::new(require_client(client, name)?, config).await?,
        ),
        "gateway-udproute" => Arc::new(
            gateway::UdpRouteSource::new(require_client(client, name)?, config).await?,
        ),
        "traefik-proxy" => Arc::new(
            traefik_proxy::TraefikSource::new(require_client(client, name)?, config).await?,
        ),
        "nomad" => Arc::new(nomad::NomadServiceSource::new(config)?),
        "http" => Arc::new(http::HttpSource::new(config)?),
        other => return Err(SourceError::UnknownSource(other.to_string())),
    };
    debug!("{name} source ready");
    Ok(source)
}

/// Build every named source.
///
/// # Errors
///
/// Fails on the first source that cannot be built.
pub async fn build_sources(
    names: &[String],
    config: &SourceConfig,
    client: Option<&Client>,
) -> Result<Vec<Arc<dyn Source>>, SourceError> {
    let mut sources = Vec::with_capacity(names.len());
    for name in names {
        sources.push(build_source(name, config, client).await?);
    }
    Ok(sources)
}
