// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service source.
//!
//! Publishes records for Services carrying a `hostname` or
//! `internal-hostname` annotation (or matching the FQDN template). Targets
//! depend on the service type:
//!
//! - `LoadBalancer`: external IPs, else the load balancer status
//! - `ClusterIP`: the cluster IP when publishing internal services; headless
//!   services publish one record per pod
//! - `NodePort`: node addresses plus an SRV record per node port
//! - `ExternalName`: the external name (or external IPs)
//!
//! The `target` annotation overrides all of the above.

use super::compatibility::{legacy_endpoints_from_service, Compatibility};
use super::{
    endpoints_for_hostname, namespaced_api, set_resource_label, sort_targets, CommonOptions,
    Source, SourceConfig,
};
use crate::annotations;
use crate::endpoint::{Endpoint, ProviderSpecific, RecordType, Targets, Ttl};
use crate::errors::SourceError;
use crate::fqdn::combine_with_templated_endpoints;
use crate::informers::{EventHandler, Informer};
use crate::selector::map_contains;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

const HEADLESS_CLUSTER_IP: &str = "None";

/// Access annotation values for `NodePort` services.
const ACCESS_PUBLIC: &str = "public";
const ACCESS_PRIVATE: &str = "private";

/// Endpoints-type annotation values for headless services.
const ENDPOINTS_TYPE_NODE_EXTERNAL_IP: &str = "NodeExternalIP";
const ENDPOINTS_TYPE_HOST_IP: &str = "HostIP";

pub struct ServiceSource {
    services: Informer<Service>,
    pods: Informer<Pod>,
    nodes: Informer<Node>,
    options: CommonOptions,
    service_types: BTreeSet<String>,
    compatibility: Option<Compatibility>,
    publish_internal: bool,
    publish_host_ip: bool,
    always_publish_not_ready_addresses: bool,
}

impl ServiceSource {
    /// Start Service, Pod and Node watchers and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let services = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let pods = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let nodes = Informer::start(Api::all(client), watcher::Config::default()).await?;
        Self::from_informers(services, pods, nodes, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informers(
        services: Informer<Service>,
        pods: Informer<Pod>,
        nodes: Informer<Node>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            services,
            pods,
            nodes,
            options: CommonOptions::from_config(config)?,
            service_types: config.service_type_filter.iter().cloned().collect(),
            compatibility: config.compatibility,
            publish_internal: config.publish_internal,
            publish_host_ip: config.publish_host_ip,
            always_publish_not_ready_addresses: config.always_publish_not_ready_addresses,
        })
    }

    fn type_allowed(&self, svc: &Service) -> bool {
        self.service_types.is_empty() || self.service_types.contains(service_type(svc))
    }

    fn endpoints_for_service(&self, svc: &Service) -> Vec<Endpoint> {
        let annotations = svc.annotations();
        let (provider_specific, set_identifier) = annotations::provider_specific(annotations);
        let mut endpoints = Vec::new();

        if !self.options.ignore_hostname_annotation {
            for hostname in annotations::hostnames(annotations) {
                endpoints.extend(self.generate_endpoints(
                    svc,
                    &hostname,
                    &provider_specific,
                    &set_identifier,
                    false,
                ));
            }
        }
        for hostname in annotations::internal_hostnames(annotations) {
            endpoints.extend(self.generate_endpoints(
                svc,
                &hostname,
                &provider_specific,
                &set_identifier,
                true,
            ));
        }
        endpoints
    }

    fn endpoints_from_template(&self, svc: &Service) -> Result<Vec<Endpoint>, SourceError> {
        let Some(template) = self.options.fqdn_template.as_ref() else {
            return Ok(Vec::new());
        };
        let hostnames = template.exec(svc, "Service")?;
        let (provider_specific, set_identifier) = annotations::provider_specific(svc.annotations());
        Ok(hostnames
            .iter()
            .flat_map(|hostname| {
                self.generate_endpoints(svc, hostname, &provider_specific, &set_identifier, false)
            })
            .collect())
    }

    fn generate_endpoints(
        &self,
        svc: &Service,
        hostname: &str,
        provider_specific: &ProviderSpecific,
        set_identifier: &str,
        use_cluster_ip: bool,
    ) -> Vec<Endpoint> {
        let hostname = hostname.strip_suffix('.').unwrap_or(hostname);
        let resource = resource_name(svc);
        let annotations = svc.annotations();
        let ttl = annotations::ttl(annotations, &resource);
        let mut targets = annotations::targets(annotations);
        let mut endpoints = Vec::new();

        if targets.is_empty() {
            match service_type(svc) {
                "LoadBalancer" => {
                    targets = if use_cluster_ip {
                        cluster_ips(svc)
                    } else {
                        load_balancer_targets(svc)
                    };
                }
                "ClusterIP" => {
                    if is_headless(svc) {
                        endpoints.extend(self.headless_endpoints(
                            svc,
                            hostname,
                            ttl,
                            provider_specific,
                            set_identifier,
                        ));
                    } else if self.publish_internal || use_cluster_ip {
                        targets = cluster_ips(svc);
                    }
                }
                "NodePort" => {
                    targets = self.node_port_targets(svc);
                    endpoints.extend(node_port_srv_endpoints(svc, hostname, ttl));
                }
                "ExternalName" => targets = external_name_targets(svc),
                other => debug!("Unsupported service type {other} for {resource}"),
            }
        }

        endpoints.extend(endpoints_for_hostname(
            hostname,
            &targets,
            ttl,
            provider_specific,
            set_identifier,
            &resource,
        ));
        endpoints
    }

    fn selected_pods(&self, svc: &Service) -> Vec<Arc<Pod>> {
        let Some(selector) = svc.spec.as_ref().and_then(|s| s.selector.as_ref()) else {
            return Vec::new();
        };
        if selector.is_empty() {
            return Vec::new();
        }
        let namespace = svc.namespace();
        self.pods
            .state()
            .into_iter()
            .filter(|pod| pod.namespace() == namespace)
            .filter(|pod| map_contains(pod.labels(), selector))
            .collect()
    }

    fn headless_endpoints(
        &self,
        svc: &Service,
        hostname: &str,
        ttl: Ttl,
        provider_specific: &ProviderSpecific,
        set_identifier: &str,
    ) -> Vec<Endpoint> {
        let publish_not_ready = self.always_publish_not_ready_addresses
            || svc
                .spec
                .as_ref()
                .and_then(|s| s.publish_not_ready_addresses)
                .unwrap_or(false);
        let endpoints_type = annotations::endpoints_type(svc.annotations());

        let mut by_domain: BTreeMap<String, Targets> = BTreeMap::new();
        for pod in self.selected_pods(svc) {
            if !publish_not_ready && !is_pod_ready(&pod) {
                debug!("Skipping pod {} of headless service: not ready", pod.name_any());
                continue;
            }

            let mut domains = vec![hostname.to_string()];
            if let Some(pod_hostname) = pod
                .spec
                .as_ref()
                .and_then(|s| s.hostname.as_ref())
                .filter(|h| !h.is_empty())
            {
                domains.push(format!("{pod_hostname}.{hostname}"));
            }

            let targets = self.headless_pod_targets(&pod, endpoints_type);
            for domain in domains {
                let entry = by_domain.entry(domain).or_default();
                for target in &targets {
                    if !entry.contains(target) {
                        entry.push(target.clone());
                    }
                }
            }
        }

        let resource = resource_name(svc);
        by_domain
            .iter()
            .flat_map(|(domain, targets)| {
                endpoints_for_hostname(
                    domain,
                    targets,
                    ttl,
                    provider_specific,
                    set_identifier,
                    &resource,
                )
            })
            .collect()
    }

    fn headless_pod_targets(&self, pod: &Pod, endpoints_type: Option<&str>) -> Vec<String> {
        let status = pod.status.as_ref();
        let host_ip = status.and_then(|s| s.host_ip.clone()).filter(|ip| !ip.is_empty());

        match endpoints_type {
            Some(ENDPOINTS_TYPE_NODE_EXTERNAL_IP) => {
                let node_name = pod.spec.as_ref().and_then(|s| s.node_name.as_deref());
                self.nodes
                    .state()
                    .iter()
                    .filter(|n| Some(n.name_any().as_str()) == node_name)
                    .flat_map(|n| node_addresses(n, "ExternalIP"))
                    .collect()
            }
            Some(ENDPOINTS_TYPE_HOST_IP) => host_ip.into_iter().collect(),
            _ if self.publish_host_ip => host_ip.into_iter().collect(),
            _ => pod_ips(pod),
        }
    }

    fn node_port_targets(&self, svc: &Service) -> Targets {
        let local_policy = svc
            .spec
            .as_ref()
            .and_then(|s| s.external_traffic_policy.as_deref())
            == Some("Local");

        let all_nodes = self.nodes.state();
        let mut nodes = all_nodes.clone();
        if local_policy {
            let pod_nodes: BTreeSet<String> = self
                .selected_pods(svc)
                .iter()
                .filter_map(|p| p.spec.as_ref().and_then(|s| s.node_name.clone()))
                .collect();
            nodes = all_nodes
                .into_iter()
                .filter(|n| pod_nodes.contains(&n.name_any()))
                .collect();
            if nodes.is_empty() {
                nodes = self.nodes.state();
            }
        }

        let mut external = Vec::new();
        let mut internal = Vec::new();
        for node in &nodes {
            external.extend(node_addresses(node, "ExternalIP"));
            internal.extend(node_addresses(node, "InternalIP"));
        }

        let targets = match annotations::access(svc.annotations()) {
            Some(ACCESS_PUBLIC) => external,
            Some(ACCESS_PRIVATE) => internal,
            _ if !external.is_empty() => external,
            _ => internal,
        };
        Targets::from(targets)
    }
}

#[async_trait]
impl Source for ServiceSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let services = self.options.filter(self.services.state());
        let mut endpoints = Vec::new();

        for svc in services {
            if !self.type_allowed(&svc) {
                continue;
            }
            if !annotations::controller_matches(svc.annotations()) {
                debug!(
                    "Skipping service {} because controller value does not match",
                    resource_name(&svc)
                );
                continue;
            }

            let mut svc_endpoints = self.endpoints_for_service(&svc);

            if svc_endpoints.is_empty() {
                if let Some(mode) = self.compatibility {
                    svc_endpoints = legacy_endpoints_from_service(&svc, mode, &self.nodes.state());
                }
            }

            let mut svc_endpoints = combine_with_templated_endpoints(
                svc_endpoints,
                self.options.fqdn_template.as_ref(),
                self.options.combine_fqdn_and_annotation,
                || self.endpoints_from_template(&svc),
            )?;

            if svc_endpoints.is_empty() {
                debug!("No endpoints could be generated from service {}", resource_name(&svc));
                continue;
            }

            set_resource_label(&mut svc_endpoints, &resource_name(&svc));
            debug!(
                "Endpoints generated from service {}: {}",
                resource_name(&svc),
                svc_endpoints.len()
            );
            endpoints.extend(svc_endpoints);
        }

        sort_targets(&mut endpoints);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for service");
        self.services.add_event_handler(handler);
    }
}

fn resource_name(svc: &Service) -> String {
    format!(
        "service/{}/{}",
        svc.namespace().unwrap_or_default(),
        svc.name_any()
    )
}

fn service_type(svc: &Service) -> &str {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
}

fn is_headless(svc: &Service) -> bool {
    svc.spec.as_ref().and_then(|s| s.cluster_ip.as_deref()) == Some(HEADLESS_CLUSTER_IP)
}

fn cluster_ips(svc: &Service) -> Targets {
    let Some(spec) = svc.spec.as_ref() else {
        return Targets::default();
    };
    let ips: Vec<String> = match spec.cluster_ips.as_ref().filter(|ips| !ips.is_empty()) {
        Some(ips) => ips.clone(),
        None => spec.cluster_ip.clone().into_iter().collect(),
    };
    ips.into_iter()
        .filter(|ip| !ip.is_empty() && ip != HEADLESS_CLUSTER_IP)
        .collect()
}

fn external_ips(svc: &Service) -> Vec<String> {
    svc.spec
        .as_ref()
        .and_then(|s| s.external_ips.clone())
        .unwrap_or_default()
}

fn load_balancer_targets(svc: &Service) -> Targets {
    let external = external_ips(svc);
    if !external.is_empty() {
        return Targets::from(external);
    }
    super::targets_from_load_balancer(svc.status.as_ref().and_then(|s| s.load_balancer.as_ref()))
}

fn external_name_targets(svc: &Service) -> Targets {
    let external = external_ips(svc);
    if !external.is_empty() {
        return Targets::from(external);
    }
    svc.spec
        .as_ref()
        .and_then(|s| s.external_name.clone())
        .into_iter()
        .collect()
}

/// `_<service>._<proto>.<hostname> SRV 0 50 <nodePort> <hostname>` per node port.
fn node_port_srv_endpoints(svc: &Service, hostname: &str, ttl: Ttl) -> Vec<Endpoint> {
    let mut endpoints: Vec<Endpoint> = Vec::new();
    let ports = svc.spec.as_ref().and_then(|s| s.ports.as_ref());
    for port in ports.into_iter().flatten() {
        let Some(node_port) = port.node_port.filter(|p| *p > 0) else {
            continue;
        };
        let protocol = port
            .protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("TCP")
            .to_lowercase();
        let record_name = format!("_{}._{protocol}.{hostname}", svc.name_any());
        let target = format!("0 50 {node_port} {hostname}");

        match endpoints.iter_mut().find(|ep| ep.dns_name == record_name) {
            Some(existing) => existing.targets.push(target),
            None => endpoints
                .push(Endpoint::new(&record_name, RecordType::SRV, vec![target]).with_ttl(ttl)),
        }
    }
    endpoints
}

fn node_addresses(node: &Node, address_type: &str) -> Vec<String> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .into_iter()
        .flatten()
        .filter(|a| a.type_ == address_type)
        .map(|a| a.address.clone())
        .collect()
}

fn pod_ips(pod: &Pod) -> Vec<String> {
    let Some(status) = pod.status.as_ref() else {
        return Vec::new();
    };
    let ips: Vec<String> = status
        .pod_ips
        .iter()
        .flatten()
        .map(|p| p.ip.clone())
        .filter(|ip| !ip.is_empty())
        .collect();
    if ips.is_empty() {
        status.pod_ip.clone().into_iter().filter(|ip| !ip.is_empty()).collect()
    } else {
        ips
    }
}

fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
