// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod source.
//!
//! - `internal-hostname` publishes the pod IP
//! - `hostname` publishes the external addresses of the pod's node (and its
//!   IPv6 internal addresses, which are routable)
//! - the `target` annotation replaces either
//! - `--pod-source-domain` publishes `<pod>.<domain>` for every pod
//! - the FQDN template publishes every pod IP
//!
//! Records with the same name, type and TTL are aggregated across pods.

use super::compatibility::Compatibility;
use super::{namespaced_api, CommonOptions, Source, SourceConfig};
use crate::annotations::{self, split_hostname_annotation};
use crate::constants::{
    HOSTNAME_ANNOTATION_KEY, INTERNAL_HOSTNAME_ANNOTATION_KEY,
    KOPS_DNS_CONTROLLER_HOSTNAME_ANNOTATION_KEY,
    KOPS_DNS_CONTROLLER_INTERNAL_HOSTNAME_ANNOTATION_KEY,
};
use crate::endpoint::{suitable_type, Endpoint, RecordType, Ttl};
use crate::errors::SourceError;
use crate::informers::{EventHandler, Informer};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

type EndpointMap = BTreeMap<(String, RecordType, Ttl), Vec<String>>;

pub struct PodSource {
    pods: Informer<Pod>,
    nodes: Informer<Node>,
    options: CommonOptions,
    compatibility: Option<Compatibility>,
    ignore_non_host_network_pods: bool,
    pod_source_domain: String,
}

impl PodSource {
    /// Start Pod and Node watchers and build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a cache fails to sync.
    pub async fn new(client: Client, config: &SourceConfig) -> Result<Self, SourceError> {
        let pods = Informer::start(
            namespaced_api(client.clone(), &config.namespace),
            watcher::Config::default(),
        )
        .await?;
        let nodes = Informer::start(Api::all(client), watcher::Config::default()).await?;
        Self::from_informers(pods, nodes, config)
    }

    /// Build the source over existing caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter or the FQDN template is malformed.
    pub fn from_informers(
        pods: Informer<Pod>,
        nodes: Informer<Node>,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            pods,
            nodes,
            options: CommonOptions::from_config(config)?,
            compatibility: config.compatibility,
            ignore_non_host_network_pods: config.ignore_non_host_network_pods,
            pod_source_domain: config.pod_source_domain.clone(),
        })
    }

    fn add_pod_endpoints(&self, map: &mut EndpointMap, pod: &Pod) {
        let host_network = pod
            .spec
            .as_ref()
            .and_then(|s| s.host_network)
            .unwrap_or(false);
        if self.ignore_non_host_network_pods && !host_network {
            debug!("Skipping pod {}: hostNetwork=false", pod.name_any());
            return;
        }

        let annotations = pod.annotations();
        let ttl = annotations::ttl(annotations, &format!("pod/{}", pod.name_any()));
        let targets = annotations::targets(annotations).0;
        let pod_ip = pod_ip(pod);

        if let Some(value) = annotations.get(INTERNAL_HOSTNAME_ANNOTATION_KEY) {
            for domain in split_hostname_annotation(value) {
                if targets.is_empty() {
                    add_address(map, &domain, ttl, pod_ip.as_deref());
                } else {
                    add_targets(map, &domain, ttl, &targets);
                }
            }
        }

        if let Some(value) = annotations.get(HOSTNAME_ANNOTATION_KEY) {
            let domains = split_hostname_annotation(value);
            if targets.is_empty() {
                self.add_node_addresses(map, pod, &domains, ttl);
            } else {
                for domain in &domains {
                    add_targets(map, domain, ttl, &targets);
                }
            }
        }

        if self.compatibility == Some(Compatibility::KopsDnsController) {
            if let Some(value) =
                annotations.get(KOPS_DNS_CONTROLLER_INTERNAL_HOSTNAME_ANNOTATION_KEY)
            {
                for domain in split_hostname_annotation(value) {
                    add_address(map, &domain, ttl, pod_ip.as_deref());
                }
            }
            if let Some(value) = annotations.get(KOPS_DNS_CONTROLLER_HOSTNAME_ANNOTATION_KEY) {
                self.add_node_addresses(map, pod, &split_hostname_annotation(value), ttl);
            }
        }

        if !self.pod_source_domain.is_empty() {
            let domain = format!("{}.{}", pod.name_any(), self.pod_source_domain);
            if targets.is_empty() {
                add_address(map, &domain, ttl, pod_ip.as_deref());
            } else {
                add_targets(map, &domain, ttl, &targets);
            }
        }
    }

    fn add_node_addresses(&self, map: &mut EndpointMap, pod: &Pod, domains: &[String], ttl: Ttl) {
        let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
            debug!("Pod {} is not scheduled yet; ignoring", pod.name_any());
            return;
        };
        let Some(node) = self
            .nodes
            .state()
            .into_iter()
            .find(|n| n.name_any() == node_name)
        else {
            debug!("Node {node_name} of pod {} not found; ignoring", pod.name_any());
            return;
        };

        let addresses = node.status.as_ref().and_then(|s| s.addresses.as_ref());
        for domain in domains {
            for address in addresses.into_iter().flatten() {
                let record_type = suitable_type(&address.address);
                // IPv6 addresses are reported as InternalIP but are reachable from outside
                let usable = address.type_ == "ExternalIP"
                    || (address.type_ == "InternalIP" && record_type == RecordType::AAAA);
                if usable {
                    add(map, domain, record_type, ttl, &address.address);
                }
            }
        }
    }

    fn hosts_from_template(&self, map: &mut EndpointMap, pod: &Pod) -> Result<(), SourceError> {
        let Some(template) = self.options.fqdn_template.as_ref() else {
            return Ok(());
        };
        let hosts = template.exec(pod, "Pod")?;
        let ttl = annotations::ttl(pod.annotations(), &format!("pod/{}", pod.name_any()));
        let ips = pod_ips(pod);
        if ips.is_empty() {
            debug!("Skipping pod {}: no pod IP yet", pod.name_any());
        }
        for host in &hosts {
            for ip in &ips {
                add(map, host, suitable_type(ip), ttl, ip);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Source for PodSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let pods = self.options.filter(self.pods.state());
        let mut map = EndpointMap::new();

        for pod in pods {
            if !annotations::controller_matches(pod.annotations()) {
                continue;
            }
            if self.options.fqdn_template.is_none() || self.options.combine_fqdn_and_annotation {
                self.add_pod_endpoints(&mut map, &pod);
            }
            self.hosts_from_template(&mut map, &pod)?;
        }

        Ok(map
            .into_iter()
            .map(|((name, record_type, ttl), targets)| {
                let mut ep = Endpoint::new(name, record_type, targets).with_ttl(ttl);
                ep.targets.sort_canonical();
                ep
            })
            .collect())
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for pod");
        self.pods.add_event_handler(handler);
    }
}

fn add(map: &mut EndpointMap, domain: &str, record_type: RecordType, ttl: Ttl, target: &str) {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    let targets = map
        .entry((domain.to_string(), record_type, ttl))
        .or_default();
    if !targets.iter().any(|t| t == target) {
        targets.push(target.to_string());
    }
}

fn add_address(map: &mut EndpointMap, domain: &str, ttl: Ttl, address: Option<&str>) {
    match address {
        Some(ip) => add(map, domain, suitable_type(ip), ttl, ip),
        None => debug!("No pod IP for {domain}; skipping"),
    }
}

fn add_targets(map: &mut EndpointMap, domain: &str, ttl: Ttl, targets: &[String]) {
    for target in targets {
        add(map, domain, suitable_type(target), ttl, target);
    }
}

fn pod_ip(pod: &Pod) -> Option<String> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.clone())
        .filter(|ip| !ip.is_empty())
}

fn pod_ips(pod: &Pod) -> Vec<String> {
    let ips: Vec<String> = pod
        .status
        .as_ref()
        .and_then(|s| s.pod_ips.as_ref())
        .into_iter()
        .flatten()
        .map(|p| p.ip.clone())
        .filter(|ip| !ip.is_empty())
        .collect();
    if ips.is_empty() {
        pod_ip(pod).into_iter().collect()
    } else {
        ips
    }
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod pod_tests;
