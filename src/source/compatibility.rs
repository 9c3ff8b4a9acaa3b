// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Legacy annotation schemes understood by the service source.
//!
//! Older DNS controllers used their own annotations. When compatibility mode
//! is set and a service yields no endpoints from the regular annotations,
//! these are consulted instead.

use crate::constants::{
    KOPS_DNS_CONTROLLER_HOSTNAME_ANNOTATION_KEY,
    KOPS_DNS_CONTROLLER_INTERNAL_HOSTNAME_ANNOTATION_KEY, MATE_ANNOTATION_KEY,
    MOLECULE_ANNOTATION_KEY,
};
use crate::endpoint::{Endpoint, RecordType};
use k8s_openapi::api::core::v1::{Node, Service};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Node role label kops uses to mark worker nodes.
const KOPS_NODE_ROLE_LABEL: &str = "node-role.kubernetes.io/node";

/// Label Molecule services opt in with, and its expected value.
const MOLECULE_OPT_IN_LABEL: (&str, &str) = ("dns", "route53");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    /// Zalando mate: `zalando.org/dnsname`
    Mate,
    /// Molecule Software: `domainName` on services labelled `dns=route53`
    Molecule,
    /// kops dns-controller: `dns.alpha.kubernetes.io/{external,internal}`
    KopsDnsController,
}

impl Compatibility {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mate => "mate",
            Self::Molecule => "molecule",
            Self::KopsDnsController => "kops-dns-controller",
        }
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compatibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mate" => Ok(Self::Mate),
            "molecule" => Ok(Self::Molecule),
            "kops-dns-controller" => Ok(Self::KopsDnsController),
            other => Err(format!(
                "unknown compatibility mode {other:?}, expected mate, molecule or kops-dns-controller"
            )),
        }
    }
}

/// Endpoints for `svc` under the legacy scheme `mode`.
#[must_use]
pub fn legacy_endpoints_from_service(
    svc: &Service,
    mode: Compatibility,
    nodes: &[Arc<Node>],
) -> Vec<Endpoint> {
    match mode {
        Compatibility::Mate => mate_endpoints(svc),
        Compatibility::Molecule => molecule_endpoints(svc),
        Compatibility::KopsDnsController => kops_endpoints(svc, nodes),
    }
}

fn split_compact(value: &str) -> Vec<String> {
    value
        .replace(' ', "")
        .split(',')
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_balancer_endpoints(svc: &Service, hostname: &str) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    let ingresses = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    for lb in ingresses.into_iter().flatten() {
        if let Some(ip) = lb.ip.as_ref().filter(|ip| !ip.is_empty()) {
            endpoints.push(Endpoint::new(hostname, RecordType::A, vec![ip.clone()]));
        }
        if let Some(host) = lb.hostname.as_ref().filter(|h| !h.is_empty()) {
            endpoints.push(Endpoint::new(hostname, RecordType::CNAME, vec![host.clone()]));
        }
    }
    endpoints
}

fn mate_endpoints(svc: &Service) -> Vec<Endpoint> {
    let Some(hostname) = svc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(MATE_ANNOTATION_KEY))
    else {
        return Vec::new();
    };
    load_balancer_endpoints(svc, hostname)
}

fn molecule_endpoints(svc: &Service) -> Vec<Endpoint> {
    let (label, expected) = MOLECULE_OPT_IN_LABEL;
    let opted_in = svc
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(label))
        .is_some_and(|v| v == expected);
    if !opted_in {
        return Vec::new();
    }
    let Some(annotation) = svc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(MOLECULE_ANNOTATION_KEY))
    else {
        return Vec::new();
    };
    split_compact(annotation)
        .iter()
        .flat_map(|hostname| load_balancer_endpoints(svc, hostname))
        .collect()
}

fn kops_endpoints(svc: &Service, nodes: &[Arc<Node>]) -> Vec<Endpoint> {
    let annotations = svc.metadata.annotations.clone().unwrap_or_default();
    let external = annotations.get(KOPS_DNS_CONTROLLER_HOSTNAME_ANNOTATION_KEY);
    let internal = annotations.get(KOPS_DNS_CONTROLLER_INTERNAL_HOSTNAME_ANNOTATION_KEY);
    let service_type = svc
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP");

    match service_type {
        "NodePort" => match (external, internal) {
            (Some(hostnames), None) => kops_node_port_endpoints(hostnames, nodes, "ExternalIP"),
            (None, Some(hostnames)) => kops_node_port_endpoints(hostnames, nodes, "InternalIP"),
            // dns-controller publishes nothing when both or neither are set
            _ => Vec::new(),
        },
        "LoadBalancer" => external
            .into_iter()
            .chain(internal)
            .flat_map(|value| split_compact(value))
            .flat_map(|hostname| load_balancer_endpoints(svc, &hostname))
            .collect(),
        _ => Vec::new(),
    }
}

fn kops_node_port_endpoints(
    hostnames: &str,
    nodes: &[Arc<Node>],
    address_type: &str,
) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for hostname in split_compact(hostnames) {
        for node in nodes {
            let is_worker = node
                .metadata
                .labels
                .as_ref()
                .is_some_and(|l| l.contains_key(KOPS_NODE_ROLE_LABEL));
            if !is_worker {
                continue;
            }
            let addresses = node
                .status
                .as_ref()
                .and_then(|s| s.addresses.as_ref());
            for address in addresses.into_iter().flatten() {
                if address.type_ == address_type {
                    endpoints.push(Endpoint::new(
                        &hostname,
                        RecordType::A,
                        vec![address.address.clone()],
                    ));
                }
            }
        }
    }
    endpoints
}

#[cfg(test)]
#[path = "compatibility_tests.rs"]
mod compatibility_tests;
