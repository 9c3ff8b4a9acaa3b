// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared builders for source unit tests.

use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::informers::{EventHandler, EventHandlers, Informer};
use crate::source::Source;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Node, NodeAddress, NodeStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::reflector;
use kube::runtime::watcher::Event;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

/// An informer whose store holds exactly `objects`.
pub fn informer<K>(objects: Vec<K>) -> Informer<K>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let (reader, mut writer) = reflector::store::<K>();
    for obj in objects {
        writer.apply_watcher_event(&Event::Apply(obj));
    }
    Informer::from_store(reader)
}

pub fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn meta(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
        annotations: (!annotations.is_empty()).then(|| string_map(annotations)),
        ..Default::default()
    }
}

/// Load balancer status listing `ips` then `hostnames`.
pub fn load_balancer(ips: &[&str], hostnames: &[&str]) -> LoadBalancerStatus {
    let mut ingress: Vec<LoadBalancerIngress> = ips
        .iter()
        .map(|ip| LoadBalancerIngress {
            ip: Some((*ip).to_string()),
            ..Default::default()
        })
        .collect();
    ingress.extend(hostnames.iter().map(|h| LoadBalancerIngress {
        hostname: Some((*h).to_string()),
        ..Default::default()
    }));
    LoadBalancerStatus {
        ingress: Some(ingress),
    }
}

/// A node with `(type, address)` pairs.
pub fn node(name: &str, addresses: &[(&str, &str)]) -> Node {
    Node {
        metadata: meta("", name, &[]),
        status: Some(NodeStatus {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(t, a)| NodeAddress {
                        type_: (*t).to_string(),
                        address: (*a).to_string(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A source returning fixed endpoints, or failing when built with [`StaticSource::failing`].
#[derive(Clone, Default)]
pub struct StaticSource {
    endpoints: Vec<Endpoint>,
    fail: bool,
    pub handlers: EventHandlers,
}

impl StaticSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        if self.fail {
            return Err(SourceError::InvalidConfig("static source failure".to_string()));
        }
        Ok(self.endpoints.clone())
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.handlers.add(handler);
    }
}

/// Shorthand for an endpoint with string targets.
pub fn ep(name: &str, record_type: crate::endpoint::RecordType, targets: &[&str]) -> Endpoint {
    Endpoint::new(
        name,
        record_type,
        targets.iter().map(|t| (*t).to_string()).collect(),
    )
}
