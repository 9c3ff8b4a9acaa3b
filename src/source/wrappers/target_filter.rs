// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Target filtering by network.

use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::Source;
use async_trait::async_trait;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error};

/// Include and exclude networks for record targets.
///
/// A target matches when it is an IP inside one of the include networks (or
/// there are none) and inside none of the exclude networks. Hostname
/// targets only match when no include networks are configured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetNetFilter {
    include: Vec<IpNet>,
    exclude: Vec<IpNet>,
}

impl TargetNetFilter {
    /// Parse CIDR lists; blank and malformed entries are skipped.
    #[must_use]
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: parse_nets(include),
            exclude: parse_nets(exclude),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        let ip = target.parse::<IpAddr>().ok();
        let in_any = |nets: &[IpNet]| ip.is_some_and(|ip| nets.iter().any(|net| net.contains(&ip)));
        let included = self.include.is_empty() || in_any(&self.include);
        let excluded = !self.exclude.is_empty() && in_any(&self.exclude);
        included && !excluded
    }
}

fn parse_nets(nets: &[String]) -> Vec<IpNet> {
    nets.iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter_map(|n| match n.parse::<IpNet>() {
            Ok(net) => Some(net),
            Err(e) => {
                error!("Ignoring invalid target network {n:?}: {e}");
                None
            }
        })
        .collect()
}

/// Keeps only targets accepted by a [`TargetNetFilter`].
///
/// Endpoints left without targets are dropped.
pub struct TargetFilterSource {
    source: Arc<dyn Source>,
    filter: TargetNetFilter,
}

impl TargetFilterSource {
    #[must_use]
    pub fn new(source: Arc<dyn Source>, filter: TargetNetFilter) -> Self {
        Self { source, filter }
    }
}

#[async_trait]
impl Source for TargetFilterSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let endpoints = self.source.endpoints().await?;
        if !self.filter.is_enabled() {
            return Ok(endpoints);
        }

        let mut result = Vec::with_capacity(endpoints.len());
        for mut ep in endpoints {
            ep.targets.retain(|t| {
                let keep = self.filter.matches(t);
                if !keep {
                    debug!("Target {t} of {} filtered out by target network filter", ep.dns_name);
                }
                keep
            });
            if ep.targets.is_empty() {
                debug!("Skipping endpoint {} because every target was filtered out", ep.dns_name);
                continue;
            }
            result.push(ep);
        }
        Ok(result)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        debug!("Adding event handler for target filter source");
        self.source.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "target_filter_tests.rs"]
mod target_filter_tests;
