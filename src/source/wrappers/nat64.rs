// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! NAT64 address synthesis.
//!
//! An AAAA target inside a NAT64 `/96` prefix embeds an IPv4 address in its
//! last 32 bits. For every AAAA endpoint with such targets an extra A
//! endpoint carrying the embedded addresses is published alongside it.

use crate::endpoint::{Endpoint, RecordType};
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::Source;
use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::debug;

/// Prefix length every NAT64 network must have
const NAT64_PREFIX_LEN: u8 = 96;

pub struct Nat64Source {
    source: Arc<dyn Source>,
    prefixes: Vec<Ipv6Net>,
}

impl Nat64Source {
    /// Wrap `source`, synthesizing A records for targets inside `prefixes`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidConfig`] when a prefix is not an IPv6 `/96`.
    pub fn new(source: Arc<dyn Source>, prefixes: &[String]) -> Result<Self, SourceError> {
        let prefixes = prefixes
            .iter()
            .map(|p| {
                let net = p.parse::<Ipv6Net>().map_err(|e| {
                    SourceError::InvalidConfig(format!("invalid NAT64 prefix {p:?}: {e}"))
                })?;
                if net.prefix_len() != NAT64_PREFIX_LEN {
                    return Err(SourceError::InvalidConfig(format!(
                        "NAT64 prefix {p:?} must be a /{NAT64_PREFIX_LEN}"
                    )));
                }
                Ok(net)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { source, prefixes })
    }

    fn embedded_ipv4(&self, target: &str) -> Option<Ipv4Addr> {
        let ip = target.parse::<Ipv6Addr>().ok()?;
        if !self.prefixes.iter().any(|net| net.contains(&ip)) {
            return None;
        }
        let octets = ip.octets();
        Some(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
    }
}

#[async_trait]
impl Source for Nat64Source {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let mut endpoints = self.source.endpoints().await?;
        if self.prefixes.is_empty() {
            return Ok(endpoints);
        }

        let mut synthesized = Vec::new();
        for ep in endpoints.iter().filter(|ep| ep.record_type == RecordType::AAAA) {
            let v4_targets: Vec<String> = ep
                .targets
                .iter()
                .filter_map(|t| self.embedded_ipv4(t))
                .map(|ip| ip.to_string())
                .collect();
            if v4_targets.is_empty() {
                continue;
            }
            debug!("Synthesizing A record for {} from NAT64 targets", ep.dns_name);
            let mut v4 = ep.clone();
            v4.record_type = RecordType::A;
            v4.targets = v4_targets.into();
            synthesized.push(v4);
        }
        endpoints.extend(synthesized);
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.source.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "nat64_tests.rs"]
mod nat64_tests;
