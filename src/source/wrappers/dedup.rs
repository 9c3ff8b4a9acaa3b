// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duplicate and invalid endpoint removal.

use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::Source;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Drops invalid endpoints and exact repeats.
///
/// An endpoint is a repeat when an earlier one has the same name, type, set
/// identifier and targets. Repeated targets inside one endpoint are removed
/// first, keeping their original order.
pub struct DedupSource {
    source: Arc<dyn Source>,
}

impl DedupSource {
    #[must_use]
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self { source }
    }
}

fn dedup_targets(ep: &mut Endpoint) {
    if ep.targets.len() < 2 {
        return;
    }
    let mut seen = HashSet::new();
    ep.targets.retain(|t| seen.insert(t.clone()));
}

#[async_trait]
impl Source for DedupSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let mut collected = HashSet::new();
        let mut result = Vec::new();

        for mut ep in self.source.endpoints().await? {
            if !ep.check_endpoint() {
                warn!(
                    "Skipping endpoint [{}:{}] due to invalid configuration [{}:{}]",
                    ep.set_identifier, ep.dns_name, ep.record_type, ep.targets
                );
                continue;
            }
            dedup_targets(&mut ep);

            let identifier = format!(
                "{}/{}/{}/{}",
                ep.record_type, ep.dns_name, ep.set_identifier, ep.targets
            );
            if !collected.insert(identifier) {
                debug!("Removing duplicate endpoint {ep}");
                continue;
            }
            result.push(ep);
        }
        Ok(result)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.source.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod dedup_tests;
