// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Concatenation of several sources, with optional default targets.

use crate::endpoint::{Endpoint, Targets};
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::{endpoints_for_hostname, Source};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct MultiSource {
    children: Vec<Arc<dyn Source>>,
    default_targets: Targets,
    /// Replace targets even on endpoints that already have some
    force_default_targets: bool,
}

impl MultiSource {
    #[must_use]
    pub fn new(
        children: Vec<Arc<dyn Source>>,
        default_targets: Vec<String>,
        force_default_targets: bool,
    ) -> Self {
        Self {
            children,
            default_targets: Targets::from(default_targets),
            force_default_targets,
        }
    }

    fn apply_default_targets(&self, ep: Endpoint) -> Vec<Endpoint> {
        if !self.force_default_targets && !ep.targets.is_empty() {
            warn!(
                "Source provided targets for {:?} ({}), ignoring default targets [{}]; set force-default-targets to override",
                ep.dns_name, ep.record_type, self.default_targets
            );
            return vec![ep];
        }
        let mut endpoints = endpoints_for_hostname(
            &ep.dns_name,
            &self.default_targets,
            ep.record_ttl,
            &ep.provider_specific,
            &ep.set_identifier,
            "",
        );
        for generated in &mut endpoints {
            generated.labels.clone_from(&ep.labels);
        }
        endpoints
    }
}

#[async_trait]
impl Source for MultiSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let mut result = Vec::new();
        for child in &self.children {
            let endpoints = child.endpoints().await?;
            if self.default_targets.is_empty() {
                result.extend(endpoints);
                continue;
            }
            for ep in endpoints {
                result.extend(self.apply_default_targets(ep));
            }
        }
        Ok(result)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        for child in &self.children {
            child.add_event_handler(Arc::clone(&handler));
        }
    }
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod multi_tests;
