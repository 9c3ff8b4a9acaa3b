// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Final touches applied to every endpoint.

use crate::constants::ALIAS_PROVIDER_SPECIFIC_KEY;
use crate::endpoint::{Endpoint, RecordType, Ttl};
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::Source;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Applies the default TTL and, optionally, alias preference.
pub struct PostProcessor {
    source: Arc<dyn Source>,
    ttl: Ttl,
    prefer_alias: bool,
}

impl PostProcessor {
    #[must_use]
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            ttl: Ttl(0),
            prefer_alias: false,
        }
    }

    /// TTL given to endpoints without one; whole seconds, zero disables.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Ttl(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        self
    }

    /// Mark CNAME records as provider aliases.
    #[must_use]
    pub fn with_prefer_alias(mut self, prefer_alias: bool) -> Self {
        self.prefer_alias = prefer_alias;
        self
    }
}

#[async_trait]
impl Source for PostProcessor {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let mut endpoints = self.source.endpoints().await?;
        for ep in &mut endpoints {
            if self.ttl.is_configured() && !ep.record_ttl.is_configured() {
                ep.record_ttl = self.ttl;
            }
            if self.prefer_alias && ep.record_type == RecordType::CNAME {
                ep.set_provider_specific_property(ALIAS_PROVIDER_SPECIFIC_KEY, "true");
            }
        }
        Ok(endpoints)
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.source.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "post_processor_tests.rs"]
mod post_processor_tests;
