// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record type management.
//!
//! Keeps endpoints whose type is managed and not explicitly excluded. With
//! `--exclude-record-types A` this suppresses IPv4 records entirely, and
//! `AAAA` suppresses IPv6.

use crate::endpoint::{Endpoint, RecordType};
use crate::errors::SourceError;
use crate::informers::EventHandler;
use crate::source::Source;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub struct RecordTypeFilterSource {
    source: Arc<dyn Source>,
    managed: BTreeSet<RecordType>,
    excluded: BTreeSet<RecordType>,
}

impl RecordTypeFilterSource {
    #[must_use]
    pub fn new(source: Arc<dyn Source>, managed: &[RecordType], excluded: &[RecordType]) -> Self {
        Self {
            source,
            managed: managed.iter().copied().collect(),
            excluded: excluded.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, record_type: RecordType) -> bool {
        self.managed.contains(&record_type) && !self.excluded.contains(&record_type)
    }
}

#[async_trait]
impl Source for RecordTypeFilterSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let endpoints = self.source.endpoints().await?;
        Ok(endpoints
            .into_iter()
            .filter(|ep| {
                let allowed = self.allows(ep.record_type);
                if !allowed {
                    debug!("Skipping endpoint {ep} because its record type is not managed");
                }
                allowed
            })
            .collect())
    }

    fn add_event_handler(&self, handler: EventHandler) {
        self.source.add_event_handler(handler);
    }
}

#[cfg(test)]
#[path = "record_type_filter_tests.rs"]
mod record_type_filter_tests;
