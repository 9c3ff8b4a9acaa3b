// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory provider.

use super::Provider;
use crate::domain_filter::DomainFilter;
use crate::endpoint::{Endpoint, EndpointKey};
use crate::errors::ProviderError;
use crate::plan::Changes;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use tracing::info;

/// Records held in a map keyed by name, type and set identifier.
///
/// A change set is validated as a whole before anything is written: creating
/// an existing record, or updating or deleting a missing one, rejects the
/// entire batch.
#[derive(Default)]
pub struct InMemoryProvider {
    records: RwLock<BTreeMap<EndpointKey, Endpoint>>,
    domain_filter: DomainFilter,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new(domain_filter: DomainFilter) -> Self {
        Self {
            records: RwLock::default(),
            domain_filter,
        }
    }

    /// Seed the provider with existing records.
    #[must_use]
    pub fn with_records(self, endpoints: Vec<Endpoint>) -> Self {
        {
            let mut records = self
                .records
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for ep in endpoints {
                records.insert(ep.key(), ep);
            }
        }
        self
    }

    fn validate(
        records: &BTreeMap<EndpointKey, Endpoint>,
        changes: &Changes,
    ) -> Result<(), ProviderError> {
        let mut touched = HashSet::new();
        let mut claim = |key: EndpointKey| {
            if touched.insert(key.clone()) {
                Ok(key)
            } else {
                Err(ProviderError::RecordAlreadyExists(key.to_string()))
            }
        };

        for ep in &changes.create {
            let key = claim(ep.key())?;
            if records.contains_key(&key) {
                return Err(ProviderError::RecordAlreadyExists(key.to_string()));
            }
        }
        for ep in changes.update_new.iter().chain(&changes.delete) {
            let key = claim(ep.key())?;
            if !records.contains_key(&key) {
                return Err(ProviderError::RecordNotFound(key.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let records = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::validate(&records, changes)?;

        for ep in &changes.create {
            info!("CREATE: {ep}");
            records.insert(ep.key(), ep.clone());
        }
        for ep in &changes.update_new {
            info!("UPDATE: {ep}");
            records.insert(ep.key(), ep.clone());
        }
        for ep in &changes.delete {
            info!("DELETE: {ep}");
            records.remove(&ep.key());
        }
        Ok(())
    }

    fn domain_filter(&self) -> DomainFilter {
        self.domain_filter.clone()
    }
}

#[cfg(test)]
#[path = "inmemory_tests.rs"]
mod inmemory_tests;
