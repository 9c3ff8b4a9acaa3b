// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TXT record registry.
//!
//! [`TxtRegistry`] wraps a [`Provider`]. Every record it creates gets a
//! companion TXT record whose value lists the record's labels, the owner id
//! among them. When reading records back, the labels of each companion are
//! copied onto the record it describes, so the plan can tell records this
//! instance owns from records created by someone else. Changes to records
//! owned by another owner are dropped before they reach the provider.
//!
//! A record that carries the right owner but lost its companion TXT record
//! is marked with the `txt/force-update` provider-specific property. The
//! plan then sees it as changed and the update recreates the companion.

use crate::constants::{
    ALIAS_PROVIDER_SPECIFIC_KEY, OWNED_RECORD_LABEL_KEY, OWNER_LABEL_KEY,
    TXT_FORCE_UPDATE_PROVIDER_SPECIFIC_KEY,
};
use crate::domain_filter::DomainFilter;
use crate::endpoint::{filter_by_owner, Endpoint, Labels, RecordType};
use crate::errors::ProviderError;
use crate::plan::Changes;
use crate::provider::Provider;
use crate::registry::labels::{parse_labels, serialize_labels};
use crate::registry::mapper::AffixNameMapper;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Settings for a [`TxtRegistry`].
#[derive(Clone, Debug, Default)]
pub struct TxtRegistryConfig {
    /// Owner written to and required on managed records; must not be empty
    pub owner_id: String,
    /// Records owned by this id are taken over by `owner_id`
    pub old_owner_id: String,
    /// Prefix of the first label of TXT names
    pub prefix: String,
    /// Suffix of the first label of TXT names; exclusive with `prefix`
    pub suffix: String,
    /// Replaces a leading `*` label in TXT names
    pub wildcard_replacement: String,
    /// Record types whose missing companions are recreated
    pub managed_types: Vec<RecordType>,
    /// Record types never managed, even when listed in `managed_types`
    pub exclude_types: Vec<RecordType>,
}

/// Name and set identifier of a TXT record seen in the last listing.
type TxtKey = (String, String);

/// Name, type and set identifier a companion TXT record describes. The type
/// is `None` for companions written without a record type in their name.
type LabelKey = (String, Option<RecordType>, String);

pub struct TxtRegistry {
    provider: Arc<dyn Provider>,
    owner_id: String,
    old_owner_id: String,
    mapper: AffixNameMapper,
    wildcard_replacement: String,
    managed_types: Vec<RecordType>,
    exclude_types: Vec<RecordType>,
    existing_txts: Mutex<HashSet<TxtKey>>,
}

impl TxtRegistry {
    /// Wrap `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error when the owner id is empty or both a prefix and a
    /// suffix are configured.
    pub fn new(
        provider: Arc<dyn Provider>,
        config: TxtRegistryConfig,
    ) -> Result<Self, ProviderError> {
        if config.owner_id.is_empty() {
            return Err(ProviderError::InvalidRegistryConfig(
                "owner id cannot be empty".to_string(),
            ));
        }
        if !config.prefix.is_empty() && !config.suffix.is_empty() {
            return Err(ProviderError::InvalidRegistryConfig(
                "txt prefix and txt suffix are mutually exclusive".to_string(),
            ));
        }

        Ok(Self {
            provider,
            mapper: AffixNameMapper::new(
                &config.prefix,
                &config.suffix,
                &config.wildcard_replacement,
            ),
            owner_id: config.owner_id,
            old_owner_id: config.old_owner_id,
            wildcard_replacement: config.wildcard_replacement,
            managed_types: config.managed_types,
            exclude_types: config.exclude_types,
            existing_txts: Mutex::default(),
        })
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn is_managed(&self, record_type: RecordType) -> bool {
        self.managed_types.contains(&record_type) && !self.exclude_types.contains(&record_type)
    }

    fn migrate_owner(&self, labels: &mut Labels) {
        if !self.old_owner_id.is_empty()
            && labels.get(OWNER_LABEL_KEY) == Some(&self.old_owner_id)
        {
            labels.insert(OWNER_LABEL_KEY.to_string(), self.owner_id.clone());
        }
    }

    /// Companion TXT record of `record`.
    #[must_use]
    pub fn txt_record(&self, record: &Endpoint) -> Endpoint {
        let mut labels = record.labels.clone();
        self.migrate_owner(&mut labels);

        let mut txt = Endpoint::new(
            self.mapper.to_txt_name(&record.dns_name, owning_type(record)),
            RecordType::TXT,
            vec![serialize_labels(&labels, true)],
        )
        .with_set_identifier(record.set_identifier.clone())
        .with_label(OWNED_RECORD_LABEL_KEY, record.dns_name.clone());
        txt.provider_specific = record.provider_specific.clone();
        txt
    }

    fn existing_txts(&self) -> std::sync::MutexGuard<'_, HashSet<TxtKey>> {
        self.existing_txts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn txt_exists(&self, txt: &Endpoint) -> bool {
        self.existing_txts()
            .contains(&(txt.dns_name.clone(), txt.set_identifier.clone()))
    }
}

/// Record type a companion TXT name is derived from. Alias A records are
/// stored as CNAME so a switch between the two keeps its ownership.
fn owning_type(record: &Endpoint) -> RecordType {
    let alias = record.get_provider_specific_property(ALIAS_PROVIDER_SPECIFIC_KEY);
    if alias == Some("true") && record.record_type == RecordType::A {
        RecordType::CNAME
    } else {
        record.record_type
    }
}

#[async_trait]
impl Provider for TxtRegistry {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let records = self.provider.records().await?;

        let mut endpoints = Vec::new();
        let mut labels_by_key: HashMap<LabelKey, Labels> = HashMap::new();
        let mut txt_names = HashSet::new();
        let mut existing = HashSet::new();

        for record in records {
            if record.record_type != RecordType::TXT {
                endpoints.push(record);
                continue;
            }
            let Some(first) = record.targets.first() else {
                error!("TXT record {} has no targets", record.dns_name);
                continue;
            };
            let Some(labels) = parse_labels(first) else {
                endpoints.push(record);
                continue;
            };

            match self.mapper.to_endpoint_name(&record.dns_name) {
                Some((name, record_type)) => {
                    let key = (name, record_type, record.set_identifier.clone());
                    labels_by_key.insert(key, labels);
                }
                None => debug!("TXT record {} does not carry the registry affix", record.dns_name),
            }
            txt_names.insert(record.dns_name.clone());
            existing.insert((record.dns_name, record.set_identifier));
        }

        for ep in &mut endpoints {
            let name = match ep.dns_name.split_once('.') {
                Some(("*", rest)) if !self.wildcard_replacement.is_empty() => {
                    format!("{}.{rest}", self.wildcard_replacement)
                }
                _ => ep.dns_name.clone(),
            };
            let typed = (name, Some(owning_type(ep)), ep.set_identifier.clone());
            let labels = labels_by_key.get(&typed).or_else(|| {
                // AAAA records never share the companion of their A record.
                (ep.record_type != RecordType::AAAA)
                    .then(|| labels_by_key.get(&(typed.0.clone(), None, typed.2.clone())))
                    .flatten()
            });
            if let Some(labels) = labels {
                ep.labels
                    .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            self.migrate_owner(&mut ep.labels);

            if !txt_names.is_empty()
                && ep.is_owned_by(&self.owner_id)
                && self.is_managed(ep.record_type)
            {
                let txt = self.txt_record(ep);
                if !txt_names.contains(&txt.dns_name) {
                    debug!("Companion TXT record {} is missing, forcing an update", txt.dns_name);
                    ep.set_provider_specific_property(
                        TXT_FORCE_UPDATE_PROVIDER_SPECIFIC_KEY,
                        "true",
                    );
                }
            }
        }

        *self.existing_txts() = existing;
        Ok(endpoints)
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let mut filtered = Changes {
            delete: filter_by_owner(&self.owner_id, changes.delete.clone()),
            ..Changes::default()
        };
        let mut txts = Changes::default();

        for record in &changes.create {
            let record = record
                .clone()
                .with_label(OWNER_LABEL_KEY, self.owner_id.clone());
            let txt = self.txt_record(&record);
            if !self.txt_exists(&txt) {
                txts.create.push(txt);
            }
            filtered.create.push(record);
        }

        for record in &filtered.delete {
            let txt = self.txt_record(record);
            if self.txt_exists(&txt) {
                txts.delete.push(txt);
            }
        }

        for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
            if !old.is_owned_by(&self.owner_id) || !new.is_owned_by(&self.owner_id) {
                debug!("Skipping update of {old}: not owned by {:?}", self.owner_id);
                continue;
            }
            let (old_txt, new_txt) = (self.txt_record(old), self.txt_record(new));
            if self.txt_exists(&old_txt) && old_txt.key() == new_txt.key() {
                txts.update_old.push(old_txt);
                txts.update_new.push(new_txt);
            } else {
                if self.txt_exists(&old_txt) {
                    txts.delete.push(old_txt);
                }
                // A lost companion is recreated rather than updated.
                if !self.txt_exists(&new_txt) {
                    txts.create.push(new_txt);
                }
            }
            filtered.update_old.push(old.clone());
            filtered.update_new.push(new.clone());
        }

        filtered.create.extend(txts.create);
        filtered.update_old.extend(txts.update_old);
        filtered.update_new.extend(txts.update_new);
        filtered.delete.extend(txts.delete);

        self.provider.apply_changes(&filtered).await
    }

    async fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        self.provider.adjust_endpoints(endpoints).await
    }

    fn domain_filter(&self) -> DomainFilter {
        self.provider.domain_filter()
    }
}

#[cfg(test)]
#[path = "txt_tests.rs"]
mod txt_tests;
