// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change calculation between current and desired records.
//!
//! [`Plan::calculate`] compares what the provider currently serves with what
//! the sources want and produces the [`Changes`] needed to converge. Both
//! sides are grouped by [`EndpointKey`]; a key present only in the desired
//! set is created, a key present on both sides is updated when the records
//! differ, and a key present only in the current set is deleted.
//!
//! With an owner id, records owned by someone else are never touched.

use crate::constants::OWNER_LABEL_KEY;
use crate::endpoint::{Endpoint, EndpointKey, ProviderSpecificProperty, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Which kinds of change the plan is allowed to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Policy {
    /// Create, update and delete
    #[default]
    Sync,
    /// Create and update, never delete
    UpsertOnly,
    /// Create only
    CreateOnly,
}

impl Policy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::UpsertOnly => "upsert-only",
            Self::CreateOnly => "create-only",
        }
    }

    fn apply(self, changes: &mut Changes) {
        match self {
            Self::Sync => {}
            Self::UpsertOnly => changes.delete.clear(),
            Self::CreateOnly => {
                changes.update_old.clear();
                changes.update_new.clear();
                changes.delete.clear();
            }
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "upsert-only" => Ok(Self::UpsertOnly),
            "create-only" => Ok(Self::CreateOnly),
            other => Err(format!(
                "unknown policy {other:?}, expected one of sync, upsert-only, create-only"
            )),
        }
    }
}

/// Record changes to hand to a provider.
///
/// `update_old[i]` is the current record replaced by `update_new[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Changes {
    #[serde(default)]
    pub create: Vec<Endpoint>,
    #[serde(default)]
    pub update_old: Vec<Endpoint>,
    #[serde(default)]
    pub update_new: Vec<Endpoint>,
    #[serde(default)]
    pub delete: Vec<Endpoint>,
}

impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }
}

/// Namespace for the planning algorithm.
pub struct Plan;

#[derive(Default)]
struct Row {
    current: Option<Endpoint>,
    candidates: Vec<Endpoint>,
}

impl Plan {
    /// Compute the changes turning `current` into `desired`.
    ///
    /// Only record types in `managed_types` are considered on either side; an
    /// empty list manages every type. When `owner_id` is non-empty, desired
    /// endpoints are labelled with it and current records carrying a
    /// different (or no) owner are left alone.
    #[must_use]
    pub fn calculate(
        current: &[Endpoint],
        desired: &[Endpoint],
        policy: Policy,
        owner_id: &str,
        managed_types: &[RecordType],
    ) -> Changes {
        let managed = |ep: &&Endpoint| {
            managed_types.is_empty() || managed_types.contains(&ep.record_type)
        };

        let mut table: BTreeMap<EndpointKey, Row> = BTreeMap::new();
        for ep in current.iter().filter(managed) {
            let row = table.entry(ep.key()).or_default();
            if row.current.is_some() {
                warn!("Provider returned more than one record for {}", ep.key());
                continue;
            }
            row.current = Some(ep.clone());
        }
        for ep in desired.iter().filter(managed) {
            let mut ep = ep.clone();
            if !owner_id.is_empty() {
                ep.labels
                    .insert(OWNER_LABEL_KEY.to_string(), owner_id.to_string());
            }
            table.entry(ep.key()).or_default().candidates.push(ep);
        }

        let owns = |ep: &Endpoint| owner_id.is_empty() || ep.is_owned_by(owner_id);
        let mut changes = Changes::default();

        for (key, Row { current, candidates }) in table {
            match current {
                None => {
                    if let Some(desired) = resolve(candidates, None) {
                        changes.create.push(desired);
                    }
                }
                Some(current) if !owns(&current) => {
                    debug!("Skipping {key}: existing record is not owned by {owner_id:?}");
                }
                Some(current) => match resolve(candidates, Some(&current)) {
                    None => changes.delete.push(current),
                    Some(mut desired) => {
                        if should_update(&current, &desired) {
                            for (k, v) in &current.labels {
                                desired.labels.entry(k.clone()).or_insert_with(|| v.clone());
                            }
                            changes.update_old.push(current);
                            changes.update_new.push(desired);
                        }
                    }
                },
            }
        }

        policy.apply(&mut changes);
        changes
    }
}

/// Pick one desired endpoint out of conflicting candidates.
///
/// A candidate with the same targets as the current record wins, so an
/// existing record is not flapped between equally valid choices. Otherwise
/// the candidate with the least targets (by [`Targets::is_less`]) wins.
///
/// [`Targets::is_less`]: crate::endpoint::Targets::is_less
fn resolve(candidates: Vec<Endpoint>, current: Option<&Endpoint>) -> Option<Endpoint> {
    if candidates.len() > 1 {
        debug!(
            "Resolving conflict between {} candidates for {}",
            candidates.len(),
            candidates[0].key()
        );
    }
    if let Some(current) = current {
        if let Some(same) = candidates
            .iter()
            .find(|c| c.targets.same(&current.targets))
        {
            return Some(same.clone());
        }
    }
    candidates.into_iter().reduce(|best, candidate| {
        if candidate.targets.is_less(&best.targets) {
            candidate
        } else {
            best
        }
    })
}

fn sorted_properties(ep: &Endpoint) -> Vec<&ProviderSpecificProperty> {
    let mut props: Vec<_> = ep.provider_specific.iter().collect();
    props.sort_by(|a, b| a.name.cmp(&b.name));
    props
}

fn should_update(current: &Endpoint, desired: &Endpoint) -> bool {
    if !current.targets.same(&desired.targets) {
        return true;
    }
    if desired.record_ttl.is_configured() && desired.record_ttl != current.record_ttl {
        return true;
    }
    sorted_properties(current) != sorted_properties(desired)
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
