// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The normalized DNS endpoint record produced by every source.
//!
//! An [`Endpoint`] is a flat description of one DNS record set: a name, a
//! record type, a list of targets, and the metadata (TTL, set identifier,
//! labels, provider-specific properties) carried along to the provider.
//!
//! # Example
//!
//! ```rust
//! use dnsync::endpoint::{Endpoint, RecordType, Ttl};
//!
//! let ep = Endpoint::new("www.example.org.", RecordType::A, vec!["192.0.2.10".to_string()])
//!     .with_ttl(Ttl(300))
//!     .with_label("resource", "service/default/web");
//!
//! assert_eq!(ep.dns_name, "www.example.org");
//! assert!(ep.record_ttl.is_configured());
//! ```

use crate::constants::{MAX_LABEL_LENGTH, OWNER_LABEL_KEY};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// DNS record types dnsync knows how to describe.
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum RecordType {
    #[default]
    A,
    AAAA,
    CNAME,
    TXT,
    SRV,
    NS,
    PTR,
    MX,
    NAPTR,
}

impl RecordType {
    /// Every supported record type, in declaration order
    pub const ALL: [RecordType; 9] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::TXT,
        RecordType::SRV,
        RecordType::NS,
        RecordType::PTR,
        RecordType::MX,
        RecordType::NAPTR,
    ];

    /// Wire name of the record type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::CNAME => "CNAME",
            Self::TXT => "TXT",
            Self::SRV => "SRV",
            Self::NS => "NS",
            Self::PTR => "PTR",
            Self::MX => "MX",
            Self::NAPTR => "NAPTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported record type {s:?}"))
    }
}

/// Record TTL in seconds. Zero means "not configured".
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct Ttl(pub i64);

impl Ttl {
    /// Whether an explicit TTL was set.
    #[must_use]
    pub fn is_configured(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered list of record targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Targets(pub Vec<String>);

impl Deref for Targets {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Targets {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<String>> for Targets {
    fn from(targets: Vec<String>) -> Self {
        Self(targets)
    }
}

impl FromIterator<String> for Targets {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Targets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(";"))
    }
}

/// Canonical sort key: IP addresses in their normalized textual form, everything else as is.
fn sort_key(target: &str) -> String {
    match target.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => target.to_string(),
    }
}

impl Targets {
    /// Sort targets, comparing IP addresses by their normalized textual form.
    pub fn sort_canonical(&mut self) {
        self.0.sort_by_cached_key(|t| sort_key(t));
    }

    fn sorted(&self) -> Vec<String> {
        let mut copy = self.clone();
        copy.sort_canonical();
        copy.0
    }

    /// Whether both lists hold the same targets, ignoring order and case.
    ///
    /// IPv6 addresses are compared in canonical form, so `2001:db8::1` and
    /// `2001:0db8:0:0:0:0:0:1` are the same target.
    #[must_use]
    pub fn same(&self, other: &Targets) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let ours = self.sorted();
        let theirs = other.sorted();
        ours.iter().zip(theirs.iter()).all(|(a, b)| {
            if a.eq_ignore_ascii_case(b) {
                return true;
            }
            match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
                (Ok(ip_a), Ok(ip_b)) => ip_a == ip_b,
                _ => false,
            }
        })
    }

    /// Conflict ordering between two candidate target lists.
    ///
    /// The shorter list is less. Otherwise the first differing element
    /// decides, with IP addresses preferred over hostnames and addresses
    /// compared numerically.
    #[must_use]
    pub fn is_less(&self, other: &Targets) -> bool {
        match self.len().cmp(&other.len()) {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
        let ours = self.sorted();
        let theirs = other.sorted();
        for (a, b) in ours.iter().zip(theirs.iter()) {
            if a == b {
                continue;
            }
            return match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
                (Ok(ip_a), Ok(ip_b)) => ip_a < ip_b,
                (Ok(_), Err(_)) => true,
                (Err(_), Ok(_)) => false,
                (Err(_), Err(_)) => a < b,
            };
        }
        false
    }

    /// Every target parses as `<priority> <host>`.
    #[must_use]
    pub fn validate_mx(&self) -> bool {
        self.iter().all(|t| match MxTarget::parse(t) {
            Ok(_) => true,
            Err(e) => {
                debug!("Invalid MX record target {t}: {e}");
                false
            }
        })
    }

    /// Every target parses as `<priority> <weight> <port> <host>`.
    #[must_use]
    pub fn validate_srv(&self) -> bool {
        self.iter().all(|t| {
            let parts: Vec<&str> = t.split_whitespace().collect();
            let valid = parts.len() == 4 && parts[..3].iter().all(|p| p.parse::<u16>().is_ok());
            if !valid {
                debug!(
                    "Invalid SRV record target {t}: expected priority, weight, port and host, e.g. '10 5 5060 example.com'"
                );
            }
            valid
        })
    }
}

/// Endpoint labels; notably `resource`, `owner` and `dualstack`.
pub type Labels = BTreeMap<String, String>;

/// A named configuration value meaningful to one particular DNS provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ProviderSpecificProperty {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl ProviderSpecificProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered provider-specific properties.
pub type ProviderSpecific = Vec<ProviderSpecificProperty>;

/// Identity of a record set: name, type and set identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub dns_name: String,
    pub record_type: RecordType,
    pub set_identifier: String,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.set_identifier.is_empty() {
            write!(f, "{}/{}", self.dns_name, self.record_type)
        } else {
            write!(f, "{}/{}/{}", self.dns_name, self.record_type, self.set_identifier)
        }
    }
}

/// A DNS record set description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// The hostname of the DNS record
    #[serde(default)]
    pub dns_name: String,

    /// The targets the DNS record points to
    #[serde(default, skip_serializing_if = "has_no_targets")]
    pub targets: Targets,

    /// Record type, e.g. A, AAAA, CNAME
    #[serde(default)]
    pub record_type: RecordType,

    /// Distinguishes multiple records with the same name and type
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_identifier: String,

    /// TTL for the record
    #[serde(default, rename = "recordTTL", skip_serializing_if = "is_zero_ttl")]
    pub record_ttl: Ttl,

    /// Labels attached to the endpoint
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,

    /// Provider-specific configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: ProviderSpecific,
}

fn is_zero_ttl(ttl: &Ttl) -> bool {
    ttl.0 == 0
}

fn has_no_targets(targets: &Targets) -> bool {
    targets.0.is_empty()
}

impl Endpoint {
    /// Build an endpoint, stripping trailing dots from the name and every target.
    pub fn new(dns_name: impl AsRef<str>, record_type: RecordType, targets: Vec<String>) -> Self {
        let targets = targets
            .into_iter()
            .map(|t| t.strip_suffix('.').map(str::to_string).unwrap_or(t))
            .collect();
        let dns_name = dns_name.as_ref();
        Self {
            dns_name: dns_name.strip_suffix('.').unwrap_or(dns_name).to_string(),
            targets,
            record_type,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.record_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_set_identifier(mut self, set_identifier: impl Into<String>) -> Self {
        self.set_identifier = set_identifier.into();
        self
    }

    /// Attach or replace one provider-specific property.
    #[must_use]
    pub fn with_provider_specific(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_provider_specific_property(name, value);
        self
    }

    /// Add or update a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get_provider_specific_property(&self, name: &str) -> Option<&str> {
        self.provider_specific
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn set_provider_specific_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.provider_specific.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self
                .provider_specific
                .push(ProviderSpecificProperty::new(name, value)),
        }
    }

    pub fn delete_provider_specific_property(&mut self, name: &str) {
        if let Some(pos) = self.provider_specific.iter().position(|p| p.name == name) {
            self.provider_specific.remove(pos);
        }
    }

    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            dns_name: self.dns_name.clone(),
            record_type: self.record_type,
            set_identifier: self.set_identifier.clone(),
        }
    }

    /// Whether the endpoint carries `owner=<owner_id>`.
    #[must_use]
    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.labels.get(OWNER_LABEL_KEY).map(String::as_str) == Some(owner_id)
    }

    /// No DNS label in the name is longer than 63 octets.
    #[must_use]
    pub fn has_valid_labels(&self) -> bool {
        self.dns_name
            .split('.')
            .all(|label| label.len() <= MAX_LABEL_LENGTH)
    }

    /// Whether the targets are well formed for the record type.
    ///
    /// Only MX and SRV records have a structured target format; every other
    /// type is accepted as is.
    #[must_use]
    pub fn check_endpoint(&self) -> bool {
        match self.record_type {
            RecordType::MX => self.targets.validate_mx(),
            RecordType::SRV => self.targets.validate_srv(),
            _ => true,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ps: Vec<String> = self
            .provider_specific
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        write!(
            f,
            "{} {} IN {} {} {} [{}]",
            self.dns_name,
            self.record_ttl,
            self.record_type,
            self.set_identifier,
            self.targets,
            ps.join(",")
        )
    }
}

/// A parsed MX target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MxTarget {
    pub priority: u16,
    pub host: String,
}

impl MxTarget {
    /// Parse `"<priority> <host>"`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the target does not have
    /// exactly two fields or the priority is not a 16-bit integer.
    pub fn parse(target: &str) -> Result<Self, String> {
        let parts: Vec<&str> = target.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(format!(
                "MX records must have a preference value and a host, e.g. '10 example.com', got {target:?}"
            ));
        }
        let priority = parts[0]
            .parse::<u16>()
            .map_err(|_| format!("invalid integer value in target {target:?}"))?;
        Ok(Self {
            priority,
            host: parts[1].to_string(),
        })
    }
}

/// Record type a single target calls for: A for IPv4, AAAA for IPv6, CNAME otherwise.
#[must_use]
pub fn suitable_type(target: &str) -> RecordType {
    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => RecordType::A,
        Ok(IpAddr::V6(_)) => RecordType::AAAA,
        Err(_) => RecordType::CNAME,
    }
}

/// Keep the first endpoint for each [`EndpointKey`].
///
/// Targets are not part of the key; later endpoints for an already seen key
/// are dropped whatever they point to.
#[must_use]
pub fn remove_duplicates(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut visited = HashSet::new();
    endpoints
        .into_iter()
        .filter(|ep| {
            let fresh = visited.insert(ep.key());
            if !fresh {
                debug!("Skipping duplicated endpoint: {ep}");
            }
            fresh
        })
        .collect()
}

/// Keep only endpoints owned by `owner_id`.
#[must_use]
pub fn filter_by_owner(owner_id: &str, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|ep| {
            let owned = ep.is_owned_by(owner_id);
            if !owned {
                debug!("Skipping endpoint {ep} because owner id does not match {owner_id:?}");
            }
            owned
        })
        .collect()
}

/// Merge endpoints that share name, type, set identifier and TTL.
///
/// The merged endpoint keeps the metadata of the first endpoint in the group
/// and the union of all targets in first-seen order. CNAME records cannot
/// hold more than one target and are passed through untouched.
#[must_use]
pub fn merge_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut merged: Vec<Endpoint> = Vec::with_capacity(endpoints.len());
    let mut index: std::collections::HashMap<(EndpointKey, Ttl), usize> =
        std::collections::HashMap::new();

    for ep in endpoints {
        if ep.record_type == RecordType::CNAME {
            merged.push(ep);
            continue;
        }
        let key = (ep.key(), ep.record_ttl);
        match index.get(&key) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                for target in ep.targets.0 {
                    if !existing.targets.contains(&target) {
                        existing.targets.push(target);
                    }
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(ep);
            }
        }
    }

    merged
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod endpoint_tests;
