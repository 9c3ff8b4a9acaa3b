// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Annotation parsing shared by every source.
//!
//! Resources opt into DNS publication through `external-dns.alpha.kubernetes.io/*`
//! annotations. The helpers here turn those raw strings into hostnames,
//! targets, TTLs and provider-specific properties. Malformed values never
//! fail a source: they are logged and replaced by the neutral value.

use crate::constants::{
    ACCESS_ANNOTATION_KEY, ALB_DUALSTACK_ANNOTATION_KEY, ALB_DUALSTACK_ANNOTATION_VALUE,
    ALIAS_ANNOTATION_KEY, ALIAS_PROVIDER_SPECIFIC_KEY, ANNOTATION_KEY_PREFIX,
    CLOUDFLARE_CUSTOM_HOSTNAME_KEY, CLOUDFLARE_PROXIED_KEY, CONTROLLER_ANNOTATION_KEY, CONTROLLER_ANNOTATION_VALUE,
    ENDPOINTS_TYPE_ANNOTATION_KEY, HOSTNAME_ANNOTATION_KEY, INGRESS_ANNOTATION_KEY,
    INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY, INTERNAL_HOSTNAME_ANNOTATION_KEY,
    SET_IDENTIFIER_ANNOTATION_KEY, TARGET_ANNOTATION_KEY, TTL_ANNOTATION_KEY, TTL_MAX_SECONDS,
};
use crate::endpoint::{ProviderSpecific, ProviderSpecificProperty, Targets, Ttl};
use std::collections::BTreeMap;
use tracing::warn;

/// Raw annotation map as found on Kubernetes object metadata.
pub type Annotations = BTreeMap<String, String>;

/// Cloudflare keys forwarded verbatim as provider-specific properties
const CLOUDFLARE_PASSTHROUGH_KEYS: [&str; 4] = [
    CLOUDFLARE_PROXIED_KEY,
    CLOUDFLARE_CUSTOM_HOSTNAME_KEY,
    "external-dns.alpha.kubernetes.io/cloudflare-region-key",
    "external-dns.alpha.kubernetes.io/cloudflare-record-comment",
];

/// Split a comma separated hostname list, dropping whitespace and empty entries.
#[must_use]
pub fn split_hostname_annotation(value: &str) -> Vec<String> {
    value
        .replace(' ', "")
        .split(',')
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hostnames from the `hostname` annotation.
#[must_use]
pub fn hostnames(annotations: &Annotations) -> Vec<String> {
    annotations
        .get(HOSTNAME_ANNOTATION_KEY)
        .map(|v| split_hostname_annotation(v))
        .unwrap_or_default()
}

/// Hostnames from the `internal-hostname` annotation.
#[must_use]
pub fn internal_hostnames(annotations: &Annotations) -> Vec<String> {
    annotations
        .get(INTERNAL_HOSTNAME_ANNOTATION_KEY)
        .map(|v| split_hostname_annotation(v))
        .unwrap_or_default()
}

/// Targets from the `target` annotation, trimmed and without trailing dots.
#[must_use]
pub fn targets(annotations: &Annotations) -> Targets {
    let Some(value) = annotations.get(TARGET_ANNOTATION_KEY) else {
        return Targets::default();
    };
    value
        .split(',')
        .map(str::trim)
        .map(|t| t.strip_suffix('.').unwrap_or(t))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Record TTL from the `ttl` annotation.
///
/// Accepts integer seconds or a duration such as `10m` or `20.5s`
/// (fractions of a second are truncated). Anything unparseable, below one
/// second, or above `u32::MAX` is logged and treated as unset.
#[must_use]
pub fn ttl(annotations: &Annotations, resource: &str) -> Ttl {
    let Some(value) = annotations.get(TTL_ANNOTATION_KEY) else {
        return Ttl(0);
    };
    match parse_ttl(value) {
        Ok(ttl) => Ttl(ttl),
        Err(reason) => {
            warn!("{resource}: ignoring ttl annotation {value:?}: {reason}");
            Ttl(0)
        }
    }
}

fn parse_ttl(value: &str) -> Result<i64, String> {
    let seconds = match value.parse::<i64>() {
        Ok(seconds) => seconds,
        Err(_) => parse_duration_secs(value)?,
    };
    if !(1..=TTL_MAX_SECONDS).contains(&seconds) {
        return Err(format!("must be between 1 and {TTL_MAX_SECONDS} seconds"));
    }
    Ok(seconds)
}

/// Parse a duration made of `<number><unit>` groups (`1h30m`, `20.5s`, `500ms`) into whole seconds.
fn parse_duration_secs(value: &str) -> Result<i64, String> {
    if value.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut rest = value;
    let mut total = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {value:?}"))?;
        if number_len == 0 {
            return Err(format!("invalid duration {value:?}"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration {value:?}"))?;
        rest = &rest[number_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => return Err(format!("unknown unit {unit:?} in duration {value:?}")),
        };
        total += number * scale;
        rest = &rest[unit_len..];
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(total.trunc() as i64)
}

/// Whether the `alias` annotation is exactly `true`.
#[must_use]
pub fn alias(annotations: &Annotations) -> bool {
    annotations.get(ALIAS_ANNOTATION_KEY).map(String::as_str) == Some("true")
}

/// Provider-specific properties and the set identifier carried by annotations.
///
/// Properties are returned sorted by name so repeated passes produce the
/// same endpoints.
#[must_use]
pub fn provider_specific(annotations: &Annotations) -> (ProviderSpecific, String) {
    let mut props: ProviderSpecific = Vec::new();

    for key in CLOUDFLARE_PASSTHROUGH_KEYS {
        if let Some(value) = annotations.get(key) {
            props.push(ProviderSpecificProperty::new(key, value.clone()));
        }
    }
    if alias(annotations) {
        props.push(ProviderSpecificProperty::new(ALIAS_PROVIDER_SPECIFIC_KEY, "true"));
    }

    let mut set_identifier = String::new();
    for (key, value) in annotations {
        if key == SET_IDENTIFIER_ANNOTATION_KEY {
            set_identifier.clone_from(value);
            continue;
        }
        let Some(attr) = key.strip_prefix(ANNOTATION_KEY_PREFIX) else {
            continue;
        };
        let name = if let Some(rest) = attr.strip_prefix("aws-") {
            format!("aws/{rest}")
        } else if let Some(rest) = attr.strip_prefix("scw-") {
            format!("scw/{rest}")
        } else if attr.starts_with("ibmcloud-") {
            attr.to_string()
        } else if let Some(rest) = attr.strip_prefix("webhook-") {
            format!("webhook/{rest}")
        } else {
            continue;
        };
        props.push(ProviderSpecificProperty::new(name, value.clone()));
    }

    props.sort_by(|a, b| a.name.cmp(&b.name));
    (props, set_identifier)
}

/// Whether the resource is meant for this controller.
///
/// Resources without a `controller` annotation are ours; resources naming
/// another controller are skipped.
#[must_use]
pub fn controller_matches(annotations: &Annotations) -> bool {
    match annotations.get(CONTROLLER_ANNOTATION_KEY) {
        Some(controller) => controller == CONTROLLER_ANNOTATION_VALUE,
        None => true,
    }
}

/// Raw value of the `access` annotation (`public` or `private`).
#[must_use]
pub fn access(annotations: &Annotations) -> Option<&str> {
    annotations.get(ACCESS_ANNOTATION_KEY).map(String::as_str)
}

/// Raw value of the `endpoints-type` annotation.
#[must_use]
pub fn endpoints_type(annotations: &Annotations) -> Option<&str> {
    annotations
        .get(ENDPOINTS_TYPE_ANNOTATION_KEY)
        .map(String::as_str)
}

/// Ingress reference (`name` or `namespace/name`) from the `ingress` annotation.
#[must_use]
pub fn ingress_reference(annotations: &Annotations) -> Option<&str> {
    annotations
        .get(INGRESS_ANNOTATION_KEY)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Which hostnames of an ingress are published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngressHostnameSource {
    /// Rules, TLS hosts and the hostname annotation
    #[default]
    All,
    /// Only the hostname annotation
    AnnotationOnly,
    /// Only the hosts defined in the ingress spec
    DefinedHostsOnly,
}

/// Parse the `ingress-hostname-source` annotation.
#[must_use]
pub fn ingress_hostname_source(annotations: &Annotations) -> IngressHostnameSource {
    match annotations
        .get(INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY)
        .map(String::as_str)
    {
        Some("annotation-only") => IngressHostnameSource::AnnotationOnly,
        Some("defined-hosts-only") => IngressHostnameSource::DefinedHostsOnly,
        Some(other) => {
            warn!("Ignoring unknown ingress-hostname-source value {other:?}");
            IngressHostnameSource::All
        }
        None => IngressHostnameSource::All,
    }
}

/// Whether the AWS load balancer controller provisions a dual-stack load balancer.
#[must_use]
pub fn alb_dualstack(annotations: &Annotations) -> bool {
    annotations
        .get(ALB_DUALSTACK_ANNOTATION_KEY)
        .map(String::as_str)
        == Some(ALB_DUALSTACK_ANNOTATION_VALUE)
}

#[cfg(test)]
#[path = "annotations_tests.rs"]
mod annotations_tests;
