// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain filters restrict which DNS names are managed.
//!
//! A filter entry matches the domain itself and every subdomain of it, on
//! label boundaries: `example.org` matches `example.org` and
//! `www.example.org` but not `badexample.org`. An entry starting with a dot
//! (`.example.org`) matches only subdomains. Matching ignores case and
//! trailing dots.

use crate::endpoint::Endpoint;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainFilter {
    /// Domains to manage; empty means every domain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Domains never managed, even when included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

fn prepare(filters: &[String]) -> Vec<String> {
    filters
        .iter()
        .map(|f| f.trim().trim_end_matches('.').to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

fn match_filter(filters: &[String], domain: &str, empty: bool) -> bool {
    if filters.is_empty() {
        return empty;
    }
    let domain = domain.trim_end_matches('.').to_lowercase();
    filters.iter().any(|filter| {
        if filter.starts_with('.') {
            domain.ends_with(filter.as_str())
        } else {
            domain == *filter || domain.ends_with(&format!(".{filter}"))
        }
    })
}

impl DomainFilter {
    #[must_use]
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: prepare(include),
            exclude: prepare(exclude),
        }
    }

    /// Whether `domain` is included and not excluded.
    #[must_use]
    pub fn matches(&self, domain: &str) -> bool {
        match_filter(&self.include, domain, true) && !match_filter(&self.exclude, domain, false)
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    /// Endpoints whose name the filter accepts.
    #[must_use]
    pub fn apply(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        if !self.is_configured() {
            return endpoints;
        }
        endpoints
            .into_iter()
            .filter(|ep| {
                let keep = self.matches(&ep.dns_name);
                if !keep {
                    debug!("Skipping endpoint {ep} because it does not match the domain filter");
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "domain_filter_tests.rs"]
mod domain_filter_tests;
