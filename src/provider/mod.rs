// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS providers.
//!
//! A [`Provider`] is the DNS backend dnsync writes to. It reports the
//! records it currently serves and applies the [`Changes`] computed by the
//! plan.
//!
//! - [`inmemory::InMemoryProvider`] keeps records in process memory, for
//!   dry runs and tests
//! - [`webhook::WebhookProvider`] talks to an out-of-process provider over
//!   the external-dns webhook protocol

pub mod inmemory;
pub mod webhook;

use crate::domain_filter::DomainFilter;
use crate::endpoint::Endpoint;
use crate::errors::ProviderError;
use crate::plan::Changes;
use async_trait::async_trait;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Records currently served.
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError>;

    /// Apply a set of changes.
    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError>;

    /// Let the provider canonicalize desired endpoints before planning.
    ///
    /// Providers that drop or rewrite properties they do not support return
    /// the adjusted list, so the plan does not keep requesting updates the
    /// provider will never honor.
    async fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        Ok(endpoints)
    }

    /// Domains this provider is authoritative for.
    fn domain_filter(&self) -> DomainFilter {
        DomainFilter::default()
    }
}
