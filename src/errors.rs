// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for dnsync.
//!
//! This module provides specialized error types for:
//! - Endpoint sources (Kubernetes informers, Nomad, HTTP servers)
//! - FQDN templates
//! - Label and annotation selectors
//! - DNS providers (in-memory and webhook)
//!
//! Library code returns these errors; the binary wraps them in `anyhow`.

use thiserror::Error;

/// Errors that can occur while collecting endpoints from a source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Kubernetes API error (list, watch or patch)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Informer caches did not finish their initial list in time
    ///
    /// Returned when a source is built and the watch on `kind` has not
    /// delivered its first complete listing within the sync timeout.
    #[error("Timed out waiting for {kind} cache to sync after {timeout_secs}s")]
    CacheSyncTimeout {
        /// Resource kind whose cache did not sync
        kind: String,
        /// How long we waited
        timeout_secs: u64,
    },

    /// FQDN template failed to parse or execute
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Annotation or label filter could not be parsed
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// HTTP request to an upstream (Nomad, endpoint server) failed
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        /// Requested URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status
    #[error("HTTP request to {url} returned status {status}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned
        status: u16,
    },

    /// Node reports neither an external nor an internal address
    #[error("Node {node} has no external or internal addresses")]
    NodeWithoutAddress {
        /// Node name
        node: String,
    },

    /// `ingress` annotation is not of the form `name` or `namespace/name`
    #[error("Invalid ingress reference {reference:?} on {resource}: expected name or namespace/name")]
    InvalidIngressReference {
        /// Object carrying the annotation
        resource: String,
        /// The annotation value
        reference: String,
    },

    /// Ingress named by an `ingress` annotation is not in the cache
    #[error("Ingress {namespace}/{name} referenced by {resource} not found")]
    IngressNotFound {
        /// Object carrying the annotation
        resource: String,
        /// Ingress namespace
        namespace: String,
        /// Ingress name
        name: String,
    },

    /// Unknown source name passed to the source builder
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Invalid source configuration
    ///
    /// Returned when flags are inconsistent, for example a NAT64 prefix that
    /// is not a /96.
    #[error("Invalid source configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the FQDN template engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Template text is malformed
    #[error("Failed to parse template {template:?}: {reason}")]
    Parse {
        /// The template text
        template: String,
        /// What went wrong
        reason: String,
    },

    /// Template parsed but failed while rendering
    #[error("Failed to apply template: {0}")]
    Exec(String),

    /// Rendering failed for a specific object
    #[error("Failed to apply template on {kind} {object}: {reason}")]
    Apply {
        /// Kind of the object, e.g. `Service`
        kind: String,
        /// `namespace/name`, or `name` for cluster-scoped objects
        object: String,
        /// What went wrong
        reason: String,
    },
}

impl TemplateError {
    /// Attach the object a render failure happened on.
    #[must_use]
    pub fn on_object(self, kind: &str, object: &str) -> Self {
        match self {
            Self::Exec(reason) => Self::Apply {
                kind: kind.to_string(),
                object: object.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Errors raised while parsing a label selector expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Selector text is malformed
    #[error("Invalid selector {selector:?}: {reason}")]
    Invalid {
        /// The selector text
        selector: String,
        /// What went wrong
        reason: String,
    },
}

/// Errors that can occur while talking to a DNS provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Create requested for a record that already exists
    #[error("Record {0} already exists")]
    RecordAlreadyExists(String),

    /// Update or delete requested for a record that does not exist
    #[error("Record {0} not found")]
    RecordNotFound(String),

    /// HTTP request to a webhook provider failed
    #[error("Webhook request to {url} failed: {source}")]
    Http {
        /// Requested URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Webhook provider answered with an unexpected status
    #[error("Webhook request to {url} returned status {status}")]
    UnexpectedStatus {
        /// Requested URL
        url: String,
        /// Status code returned
        status: u16,
    },

    /// Webhook provider negotiation did not succeed
    #[error("Failed to negotiate with webhook provider at {url} after {attempts} attempts")]
    Negotiation {
        /// Webhook base URL
        url: String,
        /// Attempts made
        attempts: u32,
    },

    /// Webhook server does not speak the supported protocol version
    #[error("Webhook provider at {url} answered with content type {content_type:?}")]
    UnsupportedMediaType {
        /// Webhook base URL
        url: String,
        /// Content type the server returned
        content_type: String,
    },

    /// Webhook base URL could not be parsed or joined
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Registry options cannot be combined
    #[error("Invalid registry configuration: {0}")]
    InvalidRegistryConfig(String),
}

/// Errors that abort a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Collecting desired endpoints failed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Reading or writing provider records failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl SourceError {
    /// Short, metric-safe name of the error variant
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kube(_) => "kube",
            Self::CacheSyncTimeout { .. } => "cache_sync_timeout",
            Self::Template(_) => "template",
            Self::Selector(_) => "selector",
            Self::Http { .. } | Self::HttpStatus { .. } => "http",
            Self::NodeWithoutAddress { .. } => "node_without_address",
            Self::InvalidIngressReference { .. } | Self::IngressNotFound { .. } => {
                "ingress_reference"
            }
            Self::UnknownSource(_) => "unknown_source",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
