// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Webhook provider.
//!
//! Delegates record management to a separate process speaking the
//! external-dns webhook protocol over HTTP:
//!
//! | request | purpose |
//! |---|---|
//! | `GET /` | negotiation; answers with the server's domain filter |
//! | `GET /records` | current records |
//! | `POST /records` | apply changes, answers `204 No Content` |
//! | `POST /adjustendpoints` | canonicalize desired endpoints |
//!
//! Every request and response uses the versioned media type
//! [`WEBHOOK_MEDIA_TYPE`]. Negotiation happens once, when the provider is
//! built, and is retried with exponential backoff while the server is
//! unreachable or answers with a transient status.

use super::Provider;
use crate::constants::{
    HTTP_REQUEST_TIMEOUT_SECS, WEBHOOK_INITIAL_BACKOFF_MS, WEBHOOK_MAX_RETRIES, WEBHOOK_MEDIA_TYPE,
};
use crate::domain_filter::DomainFilter;
use crate::endpoint::Endpoint;
use crate::errors::ProviderError;
use crate::plan::Changes;
use crate::retry::{is_retryable_http_status, webhook_backoff, ExponentialBackoff};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub struct WebhookProvider {
    http: HttpClient,
    base: Url,
    domain_filter: DomainFilter,
}

impl WebhookProvider {
    /// Connect to the webhook server at `url` and negotiate.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the server rejects
    /// negotiation, or it stays unreachable once retries are exhausted.
    pub async fn new(url: &str) -> Result<Self, ProviderError> {
        let backoff = webhook_backoff(
            Duration::from_millis(WEBHOOK_INITIAL_BACKOFF_MS),
            WEBHOOK_MAX_RETRIES,
        );
        Self::with_backoff(url, backoff).await
    }

    /// Like [`new`](Self::new), retrying negotiation on `backoff`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub async fn with_backoff(
        url: &str,
        backoff: ExponentialBackoff,
    ) -> Result<Self, ProviderError> {
        let base = Url::parse(url)?;
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|source| ProviderError::Http {
                url: base.to_string(),
                source,
            })?;
        let domain_filter = negotiate(&http, &base, backoff).await?;
        info!(
            "Negotiated with webhook provider at {base}, domain filter: {:?}",
            domain_filter
        );
        Ok(Self {
            http,
            base,
            domain_filter,
        })
    }

    fn url(&self, segment: &str) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }
}

/// `GET /` until the server answers, returning its domain filter.
async fn negotiate(
    http: &HttpClient,
    base: &Url,
    mut backoff: ExponentialBackoff,
) -> Result<DomainFilter, ProviderError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let response = http
            .get(base.clone())
            .header(ACCEPT, WEBHOOK_MEDIA_TYPE)
            .send()
            .await;

        let retry_reason = match response {
            Ok(response) if response.status().is_success() => {
                return read_negotiation(base, response).await;
            }
            Ok(response) if is_retryable_http_status(response.status()) => {
                format!("status {}", response.status())
            }
            Ok(response) => {
                return Err(ProviderError::UnexpectedStatus {
                    url: base.to_string(),
                    status: response.status().as_u16(),
                });
            }
            Err(e) => e.to_string(),
        };

        match backoff.next_backoff() {
            Some(delay) => {
                warn!(
                    attempt = attempts,
                    retry_after = ?delay,
                    "Webhook negotiation with {base} failed ({retry_reason}), will retry"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(ProviderError::Negotiation {
                    url: base.to_string(),
                    attempts,
                });
            }
        }
    }
}

async fn read_negotiation(base: &Url, response: Response) -> Result<DomainFilter, ProviderError> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if content_type != WEBHOOK_MEDIA_TYPE {
        return Err(ProviderError::UnsupportedMediaType {
            url: base.to_string(),
            content_type,
        });
    }
    decode(base, response).await
}

async fn decode<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, ProviderError> {
    response.json().await.map_err(|source| ProviderError::Http {
        url: url.to_string(),
        source,
    })
}

fn expect_status(
    url: &Url,
    response: &Response,
    expected: StatusCode,
) -> Result<(), ProviderError> {
    if response.status() == expected {
        Ok(())
    } else {
        Err(ProviderError::UnexpectedStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let url = self.url("records")?;
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, WEBHOOK_MEDIA_TYPE)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                url: url.to_string(),
                source,
            })?;
        expect_status(&url, &response, StatusCode::OK)?;
        let records: Vec<Endpoint> = decode(&url, response).await?;
        debug!("Webhook provider returned {} records", records.len());
        Ok(records)
    }

    async fn apply_changes(&self, changes: &Changes) -> Result<(), ProviderError> {
        let url = self.url("records")?;
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, WEBHOOK_MEDIA_TYPE)
            .json(changes)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                url: url.to_string(),
                source,
            })?;
        expect_status(&url, &response, StatusCode::NO_CONTENT)
    }

    async fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        let url = self.url("adjustendpoints")?;
        let response = self
            .http
            .post(url.clone())
            .header(CONTENT_TYPE, WEBHOOK_MEDIA_TYPE)
            .header(ACCEPT, WEBHOOK_MEDIA_TYPE)
            .json(&endpoints)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                url: url.to_string(),
                source,
            })?;
        expect_status(&url, &response, StatusCode::OK)?;
        decode(&url, response).await
    }

    fn domain_filter(&self) -> DomainFilter {
        self.domain_filter.clone()
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod webhook_tests;
