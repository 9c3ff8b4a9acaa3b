// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP source.
//!
//! Fetches a JSON array of endpoints from a remote server on every pass.
//! Endpoints use the same wire form as the `DNSEndpoint` resource:
//!
//! ```json
//! [{"dnsName": "www.example.org", "recordType": "A", "targets": ["1.2.3.4"]}]
//! ```

use super::{Source, SourceConfig};
use crate::endpoint::Endpoint;
use crate::errors::SourceError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client as HttpClient;
use tracing::debug;
use url::Url;

pub struct HttpSource {
    http: HttpClient,
    url: Url,
}

impl HttpSource {
    /// Build the source for `config.http_server_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or malformed, or the HTTP
    /// client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        if config.http_server_url.is_empty() {
            return Err(SourceError::InvalidConfig(
                "the http source requires a server URL".to_string(),
            ));
        }
        let url = Url::parse(&config.http_server_url).map_err(|e| {
            SourceError::InvalidConfig(format!(
                "invalid HTTP source URL {:?}: {e}",
                config.http_server_url
            ))
        })?;
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let url = self.url.to_string();
        let response = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        let endpoints: Vec<Endpoint> = response
            .json()
            .await
            .map_err(|source| SourceError::Http { url, source })?;
        debug!("Received {} endpoints from {}", endpoints.len(), self.url);
        Ok(endpoints)
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
