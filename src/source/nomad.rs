// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Nomad service source.
//!
//! Lists services registered in Nomad's native service catalog and publishes
//! those tagged for DNS. Tags of the form `external-dns.<key>=<value>` are
//! read as if they were the `external-dns.alpha.kubernetes.io/<key>`
//! annotation, so `external-dns.hostname=web.example.org` publishes a record.
//!
//! Targets are the `target` tag, or else every distinct address the service
//! is registered at.

use super::{endpoints_for_hostname, set_resource_label, Source, SourceConfig};
use crate::annotations::{self, Annotations};
use crate::constants::{
    ANNOTATION_KEY_PREFIX, DEFAULT_NOMAD_ADDRESS, NOMAD_TAG_PREFIX, NOMAD_TOKEN_HEADER,
    RESOURCE_LABEL_KEY,
};
use crate::endpoint::{merge_endpoints, Endpoint, Targets};
use crate::errors::SourceError;
use crate::fqdn::FqdnTemplate;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

/// One namespace of `GET /v1/services`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceListStub {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub services: Vec<ServiceStub>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceStub {
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One instance from `GET /v1/service/<name>`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

pub struct NomadServiceSource {
    http: HttpClient,
    address: Url,
    token: Option<String>,
    region: Option<String>,
    namespace: String,
    fqdn_template: Option<FqdnTemplate>,
    combine_fqdn_and_annotation: bool,
    ignore_hostname_annotation: bool,
}

impl NomadServiceSource {
    /// Build the source from the Nomad settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address or the FQDN template is malformed,
    /// or the HTTP client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let address = if config.nomad_address.is_empty() {
            DEFAULT_NOMAD_ADDRESS
        } else {
            config.nomad_address.as_str()
        };
        let address = Url::parse(address).map_err(|e| {
            SourceError::InvalidConfig(format!("invalid Nomad address {address:?}: {e}"))
        })?;
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| SourceError::Http {
                url: address.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            address,
            token: config.nomad_token.clone().filter(|t| !t.is_empty()),
            region: config.nomad_region.clone().filter(|r| !r.is_empty()),
            namespace: config.namespace.clone(),
            fqdn_template: FqdnTemplate::parse(&config.fqdn_template)?,
            combine_fqdn_and_annotation: config.combine_fqdn_and_annotation,
            ignore_hostname_annotation: config.ignore_hostname_annotation,
        })
    }

    fn api_url(&self, path: &[&str], namespace: &str) -> Result<Url, SourceError> {
        let mut url = self.address.clone();
        url.path_segments_mut()
            .map_err(|()| {
                SourceError::InvalidConfig(format!(
                    "Nomad address {} cannot be a base URL",
                    self.address
                ))
            })?
            .pop_if_empty()
            .extend(path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("namespace", namespace);
            if let Some(region) = self.region.as_deref() {
                query.append_pair("region", region);
            }
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = self.token.as_deref() {
            request = request.header(NOMAD_TOKEN_HEADER, token);
        }
        let response = request.send().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })
    }

    async fn list_services(&self) -> Result<Vec<ServiceListStub>, SourceError> {
        let namespace = if self.namespace.is_empty() {
            "*"
        } else {
            self.namespace.as_str()
        };
        self.get(self.api_url(&["v1", "services"], namespace)?).await
    }

    /// Distinct addresses `name` is registered at, in first-seen order.
    async fn service_addresses(&self, namespace: &str, name: &str) -> Result<Targets, SourceError> {
        let registrations: Vec<ServiceRegistration> = self
            .get(self.api_url(&["v1", "service", name], namespace)?)
            .await?;
        let mut seen = BTreeSet::new();
        Ok(registrations
            .into_iter()
            .map(|r| r.address)
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect())
    }

    async fn endpoints_for_hostnames(
        &self,
        namespace: &str,
        name: &str,
        annotations: &Annotations,
        hostnames: &[String],
    ) -> Result<Vec<Endpoint>, SourceError> {
        if hostnames.is_empty() {
            return Ok(Vec::new());
        }
        let resource = format!("service/{namespace}/{name}");
        let ttl = annotations::ttl(annotations, &resource);
        let (provider_specific, set_identifier) = annotations::provider_specific(annotations);
        let mut targets = annotations::targets(annotations);
        if targets.is_empty() {
            targets = self.service_addresses(namespace, name).await?;
        }
        Ok(hostnames
            .iter()
            .flat_map(|host| {
                endpoints_for_hostname(
                    host,
                    &targets,
                    ttl,
                    &provider_specific,
                    &set_identifier,
                    &resource,
                )
            })
            .collect())
    }

    async fn service_endpoints(
        &self,
        namespace: &str,
        service: &ServiceStub,
    ) -> Result<Vec<Endpoint>, SourceError> {
        let name = service.service_name.as_str();
        let annotations = tags_to_annotations(&service.tags);
        if !annotations::controller_matches(&annotations) {
            debug!("Skipping service {namespace}/{name} because controller value does not match");
            return Ok(Vec::new());
        }

        let hostnames = if self.ignore_hostname_annotation {
            Vec::new()
        } else {
            annotations::hostnames(&annotations)
        };
        let from_annotations = self
            .endpoints_for_hostnames(namespace, name, &annotations, &hostnames)
            .await?;

        let Some(template) = self.fqdn_template.as_ref() else {
            return Ok(from_annotations);
        };
        if !self.combine_fqdn_and_annotation && !from_annotations.is_empty() {
            return Ok(from_annotations);
        }
        let hostnames = template
            .exec_value(&json!({ "Namespace": namespace, "Name": name }))
            .map_err(|e| e.on_object("Nomad service", &format!("{namespace}/{name}")))?;
        let templated = self
            .endpoints_for_hostnames(namespace, name, &annotations, &hostnames)
            .await?;
        if self.combine_fqdn_and_annotation {
            let mut endpoints = from_annotations;
            endpoints.extend(templated);
            Ok(endpoints)
        } else {
            Ok(templated)
        }
    }
}

/// Read `external-dns.<key>=<value>` tags as DNS annotations.
#[must_use]
pub fn tags_to_annotations(tags: &[String]) -> Annotations {
    tags.iter()
        .filter(|tag| tag.starts_with(NOMAD_TAG_PREFIX))
        .filter_map(|tag| tag.split_once('='))
        .map(|(key, value)| {
            let key = key.trim();
            let key = key
                .strip_prefix(NOMAD_TAG_PREFIX)
                .and_then(|k| k.strip_prefix('.'))
                .unwrap_or(key);
            (format!("{ANNOTATION_KEY_PREFIX}{key}"), value.trim().to_string())
        })
        .collect()
}

#[async_trait]
impl Source for NomadServiceSource {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        let mut endpoints = Vec::new();

        for list in self.list_services().await? {
            for service in &list.services {
                let mut svc_endpoints = self.service_endpoints(&list.namespace, service).await?;
                if svc_endpoints.is_empty() {
                    debug!(
                        "No endpoints could be generated from service {}/{}",
                        list.namespace, service.service_name
                    );
                    continue;
                }
                set_resource_label(
                    &mut svc_endpoints,
                    &format!("service/{}/{}", list.namespace, service.service_name),
                );
                endpoints.extend(svc_endpoints);
            }
        }

        // merged records keep the labels of the first service by resource name,
        // so ownership does not flip between passes
        endpoints.sort_by(|a, b| {
            a.labels
                .get(RESOURCE_LABEL_KEY)
                .cmp(&b.labels.get(RESOURCE_LABEL_KEY))
        });
        endpoints.sort_by(|a, b| {
            (a.dns_name.as_str(), a.record_type.as_str())
                .cmp(&(b.dns_name.as_str(), b.record_type.as_str()))
        });

        let mut endpoints = merge_endpoints(endpoints);
        for ep in &mut endpoints {
            ep.targets.sort_canonical();
        }
        Ok(endpoints)
    }
}

#[cfg(test)]
#[path = "nomad_tests.rs"]
mod nomad_tests;
