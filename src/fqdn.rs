// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! FQDN templates: hostnames derived from an object's own fields.
//!
//! A template such as `{{ .Name }}.{{ .Namespace }}.example.org` is rendered
//! against the JSON form of each object. The output is split on commas,
//! trimmed, stripped of trailing dots, de-duplicated and sorted.

use crate::endpoint::Endpoint;
use crate::errors::{SourceError, TemplateError};
use crate::template::Template;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// A parsed `--fqdn-template`.
#[derive(Clone, Debug)]
pub struct FqdnTemplate {
    template: Template,
}

impl FqdnTemplate {
    /// Parse a template; an empty string means "no template".
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] if the template text is malformed.
    pub fn parse(input: &str) -> Result<Option<Self>, TemplateError> {
        if input.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            template: Template::parse(input)?,
        }))
    }

    /// Render against a Kubernetes object.
    ///
    /// `kind` is injected when the serialized object does not carry one, so
    /// `{{ .Kind }}` works for every source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Apply`] naming the object if it cannot be
    /// serialized or rendering fails.
    pub fn exec<K>(&self, obj: &K, kind: &str) -> Result<Vec<String>, TemplateError>
    where
        K: Serialize + Resource,
    {
        let object = match obj.namespace() {
            Some(namespace) => format!("{namespace}/{}", obj.name_any()),
            None => obj.name_any(),
        };
        let mut data = serde_json::to_value(obj).map_err(|e| TemplateError::Apply {
            kind: kind.to_string(),
            object: object.clone(),
            reason: e.to_string(),
        })?;
        if let Value::Object(map) = &mut data {
            map.entry("kind")
                .or_insert_with(|| Value::String(kind.to_string()));
        }
        self.exec_value(&data)
            .map_err(|e| e.on_object(kind, &object))
    }

    /// Render against arbitrary data.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Exec`] if rendering fails.
    pub fn exec_value(&self, data: &Value) -> Result<Vec<String>, TemplateError> {
        let rendered = self.template.render(data)?;
        Ok(split_hostnames(&rendered))
    }
}

fn split_hostnames(rendered: &str) -> Vec<String> {
    rendered
        .split(',')
        .map(str::trim)
        .map(|h| h.strip_suffix('.').unwrap_or(h))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Merge annotation-derived endpoints with template-derived ones.
///
/// - no template: `endpoints` unchanged
/// - `combine` unset and `endpoints` non-empty: `endpoints` unchanged
/// - otherwise the template endpoints are appended (`combine`) or used instead
///
/// # Errors
///
/// Propagates any error from `templated`.
pub fn combine_with_templated_endpoints<F>(
    mut endpoints: Vec<Endpoint>,
    template: Option<&FqdnTemplate>,
    combine: bool,
    templated: F,
) -> Result<Vec<Endpoint>, SourceError>
where
    F: FnOnce() -> Result<Vec<Endpoint>, SourceError>,
{
    if template.is_none() {
        return Ok(endpoints);
    }
    if !combine && !endpoints.is_empty() {
        return Ok(endpoints);
    }
    let from_template = templated()?;
    if combine {
        endpoints.extend(from_template);
        Ok(endpoints)
    } else {
        Ok(from_template)
    }
}

#[cfg(test)]
#[path = "fqdn_tests.rs"]
mod fqdn_tests;
