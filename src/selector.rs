// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector parsing and matching.
//!
//! Sources accept `--annotation-filter` and `--label-filter` expressions in
//! the Kubernetes label selector syntax and apply them to the objects held
//! in their reflector stores.
//!
//! Supported requirements, separated by commas:
//!
//! | expression | meaning |
//! |---|---|
//! | `key` | key is present |
//! | `!key` | key is absent |
//! | `key=value`, `key==value` | key is present with that value |
//! | `key!=value` | key is absent or has another value |
//! | `key in (a,b)` | key is present with one of the values |
//! | `key notin (a,b)` | key is absent or has none of the values |
//!
//! # Example
//!
//! ```rust
//! use dnsync::selector::Selector;
//! use std::collections::BTreeMap;
//!
//! let selector = Selector::parse("kubernetes.io/ingress.class in (nginx, internal)").unwrap();
//! let mut labels = BTreeMap::new();
//! labels.insert("kubernetes.io/ingress.class".to_string(), "nginx".to_string());
//! assert!(selector.matches(&labels));
//! ```

use crate::errors::SelectorError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One clause of a selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Exists(String),
    DoesNotExist(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
        }
    }
}

/// A parsed label selector. The empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse a selector expression.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::Invalid`] when a clause has an empty or
    /// malformed key, an unknown set operator, or an unterminated value list.
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        let invalid = |reason: &str| SelectorError::Invalid {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let mut requirements = Vec::new();
        for clause in split_clauses(selector).map_err(|r| invalid(&r))? {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            requirements.push(parse_requirement(clause).map_err(|r| invalid(&r))?);
        }
        Ok(Self { requirements })
    }

    /// Convert a structured Kubernetes label selector.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::Invalid`] for an unknown operator or an
    /// `In`/`NotIn` expression without values.
    pub fn from_label_selector(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements: Vec<Requirement> = selector
            .match_labels
            .iter()
            .flatten()
            .map(|(k, v)| Requirement::Equals(k.clone(), v.clone()))
            .collect();

        for expr in selector.match_expressions.iter().flatten() {
            let invalid = |reason: String| SelectorError::Invalid {
                selector: format!("{} {}", expr.key, expr.operator),
                reason,
            };
            let values = expr.values.clone().unwrap_or_default();
            let requirement = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(invalid("values must be non-empty".to_string()));
                }
                "In" => Requirement::In(expr.key.clone(), values),
                "NotIn" => Requirement::NotIn(expr.key.clone(), values),
                "Exists" => Requirement::Exists(expr.key.clone()),
                "DoesNotExist" => Requirement::DoesNotExist(expr.key.clone()),
                other => return Err(invalid(format!("unknown operator {other:?}"))),
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether every requirement holds for `labels`.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

/// Split on commas that are not inside a parenthesized value list.
fn split_clauses(selector: &str) -> Result<Vec<&str>, String> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced parenthesis".to_string())?;
            }
            ',' if depth == 0 => {
                clauses.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unterminated value list".to_string());
    }
    clauses.push(&selector[start..]);
    Ok(clauses)
}

fn parse_requirement(clause: &str) -> Result<Requirement, String> {
    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(validate_key(key.trim())?));
    }

    if let Some(open) = clause.find('(') {
        let close = clause
            .rfind(')')
            .ok_or_else(|| "unterminated value list".to_string())?;
        if !clause[close + 1..].trim().is_empty() {
            return Err(format!("unexpected text after value list in {clause:?}"));
        }
        let head: Vec<&str> = clause[..open].split_whitespace().collect();
        let [key, op] = head.as_slice() else {
            return Err(format!("expected `<key> in|notin (...)`, got {clause:?}"));
        };
        let key = validate_key(key)?;
        let values: Vec<String> = clause[open + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        return match *op {
            "in" => Ok(Requirement::In(key, values)),
            "notin" => Ok(Requirement::NotIn(key, values)),
            other => Err(format!("unknown set operator {other:?}")),
        };
    }

    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement::NotEquals(
            validate_key(key.trim())?,
            value.trim().to_string(),
        ));
    }
    if let Some((key, value)) = clause.split_once("==") {
        return Ok(Requirement::Equals(
            validate_key(key.trim())?,
            value.trim().to_string(),
        ));
    }
    if let Some((key, value)) = clause.split_once('=') {
        return Ok(Requirement::Equals(
            validate_key(key.trim())?,
            value.trim().to_string(),
        ));
    }

    Ok(Requirement::Exists(validate_key(clause)?))
}

fn validate_key(key: &str) -> Result<String, String> {
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(format!("invalid character in key {key:?}"));
    }
    Ok(key.to_string())
}

/// Keep the objects whose annotations satisfy `selector`.
pub fn filter_by_annotations<K>(items: Vec<Arc<K>>, selector: &Selector) -> Vec<Arc<K>>
where
    K: ResourceExt,
{
    if selector.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            let keep = selector.matches(item.annotations());
            if !keep {
                debug!(
                    "Skipping {} because its annotations do not match the filter",
                    item.name_any()
                );
            }
            keep
        })
        .collect()
}

/// Keep the objects whose labels satisfy `selector`.
pub fn filter_by_labels<K>(items: Vec<Arc<K>>, selector: &Selector) -> Vec<Arc<K>>
where
    K: ResourceExt,
{
    if selector.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| selector.matches(item.labels()))
        .collect()
}

/// Whether every `key=value` pair in `subset` is also present in `superset`.
#[must_use]
pub fn map_contains(
    superset: &BTreeMap<String, String>,
    subset: &BTreeMap<String, String>,
) -> bool {
    subset.iter().all(|(k, v)| superset.get(k) == Some(v))
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
