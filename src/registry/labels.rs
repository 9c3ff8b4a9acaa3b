// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ownership labels stored in registry TXT records.
//!
//! The value looks like
//! `"heritage=external-dns,external-dns/owner=default,external-dns/resource=service/default/web"`:
//! a heritage marker followed by every endpoint label, keys sorted.

use crate::constants::TXT_HERITAGE;
use crate::endpoint::Labels;
use std::fmt::Write;

/// Render labels as a registry TXT value.
#[must_use]
pub fn serialize_labels(labels: &Labels, with_quotes: bool) -> String {
    let mut text = format!("heritage={TXT_HERITAGE}");
    for (key, value) in labels {
        let _ = write!(text, ",{TXT_HERITAGE}/{key}={value}");
    }
    if with_quotes {
        format!("\"{text}\"")
    } else {
        text
    }
}

/// Parse a registry TXT value.
///
/// Returns `None` unless the text carries exactly the `external-dns`
/// heritage, meaning the TXT record is not a registry record. Tokens that
/// are not `key=value` pairs are ignored.
#[must_use]
pub fn parse_labels(text: &str) -> Option<Labels> {
    let text = text.trim_matches('"');
    let mut labels = Labels::new();
    let mut heritage = false;

    for token in text.split(',') {
        let mut parts = token.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if key == "heritage" {
            if value != TXT_HERITAGE {
                return None;
            }
            heritage = true;
            continue;
        }
        if let Some(label) = key.strip_prefix(TXT_HERITAGE).and_then(|k| k.strip_prefix('/')) {
            labels.insert(label.to_string(), value.to_string());
        }
    }

    heritage.then_some(labels)
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
