// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mapping between record names and registry TXT names.
//!
//! The TXT record for `foo.example.org` of type A is `a-foo.example.org`
//! by default. A prefix is put in front of the first label, a suffix after
//! it: with suffix `-txt` the name is `a-foo-txt.example.org`. When the
//! prefix or suffix contains `%{record_type}`, the lowercase record type
//! replaces it instead of being put in front of the first label.
//!
//! Names written before record types were part of TXT names (`foo.example.org`
//! with only the affix) still map back, without a record type.

use crate::constants::TXT_RECORD_TYPE_TEMPLATE;
use crate::endpoint::RecordType;

/// Record types whose TXT names carry the record type.
pub const SUPPORTED_RECORD_TYPES: [RecordType; 7] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::NS,
    RecordType::MX,
    RecordType::SRV,
    RecordType::NAPTR,
];

/// Maps names using a prefix or a suffix on the first label.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffixNameMapper {
    prefix: String,
    suffix: String,
    wildcard_replacement: String,
}

impl AffixNameMapper {
    /// Prefix and suffix are lowercased. Only one of them should be set.
    #[must_use]
    pub fn new(prefix: &str, suffix: &str, wildcard_replacement: &str) -> Self {
        Self {
            prefix: prefix.to_lowercase(),
            suffix: suffix.to_lowercase(),
            wildcard_replacement: wildcard_replacement.to_string(),
        }
    }

    fn is_prefix(&self) -> bool {
        self.suffix.is_empty()
    }

    fn is_suffix(&self) -> bool {
        self.prefix.is_empty() && !self.suffix.is_empty()
    }

    fn record_type_in_affix(&self) -> bool {
        self.prefix.contains(TXT_RECORD_TYPE_TEMPLATE)
            || self.suffix.contains(TXT_RECORD_TYPE_TEMPLATE)
    }

    /// TXT name holding the ownership of `dns_name` for `record_type`.
    #[must_use]
    pub fn to_txt_name(&self, dns_name: &str, record_type: RecordType) -> String {
        let record_type = record_type.as_str().to_lowercase();
        let prefix = self.prefix.replace(TXT_RECORD_TYPE_TEMPLATE, &record_type);
        let suffix = self.suffix.replace(TXT_RECORD_TYPE_TEMPLATE, &record_type);

        let (first, rest) = match dns_name.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (dns_name, None),
        };
        let mut first = if first == "*" && !self.wildcard_replacement.is_empty() {
            self.wildcard_replacement.clone()
        } else {
            first.to_string()
        };
        if !self.record_type_in_affix() {
            first = format!("{record_type}-{first}");
        }

        match rest {
            Some(rest) => format!("{prefix}{first}{suffix}.{rest}"),
            None => format!("{prefix}{first}{suffix}"),
        }
    }

    /// Record name and type a TXT name describes.
    ///
    /// The type is `None` for names in the format without record types.
    /// Returns `None` when the name does not carry the configured affix.
    #[must_use]
    pub fn to_endpoint_name(&self, txt_name: &str) -> Option<(String, Option<RecordType>)> {
        let name = txt_name.to_lowercase();
        if self.is_prefix() {
            return self.drop_affix(&name);
        }
        if !self.is_suffix() {
            return None;
        }

        // The suffix may span labels; it ends after the first 1 + dots labels.
        let dots = self.suffix.matches('.').count();
        let labels: Vec<&str> = name.splitn(dots + 2, '.').collect();
        if labels.len() < dots + 2 {
            return self.drop_affix(&name);
        }
        let with_suffix = labels[..=dots].join(".");
        let (endpoint_name, record_type) = self.drop_affix(&with_suffix)?;
        Some((format!("{endpoint_name}.{}", labels[dots + 1]), record_type))
    }

    fn drop_affix(&self, name: &str) -> Option<(String, Option<RecordType>)> {
        let mut prefix = self.prefix.clone();
        let mut suffix = self.suffix.clone();

        if self.record_type_in_affix() {
            for record_type in SUPPORTED_RECORD_TYPES {
                let lower = record_type.as_str().to_lowercase();
                if self.is_prefix() {
                    let typed = prefix.replace(TXT_RECORD_TYPE_TEMPLATE, &lower);
                    if let Some(rest) = name.strip_prefix(typed.as_str()) {
                        return Some((rest.to_string(), Some(record_type)));
                    }
                } else {
                    let typed = suffix.replace(TXT_RECORD_TYPE_TEMPLATE, &lower);
                    if let Some(rest) = name.strip_suffix(typed.as_str()) {
                        return Some((rest.to_string(), Some(record_type)));
                    }
                }
            }
            // Written without a record type
            prefix = prefix.replace(TXT_RECORD_TYPE_TEMPLATE, "");
            suffix = suffix.replace(TXT_RECORD_TYPE_TEMPLATE, "");
        }

        let stripped = if self.is_prefix() {
            name.strip_prefix(prefix.as_str())
        } else {
            name.strip_suffix(suffix.as_str())
        }?;
        Some(extract_record_type(stripped))
    }
}

/// Split a leading `<type>-` off a name.
#[must_use]
pub fn extract_record_type(name: &str) -> (String, Option<RecordType>) {
    if let Some((head, rest)) = name.split_once('-') {
        if let Some(record_type) = SUPPORTED_RECORD_TYPES
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(head))
        {
            return (rest.to_string(), Some(record_type));
        }
    }
    (name.to_string(), None)
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod mapper_tests;
