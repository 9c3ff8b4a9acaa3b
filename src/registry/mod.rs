// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record ownership registries.
//!
//! DNS providers have no notion of who created a record. A registry keeps
//! that information next to the records themselves so several dnsync
//! instances (or other tools) can share a zone without deleting each other's
//! records.
//!
//! - [`txt::TxtRegistry`] stores ownership in a companion TXT record per
//!   managed record, in the format external-dns uses
//! - [`RegistryKind::Noop`] keeps no ownership at all; every record in the
//!   managed domains is considered owned
//!
//! [`mapper`] derives the companion TXT name from the record name and back,
//! and [`labels`] serializes the ownership labels into the TXT value.

pub mod labels;
pub mod mapper;
pub mod txt;

use clap::ValueEnum;

/// Where record ownership is kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RegistryKind {
    /// Companion TXT records
    #[default]
    Txt,
    /// No ownership tracking
    Noop,
}
