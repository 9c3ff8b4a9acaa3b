// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Source decorators.
//!
//! Each wrapper owns an inner [`Source`](super::Source), post-processes the
//! endpoints it returns and forwards event handlers to it. The controller
//! stacks them in this order:
//!
//! ```text
//! MultiSource -> DedupSource -> Nat64Source -> TargetFilterSource
//!     -> RecordTypeFilterSource -> PostProcessor
//! ```

pub mod dedup;
pub mod multi;
pub mod nat64;
pub mod post_processor;
pub mod record_type_filter;
pub mod target_filter;

pub use dedup::DedupSource;
pub use multi::MultiSource;
pub use nat64::Nat64Source;
pub use post_processor::PostProcessor;
pub use record_type_filter::RecordTypeFilterSource;
pub use target_filter::{TargetFilterSource, TargetNetFilter};
