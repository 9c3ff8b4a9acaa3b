// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # dnsync - DNS records from cluster and service-catalog resources
//!
//! dnsync watches Kubernetes objects (Services, Ingresses, Pods, Nodes,
//! `DNSEndpoint` resources, Istio Gateways and VirtualServices, Kong
//! TCPIngresses, Gateway API routes, Traefik IngressRoutes), the Nomad
//! service catalog or a plain HTTP endpoint, derives
//! the DNS records they should publish, and keeps a DNS provider in sync.
//!
//! ## Overview
//!
//! Every sync pass runs the same pipeline:
//!
//! 1. [`source`] adapters turn upstream objects into [`endpoint::Endpoint`]s
//! 2. [`source::wrappers`] decorate the combined list (default targets,
//!    deduplication, NAT64, target and record-type filters, default TTL)
//! 3. [`domain_filter`] drops names dnsync does not manage
//! 4. [`plan`] compares desired endpoints with the provider's records
//! 5. a [`provider`] applies the resulting changes, behind the TXT
//!    [`registry`] that records which records this instance owns
//!
//! [`controller`] drives the pipeline on an interval, or early when a source
//! reports a change.
//!
//! ## Modules
//!
//! - [`endpoint`] - The record model shared by sources, plan and providers
//! - [`annotations`] - Hostname, target, TTL and provider-specific annotations
//! - [`selector`] - Label and annotation selector matching
//! - [`template`] / [`fqdn`] - Hostname templates evaluated against objects
//! - [`crd`] - Custom resource types
//! - [`registry`] - Ownership records kept next to managed records
//! - [`metrics`] - Prometheus metrics and the `/metrics` server
//! - [`config`] - Command line flags
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnsync::endpoint::{Endpoint, RecordType};
//! use dnsync::plan::{Plan, Policy};
//!
//! let desired = vec![Endpoint::new(
//!     "www.example.org",
//!     RecordType::A,
//!     vec!["192.0.2.10".to_string()],
//! )];
//! let changes = Plan::calculate(&[], &desired, Policy::Sync, "default", &[]);
//! assert_eq!(changes.create.len(), 1);
//! ```

pub mod annotations;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod domain_filter;
pub mod endpoint;
pub mod errors;
pub mod fqdn;
pub mod informers;
pub mod metrics;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod selector;
pub mod source;
pub mod template;
