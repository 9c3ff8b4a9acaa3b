// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for dnsync.
//!
//! This module contains the annotation keys, label keys and default values
//! shared by every source, wrapper and the controller loop.

// ============================================================================
// Annotation Keys
// ============================================================================

/// Prefix shared by every annotation dnsync understands
pub const ANNOTATION_KEY_PREFIX: &str = "external-dns.alpha.kubernetes.io/";

/// Comma separated list of hostnames to publish for a resource
pub const HOSTNAME_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/hostname";

/// Hostnames that resolve to the internal address of a resource
pub const INTERNAL_HOSTNAME_ANNOTATION_KEY: &str =
    "external-dns.alpha.kubernetes.io/internal-hostname";

/// Explicit targets overriding whatever the resource status reports
pub const TARGET_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/target";

/// Record TTL, either integer seconds or a duration like `10m`
pub const TTL_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/ttl";

/// Set identifier for weighted or multi-value records
pub const SET_IDENTIFIER_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/set-identifier";

/// Marks a record as a provider alias
pub const ALIAS_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/alias";

/// Provider-specific property set on alias records
pub const ALIAS_PROVIDER_SPECIFIC_KEY: &str = "alias";

/// Owning controller; resources claimed by another controller are skipped
pub const CONTROLLER_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/controller";

/// Value of [`CONTROLLER_ANNOTATION_KEY`] this controller answers to
pub const CONTROLLER_ANNOTATION_VALUE: &str = "dns-controller";

/// Whether node sources publish public or private addresses for `NodePort` services
pub const ACCESS_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/access";

/// Selects which address family of a `NodePort` service is published
pub const ENDPOINTS_TYPE_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/endpoints-type";

/// Ingress reference used by Istio gateways to borrow load balancer targets
pub const INGRESS_ANNOTATION_KEY: &str = "external-dns.alpha.kubernetes.io/ingress";

/// Narrows which ingress hostnames are published
pub const INGRESS_HOSTNAME_SOURCE_ANNOTATION_KEY: &str =
    "external-dns.alpha.kubernetes.io/ingress-hostname-source";

/// Cloudflare proxy toggle, passed through as a provider-specific property
pub const CLOUDFLARE_PROXIED_KEY: &str = "external-dns.alpha.kubernetes.io/cloudflare-proxied";

/// Cloudflare custom hostname, passed through as a provider-specific property
pub const CLOUDFLARE_CUSTOM_HOSTNAME_KEY: &str =
    "external-dns.alpha.kubernetes.io/cloudflare-custom-hostname";

/// Legacy ingress class annotation
pub const INGRESS_CLASS_ANNOTATION_KEY: &str = "kubernetes.io/ingress.class";

/// AWS load balancer controller annotation that enables dual-stack addressing
pub const ALB_DUALSTACK_ANNOTATION_KEY: &str = "alb.ingress.kubernetes.io/ip-address-type";

/// Value of [`ALB_DUALSTACK_ANNOTATION_KEY`] that marks a dual-stack load balancer
pub const ALB_DUALSTACK_ANNOTATION_VALUE: &str = "dualstack";

// ============================================================================
// Compatibility Annotation Keys
// ============================================================================

/// Hostname annotation used by Zalando's mate
pub const MATE_ANNOTATION_KEY: &str = "zalando.org/dnsname";

/// Hostname annotation used by molecule software
pub const MOLECULE_ANNOTATION_KEY: &str = "domainName";

/// Public hostnames used by the kops dns-controller
pub const KOPS_DNS_CONTROLLER_HOSTNAME_ANNOTATION_KEY: &str = "dns.alpha.kubernetes.io/external";

/// Internal hostnames used by the kops dns-controller
pub const KOPS_DNS_CONTROLLER_INTERNAL_HOSTNAME_ANNOTATION_KEY: &str =
    "dns.alpha.kubernetes.io/internal";

// ============================================================================
// Endpoint Label Keys
// ============================================================================

/// Label carrying `kind/namespace/name` of the resource an endpoint came from
pub const RESOURCE_LABEL_KEY: &str = "resource";

/// Label carrying the owner id of a record
pub const OWNER_LABEL_KEY: &str = "owner";

/// Label marking endpoints backed by dual-stack load balancers
pub const DUALSTACK_LABEL_KEY: &str = "dualstack";

/// Label on a registry TXT record naming the record it describes
pub const OWNED_RECORD_LABEL_KEY: &str = "ownedRecord";

// ============================================================================
// TXT Registry
// ============================================================================

/// Heritage every registry TXT record starts with
pub const TXT_HERITAGE: &str = "external-dns";

/// Placeholder in a TXT prefix or suffix replaced by the lowercase record type
pub const TXT_RECORD_TYPE_TEMPLATE: &str = "%{record_type}";

/// Provider-specific property forcing an update when a TXT record is missing
pub const TXT_FORCE_UPDATE_PROVIDER_SPECIFIC_KEY: &str = "txt/force-update";

// ============================================================================
// Source Defaults
// ============================================================================

/// Upper bound for a record TTL in seconds
pub const TTL_MAX_SECONDS: i64 = u32::MAX as i64;

/// Longest DNS label allowed in a hostname
pub const MAX_LABEL_LENGTH: usize = 63;

/// How long sources wait for their informer caches to fill before failing
pub const CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Nomad agent queried when no address is configured
pub const DEFAULT_NOMAD_ADDRESS: &str = "http://127.0.0.1:4646";

/// Prefix of Nomad service tags carrying DNS settings
pub const NOMAD_TAG_PREFIX: &str = "external-dns";

/// Header carrying the Nomad ACL token
pub const NOMAD_TOKEN_HEADER: &str = "X-Nomad-Token";

/// API group of Gateway API gateways and routes
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Kind route parent references default to
pub const GATEWAY_API_KIND: &str = "Gateway";

/// Route parent condition set once a gateway takes the route
pub const GATEWAY_ROUTE_ACCEPTED: &str = "Accepted";

// ============================================================================
// Controller Defaults
// ============================================================================

/// Default interval between synchronizations
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Default minimum delay between event-triggered synchronizations
pub const DEFAULT_MIN_EVENT_SYNC_INTERVAL_SECS: u64 = 5;

/// Default bind address of the metrics and health server
pub const DEFAULT_METRICS_ADDRESS: &str = "0.0.0.0:7979";

/// Content type spoken by webhook providers
pub const WEBHOOK_MEDIA_TYPE: &str = "application/external.dns.webhook+json;version=1";

/// Attempts made when negotiating with a webhook provider
pub const WEBHOOK_MAX_RETRIES: u32 = 5;

/// Initial backoff between webhook negotiation attempts
pub const WEBHOOK_INITIAL_BACKOFF_MS: u64 = 500;

/// Request timeout for outbound HTTP calls
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
