// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line and environment configuration.
//!
//! Every flag can also be set through a `DNSYNC_*` environment variable;
//! list-valued flags accept comma-separated values.

use crate::constants::{DEFAULT_METRICS_ADDRESS, DEFAULT_NOMAD_ADDRESS};
use crate::controller::ControllerConfig;
use crate::domain_filter::DomainFilter;
use crate::endpoint::RecordType;
use crate::errors::{ProviderError, SourceError};
use crate::plan::Policy;
use crate::provider::inmemory::InMemoryProvider;
use crate::provider::webhook::WebhookProvider;
use crate::provider::Provider;
use crate::registry::txt::{TxtRegistry, TxtRegistryConfig};
use crate::registry::RegistryKind;
use crate::source::compatibility::Compatibility;
use crate::source::wrappers::{
    DedupSource, MultiSource, Nat64Source, PostProcessor, RecordTypeFilterSource,
    TargetFilterSource, TargetNetFilter,
};
use crate::source::{build_sources, needs_kubernetes, Source, SourceConfig};
use clap::{ArgAction, Parser, ValueEnum};
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// DNS backend to synchronize into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Keep records in memory
    #[default]
    Inmemory,
    /// Delegate to an external-dns webhook provider
    Webhook,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Sources to read endpoints from
    #[arg(long = "source", env = "DNSYNC_SOURCES", value_delimiter = ',', required = true)]
    pub sources: Vec<String>,

    /// Only read objects in this namespace; empty means all
    #[arg(long, env = "DNSYNC_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Annotation selector objects must match
    #[arg(long, env = "DNSYNC_ANNOTATION_FILTER", default_value = "")]
    pub annotation_filter: String,

    /// Label selector objects must match
    #[arg(long, env = "DNSYNC_LABEL_FILTER", default_value = "")]
    pub label_filter: String,

    /// Ingress classes to process; empty means all
    #[arg(long = "ingress-class", env = "DNSYNC_INGRESS_CLASSES", value_delimiter = ',')]
    pub ingress_class_names: Vec<String>,

    /// Template producing hostnames for objects without a hostname annotation
    #[arg(long, env = "DNSYNC_FQDN_TEMPLATE", default_value = "")]
    pub fqdn_template: String,

    /// Use template hostnames in addition to annotation hostnames
    #[arg(long, env = "DNSYNC_COMBINE_FQDN_ANNOTATION")]
    pub combine_fqdn_annotation: bool,

    #[arg(long, env = "DNSYNC_IGNORE_HOSTNAME_ANNOTATION")]
    pub ignore_hostname_annotation: bool,

    #[arg(long, env = "DNSYNC_IGNORE_INGRESS_TLS_SPEC")]
    pub ignore_ingress_tls_spec: bool,

    #[arg(long, env = "DNSYNC_IGNORE_INGRESS_RULES_SPEC")]
    pub ignore_ingress_rules_spec: bool,

    #[arg(long, env = "DNSYNC_IGNORE_NON_HOST_NETWORK_PODS")]
    pub ignore_non_host_network_pods: bool,

    /// Publish the cluster IP of ClusterIP services
    #[arg(long, env = "DNSYNC_PUBLISH_INTERNAL_SERVICES")]
    pub publish_internal_services: bool,

    /// Publish the node IP instead of the pod IP for headless services
    #[arg(long, env = "DNSYNC_PUBLISH_HOST_IP")]
    pub publish_host_ip: bool,

    #[arg(long, env = "DNSYNC_ALWAYS_PUBLISH_NOT_READY_ADDRESSES")]
    pub always_publish_not_ready_addresses: bool,

    /// Service types to process; empty means all
    #[arg(long, env = "DNSYNC_SERVICE_TYPE_FILTER", value_delimiter = ',')]
    pub service_type_filter: Vec<String>,

    /// Legacy annotation scheme: mate, molecule or kops-dns-controller
    #[arg(long, env = "DNSYNC_COMPATIBILITY")]
    pub compatibility: Option<Compatibility>,

    /// Publish `<pod-name>.<domain>` for every pod
    #[arg(long, env = "DNSYNC_POD_SOURCE_DOMAIN", default_value = "")]
    pub pod_source_domain: String,

    #[arg(
        long,
        env = "DNSYNC_EXCLUDE_UNSCHEDULABLE",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub exclude_unschedulable: bool,

    #[arg(
        long,
        env = "DNSYNC_EXPOSE_INTERNAL_IPV6",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub expose_internal_ipv6: bool,

    /// Namespace of the gateways Gateway API routes attach to
    #[arg(long, env = "DNSYNC_GATEWAY_NAMESPACE", default_value = "")]
    pub gateway_namespace: String,

    /// Label selector gateways must match
    #[arg(long, env = "DNSYNC_GATEWAY_LABEL_FILTER", default_value = "")]
    pub gateway_label_filter: String,

    /// Ignore Traefik resources in the traefik.containo.us group
    #[arg(long, env = "DNSYNC_TRAEFIK_DISABLE_LEGACY")]
    pub traefik_disable_legacy: bool,

    /// Ignore Traefik resources in the traefik.io group
    #[arg(long, env = "DNSYNC_TRAEFIK_DISABLE_NEW")]
    pub traefik_disable_new: bool,

    #[arg(long, env = "DNSYNC_NOMAD_ADDRESS", default_value = DEFAULT_NOMAD_ADDRESS)]
    pub nomad_address: String,

    #[arg(long, env = "DNSYNC_NOMAD_TOKEN", hide_env_values = true)]
    pub nomad_token: Option<String>,

    #[arg(long, env = "DNSYNC_NOMAD_REGION")]
    pub nomad_region: Option<String>,

    /// Server queried by the http source
    #[arg(long, env = "DNSYNC_HTTP_SERVER_URL", default_value = "")]
    pub http_server_url: String,

    /// Timeout for HTTP requests made by sources
    #[arg(
        long,
        env = "DNSYNC_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub request_timeout: Duration,

    /// Targets for endpoints that have none
    #[arg(long = "default-targets", env = "DNSYNC_DEFAULT_TARGETS", value_delimiter = ',')]
    pub default_targets: Vec<String>,

    /// Replace source targets with the default targets
    #[arg(long, env = "DNSYNC_FORCE_DEFAULT_TARGETS")]
    pub force_default_targets: bool,

    /// Only publish targets inside these networks
    #[arg(long = "target-net-filter", env = "DNSYNC_TARGET_NET_FILTER", value_delimiter = ',')]
    pub target_net_filter: Vec<String>,

    /// Never publish targets inside these networks
    #[arg(long = "exclude-target-net", env = "DNSYNC_EXCLUDE_TARGET_NETS", value_delimiter = ',')]
    pub exclude_target_nets: Vec<String>,

    /// /96 prefixes whose AAAA targets also get an A record
    #[arg(long = "nat64-networks", env = "DNSYNC_NAT64_NETWORKS", value_delimiter = ',')]
    pub nat64_networks: Vec<String>,

    /// Record types to manage
    #[arg(
        long = "managed-record-types",
        env = "DNSYNC_MANAGED_RECORD_TYPES",
        value_delimiter = ',',
        default_value = "A,AAAA,CNAME"
    )]
    pub managed_record_types: Vec<RecordType>,

    /// Record types never published, e.g. `A` to suppress IPv4
    #[arg(
        long = "exclude-record-types",
        env = "DNSYNC_EXCLUDE_RECORD_TYPES",
        value_delimiter = ','
    )]
    pub exclude_record_types: Vec<RecordType>,

    /// TTL for endpoints without one; 0 leaves them unset
    #[arg(
        long,
        env = "DNSYNC_DEFAULT_TTL",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    pub default_ttl: Duration,

    /// Mark CNAME records as provider aliases
    #[arg(long, env = "DNSYNC_PREFER_ALIAS")]
    pub prefer_alias: bool,

    #[arg(long, env = "DNSYNC_PROVIDER", value_enum, default_value_t = ProviderKind::Inmemory)]
    pub provider: ProviderKind,

    #[arg(long, env = "DNSYNC_WEBHOOK_PROVIDER_URL", default_value = "http://localhost:8888")]
    pub webhook_provider_url: String,

    /// sync, upsert-only or create-only
    #[arg(long, env = "DNSYNC_POLICY", default_value = "sync")]
    pub policy: Policy,

    /// Where record ownership is kept
    #[arg(long, env = "DNSYNC_REGISTRY", value_enum, default_value_t = RegistryKind::Txt)]
    pub registry: RegistryKind,

    /// Owner label value identifying records managed by this instance
    #[arg(long, env = "DNSYNC_OWNER_ID", default_value = "default")]
    pub owner_id: String,

    /// Take over records owned by this id
    #[arg(
        long = "migrate-from-txt-owner",
        env = "DNSYNC_MIGRATE_FROM_TXT_OWNER",
        default_value = ""
    )]
    pub old_owner_id: String,

    /// Prefix of the first label of registry TXT names; may contain `%{record_type}`
    #[arg(long, env = "DNSYNC_TXT_PREFIX", default_value = "", conflicts_with = "txt_suffix")]
    pub txt_prefix: String,

    /// Suffix of the first label of registry TXT names; may contain `%{record_type}`
    #[arg(long, env = "DNSYNC_TXT_SUFFIX", default_value = "")]
    pub txt_suffix: String,

    /// Replaces a leading `*` in registry TXT names
    #[arg(long, env = "DNSYNC_TXT_WILDCARD_REPLACEMENT", default_value = "")]
    pub txt_wildcard_replacement: String,

    /// Domains to manage; empty means all
    #[arg(long = "domain-filter", env = "DNSYNC_DOMAIN_FILTER", value_delimiter = ',')]
    pub domain_filter: Vec<String>,

    /// Domains never managed
    #[arg(long = "exclude-domains", env = "DNSYNC_EXCLUDE_DOMAINS", value_delimiter = ',')]
    pub exclude_domains: Vec<String>,

    /// Time between two synchronizations
    #[arg(
        long,
        env = "DNSYNC_INTERVAL",
        default_value = "1m",
        value_parser = humantime::parse_duration
    )]
    pub interval: Duration,

    /// Sync early when a source reports a change
    #[arg(long, env = "DNSYNC_EVENTS")]
    pub events: bool,

    /// Minimum time between event-triggered synchronizations
    #[arg(
        long,
        env = "DNSYNC_MIN_EVENT_SYNC_INTERVAL",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub min_event_sync_interval: Duration,

    /// Run a single synchronization and exit
    #[arg(long, env = "DNSYNC_ONCE")]
    pub once: bool,

    /// Log changes instead of applying them
    #[arg(long, env = "DNSYNC_DRY_RUN")]
    pub dry_run: bool,

    /// Bind address for /metrics and /healthz
    #[arg(long, env = "DNSYNC_METRICS_ADDRESS", default_value = DEFAULT_METRICS_ADDRESS)]
    pub metrics_address: SocketAddr,
}

impl Args {
    /// Options handed to every source.
    #[must_use]
    pub fn to_source_config(&self) -> SourceConfig {
        SourceConfig {
            namespace: self.namespace.clone(),
            annotation_filter: self.annotation_filter.clone(),
            label_filter: self.label_filter.clone(),
            ingress_class_names: self.ingress_class_names.clone(),
            fqdn_template: self.fqdn_template.clone(),
            combine_fqdn_and_annotation: self.combine_fqdn_annotation,
            ignore_hostname_annotation: self.ignore_hostname_annotation,
            ignore_ingress_tls_spec: self.ignore_ingress_tls_spec,
            ignore_ingress_rules_spec: self.ignore_ingress_rules_spec,
            ignore_non_host_network_pods: self.ignore_non_host_network_pods,
            publish_internal: self.publish_internal_services,
            publish_host_ip: self.publish_host_ip,
            always_publish_not_ready_addresses: self.always_publish_not_ready_addresses,
            service_type_filter: self.service_type_filter.clone(),
            compatibility: self.compatibility,
            pod_source_domain: self.pod_source_domain.clone(),
            exclude_unschedulable: self.exclude_unschedulable,
            expose_internal_ipv6: self.expose_internal_ipv6,
            gateway_namespace: self.gateway_namespace.clone(),
            gateway_label_filter: self.gateway_label_filter.clone(),
            traefik_disable_legacy: self.traefik_disable_legacy,
            traefik_disable_new: self.traefik_disable_new,
            nomad_address: self.nomad_address.clone(),
            nomad_token: self.nomad_token.clone(),
            nomad_region: self.nomad_region.clone(),
            http_server_url: self.http_server_url.clone(),
            request_timeout: self.request_timeout,
        }
    }

    #[must_use]
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            interval: self.interval,
            min_event_sync_interval: self.min_event_sync_interval,
            events: self.events,
            dry_run: self.dry_run,
            policy: self.policy,
            owner_id: self.plan_owner_id(),
            managed_types: self.managed_record_types.clone(),
            domain_filter: DomainFilter::new(&self.domain_filter, &self.exclude_domains),
        }
    }

    /// Owner the plan enforces. Without a registry nothing records
    /// ownership, so every record is treated as owned.
    #[must_use]
    pub fn plan_owner_id(&self) -> String {
        match self.registry {
            RegistryKind::Txt => self.owner_id.clone(),
            RegistryKind::Noop => String::new(),
        }
    }

    /// Whether any configured source reads from Kubernetes.
    #[must_use]
    pub fn needs_kubernetes(&self) -> bool {
        self.sources.iter().any(|name| needs_kubernetes(name))
    }

    /// Wrap already built sources in the configured decorators.
    ///
    /// # Errors
    ///
    /// Returns an error when a NAT64 prefix is malformed.
    pub fn wrap_sources(
        &self,
        sources: Vec<Arc<dyn Source>>,
    ) -> Result<Arc<dyn Source>, SourceError> {
        let mut source: Arc<dyn Source> = Arc::new(MultiSource::new(
            sources,
            self.default_targets.clone(),
            self.force_default_targets,
        ));
        source = Arc::new(DedupSource::new(source));
        if !self.nat64_networks.is_empty() {
            source = Arc::new(Nat64Source::new(source, &self.nat64_networks)?);
        }
        let filter = TargetNetFilter::new(&self.target_net_filter, &self.exclude_target_nets);
        source = Arc::new(TargetFilterSource::new(source, filter));
        source = Arc::new(RecordTypeFilterSource::new(
            source,
            &self.managed_record_types,
            &self.exclude_record_types,
        ));
        Ok(Arc::new(
            PostProcessor::new(source)
                .with_ttl(self.default_ttl)
                .with_prefer_alias(self.prefer_alias),
        ))
    }

    /// Build every configured source and wrap them.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be built or a wrapper is
    /// misconfigured.
    pub async fn build_source(
        &self,
        client: Option<&Client>,
    ) -> Result<Arc<dyn Source>, SourceError> {
        let sources = build_sources(&self.sources, &self.to_source_config(), client).await?;
        self.wrap_sources(sources)
    }

    /// Build the configured provider, behind the configured registry.
    ///
    /// # Errors
    ///
    /// Returns an error if webhook negotiation fails or the registry options
    /// are invalid.
    pub async fn build_provider(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        let provider: Arc<dyn Provider> = match self.provider {
            ProviderKind::Inmemory => {
                info!("Using in-memory provider");
                Arc::new(InMemoryProvider::new(DomainFilter::new(
                    &self.domain_filter,
                    &self.exclude_domains,
                )))
            }
            ProviderKind::Webhook => {
                info!("Using webhook provider at {}", self.webhook_provider_url);
                Arc::new(WebhookProvider::new(&self.webhook_provider_url).await?)
            }
        };
        self.wrap_provider(provider)
    }

    /// Put the configured registry in front of `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner id is empty or both a TXT prefix and
    /// suffix are set.
    pub fn wrap_provider(
        &self,
        provider: Arc<dyn Provider>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        match self.registry {
            RegistryKind::Txt => {
                info!("Using TXT registry with owner id {:?}", self.owner_id);
                let config = TxtRegistryConfig {
                    owner_id: self.owner_id.clone(),
                    old_owner_id: self.old_owner_id.clone(),
                    prefix: self.txt_prefix.clone(),
                    suffix: self.txt_suffix.clone(),
                    wildcard_replacement: self.txt_wildcard_replacement.clone(),
                    managed_types: self.managed_record_types.clone(),
                    exclude_types: self.exclude_record_types.clone(),
                };
                Ok(Arc::new(TxtRegistry::new(provider, config)?))
            }
            RegistryKind::Noop => {
                info!("Using no registry, every record in the managed domains is owned");
                Ok(provider)
            }
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
