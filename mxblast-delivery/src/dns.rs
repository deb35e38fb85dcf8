//! MX resolution for direct delivery.
//!
//! Looks up a domain's mail exchangers and returns them in preference
//! order. Results are cached concurrently using the DNS record TTL,
//! clamped to configurable bounds, with an optional override TTL for
//! testing.
//!
//! Resolution failure is a normal outcome here, not an exceptional one:
//! [`MxResolver::resolve`] reports it as an empty set after emitting a
//! diagnostic, and the caller decides what an empty set means for the
//! batch in hand.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use hickory_resolver::{
    TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use mxblast_common::Domain;

/// Default delivery port for every resolved exchanger.
const SMTP_PORT: u16 = 25;

/// Errors produced by the fallible lookup path.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain has no MX records.
    #[error("no MX records for domain: {0}")]
    NoRecords(Domain),

    /// The DNS query failed (network, NXDOMAIN, timeout, malformed).
    #[error("DNS lookup failed: {0}")]
    Lookup(#[from] hickory_resolver::ResolveError),
}

/// Configuration for the MX resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// DNS query timeout in seconds.
    pub timeout_secs: u64,

    /// Cache TTL override in seconds. When set, overrides the DNS record
    /// TTL for all cached entries; when unset the record TTL is used.
    pub cache_ttl_secs: Option<u64>,

    /// Minimum cache TTL in seconds, bounding very short record TTLs.
    pub min_cache_ttl_secs: u64,

    /// Maximum cache TTL in seconds, bounding very long record TTLs.
    pub max_cache_ttl_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            cache_ttl_secs: None,
            min_cache_ttl_secs: 60,
            max_cache_ttl_secs: 3600,
        }
    }
}

/// One mail exchanger for a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailExchange {
    /// Hostname (or address) of the exchanger.
    pub host: String,
    /// MX preference value; lower is tried first.
    pub preference: u16,
    /// Delivery port.
    pub port: u16,
}

impl MailExchange {
    #[must_use]
    pub const fn new(host: String, preference: u16, port: u16) -> Self {
        Self {
            host,
            preference,
            port,
        }
    }

    /// The full `host:port` connection address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A domain's mail exchangers, ascending by preference.
///
/// Ties keep the original query order (the sort is stable). May be empty,
/// which signals that resolution failed or the domain has no exchangers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailExchangeSet(Vec<MailExchange>);

impl MailExchangeSet {
    /// Build a set from `(preference, host)` records, sorting ascending by
    /// preference. A trailing root dot on hostnames is stripped.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = (u16, String)>) -> Self {
        let mut exchanges: Vec<MailExchange> = records
            .into_iter()
            .map(|(preference, host)| {
                let host = host.trim_end_matches('.').to_string();
                MailExchange::new(host, preference, SMTP_PORT)
            })
            .collect();

        exchanges.sort_by_key(|exchange| exchange.preference);
        Self(exchanges)
    }

    /// Build a set from explicit `host[:port]` addresses, preserving list
    /// order as the preference order. Used for per-domain MX overrides.
    #[must_use]
    pub fn from_override_addrs(addrs: &[String]) -> Self {
        let exchanges = addrs
            .iter()
            .enumerate()
            .map(|(index, addr)| {
                let (host, port) = match addr.rsplit_once(':') {
                    Some((host, port)) => match port.parse() {
                        Ok(port) => (host.to_string(), port),
                        Err(_) => (addr.clone(), SMTP_PORT),
                    },
                    None => (addr.clone(), SMTP_PORT),
                };
                MailExchange::new(host, u16::try_from(index).unwrap_or(u16::MAX), port)
            })
            .collect();

        Self(exchanges)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MailExchange> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a MailExchangeSet {
    type Item = &'a MailExchange;
    type IntoIter = std::slice::Iter<'a, MailExchange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Cached resolution result with its expiry.
#[derive(Debug, Clone)]
struct CachedExchanges {
    set: Arc<MailExchangeSet>,
    expires_at: Instant,
}

/// MX resolver with lock-free concurrent caching.
#[derive(Debug)]
pub struct MxResolver {
    resolver: TokioResolver,
    cache: DashMap<Domain, CachedExchanges>,
    config: DnsConfig,
}

impl MxResolver {
    /// Create a resolver from the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            cache: DashMap::new(),
            config,
        })
    }

    /// Create a resolver with an explicit upstream configuration instead
    /// of the system one.
    #[must_use]
    pub fn with_resolver_config(resolver_config: ResolverConfig, config: DnsConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver =
            TokioResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self {
            resolver,
            cache: DashMap::new(),
            config,
        }
    }

    /// Resolve the mail exchangers for `domain`.
    ///
    /// Returns an empty set on any failure (NXDOMAIN, timeout, no MX
    /// records, malformed response) after emitting a diagnostic. Failed
    /// lookups are not cached.
    pub async fn resolve(&self, domain: &Domain) -> Arc<MailExchangeSet> {
        if let Some(cached) = self.cache.get(domain)
            && cached.expires_at > Instant::now()
        {
            debug!(%domain, exchangers = cached.set.len(), "MX cache hit");
            return Arc::clone(&cached.set);
        }

        match self.lookup(domain).await {
            Ok((set, record_ttl)) => {
                let set = Arc::new(set);

                let cache_ttl = self.config.cache_ttl_secs.unwrap_or_else(|| {
                    u64::from(record_ttl).clamp(
                        self.config.min_cache_ttl_secs,
                        self.config.max_cache_ttl_secs,
                    )
                });

                self.cache.insert(
                    domain.clone(),
                    CachedExchanges {
                        set: Arc::clone(&set),
                        expires_at: Instant::now() + Duration::from_secs(cache_ttl),
                    },
                );

                debug!(
                    %domain,
                    exchangers = set.len(),
                    record_ttl,
                    cache_ttl,
                    "resolved mail exchangers"
                );
                set
            }
            Err(error) => {
                warn!(%domain, %error, "MX resolution failed");
                Arc::new(MailExchangeSet::default())
            }
        }
    }

    /// Uncached MX lookup. Returns the set and the minimum record TTL.
    async fn lookup(&self, domain: &Domain) -> Result<(MailExchangeSet, u32), DnsError> {
        let mx_lookup = self
            .resolver
            .mx_lookup(domain.as_str())
            .await
            .map_err(|err| {
                if err.is_no_records_found() {
                    DnsError::NoRecords(domain.clone())
                } else {
                    DnsError::Lookup(err)
                }
            })?;

        let min_ttl = mx_lookup
            .as_lookup()
            .records()
            .iter()
            .map(hickory_resolver::proto::rr::Record::ttl)
            .min()
            .unwrap_or(300);

        let set = MailExchangeSet::from_records(
            mx_lookup
                .iter()
                .map(|mx| (mx.preference(), mx.exchange().to_utf8())),
        );

        if set.is_empty() {
            return Err(DnsError::NoRecords(domain.clone()));
        }

        Ok((set, min_ttl))
    }
}
