//! Per-domain delivery overrides.
//!
//! Lets specific recipient domains opt out of DNS resolution (routing to
//! fixed exchangers instead, which is how the integration tests point
//! delivery at local servers) or tighten TLS policy.

use std::collections::HashMap;

use serde::Deserialize;

use mxblast_common::Domain;

use crate::dns::MailExchangeSet;

/// Overrides for a single recipient domain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainOverride {
    /// Replace MX resolution with these `host[:port]` addresses, tried in
    /// list order. Port defaults to 25.
    #[serde(default)]
    pub mx_override: Vec<String>,

    /// Fail a host attempt when TLS cannot be negotiated instead of
    /// falling back to plaintext.
    #[serde(default)]
    pub require_tls: bool,

    /// Accept invalid TLS certificates (testing only).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Registry of per-domain overrides, keyed by recipient domain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DomainOverrides {
    domains: HashMap<Domain, DomainOverride>,
}

impl DomainOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: Domain, config: DomainOverride) {
        self.domains.insert(domain, config);
    }

    #[must_use]
    pub fn get(&self, domain: &Domain) -> Option<&DomainOverride> {
        self.domains.get(domain)
    }

    /// The override exchanger set for `domain`, if one is configured.
    #[must_use]
    pub fn mail_exchanges(&self, domain: &Domain) -> Option<MailExchangeSet> {
        self.get(domain)
            .filter(|config| !config.mx_override.is_empty())
            .map(|config| MailExchangeSet::from_override_addrs(&config.mx_override))
    }

    #[must_use]
    pub fn requires_tls(&self, domain: &Domain) -> bool {
        self.get(domain).is_some_and(|config| config.require_tls)
    }

    #[must_use]
    pub fn accepts_invalid_certs(&self, domain: &Domain) -> bool {
        self.get(domain)
            .is_some_and(|config| config.accept_invalid_certs)
    }
}
