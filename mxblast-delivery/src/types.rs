//! Configuration types for the delivery engine.

use std::num::NonZeroUsize;

use serde::Deserialize;

use crate::{dns::DnsConfig, domain_config::DomainOverrides};

/// SMTP operation timeout configuration.
///
/// Each protocol step gets its own deadline so a hung server fails the
/// host attempt promptly instead of stalling a worker.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for connection establishment and the 220 banner.
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for EHLO/HELO.
    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    /// Timeout for STARTTLS and the TLS upgrade.
    #[serde(default = "default_starttls_timeout")]
    pub starttls_secs: u64,

    /// Timeout for MAIL FROM.
    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    /// Timeout for each RCPT TO.
    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA and message transmission. Longer than the others
    /// to accommodate large bodies.
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Timeout for QUIT.
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            starttls_secs: default_starttls_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_starttls_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

/// Engine-level delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum recipients per batch.
    pub batch_size: NonZeroUsize,

    /// Maximum simultaneously in-flight batch deliveries.
    pub concurrency: NonZeroUsize,

    /// Fixed wait between successive batch submissions, in seconds.
    pub pacing_delay_secs: u64,

    /// Hostname announced in the EHLO/HELO greeting.
    pub helo_hostname: String,

    /// Deadline for one batch's entire delivery attempt, in seconds.
    pub batch_timeout_secs: u64,

    /// MX resolver configuration.
    pub dns: DnsConfig,

    /// Per-operation SMTP timeouts.
    pub smtp_timeouts: SmtpTimeouts,

    /// Per-domain overrides.
    pub domains: DomainOverrides,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            pacing_delay_secs: default_pacing_delay(),
            helo_hostname: default_helo_hostname(),
            batch_timeout_secs: default_batch_timeout(),
            dns: DnsConfig::default(),
            smtp_timeouts: SmtpTimeouts::default(),
            domains: DomainOverrides::default(),
        }
    }
}

const fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(100).expect("non-zero")
}

const fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(5).expect("non-zero")
}

const fn default_pacing_delay() -> u64 {
    3
}

fn default_helo_hostname() -> String {
    "localhost".to_string()
}

const fn default_batch_timeout() -> u64 {
    300
}
