//! Delivery engine for direct-to-MX bulk mail.
//!
//! The pieces, leaves first: [`dns::MxResolver`] turns a recipient domain
//! into a preference-ordered exchanger set; [`batch`] partitions a
//! recipient list into domain-homogeneous batches; [`dispatch::Dispatcher`]
//! walks a batch's exchangers until one accepts the message;
//! [`scheduler::Scheduler`] fans batches out over a bounded, paced worker
//! pool; [`report::Report`] collects one outcome per batch.

pub mod batch;
pub mod dispatch;
pub mod dns;
pub mod domain_config;
pub mod error;
pub mod pacing;
pub mod report;
pub mod scheduler;
pub mod types;

pub use batch::{Batch, batch};
pub use dispatch::{Dispatch, Dispatcher};
pub use dns::{DnsConfig, DnsError, MailExchange, MailExchangeSet, MxResolver};
pub use domain_config::{DomainOverride, DomainOverrides};
pub use error::HostError;
pub use pacing::PacingGate;
pub use report::{DeliveryOutcome, Report, Summary};
pub use scheduler::Scheduler;
pub use types::{DeliveryConfig, SmtpTimeouts};
