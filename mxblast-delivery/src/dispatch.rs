//! Batch dispatch through a domain's mail exchangers.
//!
//! One dispatch is one delivery attempt for one batch: resolve the
//! domain's exchangers, then walk them in preference order running a full
//! SMTP transaction against each until one accepts the message. Every
//! failed host attempt is logged and falls through to the next host; the
//! batch only fails once the whole set is exhausted.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mxblast_common::Message;
use mxblast_smtp::client::{self, SmtpClient};

use crate::{
    batch::Batch,
    dns::{MailExchange, MxResolver},
    domain_config::DomainOverrides,
    error::HostError,
    report::DeliveryOutcome,
    types::SmtpTimeouts,
};

/// Seam between the scheduler and the concrete dispatcher.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Attempt delivery of one batch, resolving all failures into the
    /// returned outcome.
    async fn dispatch(&self, batch: &Batch, message: &Message) -> DeliveryOutcome;
}

/// Everything a host attempt needs, rendered once per batch.
struct Envelope {
    sender: String,
    recipients: Vec<String>,
    content: String,
    require_tls: bool,
    accept_invalid_certs: bool,
}

/// Delivers batches directly to their domain's mail exchangers.
pub struct Dispatcher {
    resolver: MxResolver,
    overrides: DomainOverrides,
    helo_hostname: String,
    timeouts: SmtpTimeouts,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(
        resolver: MxResolver,
        overrides: DomainOverrides,
        helo_hostname: String,
        timeouts: SmtpTimeouts,
    ) -> Self {
        Self {
            resolver,
            overrides,
            helo_hostname,
            timeouts,
        }
    }

    /// Connect to an exchanger and complete the greeting: 220 banner, then
    /// EHLO with a HELO fallback for servers that refuse it.
    ///
    /// Returns the connected client and whether STARTTLS was advertised.
    async fn connect_and_greet(
        &self,
        exchange: &MailExchange,
        envelope: &Envelope,
    ) -> Result<(SmtpClient, bool), HostError> {
        let host = &exchange.host;

        let mut client = smtp_op(
            host,
            "connect",
            self.timeouts.connect_secs,
            SmtpClient::connect(&exchange.address(), host.clone()),
        )
        .await?
        .accept_invalid_certs(envelope.accept_invalid_certs);

        let banner = smtp_op(
            host,
            "greeting",
            self.timeouts.connect_secs,
            client.read_greeting(),
        )
        .await?;
        if !banner.is_success() {
            return Err(HostError::Greeting {
                host: host.clone(),
                response: banner.message(),
            });
        }

        let ehlo = smtp_op(
            host,
            "EHLO",
            self.timeouts.ehlo_secs,
            client.ehlo(&self.helo_hostname),
        )
        .await?;
        if ehlo.is_success() {
            let starttls = ehlo
                .lines
                .iter()
                .any(|line| line.to_uppercase().starts_with("STARTTLS"));
            return Ok((client, starttls));
        }

        debug!(host = %host, response = %ehlo.message(), "EHLO refused, falling back to HELO");
        let helo = smtp_op(
            host,
            "HELO",
            self.timeouts.ehlo_secs,
            client.helo(&self.helo_hostname),
        )
        .await?;
        if !helo.is_success() {
            return Err(HostError::Greeting {
                host: host.clone(),
                response: helo.message(),
            });
        }

        Ok((client, false))
    }

    /// Run one complete SMTP transaction against a single exchanger.
    async fn attempt_host(
        &self,
        exchange: &MailExchange,
        envelope: &Envelope,
    ) -> Result<(), HostError> {
        let host = &exchange.host;

        let (mut client, supports_starttls) = self.connect_and_greet(exchange, envelope).await?;

        if envelope.require_tls || supports_starttls {
            match smtp_op(
                host,
                "STARTTLS",
                self.timeouts.starttls_secs,
                client.starttls(),
            )
            .await
            {
                Ok(response) if response.is_success() => {
                    // RFC 3207: the session state resets, greet again
                    let ehlo = smtp_op(
                        host,
                        "EHLO",
                        self.timeouts.ehlo_secs,
                        client.ehlo(&self.helo_hostname),
                    )
                    .await?;
                    if !ehlo.is_success() {
                        return Err(HostError::Rejected {
                            host: host.clone(),
                            command: "EHLO",
                            response: ehlo.message(),
                        });
                    }
                }
                Ok(response) => {
                    if envelope.require_tls {
                        return Err(HostError::TlsRequired {
                            host: host.clone(),
                            detail: response.message(),
                        });
                    }
                    debug!(host = %host, response = %response.message(), "STARTTLS refused, continuing in plaintext");
                }
                Err(error) => {
                    if envelope.require_tls {
                        return Err(HostError::TlsRequired {
                            host: host.clone(),
                            detail: error.to_string(),
                        });
                    }
                    // RFC 3207 4.1: handshake failure, reconnect without TLS
                    info!(host = %host, %error, "STARTTLS failed, reconnecting in plaintext");
                    (client, _) = self.connect_and_greet(exchange, envelope).await?;
                }
            }
        }

        let response = smtp_op(
            host,
            "MAIL FROM",
            self.timeouts.mail_from_secs,
            client.mail_from(&envelope.sender),
        )
        .await?;
        if !response.is_success() {
            return Err(HostError::Rejected {
                host: host.clone(),
                command: "MAIL FROM",
                response: response.message(),
            });
        }

        for recipient in &envelope.recipients {
            let response = smtp_op(
                host,
                "RCPT TO",
                self.timeouts.rcpt_to_secs,
                client.rcpt_to(recipient),
            )
            .await?;
            if !response.is_success() {
                return Err(HostError::Rejected {
                    host: host.clone(),
                    command: "RCPT TO",
                    response: response.message(),
                });
            }
        }

        let response = smtp_op(host, "DATA", self.timeouts.data_secs, client.data()).await?;
        if !(300..400).contains(&response.code) {
            return Err(HostError::Rejected {
                host: host.clone(),
                command: "DATA",
                response: response.message(),
            });
        }

        let response = smtp_op(
            host,
            "message content",
            self.timeouts.data_secs,
            client.send_data(&envelope.content),
        )
        .await?;
        if !response.is_success() {
            return Err(HostError::Rejected {
                host: host.clone(),
                command: "message content",
                response: response.message(),
            });
        }

        // The message is accepted at this point; a QUIT problem is noise
        let quit = timeout(Duration::from_secs(self.timeouts.quit_secs), client.quit()).await;
        match quit {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => warn!(host = %host, %error, "QUIT failed after successful delivery"),
            Err(_) => warn!(host = %host, "QUIT timed out after successful delivery"),
        }

        Ok(())
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, batch: &Batch, message: &Message) -> DeliveryOutcome {
        let Some(domain) = batch.domain() else {
            return DeliveryOutcome::Skipped;
        };

        // The batcher guarantees domain-homogeneous batches; a hand-built
        // mixed batch resolves through its first recipient's domain.
        let exchanges = match self.overrides.mail_exchanges(domain) {
            Some(set) => Arc::new(set),
            None => self.resolver.resolve(domain).await,
        };

        if exchanges.is_empty() {
            warn!(%domain, "no MX records, batch not attempted");
            return DeliveryOutcome::Failure {
                domain: domain.clone(),
                reason: "no MX records".to_string(),
            };
        }

        let envelope = Envelope {
            sender: message.sender().to_string(),
            recipients: batch.recipients().iter().map(ToString::to_string).collect(),
            content: client::render(message, &self.helo_hostname),
            require_tls: self.overrides.requires_tls(domain),
            accept_invalid_certs: self.overrides.accepts_invalid_certs(domain),
        };

        for exchange in exchanges.iter() {
            match self.attempt_host(exchange, &envelope).await {
                Ok(()) => {
                    info!(
                        %domain,
                        host = %exchange.host,
                        recipients = batch.len(),
                        "batch delivered"
                    );
                    return DeliveryOutcome::Success {
                        mx_host: exchange.host.clone(),
                        recipients: batch.len(),
                    };
                }
                Err(error) => {
                    warn!(%domain, host = %exchange.host, %error, "host attempt failed");
                }
            }
        }

        DeliveryOutcome::Failure {
            domain: domain.clone(),
            reason: "all MX hosts failed".to_string(),
        }
    }
}

/// Wrap one SMTP operation with its timeout, folding both failure shapes
/// into a [`HostError`].
async fn smtp_op<T>(
    host: &str,
    operation: &'static str,
    seconds: u64,
    fut: impl Future<Output = client::Result<T>> + Send,
) -> Result<T, HostError> {
    match timeout(Duration::from_secs(seconds), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(HostError::Transport {
            host: host.to_string(),
            source,
        }),
        Err(_) => Err(HostError::Timeout {
            host: host.to_string(),
            operation,
            seconds,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsConfig;
    use hickory_resolver::config::ResolverConfig;
    use mxblast_common::Address;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            MxResolver::with_resolver_config(ResolverConfig::default(), DnsConfig::default()),
            DomainOverrides::new(),
            "test.invalid".to_string(),
            SmtpTimeouts::default(),
        )
    }

    fn message() -> Message {
        Message::new(
            "Subject".to_string(),
            "sender@example.org".parse::<Address>().unwrap(),
            "Sender".to_string(),
            "<html></html>".to_string(),
        )
    }

    #[tokio::test]
    async fn test_empty_batch_is_skipped() {
        let outcome = dispatcher()
            .dispatch(&Batch::new(Vec::new()), &message())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Skipped);
    }
}
