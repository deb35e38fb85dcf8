//! mxblast: send one HTML message to a recipient list, directly via MX.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use mxblast_common::{Address, Message, Signal, logging};
use mxblast_delivery::{DeliveryConfig, Dispatcher, MxResolver, Scheduler, batch};

#[derive(Debug, Parser)]
#[command(
    name = "mxblast",
    version,
    about = "Send one HTML message to a recipient list in batches, delivered directly to each domain's MX hosts"
)]
struct Args {
    /// Configuration file (RON). Searched for in the default locations
    /// when not given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Line-delimited recipient list.
    #[arg(short, long)]
    recipients: PathBuf,

    /// HTML file used wholesale as the message body.
    #[arg(short, long)]
    body: PathBuf,
}

#[derive(Debug, Deserialize)]
struct MailerConfig {
    sender_address: Address,
    sender_display_name: String,
    subject: String,

    /// Optional plain-text log file, written alongside console output.
    #[serde(default)]
    log_file: Option<PathBuf>,

    #[serde(default)]
    delivery: DeliveryConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config_path = find_config_file(args.config.as_deref())?;
    let raw_config = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config from {}", config_path.display()))?;
    let config: MailerConfig = ron::from_str(&raw_config)
        .with_context(|| format!("failed to parse config {}", config_path.display()))?;

    logging::init(config.log_file.as_deref()).context("failed to initialise logging")?;

    let recipients = read_recipient_list(&args.recipients)?;
    anyhow::ensure!(
        !recipients.is_empty(),
        "recipient list {} is empty",
        args.recipients.display()
    );

    let html_body = std::fs::read_to_string(&args.body)
        .with_context(|| format!("failed to read message body from {}", args.body.display()))?;

    let message = Message::new(
        config.subject,
        config.sender_address,
        config.sender_display_name,
        html_body,
    );

    let delivery = config.delivery;
    let resolver =
        MxResolver::new(delivery.dns.clone()).context("failed to initialise DNS resolver")?;
    let dispatcher = Dispatcher::new(
        resolver,
        delivery.domains.clone(),
        delivery.helo_hostname.clone(),
        delivery.smtp_timeouts.clone(),
    );
    let scheduler = Scheduler::new(
        Arc::new(dispatcher),
        delivery.concurrency,
        Duration::from_secs(delivery.pacing_delay_secs),
        Duration::from_secs(delivery.batch_timeout_secs),
    );

    let batches = batch(&recipients, delivery.batch_size);
    info!(
        recipients = recipients.len(),
        batches = batches.len(),
        "prepared delivery run"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling the run");
            let _ = shutdown_tx.send(Signal::Shutdown);
        }
    });

    let report = scheduler.run(batches, message, shutdown_rx).await;

    let summary = report.summarize();
    println!("{summary}");

    Ok(if summary.failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Read the recipient list: one address per line, whitespace trimmed,
/// blank lines dropped. A malformed address fails the run up front.
fn read_recipient_list(path: &Path) -> anyhow::Result<Vec<Address>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read recipient list from {}", path.display()))?;

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<Address>()
                .with_context(|| format!("invalid recipient address {line:?}"))
        })
        .collect()
}

/// Find the configuration file using the following precedence:
/// 1. the `--config` flag
/// 2. `MXBLAST_CONFIG` environment variable
/// 3. ./mxblast.config.ron (current working directory)
/// 4. /etc/mxblast/mxblast.config.ron (system-wide config)
fn find_config_file(flag: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        anyhow::ensure!(
            path.exists(),
            "--config points to non-existent file: {}",
            path.display()
        );
        return Ok(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("MXBLAST_CONFIG") {
        let path = PathBuf::from(env_path);
        anyhow::ensure!(
            path.exists(),
            "MXBLAST_CONFIG points to non-existent file: {}",
            path.display()
        );
        return Ok(path);
    }

    let default_paths = [
        PathBuf::from("./mxblast.config.ron"),
        PathBuf::from("/etc/mxblast/mxblast.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "no configuration file found. Tried:\n  - --config flag\n  - MXBLAST_CONFIG environment variable\n{paths_tried}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxblast_common::Domain;

    #[test]
    fn test_config_parses_with_defaults() {
        let config: MailerConfig = ron::from_str(
            r#"(
                sender_address: "news@example.org",
                sender_display_name: "Example News",
                subject: "Monthly update",
            )"#,
        )
        .unwrap();

        assert_eq!(config.sender_address.to_string(), "news@example.org");
        assert_eq!(config.delivery.batch_size.get(), 100);
        assert_eq!(config.delivery.concurrency.get(), 5);
        assert_eq!(config.delivery.pacing_delay_secs, 3);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_with_overrides() {
        let config: MailerConfig = ron::from_str(
            r#"(
                sender_address: "news@example.org",
                sender_display_name: "Example News",
                subject: "Monthly update",
                delivery: (
                    batch_size: 50,
                    concurrency: 2,
                    pacing_delay_secs: 1,
                    helo_hostname: "mail.example.org",
                    domains: {
                        "test.example.com": (
                            mx_override: ["localhost:1025"],
                        ),
                    },
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.delivery.batch_size.get(), 50);
        assert_eq!(config.delivery.helo_hostname, "mail.example.org");
        assert!(
            config
                .delivery
                .domains
                .mail_exchanges(&Domain::new("test.example.com"))
                .is_some()
        );
    }
}
