//! Delivery outcomes and the final run report.

use std::fmt::{self, Display};

use mxblast_common::Domain;

/// The result of one batch's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The batch was delivered through `mx_host` for all its recipients.
    Success {
        /// The exchanger that accepted the message.
        mx_host: String,
        /// Number of envelope recipients delivered.
        recipients: usize,
    },

    /// The batch failed as a unit.
    Failure {
        /// The batch's resolution domain.
        domain: Domain,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The batch was empty; nothing was attempted.
    Skipped,
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                mx_host,
                recipients,
            } => {
                write!(f, "delivered {recipients} recipient(s) via {mx_host}")
            }
            Self::Failure { domain, reason } => write!(f, "failed for {domain}: {reason}"),
            Self::Skipped => write!(f, "skipped (empty batch)"),
        }
    }
}

/// Per-batch outcomes in completion order, one per submitted batch.
///
/// Created empty, appended to as batches complete, and read-only once the
/// run finishes.
#[derive(Debug, Default)]
pub struct Report {
    outcomes: Vec<DeliveryOutcome>,
}

impl Report {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: DeliveryOutcome) {
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn outcomes(&self) -> &[DeliveryOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Aggregate the report into counts and failure details.
    #[must_use]
    pub fn summarize(&self) -> Summary {
        let mut summary = Summary {
            total_batches: self.outcomes.len(),
            successes: 0,
            failures: 0,
            skipped: 0,
            delivered_recipients: 0,
            failure_details: Vec::new(),
        };

        for outcome in &self.outcomes {
            match outcome {
                DeliveryOutcome::Success { recipients, .. } => {
                    summary.successes += 1;
                    summary.delivered_recipients += recipients;
                }
                DeliveryOutcome::Failure { domain, reason } => {
                    summary.failures += 1;
                    summary
                        .failure_details
                        .push((domain.clone(), reason.clone()));
                }
                DeliveryOutcome::Skipped => summary.skipped += 1,
            }
        }

        summary
    }
}

/// Aggregated run statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total_batches: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub delivered_recipients: usize,
    /// `(domain, reason)` for every failed batch.
    pub failure_details: Vec<(Domain, String)>,
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batch(es): {} delivered ({} recipient(s)), {} failed",
            self.total_batches, self.successes, self.delivered_recipients, self.failures
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        for (domain, reason) in &self.failure_details {
            write!(f, "\n  {domain}: {reason}")?;
        }
        Ok(())
    }
}
