//! Concurrent batch scheduling with submission pacing.
//!
//! Fan-out/fan-in over a bounded worker pool: batches are submitted in
//! order through a pacing gate, a semaphore bounds how many dispatches
//! run at once, and a single collecting loop appends outcomes to the
//! report in completion order. A fault in one batch never touches
//! another: panics are caught at the `JoinSet` boundary and recorded as
//! that batch's failure.

use std::{collections::HashMap, num::NonZeroUsize, sync::Arc, time::Duration};

use tokio::{
    sync::{Semaphore, broadcast},
    task::JoinSet,
    time::timeout,
};
use tracing::{error, info, warn};

use mxblast_common::{Domain, Message, Signal};

use crate::{
    batch::Batch,
    dispatch::Dispatch,
    pacing::PacingGate,
    report::{DeliveryOutcome, Report},
};

/// Runs a full set of batches to completion.
pub struct Scheduler {
    dispatcher: Arc<dyn Dispatch>,
    concurrency: NonZeroUsize,
    pacing_delay: Duration,
    batch_timeout: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        concurrency: NonZeroUsize,
        pacing_delay: Duration,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            concurrency,
            pacing_delay,
            batch_timeout,
        }
    }

    /// Submit every batch and collect one outcome per batch.
    ///
    /// Submission order follows the input, spaced by the pacing gate; at
    /// most `concurrency` dispatches are in flight at any instant;
    /// outcomes land in the report in completion order. On a shutdown
    /// signal no further batches are submitted: in-flight ones run to
    /// completion and the rest are recorded as failures.
    pub async fn run(
        &self,
        batches: Vec<Batch>,
        message: Message,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Report {
        let total = batches.len();
        info!(
            batches = total,
            concurrency = self.concurrency.get(),
            pacing_secs = self.pacing_delay.as_secs_f64(),
            "starting delivery run"
        );

        let message = Arc::new(message);
        let gate = PacingGate::new(self.pacing_delay);
        let semaphore = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut in_flight: JoinSet<DeliveryOutcome> = JoinSet::new();
        let mut task_domains: HashMap<tokio::task::Id, Domain> = HashMap::new();
        let mut report = Report::new();

        let mut pending = batches.into_iter();
        let mut cancelled = false;

        for batch in pending.by_ref() {
            tokio::select! {
                biased;

                () = wait_for_shutdown(&mut shutdown) => {
                    warn!("shutdown requested, no further batches will be submitted");
                    cancelled = true;
                }
                () = gate.ready() => {}
            }

            if cancelled {
                report.record(cancelled_outcome(&batch));
                break;
            }

            let domain = domain_or_unknown(batch.domain().cloned());
            let task_domain = domain.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            let semaphore = Arc::clone(&semaphore);
            let message = Arc::clone(&message);
            let deadline = self.batch_timeout;

            let handle = in_flight.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    // The semaphore lives for the whole run
                    return DeliveryOutcome::Failure {
                        domain,
                        reason: "worker pool closed".to_string(),
                    };
                };

                match timeout(deadline, dispatcher.dispatch(&batch, &message)).await {
                    Ok(outcome) => outcome,
                    Err(_) => DeliveryOutcome::Failure {
                        domain,
                        reason: format!("delivery timed out after {}s", deadline.as_secs()),
                    },
                }
            });

            task_domains.insert(handle.id(), task_domain);
        }

        if cancelled {
            for batch in pending {
                report.record(cancelled_outcome(&batch));
            }
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    task_domains.remove(&id);
                    report.record(outcome);
                }
                Err(join_error) => {
                    let domain = task_domains
                        .remove(&join_error.id())
                        .unwrap_or_else(|| Domain::new("unknown"));
                    error!(%domain, error = %join_error, "dispatcher fault");
                    report.record(DeliveryOutcome::Failure {
                        domain,
                        reason: format!("dispatcher fault: {join_error}"),
                    });
                }
            }
        }

        info!(outcomes = report.len(), "delivery run complete");
        report
    }
}

fn domain_or_unknown(domain: Option<Domain>) -> Domain {
    domain.unwrap_or_else(|| Domain::new("unknown"))
}

fn cancelled_outcome(batch: &Batch) -> DeliveryOutcome {
    DeliveryOutcome::Failure {
        domain: domain_or_unknown(batch.domain().cloned()),
        reason: "run cancelled before submission".to_string(),
    }
}

/// Resolves when a shutdown signal arrives; pends forever if the sender
/// side is gone (a run without a cancellation driver just runs out).
async fn wait_for_shutdown(shutdown: &mut broadcast::Receiver<Signal>) {
    loop {
        match shutdown.recv().await {
            Ok(Signal::Shutdown) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    use mxblast_common::Address;

    use super::*;

    struct StubDispatch {
        delay: Duration,
        panic_domain: Option<String>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        starts: Mutex<Vec<Instant>>,
    }

    impl StubDispatch {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                panic_domain: None,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                starts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatch for StubDispatch {
        async fn dispatch(&self, batch: &Batch, _message: &Message) -> DeliveryOutcome {
            self.starts.lock().push(Instant::now());

            if let Some(panic_domain) = &self.panic_domain
                && batch.domain().is_some_and(|d| d.as_str() == panic_domain)
            {
                panic!("injected dispatcher fault");
            }

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            DeliveryOutcome::Success {
                mx_host: format!("mx.{}", batch.domain().map_or_else(String::new, |d| d.to_string())),
                recipients: batch.len(),
            }
        }
    }

    fn single_recipient_batches(count: usize) -> Vec<Batch> {
        (0..count)
            .map(|i| {
                let address: Address = format!("user{i}@domain{i}.test").parse().unwrap();
                Batch::new(vec![address])
            })
            .collect()
    }

    fn test_message() -> Message {
        Message::new(
            "Subject".to_string(),
            "sender@example.org".parse::<Address>().unwrap(),
            "Sender".to_string(),
            "<html></html>".to_string(),
        )
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn scheduler(stub: &Arc<StubDispatch>, concurrency: usize, pacing: Duration) -> Scheduler {
        Scheduler::new(
            Arc::clone(stub) as Arc<dyn Dispatch>,
            nz(concurrency),
            pacing,
            Duration::from_secs(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_outcome_per_batch_within_concurrency_bound() {
        let stub = Arc::new(StubDispatch::with_delay(Duration::from_millis(200)));
        let (tx, rx) = broadcast::channel(1);

        let report = scheduler(&stub, 3, Duration::ZERO)
            .run(single_recipient_batches(10), test_message(), rx)
            .await;
        drop(tx);

        assert_eq!(report.len(), 10);
        assert_eq!(report.summarize().successes, 10);
        assert!(
            stub.max_active.load(Ordering::SeqCst) <= 3,
            "saw {} concurrent dispatches",
            stub.max_active.load(Ordering::SeqCst)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submissions_spaced_by_pacing_delay() {
        let stub = Arc::new(StubDispatch::with_delay(Duration::ZERO));
        let (tx, rx) = broadcast::channel(1);

        let report = scheduler(&stub, 5, Duration::from_secs(3))
            .run(single_recipient_batches(3), test_message(), rx)
            .await;
        drop(tx);

        assert_eq!(report.len(), 3);
        let starts = stub.starts.lock();
        for pair in starts.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_secs(3),
                "submissions only {:?} apart",
                pair[1] - pair[0]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_becomes_failure() {
        let stub = Arc::new(StubDispatch::with_delay(Duration::from_secs(3600)));
        let (tx, rx) = broadcast::channel(1);

        let scheduler = Scheduler::new(
            Arc::clone(&stub) as Arc<dyn Dispatch>,
            nz(1),
            Duration::ZERO,
            Duration::from_secs(1),
        );
        let report = scheduler
            .run(single_recipient_batches(1), test_message(), rx)
            .await;
        drop(tx);

        assert_eq!(report.len(), 1);
        let summary = report.summarize();
        assert_eq!(summary.failures, 1);
        assert!(summary.failure_details[0].1.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_in_one_batch_is_isolated() {
        let mut stub = StubDispatch::with_delay(Duration::from_millis(10));
        stub.panic_domain = Some("domain1.test".to_string());
        let stub = Arc::new(stub);
        let (tx, rx) = broadcast::channel(1);

        let report = scheduler(&stub, 2, Duration::ZERO)
            .run(single_recipient_batches(3), test_message(), rx)
            .await;
        drop(tx);

        assert_eq!(report.len(), 3);
        let summary = report.summarize();
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.failures, 1);

        let (domain, reason) = &summary.failure_details[0];
        assert_eq!(domain.as_str(), "domain1.test");
        assert!(reason.contains("dispatcher fault"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_unsubmitted_batches() {
        let stub = Arc::new(StubDispatch::with_delay(Duration::from_millis(10)));
        let (tx, rx) = broadcast::channel(1);
        tx.send(Signal::Shutdown).unwrap();

        let report = scheduler(&stub, 2, Duration::from_secs(3))
            .run(single_recipient_batches(4), test_message(), rx)
            .await;
        drop(tx);

        assert_eq!(report.len(), 4);
        let summary = report.summarize();
        assert_eq!(summary.failures, 4);
        assert!(
            summary
                .failure_details
                .iter()
                .all(|(_, reason)| reason.contains("cancelled"))
        );
        assert!(stub.starts.lock().is_empty());
    }
}

