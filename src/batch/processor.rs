//! Batch processor.
//!
//! Runs one orchestrator operation over many items with a fixed pool of
//! tokio workers. Workers pull ids from a shared queue and send results to
//! a single coordinator, which owns the counters and the progress callback.
//!
//! Every adapter call goes through the orchestrator's rate gate, so when the
//! remote budget drops below the threshold all workers suspend until the
//! window resets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::options::{BatchOptions, ProgressEvent, RateLimitOptions};
use crate::batch::result::{BatchResult, RunInfo, Tally};
use crate::batch::retry::retry_with_backoff;
use crate::batch::throttle::RateGate;
use crate::error::{Error, Result};
use crate::remote::RemoteAdapter;
use crate::storage::LocalStore;
use crate::sync::{SyncOperation, SyncOrchestrator};

/// Outcome label counted for each item of a dry run.
const PLANNED: &str = "planned";

/// What a worker reports back for one item.
struct ItemReport {
    item: String,
    /// `None` when cancellation cut the item off between retries.
    result: Option<Result<&'static str>>,
}

pub struct BatchProcessor<A, L> {
    orch: Arc<SyncOrchestrator<A, L>>,
}

impl<A, L> Clone for BatchProcessor<A, L> {
    fn clone(&self) -> Self {
        Self {
            orch: Arc::clone(&self.orch),
        }
    }
}

impl<A, L> BatchProcessor<A, L>
where
    A: RemoteAdapter + 'static,
    L: LocalStore + 'static,
{
    #[must_use]
    pub fn new(orch: Arc<SyncOrchestrator<A, L>>) -> Self {
        Self { orch }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &SyncOrchestrator<A, L> {
        &self.orch
    }

    /// Run `op` over `items`.
    ///
    /// Item ids are remote ids for [`SyncOperation::Pull`] and local ids
    /// otherwise. Per-item failures are collected in the result; only a
    /// fatal error (bad credentials, mapping store I/O) stops the batch.
    ///
    /// # Errors
    ///
    /// Returns `BatchAborted` carrying the partial result when a fatal error
    /// stops the batch, including failed authentication before the first item.
    pub async fn run(
        &self,
        items: Vec<String>,
        op: SyncOperation,
        mut options: BatchOptions,
    ) -> Result<BatchResult> {
        let total = items.len();
        let workers = options.max_concurrent.max(1).min(total.max(1));
        let cancel = options.cancel.clone().unwrap_or_default();
        let started = Instant::now();

        info!(
            op = op.as_str(),
            total,
            workers,
            dry_run = options.dry_run,
            "Starting batch"
        );

        if options.dry_run {
            return Ok(plan(items, op, &mut options));
        }

        let mut tally = Tally::new(op, total);
        if cancel.is_cancelled() {
            info!(op = op.as_str(), total, "Batch cancelled before start");
            return Ok(tally.finish(self.run_info(started, true)));
        }

        let gate = self.orch.gate();
        gate.set_threshold(options.rate_limit.threshold);
        gate.observe(self.orch.adapter().check_rate_limit());

        // Fires on caller cancellation or on the first fatal error.
        let abort = cancel.child_token();
        gate.interrupt_on(abort.clone());
        let _unbind = Unbind(gate);

        let auth = retry_with_backoff("authenticate", &options.rate_limit, &abort, || {
            self.orch.ensure_authenticated()
        })
        .await;
        match auth {
            Some(Ok(())) => {}
            None | Some(Err(Error::Cancelled { .. })) => {
                return Ok(tally.finish(self.run_info(started, true)));
            }
            Some(Err(cause)) => {
                warn!(error = %cause, "Authentication failed, aborting batch");
                return Err(Error::BatchAborted {
                    cause: Box::new(cause),
                    partial: Box::new(tally.finish(self.run_info(started, false))),
                });
            }
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let in_flight = Arc::new(Mutex::new(vec![None; workers]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(work(
                Worker {
                    id: worker,
                    queue: Arc::clone(&queue),
                    in_flight: Arc::clone(&in_flight),
                    abort: abort.clone(),
                    tx: tx.clone(),
                },
                Arc::clone(&self.orch),
                op,
                options.rate_limit,
            ));
        }
        drop(tx);

        let mut fatal: Option<Error> = None;
        while let Some(report) = rx.recv().await {
            let Some(result) = report.result else {
                continue;
            };
            let ok = match result {
                Ok(label) => {
                    tally.succeed(label);
                    true
                }
                Err(err) => {
                    tally.fail(&report.item, &err);
                    if err.is_batch_fatal() && fatal.is_none() {
                        fatal = Some(err);
                    }
                    false
                }
            };
            report_progress(&mut options, &tally, total, report.item, ok);
        }

        // A panicked worker never reported the item it held.
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Batch worker failed");
                let lost: Vec<String> = in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter_mut()
                    .filter_map(Option::take)
                    .collect();
                for item in lost {
                    tally.fail(&item, &Error::Other(format!("batch worker failed: {e}")));
                    report_progress(&mut options, &tally, total, item, false);
                }
            }
        }

        let result = tally.finish(self.run_info(started, cancel.is_cancelled()));
        info!(
            op = op.as_str(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            aborted = result.aborted(),
            duration_ms = result.duration_ms(),
            "Batch finished"
        );

        match fatal {
            Some(cause) => Err(Error::BatchAborted {
                cause: Box::new(cause),
                partial: Box::new(result),
            }),
            None => Ok(result),
        }
    }

    fn run_info(&self, started: Instant, cancelled: bool) -> RunInfo {
        RunInfo {
            duration_ms: elapsed_ms(started),
            rate_limit_state: self.orch.gate().snapshot(),
            cancelled,
            ..RunInfo::default()
        }
    }
}

/// Releases the batch's interrupt token from the rate gate.
struct Unbind<'a>(&'a RateGate);

impl Drop for Unbind<'_> {
    fn drop(&mut self) {
        self.0.clear_interrupt();
    }
}

/// Per-worker handles onto the shared batch state.
struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<String>>>,
    /// Item each worker holds, indexed by worker id.
    in_flight: Arc<Mutex<Vec<Option<String>>>>,
    abort: CancellationToken,
    tx: mpsc::UnboundedSender<ItemReport>,
}

impl Worker {
    fn hold(&self, item: Option<String>) {
        if let Some(slot) = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(self.id)
        {
            *slot = item;
        }
    }
}

async fn work<A, L>(
    worker: Worker,
    orch: Arc<SyncOrchestrator<A, L>>,
    op: SyncOperation,
    policy: RateLimitOptions,
) where
    A: RemoteAdapter + 'static,
    L: LocalStore + 'static,
{
    loop {
        if worker.abort.is_cancelled() {
            debug!(worker = worker.id, "Worker stopping");
            return;
        }
        let next = worker
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(item) = next else {
            return;
        };
        worker.hold(Some(item.clone()));

        // Workers finishing in the same tick get to report a fatal error
        // before this item reaches the remote.
        tokio::task::yield_now().await;

        let result = retry_with_backoff(&item, &policy, &worker.abort, || {
            orch.run_operation(op, &item)
        })
        .await
        .and_then(|r| match r {
            Err(Error::Cancelled { .. }) => None,
            other => Some(other.map(|outcome| outcome.label())),
        });

        if let Some(Err(err)) = &result {
            if err.is_batch_fatal() {
                worker.abort.cancel();
            }
            debug!(worker = worker.id, item = %item, error = %err, "Item failed");
        }
        worker.hold(None);
        if worker.tx.send(ItemReport { item, result }).is_err() {
            return;
        }
    }
}

fn report_progress(options: &mut BatchOptions, tally: &Tally, total: usize, item: String, ok: bool) {
    if let Some(progress) = options.on_progress.as_mut() {
        progress(&ProgressEvent {
            current: tally.done(),
            total,
            item,
            ok,
        });
    }
}

/// Dry-run summary: every item counts as planned and no remote is touched.
///
/// The estimate assumes `assumed_item_latency_ms` per item across
/// `max_concurrent` workers.
pub fn plan(items: Vec<String>, op: SyncOperation, options: &mut BatchOptions) -> BatchResult {
    let started = Instant::now();
    let total = items.len();
    let mut tally = Tally::new(op, total);
    for item in items {
        tally.succeed(PLANNED);
        report_progress(options, &tally, total, item, true);
    }

    let rounds = u64::try_from(total.div_ceil(options.max_concurrent.max(1))).unwrap_or(u64::MAX);
    tally.finish(RunInfo {
        duration_ms: elapsed_ms(started),
        dry_run: true,
        estimated_duration_ms: Some(rounds.saturating_mul(options.assumed_item_latency_ms)),
        ..RunInfo::default()
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
