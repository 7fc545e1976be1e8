//! Job lifecycle engine
//!
//! Owns the single in-flight job and drives it through
//! `IDLE -> ADMITTED -> AWAITING_WORKER -> RECONCILING -> IDLE`:
//!
//! - [`Engine::admit`] refuses to start while a job is locked, fetches the
//!   batch from the coordinator and hands it to the worker
//! - worker settlements are applied as they arrive, racing a fixed deadline
//!   that forces unsettled items to `TIMEOUT`
//! - [`Engine::reconcile`] gives every item a terminal state, delivers
//!   through the [`DestinationRouter`] and resets the slot
//!
//! After a reconciled job the engine admits again right away, so a backlog
//! drains without waiting for the next poll tick.

mod job;

pub use job::{Job, MALFORMED_REASON, Settlement, TIMEOUT_REASON, UNSETTLED_REASON};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use gleaner_core::domain::configuration::RemoteConfiguration;
use gleaner_core::domain::item::WorkItem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::CoordinatorRepository;
use crate::service::{DeliveryReport, DestinationRouter};
use crate::worker::{ItemFailure, ItemFuture, Worker, WorkerContext};

/// Deadline for a whole job, armed once the worker has been invoked
pub const COLLECT_JOB_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Rejection recorded for an item future that panicked
const PANIC_REASON: &str = "worker panicked";

/// Result of one admission attempt
#[derive(Debug)]
pub enum JobOutcome {
    /// Another job holds the slot
    Busy,
    /// The engine is stopping and admits nothing
    Stopped,
    /// The coordinator could not be reached; retried on the next tick
    FetchFailed,
    /// The coordinator had no work
    Idle,
    /// The job ran to the end
    Reconciled(ReconcileReport),
    /// Reconciliation was taken over by an explicit `reconcile()` call
    Superseded,
    /// The job panicked before it had items to reconcile; the slot was freed
    Aborted,
}

/// Summary of a reconciled job
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub job_id: Uuid,
    /// Items with the state reported to the coordinator
    pub items: Vec<WorkItem>,
    pub timed_out: bool,
    pub malformed: usize,
    pub failed_deliveries: usize,
    pub elapsed: chrono::Duration,
}

struct Inner {
    coordinator: Arc<dyn CoordinatorRepository>,
    worker: Arc<dyn Worker>,
    router: DestinationRouter,
    job: Mutex<Job>,
    configuration: RwLock<Option<RemoteConfiguration>>,
    ran_jobs: AtomicU64,
    stopping: AtomicBool,
    /// `true` whenever the slot is free
    idle: watch::Sender<bool>,
}

/// Handle to the job state machine
///
/// Cheap to clone; all clones share the same job slot.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        coordinator: Arc<dyn CoordinatorRepository>,
        worker: Arc<dyn Worker>,
        router: DestinationRouter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                worker,
                router,
                job: Mutex::new(Job::idle()),
                configuration: RwLock::new(None),
                ran_jobs: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
                idle: watch::channel(true).0,
            }),
        }
    }

    /// Id of the job currently holding the slot
    pub async fn current_job_id(&self) -> Option<Uuid> {
        self.inner.job.lock().await.id
    }

    /// Whether a new job could be admitted now
    pub async fn is_idle(&self) -> bool {
        let job = self.inner.job.lock().await;
        job.id.is_none() && !job.locked
    }

    /// Number of jobs that admitted at least one item
    pub fn ran_jobs(&self) -> u64 {
        self.inner.ran_jobs.load(Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    /// Configuration handed to the worker with each job
    pub async fn set_configuration(&self, configuration: Option<RemoteConfiguration>) {
        *self.inner.configuration.write().await = configuration;
    }

    pub async fn configuration(&self) -> Option<RemoteConfiguration> {
        self.inner.configuration.read().await.clone()
    }

    /// Admits jobs until one ends without reconciled work
    ///
    /// Returns the outcome of every admission attempt in order. A call made
    /// while a job is in flight returns `[Busy]` without side effects.
    pub async fn admit(&self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.run_job().await;
            let again = matches!(outcome, JobOutcome::Reconciled(_)) && !self.is_stopping();
            outcomes.push(outcome);
            if !again {
                return outcomes;
            }
            debug!("Job reconciled, admitting the next one");
        }
    }

    /// Reconciles the current job now
    ///
    /// Ignored (`None`) when no job is locked, the job is still fetching its
    /// items, or it is already being reconciled. The job's collection stops; unsettled items are failed.
    /// Afterwards a new admission is started in the background.
    pub async fn reconcile(&self) -> Option<ReconcileReport> {
        let job_id = self.current_job_id().await?;
        let report = self.reconcile_job(job_id).await?;

        if !self.is_stopping() {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.admit().await;
            });
        }

        Some(report)
    }

    /// Stops admitting jobs and cuts the in-flight collection short
    ///
    /// The in-flight job is still reconciled and reported by its own task.
    pub async fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        let job = self.inner.job.lock().await;
        if let Some(id) = job.id {
            info!(job_id = %id, "Stopping engine, ending in-flight job");
            job.cancel();
        }
    }

    /// Waits until the slot is free, up to `timeout`
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut idle = self.inner.idle.subscribe();
        let waited = tokio::time::timeout(timeout, idle.wait_for(|idle| *idle)).await;
        matches!(waited, Ok(Ok(_)))
    }

    async fn run_job(&self) -> JobOutcome {
        if self.is_stopping() {
            return JobOutcome::Stopped;
        }

        let (job_id, cancel) = {
            let mut job = self.inner.job.lock().await;
            if job.is_busy() {
                info!(
                    job_id = ?job.id,
                    "Admission refused, previous job is still running"
                );
                return JobOutcome::Busy;
            }
            let begun = job.begin();
            self.inner.idle.send_replace(false);
            begun
        };

        match AssertUnwindSafe(self.drive(job_id, cancel))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(job_id = %job_id, "Job panicked, ending it");
                match self.reconcile_job(job_id).await {
                    Some(report) => JobOutcome::Reconciled(report),
                    None => {
                        self.reset(job_id).await;
                        JobOutcome::Aborted
                    }
                }
            }
        }
    }

    /// Runs an admitted job from fetch to reconciliation
    async fn drive(&self, job_id: Uuid, cancel: CancellationToken) -> JobOutcome {
        info!(job_id = %job_id, "Starting job");
        let configuration = self.configuration().await;

        let items = match self.inner.coordinator.fetch_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to fetch items: {}", e);
                self.reset(job_id).await;
                return JobOutcome::FetchFailed;
            }
        };

        info!(job_id = %job_id, "Fetched {} item(s)", items.len());

        if items.is_empty() {
            let context = WorkerContext {
                job_id,
                items: Vec::new(),
                configuration,
            };
            drop(self.inner.worker.run(context).await);
            info!(job_id = %job_id, "Ending job, no items to collect");
            self.reset(job_id).await;
            return JobOutcome::Idle;
        }

        {
            let mut job = self.inner.job.lock().await;
            if !job.is_current(job_id) {
                return self.lost_slot(job_id);
            }
            job.accept(items.clone());
        }

        let run = self.inner.ran_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        info!(job_id = %job_id, "Job number {}", run);

        let context = WorkerContext {
            job_id,
            items,
            configuration,
        };
        let futures = self.inner.worker.run(context).await;
        self.collect(job_id, futures, cancel).await;

        match self.reconcile_job(job_id).await {
            Some(report) => JobOutcome::Reconciled(report),
            None => self.lost_slot(job_id),
        }
    }

    fn lost_slot(&self, job_id: Uuid) -> JobOutcome {
        if self.is_stopping() {
            JobOutcome::Stopped
        } else {
            debug!(job_id = %job_id, "Job was reconciled elsewhere");
            JobOutcome::Superseded
        }
    }

    /// Applies settlements as they arrive until all settle, the deadline
    /// fires or the job is cancelled
    async fn collect(&self, job_id: Uuid, futures: Vec<ItemFuture>, cancel: CancellationToken) {
        let mut pending: FuturesUnordered<_> = futures
            .into_iter()
            .enumerate()
            .map(|(index, future)| {
                AssertUnwindSafe(future)
                    .catch_unwind()
                    .map(move |result| match result {
                        Ok(result) => (index, result),
                        Err(_) => {
                            error!(job_id = %job_id, "Worker panicked while collecting item #{}", index);
                            (index, Err(ItemFailure::detached(PANIC_REASON)))
                        }
                    })
            })
            .collect();

        let deadline = tokio::time::sleep(COLLECT_JOB_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(job_id = %job_id, "Collection cancelled");
                    return;
                }
                _ = &mut deadline => {
                    let forced = self.inner.job.lock().await.expire(job_id);
                    warn!(
                        job_id = %job_id,
                        "Job timed out after {:?}, {} item(s) forced to TIMEOUT",
                        COLLECT_JOB_TIMEOUT,
                        forced
                    );
                    return;
                }
                next = pending.next() => match next {
                    Some((index, result)) => self.record(job_id, index, result).await,
                    None => {
                        info!(job_id = %job_id, "All items settled");
                        return;
                    }
                },
            }
        }
    }

    async fn record(&self, job_id: Uuid, index: usize, result: Result<WorkItem, ItemFailure>) {
        let mut job = self.inner.job.lock().await;
        if !job.is_current(job_id) {
            return;
        }

        match job.record(index, result) {
            Some(Settlement::Settled(item)) => {
                debug!(job_id = %job_id, "Item {} finished", item.global_id)
            }
            Some(Settlement::Failed { item, error }) => {
                debug!(job_id = %job_id, "Item {} failed: {}", item.global_id, error)
            }
            Some(Settlement::Malformed(index)) => warn!(
                job_id = %job_id,
                "Worker settlement #{} has no admitted globalId; workers must settle with the item",
                index
            ),
            None => debug!(job_id = %job_id, "Ignoring late settlement #{}", index),
        }
    }

    /// Ends `job_id`: reconcile, deliver, reset
    ///
    /// Returns `None` without side effects when `job_id` is not the locked
    /// job, has not received its items yet, or is already ending.
    async fn reconcile_job(&self, job_id: Uuid) -> Option<ReconcileReport> {
        let (items, started_at, timed_out, malformed) = {
            let mut job = self.inner.job.lock().await;
            if !job.is_current(job_id) || !job.is_reconcilable() {
                debug!(job_id = %job_id, "No collecting job to reconcile or already ending");
                return None;
            }
            job.ending = true;
            job.cancel();
            (job.reconcile(), job.started_at, job.timed_out, job.malformed)
        };

        info!(job_id = %job_id, "Ending job with {} item(s)", items.len());

        let delivery = match self.inner.router.deliver(items.clone()).await {
            Ok(report) => report,
            Err(e) => {
                error!(job_id = %job_id, "Delivery did not complete: {}", e);
                DeliveryReport::default()
            }
        };

        let elapsed = started_at
            .map(|start| chrono::Utc::now() - start)
            .unwrap_or_default();
        info!(
            job_id = %job_id,
            "Job ended in {} ms",
            elapsed.num_milliseconds()
        );

        self.reset(job_id).await;

        let reported = delivery.items();
        Some(ReconcileReport {
            job_id,
            items: if reported.is_empty() { items } else { reported },
            timed_out,
            malformed,
            failed_deliveries: delivery.failed_deliveries(),
            elapsed,
        })
    }

    /// Frees the slot if `job_id` still holds it
    async fn reset(&self, job_id: Uuid) {
        let mut job = self.inner.job.lock().await;
        if job.is_current(job_id) {
            job.cancel();
            *job = Job::idle();
            self.inner.idle.send_replace(true);
        }
    }
}
