//! Poll loop
//!
//! Asks the engine to admit a job on every tick while no job is in flight.
//! The interval comes from the active remote configuration only.

use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, info};

use super::periodic::PeriodicTask;
use crate::engine::{Engine, JobOutcome};

/// Owner of the single poll timer
pub struct JobPoller {
    engine: Engine,
    task: Mutex<Option<PeriodicTask>>,
}

impl JobPoller {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            task: Mutex::new(None),
        }
    }

    /// Starts polling every `interval`, replacing any running timer
    pub async fn start(&self, interval: Duration) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            previous.stop();
        }

        info!("Starting job poller (interval: {:?})", interval);

        let engine = self.engine.clone();
        *task = Some(PeriodicTask::spawn(interval, move || {
            let engine = engine.clone();
            async move { poll_once(engine).await }
        }));
    }

    /// Cancels the timer; an in-flight job keeps running
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            info!("Stopping job poller");
            task.stop();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Interval of the running timer
    pub async fn interval(&self) -> Option<Duration> {
        self.task.lock().await.as_ref().map(PeriodicTask::period)
    }
}

/// One poll tick
///
/// Admission runs in its own task: stopping the timer must never drop a job
/// halfway through.
async fn poll_once(engine: Engine) {
    if !engine.is_idle().await {
        let current = engine.current_job_id().await;
        debug!(job_id = ?current, "Waiting for the running job");
        return;
    }

    tokio::spawn(async move {
        for outcome in engine.admit().await {
            match outcome {
                JobOutcome::Reconciled(report) => debug!(
                    job_id = %report.job_id,
                    "Reconciled {} item(s)",
                    report.items.len()
                ),
                JobOutcome::Idle => debug!("No items available"),
                other => debug!("Admission ended: {:?}", other),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DestinationRouter;
    use crate::testing::{FakeCoordinator, FakeDestinations, ScriptedWorker, routed};
    use std::sync::Arc;

    fn poller(coordinator: &Arc<FakeCoordinator>, worker: ScriptedWorker) -> JobPoller {
        let destinations = Arc::new(FakeDestinations::default());
        let router = DestinationRouter::new(destinations, coordinator.clone());
        JobPoller::new(Engine::new(coordinator.clone(), Arc::new(worker), router))
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_tick_future_is_send() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let router = DestinationRouter::new(Arc::new(FakeDestinations::default()), coordinator.clone());
        let engine = Engine::new(coordinator, Arc::new(ScriptedWorker::stalled()), router);

        let tick = poll_once(engine);
        assert_send(&tick);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_tick_admits_when_idle() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let poller = poller(&coordinator, ScriptedWorker::succeeding());

        poller.start(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(coordinator.fetch_calls(), 3);
        assert_eq!(poller.interval().await, Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_skip_while_job_in_flight() {
        let coordinator = Arc::new(FakeCoordinator::with_batches(vec![vec![routed(
            "a",
            "http://cb.io",
        )]]));
        let poller = poller(&coordinator, ScriptedWorker::stalled());

        poller.start(Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        // the stalled job holds the slot until its deadline
        assert_eq!(coordinator.fetch_calls(), 1);
        assert_eq!(coordinator.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_a_single_timer() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let poller = poller(&coordinator, ScriptedWorker::succeeding());

        poller.start(Duration::from_secs(10)).await;
        poller.start(Duration::from_secs(10)).await;
        poller.start(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(coordinator.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let poller = poller(&coordinator, ScriptedWorker::succeeding());

        poller.start(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        poller.stop().await;
        poller.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(coordinator.fetch_calls(), 1);
        assert!(!poller.is_running().await);
        assert_eq!(poller.interval().await, None);
    }
}
