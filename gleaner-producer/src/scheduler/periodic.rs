//! Cancellable fixed-interval task

use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A timer firing every `period` until stopped or dropped
///
/// The first tick fires one full period after spawning. Ticks run one at a
/// time; a tick that overruns the period makes the timer skip, not burst.
pub struct PeriodicTask {
    period: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tick() => {}
                }
            }
        });

        Self {
            period,
            token,
            handle,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cancels future ticks; idempotent
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
