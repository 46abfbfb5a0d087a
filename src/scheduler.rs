/*!
 * # Polling Scheduler
 *
 * Generic cooperative-task primitive used by the payment orchestrator and the
 * generation poller: runs an async callback on a fixed wall-clock interval,
 * optionally after an initial delay, and guarantees that cancellation is
 * idempotent and always reachable.
 */

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::trace;

/// Handle to one scheduled polling task.
///
/// `stop` is an idempotent abort; stopping an already-stopped or never-started
/// handle is a safe no-op. Dropping the handle also cancels the task, so a
/// forgotten handle cannot leak its interval.
#[derive(Debug, Default)]
pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// A handle that was never armed. Stopping it is a no-op.
    pub fn idle() -> Self {
        Self { task: None }
    }

    /// Cancels the scheduled task. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            trace!("polling task cancelled");
        }
    }

    /// Whether a task is still armed (stopped handles report false).
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fixed-interval scheduler over the tokio runtime.
pub struct PollingScheduler;

impl PollingScheduler {
    /// Spawns `callback` every `interval_between`, the first run after
    /// `initial_delay` (pass `Duration::ZERO` to start on the first tick).
    ///
    /// Callback runs never overlap: the next tick is awaited only after the
    /// previous run returned, and missed ticks are skipped so the cadence
    /// stays aligned to the wall clock rather than to callback latency. A
    /// slow response simply means the next tick's result may supersede it.
    pub fn start<F, Fut>(
        mut callback: F,
        interval_between: Duration,
        initial_delay: Duration,
    ) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = tokio::spawn(async move {
            if !initial_delay.is_zero() {
                sleep(initial_delay).await;
            }
            let mut ticker = interval(interval_between);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                callback().await;
            }
        });
        PollHandle { task: Some(task) }
    }
}
