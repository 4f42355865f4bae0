//! Periodic Background Tasks
//!
//! The pipeline owns exactly two background loops (metric sampling and
//! performance checking). Both share the lifecycle implemented here:
//! starting twice is a no-op, and stopping cancels the loop then joins it
//! with a bounded timeout so no tick runs after `stop` returns.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop` waits for the loop to observe cancellation
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A named, restartable interval loop.
pub struct PeriodicTask {
    name: String,
    state: Mutex<Option<RunningTask>>,
}

impl PeriodicTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a loop is currently alive.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the loop, calling `tick` once per `period` (first call immediately).
    ///
    /// Returns `false` without spawning if the loop is already running.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(running) = state.as_ref() {
            if !running.handle.is_finished() {
                debug!(task = %self.name, "Task already running");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = self.name.clone();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            info!(task = %name, ?period, "Background task started");

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick().await,
                }
            }

            info!(task = %name, "Background task stopped");
        });

        *state = Some(RunningTask { cancel, handle });
        true
    }

    /// Cancel the loop and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` once the loop has observably halted, `false` if nothing
    /// was running or the join timed out (the task is then aborted).
    pub async fn stop(&self, timeout: Duration) -> bool {
        let running = self.state.lock().take();
        let Some(running) = running else {
            return false;
        };

        running.cancel.cancel();
        let abort = running.handle.abort_handle();

        match tokio::time::timeout(timeout, running.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(task = %self.name, "Background task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!(task = %self.name, ?timeout, "Background task did not stop in time, aborting");
                abort.abort();
                false
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_runs_ticks() {
        let task = PeriodicTask::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        assert!(task.start(Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);
        assert!(!task.is_running());
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let task = PeriodicTask::new("test");

        assert!(task.start(Duration::from_secs(60), || async {}));
        assert!(!task.start(Duration::from_secs(60), || async {}));

        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let task = PeriodicTask::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        task.start(Duration::from_millis(5), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);

        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let task = PeriodicTask::new("idle");
        assert!(!task.stop(DEFAULT_STOP_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let task = PeriodicTask::new("test");

        assert!(task.start(Duration::from_secs(60), || async {}));
        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);
        assert!(task.start(Duration::from_secs(60), || async {}));
        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_stop_after_loop_already_exited() {
        let task = PeriodicTask::new("crashing");

        assert!(task.start(Duration::from_millis(5), || async {
            panic!("tick failed");
        }));
        for _ in 0..100 {
            if !task.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!task.is_running());

        let stopped = tokio::time::timeout(
            Duration::from_secs(1),
            task.stop(Duration::from_secs(30)),
        )
        .await
        .expect("stop must not hang on an exited loop");
        assert!(stopped);
        assert!(!task.stop(DEFAULT_STOP_TIMEOUT).await);

        // A crashed loop can be started again.
        assert!(task.start(Duration::from_secs(60), || async {}));
        assert!(task.stop(DEFAULT_STOP_TIMEOUT).await);
    }
}
