//! Cancellable periodic tasks and log throttling.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A spawned loop that runs `tick` every `period`.
///
/// Ticks are serialized: the next one starts only after the previous one
/// finished, and ticks missed meanwhile are skipped. Stopping drops an
/// in-flight tick at its next await point, so nothing it would have done
/// after that point happens.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the loop. The first tick fires immediately.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
            tracing::debug!(task = name, "periodic task stopped");
        });
        tracing::debug!(
            task = name,
            period_ms = period.as_millis() as u64,
            "periodic task started"
        );
        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.handle.await {
            if !err.is_cancelled() {
                tracing::error!(task = self.name, error = %err, "periodic task panicked");
            }
        }
    }
}

/// Allow one log line per window; count what was suppressed in between.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(suppressed)` when a line may be logged now, with the number of
    /// lines dropped since the previous one.
    pub fn admit(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.duration_since(last) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
