//! Pong watchdog for the broker connection

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tracks pong arrivals and trips when they stop.
///
/// The reader loop calls [`touch`](Self::touch) on every pong; the watch
/// loop checks the silence on a fixed interval and cancels the connection
/// token once it exceeds `max_wait`.
pub struct KeepaliveWatchdog {
    started: Instant,
    last_pong_ms: AtomicU64,
    max_wait: Duration,
}

impl KeepaliveWatchdog {
    /// Create a watchdog whose clock starts now
    pub fn new(max_wait: Duration) -> Self {
        Self {
            started: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
            max_wait,
        }
    }

    /// Record a pong
    pub fn touch(&self) {
        let now = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_pong_ms.store(now, Ordering::Relaxed);
    }

    /// Time since the last pong, or since creation if none arrived
    pub fn silence(&self) -> Duration {
        let last = Duration::from_millis(self.last_pong_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// Check every `check_interval` until the silence exceeds `max_wait`.
    ///
    /// Returns the observed silence after cancelling `cancel`, or `None` if
    /// `cancel` fired first.
    pub async fn watch(
        &self,
        check_interval: Duration,
        cancel: &CancellationToken,
    ) -> Option<Duration> {
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = ticker.tick() => {
                    let silence = self.silence();
                    if silence > self.max_wait {
                        tracing::warn!(
                            "No pong for {:?} (max {:?}), closing connection",
                            silence,
                            self.max_wait
                        );
                        cancel.cancel();
                        return Some(silence);
                    }
                    tracing::trace!(?silence, "Keepalive ok");
                }
            }
        }
    }
}
