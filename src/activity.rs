// Activity tracker: last inbound request time, plus the wake signal that pulls the
// scheduler out of an idle sleep.

use futures_util::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

pub struct ActivityTracker {
    origin: Instant,
    /// Milliseconds since `origin` of the most recent touch.
    last_touch_ms: AtomicU64,
    idle: AtomicBool,
    wake: Notify,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// Construction counts as activity, so a fresh engine starts active.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_touch_ms: AtomicU64::new(0),
            idle: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Record a request. Safe from any number of concurrent handlers; only the
    /// most recent time is kept. Wakes the scheduler if it is idling.
    pub fn touch(&self) {
        let now_ms = self.origin.elapsed().as_millis() as u64;
        self.last_touch_ms.fetch_max(now_ms, Ordering::SeqCst);
        if self.idle.load(Ordering::SeqCst) {
            self.wake.notify_one();
        }
    }

    /// Time since the last touch.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_touch_ms.load(Ordering::SeqCst));
        self.origin.elapsed().saturating_sub(last)
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    /// Set by the scheduler when it changes mode.
    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    /// Drop a wake left over from an earlier idle period, so a touch that already
    /// pulled the scheduler back to active cannot cut the next idle sleep short.
    pub(crate) fn clear_wake(&self) {
        let _ = self.wake.notified().now_or_never();
    }

    /// Resolves after a touch while idle. A touch that lands before the scheduler
    /// starts waiting is not lost.
    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_for_grows_until_touched() {
        let tracker = ActivityTracker::new();
        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(tracker.idle_for() >= Duration::from_secs(7));
        tracker.touch();
        assert!(tracker.idle_for() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_while_active_does_not_leave_a_wake_permit() {
        let tracker = ActivityTracker::new();
        tracker.touch();
        let woke = tokio::time::timeout(Duration::from_secs(1), tracker.woken()).await;
        assert!(woke.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_wake_does_not_fire_later() {
        let tracker = ActivityTracker::new();
        tracker.set_idle(true);
        tracker.touch();
        tracker.set_idle(false);
        tracker.clear_wake();
        tracker.set_idle(true);
        let woke = tokio::time::timeout(Duration::from_secs(1), tracker.woken()).await;
        assert!(woke.is_err());

        tracker.touch();
        let woke = tokio::time::timeout(Duration::from_secs(1), tracker.woken()).await;
        assert!(woke.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_while_idle_wakes_the_scheduler() {
        let tracker = ActivityTracker::new();
        tracker.set_idle(true);
        tracker.touch();
        let woke = tokio::time::timeout(Duration::from_secs(1), tracker.woken()).await;
        assert!(woke.is_ok());
    }
}
