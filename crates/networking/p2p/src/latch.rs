use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio::time::Duration;

/// A single-use countdown synchroniser: "wait up to `timeout` for `count`
/// completions, whichever comes first." Rearmed each loop iteration by
/// constructing a fresh one and handing clones of the new `Arc` to whatever
/// completion callbacks get dispatched this round; stale latches from a
/// prior iteration simply get dropped once no one references them.
pub struct CountdownLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        CountdownLatch {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    /// Counts down by one. Wakes any waiter once the count reaches zero.
    /// Safe to call more times than the initial count (e.g. a stray late
    /// callback after the loop moved on) — it saturates at zero.
    pub fn count_down(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == 0 { None } else { Some(n - 1) }
            });
        if prev == Ok(1) {
            self.notify.notify_waiters();
        }
    }

    /// Waits until the count reaches zero or `timeout` elapses, whichever
    /// is sooner.
    pub async fn wait(&self, timeout: Duration) {
        if self.remaining.load(Ordering::Acquire) == 0 {
            return;
        }
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn counts_down_to_zero_and_wakes_waiter() {
        let latch = Arc::new(CountdownLatch::new(2));
        let l2 = latch.clone();
        tokio::spawn(async move {
            l2.count_down();
            l2.count_down();
        });
        latch.wait(Duration::from_secs(5)).await;
        assert_eq!(latch.remaining.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn times_out_without_enough_count_downs() {
        let latch = CountdownLatch::new(2);
        latch.count_down();
        let start = tokio::time::Instant::now();
        latch.wait(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn extra_count_downs_saturate() {
        let latch = CountdownLatch::new(1);
        latch.count_down();
        latch.count_down();
        latch.count_down();
        latch.wait(Duration::from_millis(5)).await;
        assert_eq!(latch.remaining.load(Ordering::Acquire), 0);
    }
}
