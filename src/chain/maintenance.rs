//! Debounced background maintenance.
//!
//! Every processed submission calls [`MaintenanceScheduler::notify_activity`].
//! The flush runs once the channel traffic has been quiet for a full period,
//! so a burst of play results in a single flush.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Work performed by a flush. Must be idempotent.
pub trait FlushTask: Send + Sync + 'static {
    fn flush(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

struct Shared {
    pending: AtomicUsize,
    quiet_period: Duration,
    task: Arc<dyn FlushTask>,
    flush_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct MaintenanceScheduler {
    shared: Arc<Shared>,
}

impl MaintenanceScheduler {
    pub fn new(task: Arc<dyn FlushTask>, quiet_period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                quiet_period,
                task,
                flush_lock: Mutex::new(()),
            }),
        }
    }

    /// Record activity. Arms the timer unless one is already waiting.
    pub fn notify_activity(&self) {
        let previous = self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.wait_for_quiet().await });
        }
    }

    /// Number of submissions seen since the last flush.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Run the flush now, serialized with timer-driven flushes.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.shared.flush().await
    }
}

impl Shared {
    async fn wait_for_quiet(&self) {
        loop {
            let seen = self.pending.load(Ordering::Acquire);
            tokio::time::sleep(self.quiet_period).await;
            // Only the timer resets the counter, so a failed exchange means
            // more activity arrived during the sleep.
            if self
                .pending
                .compare_exchange(seen, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            debug!("Activity during quiet period, postponing flush");
        }
        if let Err(e) = self.flush().await {
            error!("Scheduled flush failed: {:#}", e);
        }
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let _guard = self.flush_lock.lock().await;
        info!("Running maintenance flush");
        self.task.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingFlush {
        runs: AtomicUsize,
    }

    impl FlushTask for CountingFlush {
        fn flush(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn make_scheduler() -> (MaintenanceScheduler, Arc<CountingFlush>) {
        let task = Arc::new(CountingFlush::default());
        let scheduler = MaintenanceScheduler::new(task.clone(), Duration::from_secs(5));
        (scheduler, task)
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_activity_flushes_after_quiet_period() {
        let (scheduler, task) = make_scheduler();
        scheduler.notify_activity();
        assert_eq!(scheduler.pending(), 1);

        advance(4).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        advance(2).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_flush() {
        let (scheduler, task) = make_scheduler();
        for _ in 0..10 {
            scheduler.notify_activity();
            advance(1).await;
        }
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        advance(12).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_after_flush_rearms() {
        let (scheduler, task) = make_scheduler();
        scheduler.notify_activity();
        advance(6).await;
        scheduler.notify_activity();
        advance(6).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forced_flush_is_repeatable() {
        let (scheduler, task) = make_scheduler();
        tokio_test::assert_ok!(scheduler.flush().await);
        tokio_test::assert_ok!(scheduler.flush().await);
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }
}
