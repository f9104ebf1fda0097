//! Debounced reload trigger.
//!
//! The first trigger opens a fixed quiet window; every trigger that arrives
//! inside the window collapses into the single reload that runs when it
//! closes. Triggers arriving while that reload runs open the next window.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

pub struct ReloadScheduler {
    trigger: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl ReloadScheduler {
    pub fn spawn<F, Fut>(quiet_period: Duration, reload: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (trigger, mut rx) = mpsc::unbounded_channel::<()>();

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                sleep(quiet_period).await;

                let mut collapsed = 0usize;
                while rx.try_recv().is_ok() {
                    collapsed += 1;
                }
                debug!("Reloading after quiet period ({} triggers collapsed)", collapsed);

                reload().await;
            }
        });

        Self { trigger, task }
    }

    /// Request a reload; false once the scheduler has stopped
    pub fn schedule(&self) -> bool {
        self.trigger.send(()).is_ok()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(quiet: Duration) -> (ReloadScheduler, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let scheduler = ReloadScheduler::spawn(quiet, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (scheduler, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_reload() {
        let (scheduler, runs) = counting(Duration::from_millis(750));

        for _ in 0..5 {
            assert!(scheduler.schedule());
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_reload_separately() {
        let (scheduler, runs) = counting(Duration::from_millis(750));

        scheduler.schedule();
        sleep(Duration::from_secs(1)).await;
        scheduler.schedule();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reload() {
        let (scheduler, runs) = counting(Duration::from_millis(750));

        scheduler.schedule();
        scheduler.stop();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_stopped());
        assert!(!scheduler.schedule());
    }
}
