//! Periodic job runner.

use std::time::Duration;

use async_trait::async_trait;
use greenspace_core::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A unit of periodic work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run once. Returns how many entities were changed.
    async fn tick(&self) -> Result<usize>;
}

/// Run `job` now and then every `interval` until `cancel` fires.
///
/// Errors are logged; the next tick runs regardless. A tick in progress is
/// abandoned when `cancel` fires.
pub async fn run_periodic<J: Job + ?Sized>(job: &J, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(job = job.name(), interval_secs = interval.as_secs(), "Job started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = job.tick() => outcome,
        };
        match outcome {
            Ok(0) => tracing::trace!(job = job.name(), "Tick changed nothing"),
            Ok(changed) => tracing::info!(job = job.name(), changed, "Tick completed"),
            Err(e) => tracing::error!(job = job.name(), error = %e, "Tick failed"),
        }
    }
    tracing::debug!(job = job.name(), "Job stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use greenspace_core::ServiceError;

    #[derive(Default)]
    struct Counting {
        ticks: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&self) -> Result<usize> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ServiceError::internal("boom"))
            } else {
                Ok(1)
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_every_interval() {
        let job = Arc::new(Counting::default());
        let cancel = CancellationToken::new();
        let handle = {
            let job = Arc::clone(&job);
            let cancel = cancel.clone();
            tokio::spawn(async move { run_periodic(job.as_ref(), Duration::from_secs(60), cancel).await })
        };

        settle().await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_the_loop() {
        let job = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let cancel = CancellationToken::new();
        let handle = {
            let job = Arc::clone(&job);
            let cancel = cancel.clone();
            tokio::spawn(async move { run_periodic(job.as_ref(), Duration::from_secs(10), cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 4);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_ticks() {
        let job = Counting::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_periodic(&job, Duration::from_secs(10), cancel).await;
        assert_eq!(job.ticks.load(Ordering::SeqCst), 0);
    }
}
