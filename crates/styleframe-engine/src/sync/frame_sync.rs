use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::GraphicsContext;
use crate::error::SyncError;
use crate::logging::TAG_SYNC;

use super::fence::{Fence, FenceStatus, GpuFence};
use super::{POLL_INTERVAL, PollBackoff};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Give up after this long. `None` waits until the fence resolves.
    pub timeout: Option<Duration>,
    /// Sleep between polls of a fence that is still pending.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1)),
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Measures how long submitted GPU work takes to complete.
///
/// Pacing and telemetry only; rendering correctness never depends on it.
#[derive(Debug, Clone, Default)]
pub struct FrameSync {
    config: SyncConfig,
}

impl FrameSync {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Fences everything submitted on `context` and waits for it.
    ///
    /// Returns the wall-clock time spent waiting.
    pub async fn wait_for_completion(
        &self,
        context: &Arc<GraphicsContext>,
    ) -> Result<Duration, SyncError> {
        self.wait(GpuFence::insert(context)).await
    }

    /// Polls `fence` with zero timeout until it resolves, backing off between
    /// polls. The fence is dropped before returning.
    pub async fn wait<F: Fence>(&self, mut fence: F) -> Result<Duration, SyncError> {
        let start = Instant::now();
        let mut backoff = PollBackoff::new(self.config.poll_interval);

        let outcome = loop {
            match fence.status() {
                FenceStatus::Signaled => break Ok(()),
                FenceStatus::Failed(reason) => break Err(SyncError::WaitFailed(reason)),
                FenceStatus::Pending => {
                    if let Some(timeout) = self.config.timeout {
                        if start.elapsed() >= timeout {
                            break Err(SyncError::Timeout(timeout));
                        }
                    }
                    backoff.wait().await;
                }
            }
        };
        drop(fence);

        match outcome {
            Ok(()) => Ok(start.elapsed()),
            Err(e) => {
                log::warn!(target: TAG_SYNC, "{e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Signals after a fixed number of pending polls.
    struct CountdownFence {
        pending: usize,
        polls: usize,
        released: Arc<AtomicBool>,
    }

    impl CountdownFence {
        fn new(pending: usize) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            (
                Self {
                    pending,
                    polls: 0,
                    released: Arc::clone(&released),
                },
                released,
            )
        }
    }

    impl Fence for CountdownFence {
        fn status(&mut self) -> FenceStatus {
            self.polls += 1;
            if self.polls > self.pending {
                FenceStatus::Signaled
            } else {
                FenceStatus::Pending
            }
        }
    }

    impl Drop for CountdownFence {
        fn drop(&mut self) {
            self.released.store(true, Ordering::Relaxed);
        }
    }

    /// Signals once a deadline passes; counts status queries.
    struct DeadlineFence {
        deadline: Instant,
        polls: Arc<AtomicUsize>,
    }

    impl Fence for DeadlineFence {
        fn status(&mut self) -> FenceStatus {
            self.polls.fetch_add(1, Ordering::Relaxed);
            if Instant::now() >= self.deadline {
                FenceStatus::Signaled
            } else {
                FenceStatus::Pending
            }
        }
    }

    struct FailingFence;

    impl Fence for FailingFence {
        fn status(&mut self) -> FenceStatus {
            FenceStatus::Failed("device removed".into())
        }
    }

    #[tokio::test]
    async fn signaled_fence_returns_immediately() {
        let (fence, released) = CountdownFence::new(0);
        let elapsed = FrameSync::default().wait(fence).await.unwrap();

        assert!(elapsed < Duration::from_millis(50));
        assert!(released.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn pending_fence_is_polled_until_signaled() {
        let (fence, released) = CountdownFence::new(5);
        let elapsed = FrameSync::default().wait(fence).await.unwrap();

        assert!(elapsed >= Duration::ZERO);
        assert!(released.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn slow_fence_is_not_spun_on() {
        let polls = Arc::new(AtomicUsize::new(0));
        let fence = DeadlineFence {
            deadline: Instant::now() + Duration::from_millis(20),
            polls: Arc::clone(&polls),
        };

        let elapsed = FrameSync::default().wait(fence).await.unwrap();

        assert!(elapsed >= Duration::from_millis(20));
        // 4 yields plus at most one poll per millisecond slept.
        let polls = polls.load(Ordering::Relaxed);
        assert!(polls <= 30, "{polls} polls for a 20 ms wait");
    }

    #[tokio::test]
    async fn failed_wait_is_reported() {
        let result = FrameSync::default().wait(FailingFence).await;
        assert!(matches!(result, Err(SyncError::WaitFailed(_))));
    }

    #[tokio::test]
    async fn never_signaled_fence_times_out() {
        let sync = FrameSync::new(SyncConfig {
            timeout: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        let (fence, released) = CountdownFence::new(usize::MAX);
        let result = sync.wait(fence).await;

        assert!(matches!(result, Err(SyncError::Timeout(_))));
        assert!(released.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn gpu_fence_signals_after_submission() {
        let Some((_surface, ctx)) = crate::device::test_context(4, 4) else {
            return;
        };
        ctx.queue().submit(std::iter::empty());

        let elapsed = FrameSync::default().wait_for_completion(&ctx).await.unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }
}
