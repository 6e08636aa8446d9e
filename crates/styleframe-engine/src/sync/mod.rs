//! GPU fence synchronization.
//!
//! Fences are polled with a zero timeout. Between polls the task yields a few
//! times and then sleeps on the tokio timer, so waiting never blocks or spins
//! the driver thread. Waits need a tokio runtime with the time driver enabled.
//! Timings are telemetry only.

mod fence;
mod frame_sync;

pub use fence::{Fence, FenceStatus, GpuFence};
pub use frame_sync::{FrameSync, SyncConfig};

use std::time::Duration;

use crate::device::GraphicsContext;
use crate::error::SyncError;

/// Default spacing between polls once the initial yields are spent.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Pacing between polls of pending GPU work.
pub(crate) struct PollBackoff {
    yields_left: u32,
    interval: Duration,
}

impl PollBackoff {
    /// Bare yields before switching to timed sleeps.
    const YIELDS: u32 = 4;

    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            yields_left: Self::YIELDS,
            interval,
        }
    }

    pub(crate) async fn wait(&mut self) {
        if self.yields_left > 0 {
            self.yields_left -= 1;
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Polls the device until `done` reports true, backing off between polls.
pub(crate) async fn poll_until(
    context: &GraphicsContext,
    mut done: impl FnMut() -> bool,
) -> Result<(), SyncError> {
    let mut backoff = PollBackoff::new(POLL_INTERVAL);
    loop {
        if done() {
            return Ok(());
        }
        if !context.is_alive() {
            return Err(SyncError::WaitFailed(format!("{} lost", context.id())));
        }

        context
            .device()
            .poll(wgpu::PollType::Poll)
            .map_err(|e| SyncError::WaitFailed(e.to_string()))?;

        if done() {
            return Ok(());
        }
        backoff.wait().await;
    }
}
