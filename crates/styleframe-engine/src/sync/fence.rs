use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::device::GraphicsContext;

/// Result of a zero-timeout fence query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceStatus {
    Pending,
    Signaled,
    Failed(String),
}

/// A synchronization point after previously submitted GPU work.
///
/// `status` must not block. Dropping the fence releases it.
pub trait Fence {
    fn status(&mut self) -> FenceStatus;
}

/// Fence over `Queue::on_submitted_work_done`.
pub struct GpuFence {
    context: Arc<GraphicsContext>,
    signaled: Arc<AtomicBool>,
}

impl GpuFence {
    /// Inserts a fence after all work submitted to the context's queue so far.
    pub fn insert(context: &Arc<GraphicsContext>) -> Self {
        let signaled = Arc::new(AtomicBool::new(false));
        {
            let signaled = Arc::clone(&signaled);
            context.queue().on_submitted_work_done(move || {
                signaled.store(true, Ordering::Release);
            });
        }
        Self {
            context: Arc::clone(context),
            signaled,
        }
    }

    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

impl Fence for GpuFence {
    fn status(&mut self) -> FenceStatus {
        if self.is_signaled() {
            return FenceStatus::Signaled;
        }
        if !self.context.is_alive() {
            return FenceStatus::Failed(format!("{} lost", self.context.id()));
        }

        // Poll drives the callback; it never waits.
        if let Err(e) = self.context.device().poll(wgpu::PollType::Poll) {
            return FenceStatus::Failed(e.to_string());
        }

        if self.is_signaled() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Pending
        }
    }
}
