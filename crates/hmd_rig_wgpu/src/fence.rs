use hmd_rig::Fence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A [`Fence`] that signals once all GPU work submitted to the queue
/// before its creation has completed. Create it immediately after the
/// last submission that reads the guarded resource.
pub struct WgpuFence {
    signaled: Arc<AtomicBool>,
}

impl WgpuFence {
    pub fn new(queue: &wgpu::Queue) -> Self {
        let signaled = Arc::new(AtomicBool::new(false));
        let flag = signaled.clone();
        queue.on_submitted_work_done(move || {
            flag.store(true, Ordering::Release);
        });
        Self { signaled }
    }
}

impl Fence for WgpuFence {
    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}
