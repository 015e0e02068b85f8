//! Cross-thread texture hand-off.
//!
//! A producer thread (offscreen overlay/UI composition) hands textures to
//! the render thread through a single-slot exchange: a newly produced
//! value overwrites a not-yet-consumed one, and the producer never blocks
//! waiting for the consumer. The slot is a lock-free atomic pointer swap;
//! a mutex here would let the consumer stall the producer (or vice versa)
//! mid-frame.
//!
//! A resource the GPU may still be reading is never destroyed directly.
//! It goes into a [`RetireQueue`] paired with a [`Fence`] and is only
//! released once the fence reports the GPU finished with it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Completion marker for GPU work. `is_signaled` must be cheap and
/// non-blocking; it is polled once per frame while draining retired
/// resources.
pub trait Fence {
    fn is_signaled(&self) -> bool;
}

/// Single-slot hand-off with at-most-one-pending semantics.
pub struct SwapSlot<T> {
    slot: AtomicPtr<T>,
    _owns: PhantomData<Box<T>>,
}

// The raw pointer is only ever produced from `Box::into_raw` and consumed
// exactly once by `Box::from_raw` after an atomic swap, so values move
// between threads but are never aliased.
unsafe impl<T: Send> Send for SwapSlot<T> {}
unsafe impl<T: Send> Sync for SwapSlot<T> {}

impl<T> SwapSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    /// Publishes a value, returning the displaced one if the consumer had
    /// not picked it up yet. The caller decides whether a displaced GPU
    /// resource must be retired through a [`RetireQueue`] or can be
    /// dropped immediately.
    pub fn publish(&self, value: T) -> Option<T> {
        let fresh = Box::into_raw(Box::new(value));
        let old = self.slot.swap(fresh, Ordering::AcqRel);
        if old.is_null() {
            None
        } else {
            // Safety: `old` came from Box::into_raw in a previous publish
            // and the swap transferred sole ownership to us.
            Some(*unsafe { Box::from_raw(old) })
        }
    }

    /// Takes the pending value, if any.
    pub fn take(&self) -> Option<T> {
        let old = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if old.is_null() {
            None
        } else {
            // Safety: as in `publish`.
            Some(*unsafe { Box::from_raw(old) })
        }
    }
}

impl<T> Default for SwapSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SwapSlot<T> {
    fn drop(&mut self) {
        self.take();
    }
}

/// Deferred-deletion queue for resources the GPU may still be reading.
/// Resources release in retirement order; draining stops at the first
/// unsignaled fence so release order matches submission order.
pub struct RetireQueue<T, F: Fence> {
    pending: Mutex<VecDeque<(T, F)>>,
}

impl<T, F: Fence> RetireQueue<T, F> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn retire(&self, resource: T, fence: F) {
        self.pending.lock().push_back((resource, fence));
    }

    /// Removes and returns every resource whose fence has signaled,
    /// oldest first. Returned values are ready to drop.
    pub fn drain_ready(&self) -> Vec<T> {
        let mut pending = self.pending.lock();
        let mut ready = Vec::new();
        while let Some((_, fence)) = pending.front() {
            if !fence.is_signaled() {
                break;
            }
            let (resource, _) = pending.pop_front().expect("front checked above");
            ready.push(resource);
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl<T, F: Fence> Default for RetireQueue<T, F> {
    fn default() -> Self {
        Self::new()
    }
}
