//! Per-eye off-screen render target contract.

use crate::RigResult;
use glam::UVec2;

/// Opaque identifier for a color texture crossing the controller/session
/// boundary. Implementations mint a fresh handle on every (re)allocation
/// so a stale handle never silently aliases a new texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// An off-screen color+depth render target sized to one eye.
///
/// Lifecycle: `Uninitialized → Allocated → Active → Allocated → … →
/// Destroyed`. At most one target is Active at a time (single-threaded
/// render loop); activation for the next eye must not begin before the
/// previous eye's `deactivate` returns.
pub trait EyeTarget {
    /// Allocates (or reallocates) color+depth resources at exactly
    /// `size`. Old resources are released before new ones are visible;
    /// calling with the current size is a no-op. The fresh color
    /// attachment is cleared to opaque black, so the handle is a valid
    /// submittable image even if the eye is never rendered.
    fn init(&mut self, size: UVec2) -> RigResult<()>;

    fn size(&self) -> UVec2;

    /// Binds the target as the current render destination, sets the
    /// viewport to its full size and clears color+depth. Must be paired
    /// with [`deactivate`](Self::deactivate).
    fn activate(&mut self) -> RigResult<()>;

    /// Restores the previously bound render destination.
    fn deactivate(&mut self);

    /// Handle of the current color attachment.
    fn color_handle(&self) -> TextureHandle;
}
