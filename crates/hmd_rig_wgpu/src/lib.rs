//! wgpu backend for the stereo rig.
//!
//! - [`GfxContext`] owns the adapter/device/queue and the mirror-window
//!   surface.
//! - [`WgpuEyeTarget`] implements the per-eye off-screen target contract
//!   with color+depth textures, publishing its attachments through a
//!   shared [`TargetRegistry`] so the scene and the presenter can reach
//!   them by eye or by handle.
//! - [`DistortionPass`] applies barrel distortion and chromatic-aberration
//!   correction while compositing both eyes side-by-side.
//! - [`DesktopHmd`] is the `HmdSession` used without headset hardware:
//!   debug-HMD optics and tracking plus the distortion pass presenting
//!   into a desktop window.
//! - [`WgpuFence`] adapts queue completion callbacks to the retire-queue
//!   fence contract.

pub mod context;
pub mod desktop;
pub mod distortion;
pub mod fence;
pub mod target;

pub use context::GfxContext;
pub use desktop::DesktopHmd;
pub use distortion::{DistortionParams, DistortionPass};
pub use fence::WgpuFence;
pub use target::{EyeAttachments, TargetRegistry, WgpuEyeTarget, COLOR_FORMAT, DEPTH_FORMAT};

/// Converts GL-style clip space (the convention of the core math: Y up,
/// z in [−1, 1]) to what wgpu expects (z in [0, 1]).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: glam::Mat4 = glam::Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);
