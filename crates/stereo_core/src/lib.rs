//! Core math for stereoscopic HMD rendering.
//!
//! - Matrix stacks with scoped push/pop and an explicit [`RenderContext`]
//!   holding the projection and modelview stacks.
//! - Off-axis perspective projection built from four half-angle tangents
//!   ([`FovPort`]); HMD lenses are not centered over the panel, so a
//!   symmetric `perspective(fov_y, aspect, ...)` helper cannot be used.
//! - Per-eye render parameters ([`EyeRenderDescriptor`]): projection,
//!   half-IPD view offset and scaled render-target size.
//!
//! Conventions: `glam` column-major matrices, right-handed, −Z forward,
//! GL-style clip space (z in [−1, 1]). Backends that need 0..1 depth
//! convert at the last stage.

pub mod descriptor;
pub mod eye;
pub mod pose;
pub mod projection;
pub mod stack;

pub use descriptor::EyeRenderDescriptor;
pub use eye::{Eye, PerEye};
pub use pose::EyePose;
pub use projection::{FovPort, DEFAULT_ZFAR, DEFAULT_ZNEAR};
pub use stack::{MatrixStack, RenderContext};

use thiserror::Error;

/// Session-configuration failures. These are reported before the render
/// loop starts and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("degenerate field of view (all four half-angle tangents must be positive): {0:?}")]
    DegenerateFov(FovPort),
    #[error("render scale {0} outside (0, 1]")]
    InvalidRenderScale(f32),
    #[error("interpupillary distance must be positive, got {0}")]
    InvalidIpd(f32),
    #[error("eye render target would be zero-sized ({0}x{1})")]
    ZeroTargetSize(u32, u32),
}
