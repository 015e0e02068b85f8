//! Stereo frame orchestration.
//!
//! The [`StereoFrameController`] drives one frame of stereoscopic
//! rendering: per eye (in the order the HMD recommends) it composes the
//! projection and view transforms on an explicit
//! [`stereo_core::RenderContext`], activates that eye's off-screen target,
//! invokes the scene callback, and finally submits both eye images with
//! the poses that produced them.
//!
//! The HMD runtime is behind the [`HmdSession`] trait; GPU render targets
//! are behind [`EyeTarget`]. [`DebugHmd`] is a software session used when
//! no hardware is attached (and by the tests). [`channel`] carries the
//! cross-thread texture hand-off used for offscreen-composited overlays.

pub mod channel;
pub mod controller;
pub mod debug_hmd;
pub mod session;
pub mod target;

pub use channel::{Fence, RetireQueue, SwapSlot};
pub use controller::{
    ControllerConfig, EyeSubmission, FrameReport, FrameSubmission, SceneRenderer,
    StereoFrameController,
};
pub use debug_hmd::DebugHmd;
pub use session::{DistortionCaps, HmdSession, TrackingCaps};
pub use target::{EyeTarget, TextureHandle};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StereoError {
    #[error(transparent)]
    Config(#[from] stereo_core::ConfigError),
    #[error("tracking configuration failed: {0}")]
    Tracking(String),
    #[error("eye target allocation failed: {0}")]
    TargetAllocation(String),
    #[error("present failed: {0}")]
    Present(String),
}

pub type RigResult<T> = Result<T, StereoError>;
