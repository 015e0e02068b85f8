//! The contract consumed from the HMD runtime.

use crate::{controller::FrameSubmission, RigResult};
use bitflags::bitflags;
use glam::{UVec2, Vec3};
use stereo_core::{Eye, EyePose, FovPort};

bitflags! {
    /// Tracking capabilities requested at session configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackingCaps: u32 {
        const ORIENTATION        = 1 << 0;
        const POSITION           = 1 << 1;
        const MAG_YAW_CORRECTION = 1 << 2;
    }
}

bitflags! {
    /// Distortion-stage capabilities. Forwarded opaquely to the session;
    /// the frame controller does not interpret these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DistortionCaps: u32 {
        const CHROMATIC       = 1 << 0;
        const VIGNETTE        = 1 << 1;
        const TIME_WARP       = 1 << 2;
        const OVERDRIVE       = 1 << 3;
        const LOW_PERSISTENCE = 1 << 4;
    }
}

impl Default for DistortionCaps {
    fn default() -> Self {
        DistortionCaps::CHROMATIC | DistortionCaps::VIGNETTE | DistortionCaps::TIME_WARP
    }
}

/// An attached HMD runtime: tracking, per-eye optics metadata, and the
/// begin/end frame pair that brackets distortion correction and present.
///
/// `begin_frame` and `end_frame` must be called exactly once per displayed
/// frame, in that order. An unmatched `begin_frame` can desynchronize the
/// runtime's compositor for all subsequent frames, so the controller
/// completes the pair even when an eye fails to render.
pub trait HmdSession {
    /// The order in which eyes should be rendered and submitted. Some
    /// panels scan out one eye first; honoring this order is required for
    /// the runtime's latency compensation.
    fn eye_render_order(&self) -> [Eye; 2] {
        Eye::BOTH
    }

    fn default_fov(&self, eye: Eye) -> FovPort;

    /// Ideal pre-distortion render-target size for `eye` at the given
    /// pixel density (1.0 = one texel per display pixel at screen center).
    fn recommended_target_size(&self, eye: Eye, fov: FovPort, pixel_density: f32) -> UVec2;

    fn configure_tracking(&mut self, caps: TrackingCaps) -> RigResult<()>;

    fn distortion_caps(&self) -> DistortionCaps {
        DistortionCaps::default()
    }

    fn interpupillary_distance(&self) -> f32;

    fn player_eye_height(&self) -> f32;

    fn begin_frame(&mut self, frame_index: u64) -> RigResult<()>;

    /// Samples the head pose for rendering `eye` of frame `frame_index`.
    /// Called inside the per-eye loop, as late as possible before the eye
    /// is drawn, to minimize motion-to-photon latency. `view_offset` is
    /// supplied for runtimes that predict per-eye; implementations are
    /// free to ignore it.
    fn eye_pose(&mut self, frame_index: u64, eye: Eye, view_offset: Vec3) -> EyePose;

    /// Hands over both eye images and the poses that were actually used
    /// to render them (never newer ones: time-warp computes its
    /// reprojection delta against the render pose), then distorts and
    /// presents.
    fn end_frame(&mut self, submission: &FrameSubmission) -> RigResult<()>;
}
