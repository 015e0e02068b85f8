//! Software HMD session, used when no hardware is attached.

use crate::{
    controller::FrameSubmission,
    session::{DistortionCaps, HmdSession, TrackingCaps},
    RigResult, StereoError,
};
use glam::{Quat, UVec2, Vec3};
use stereo_core::{Eye, EyePose, FovPort};

/// A debug HMD with the optics of a DK2-class device and a synthetic,
/// smooth head motion so desktop runs still exercise the full transform
/// path. Also used by the tests: it accounts begin/end pairing strictly.
pub struct DebugHmd {
    ipd: f32,
    eye_height: f32,
    animate: bool,
    in_frame: bool,
    frames_begun: u64,
    frames_ended: u64,
}

/// Left-eye field of view; the right eye mirrors left/right tangents.
const LEFT_FOV: FovPort = FovPort {
    up_tan: 0.96,
    down_tan: 1.09,
    left_tan: 0.87,
    right_tan: 0.90,
};

/// Ideal pre-distortion target size per eye at density 1.0.
const RECOMMENDED: UVec2 = UVec2::new(1182, 1461);

impl Default for DebugHmd {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugHmd {
    pub fn new() -> Self {
        Self {
            ipd: 0.064,
            eye_height: 1.675,
            animate: true,
            in_frame: false,
            frames_begun: 0,
            frames_ended: 0,
        }
    }

    pub fn with_ipd(mut self, ipd: f32) -> Self {
        self.ipd = ipd;
        self
    }

    /// Disables the synthetic head motion (poses become identity at eye
    /// height). Tests use this for deterministic matrices.
    pub fn with_static_pose(mut self) -> Self {
        self.animate = false;
        self
    }

    pub fn frames_begun(&self) -> u64 {
        self.frames_begun
    }

    pub fn frames_ended(&self) -> u64 {
        self.frames_ended
    }

    /// Smooth look-around driven by the frame index, assuming a nominal
    /// 75 Hz refresh. Deterministic so captures are reproducible.
    fn synthetic_pose(&self, frame_index: u64) -> EyePose {
        let t = frame_index as f32 / 75.0;
        let yaw = (t * 0.31).sin() * 0.45;
        let pitch = (t * 0.23).sin() * 0.15;
        let bob = (t * 1.9).sin() * 0.008;
        EyePose::new(
            (Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch)).normalize(),
            Vec3::new(0.0, self.eye_height + bob, 0.0),
        )
    }
}

impl HmdSession for DebugHmd {
    fn default_fov(&self, eye: Eye) -> FovPort {
        match eye {
            Eye::Left => LEFT_FOV,
            Eye::Right => FovPort::new(
                LEFT_FOV.up_tan,
                LEFT_FOV.down_tan,
                LEFT_FOV.right_tan,
                LEFT_FOV.left_tan,
            ),
        }
    }

    fn recommended_target_size(&self, _eye: Eye, _fov: FovPort, pixel_density: f32) -> UVec2 {
        UVec2::new(
            (RECOMMENDED.x as f32 * pixel_density).ceil() as u32,
            (RECOMMENDED.y as f32 * pixel_density).ceil() as u32,
        )
    }

    fn configure_tracking(&mut self, _caps: TrackingCaps) -> RigResult<()> {
        // Nothing to attach; every capability is simulated.
        Ok(())
    }

    fn distortion_caps(&self) -> DistortionCaps {
        DistortionCaps::CHROMATIC | DistortionCaps::VIGNETTE
    }

    fn interpupillary_distance(&self) -> f32 {
        self.ipd
    }

    fn player_eye_height(&self) -> f32 {
        self.eye_height
    }

    fn begin_frame(&mut self, _frame_index: u64) -> RigResult<()> {
        if self.in_frame {
            return Err(StereoError::Present(
                "begin_frame while a frame is already open".into(),
            ));
        }
        self.in_frame = true;
        self.frames_begun += 1;
        Ok(())
    }

    fn eye_pose(&mut self, frame_index: u64, _eye: Eye, _view_offset: Vec3) -> EyePose {
        if self.animate {
            self.synthetic_pose(frame_index)
        } else {
            EyePose::new(Quat::IDENTITY, Vec3::new(0.0, self.eye_height, 0.0))
        }
    }

    fn end_frame(&mut self, _submission: &FrameSubmission) -> RigResult<()> {
        if !self.in_frame {
            return Err(StereoError::Present(
                "end_frame without a matching begin_frame".into(),
            ));
        }
        self.in_frame = false;
        self.frames_ended += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_is_accounted() {
        let mut hmd = DebugHmd::new();
        hmd.begin_frame(1).unwrap();
        assert!(hmd.begin_frame(2).is_err());
        let submission = dummy_submission(&mut hmd);
        hmd.end_frame(&submission).unwrap();
        assert!(hmd.end_frame(&submission).is_err());
        assert_eq!((hmd.frames_begun(), hmd.frames_ended()), (1, 1));
    }

    #[test]
    fn poses_stay_unit_length() {
        let mut hmd = DebugHmd::new();
        for frame in (0..2000).step_by(37) {
            let pose = hmd.eye_pose(frame, Eye::Left, Vec3::ZERO);
            assert!((pose.orientation.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn right_eye_fov_mirrors_left() {
        let hmd = DebugHmd::new();
        let left = hmd.default_fov(Eye::Left);
        let right = hmd.default_fov(Eye::Right);
        assert_eq!(left.left_tan, right.right_tan);
        assert_eq!(left.right_tan, right.left_tan);
        assert_eq!(left.up_tan, right.up_tan);
    }

    fn dummy_submission(hmd: &mut DebugHmd) -> FrameSubmission {
        use crate::controller::EyeSubmission;
        use crate::target::TextureHandle;
        use stereo_core::{EyeRenderDescriptor, PerEye};

        let eyes = PerEye::from_fn(|eye| EyeSubmission {
            eye,
            texture: TextureHandle(1),
            pose: EyePose::default(),
            descriptor: EyeRenderDescriptor::compute(
                eye,
                hmd.default_fov(eye),
                RECOMMENDED,
                hmd.interpupillary_distance(),
                1.0,
            )
            .unwrap(),
        });
        FrameSubmission {
            frame_index: 1,
            eyes,
        }
    }
}
