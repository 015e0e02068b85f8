//! `HmdSession` for running without headset hardware: debug-HMD optics
//! and tracking, with the distortion composite presented side-by-side
//! into a desktop window.

use crate::{
    context::GfxContext,
    distortion::{DistortionParams, DistortionPass},
    target::TargetRegistry,
};
use glam::{UVec2, Vec3};
use hmd_rig::{
    DebugHmd, DistortionCaps, FrameSubmission, HmdSession, RigResult, StereoError, TrackingCaps,
};
use stereo_core::{Eye, EyePose, FovPort, PerEye};

pub struct DesktopHmd {
    inner: DebugHmd,
    gfx: GfxContext,
    registry: TargetRegistry,
    distortion: DistortionPass,
    params: DistortionParams,
    /// Raw side-by-side blit without lens correction, for debugging the
    /// undistorted output.
    distortion_enabled: bool,
}

impl DesktopHmd {
    pub fn new(gfx: GfxContext, registry: TargetRegistry, hmd: DebugHmd) -> Self {
        let distortion = DistortionPass::new(&gfx.device, gfx.config.format);
        Self {
            inner: hmd,
            gfx,
            registry,
            distortion,
            params: DistortionParams::default(),
            distortion_enabled: true,
        }
    }

    pub fn gfx(&self) -> &GfxContext {
        &self.gfx
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.gfx.resize(new_size);
    }

    pub fn distortion_params_mut(&mut self) -> &mut DistortionParams {
        &mut self.params
    }

    pub fn set_distortion_enabled(&mut self, enabled: bool) {
        self.distortion_enabled = enabled;
    }

    pub fn distortion_enabled(&self) -> bool {
        self.distortion_enabled
    }
}

impl HmdSession for DesktopHmd {
    fn default_fov(&self, eye: Eye) -> FovPort {
        self.inner.default_fov(eye)
    }

    fn recommended_target_size(&self, eye: Eye, fov: FovPort, pixel_density: f32) -> UVec2 {
        self.inner.recommended_target_size(eye, fov, pixel_density)
    }

    fn configure_tracking(&mut self, caps: TrackingCaps) -> RigResult<()> {
        self.inner.configure_tracking(caps)
    }

    fn distortion_caps(&self) -> DistortionCaps {
        self.inner.distortion_caps()
    }

    fn interpupillary_distance(&self) -> f32 {
        self.inner.interpupillary_distance()
    }

    fn player_eye_height(&self) -> f32 {
        self.inner.player_eye_height()
    }

    fn begin_frame(&mut self, frame_index: u64) -> RigResult<()> {
        self.inner.begin_frame(frame_index)
    }

    fn eye_pose(&mut self, frame_index: u64, eye: Eye, view_offset: Vec3) -> EyePose {
        self.inner.eye_pose(frame_index, eye, view_offset)
    }

    fn end_frame(&mut self, submission: &FrameSubmission) -> RigResult<()> {
        self.inner.end_frame(submission)?;

        let frame = match self.gfx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("swap chain lost/outdated, reconfiguring and dropping the frame");
                self.gfx.reconfigure();
                return Ok(());
            }
            Err(err) => return Err(StereoError::Present(format!("surface error: {err}"))),
        };

        // Resolve the submitted handles; hold the Arcs until the encoder
        // is submitted.
        let attachments = PerEye::try_from_fn(|eye| {
            self.registry
                .lookup(submission.eyes[eye].texture)
                .ok_or(eye)
        });
        let attachments = match attachments {
            Ok(a) => a,
            Err(eye) => {
                // A submission should never reference a dead texture;
                // discard the swap image rather than presenting garbage.
                log::warn!("{eye:?} submission references an unknown texture, dropping frame");
                drop(frame);
                return Ok(());
            }
        };

        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });

        let sources = PerEye::from_fn(|eye| &attachments[eye].color_view);
        let mut params = self.params;
        if !self.distortion_enabled {
            // Identity warp: straight blit per eye half.
            params.warp_k = [1.0, 0.0, 0.0, 0.0];
            params.chrom_ab = [1.0, 0.0, 1.0, 0.0];
            params.lens_center_offset = 0.0;
            params.fit_scale = 1.0;
        }
        self.distortion.composite(
            &self.gfx.device,
            &self.gfx.queue,
            &mut encoder,
            &swap_view,
            sources,
            (self.gfx.config.width, self.gfx.config.height),
            &params,
        );

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
