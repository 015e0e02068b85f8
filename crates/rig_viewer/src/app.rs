use crate::{
    overlay::{OverlayProducer, OverlayRetireQueue, OverlaySlot},
    scene::CubeScene,
    Args,
};
use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use hmd_rig::{ControllerConfig, DebugHmd, RetireQueue, StereoFrameController, SwapSlot};
use hmd_rig_wgpu::{DesktopHmd, GfxContext, TargetRegistry, WgpuEyeTarget};
use std::sync::Arc;
use std::time::Instant;
use stereo_core::{PerEye, RenderContext};
use winit::window::Window;

/// Frame-rate accounting; reports every couple of seconds.
struct RateCounter {
    frames: u32,
    since: Instant,
}

impl RateCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed > 2.0 {
            log::info!("{:.1} fps", self.frames as f32 / elapsed);
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

pub struct App {
    controller: StereoFrameController<DesktopHmd, WgpuEyeTarget>,
    ctx: RenderContext,
    scene: CubeScene,
    // Keeps the producer thread alive; joined on drop.
    _overlay: OverlayProducer,
    rate: RateCounter,
    player_pos: Vec3,
    render_scale: f32,
}

impl App {
    pub async fn new(window: Arc<Window>, args: &Args) -> Result<Self> {
        let gfx = GfxContext::new(window, !args.no_vsync).await?;
        let device = gfx.device.clone();
        let queue = gfx.queue.clone();

        let registry = TargetRegistry::new();
        let targets = PerEye::from_fn(|eye| {
            WgpuEyeTarget::new(device.clone(), queue.clone(), eye, registry.clone())
        });

        let mut hmd = DebugHmd::new().with_ipd(args.ipd);
        if args.static_pose {
            hmd = hmd.with_static_pose();
        }
        let mut session = DesktopHmd::new(gfx, registry.clone(), hmd);
        session.set_distortion_enabled(!args.no_distortion);

        let config = ControllerConfig {
            render_scale: args.render_scale,
            pixel_density: args.pixel_density,
            ..ControllerConfig::default()
        };
        let mut controller = StereoFrameController::new(session, targets, config)
            .map_err(|e| anyhow!("stereo rig setup failed: {e}"))?;
        controller.set_eye_per_frame(args.eye_per_frame);

        let overlay_slot: OverlaySlot = Arc::new(SwapSlot::new());
        let overlay_retired: OverlayRetireQueue = Arc::new(RetireQueue::new());
        let overlay = OverlayProducer::spawn(
            device.clone(),
            queue.clone(),
            overlay_slot.clone(),
            overlay_retired.clone(),
        );

        let scene = CubeScene::new(device, queue, registry, overlay_slot, overlay_retired);

        Ok(Self {
            controller,
            ctx: RenderContext::new(),
            scene,
            _overlay: overlay,
            rate: RateCounter::new(),
            player_pos: Vec3::ZERO,
            render_scale: args.render_scale,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.controller.session_mut().resize(new_size);
    }

    /// Runs one stereo frame. Degraded eyes are logged by the controller;
    /// only session-level failures surface here.
    pub fn render_frame(&mut self) {
        // The world transform the controller composes the eye views onto:
        // moving the player +X moves the world −X.
        self.ctx.modelview.identity();
        self.ctx
            .modelview
            .transform(Mat4::from_translation(-self.player_pos));

        match self.controller.render_frame(&mut self.ctx, &mut self.scene) {
            Ok(_report) => self.rate.tick(),
            Err(err) => log::error!("frame failed: {err}"),
        }
    }

    pub fn move_player(&mut self, delta: Vec3) {
        self.player_pos += delta;
    }

    pub fn toggle_eye_per_frame(&mut self) {
        let enabled = !self.controller.eye_per_frame();
        self.controller.set_eye_per_frame(enabled);
        log::info!("eye-per-frame mode: {enabled}");
    }

    pub fn toggle_distortion(&mut self) {
        let session = self.controller.session_mut();
        let enabled = !session.distortion_enabled();
        session.set_distortion_enabled(enabled);
        log::info!("distortion correction: {enabled}");
    }

    pub fn adjust_render_scale(&mut self, delta: f32) {
        let scale = (self.render_scale + delta).clamp(0.1, 1.0);
        match self.controller.set_render_scale(scale) {
            Ok(()) => {
                self.render_scale = scale;
                log::info!("render scale -> {scale:.1}");
            }
            Err(err) => log::warn!("render scale {scale:.1} rejected: {err}"),
        }
    }
}
