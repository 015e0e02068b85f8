//! The per-frame stereo orchestration loop.

use crate::{
    session::{HmdSession, TrackingCaps},
    target::{EyeTarget, TextureHandle},
    RigResult,
};
use glam::{Mat4, UVec2};
use stereo_core::{Eye, EyePose, EyeRenderDescriptor, PerEye, RenderContext};

/// The scene side of the pipeline. The controller owns projection and view
/// setup; `render_eye` only needs to draw with the stacks it is handed.
pub trait SceneRenderer {
    /// Runs once per frame, before the eye loop. For work that must not
    /// happen twice per frame (animation stepping, consuming a pending
    /// overlay texture).
    fn per_frame(&mut self, _ctx: &mut RenderContext) {}

    /// Draws the scene for one eye. The projection stack top holds the
    /// eye's off-axis projection; the modelview stack top holds
    /// `translate(eye_offset) * inverse(head_pose) * world`.
    fn render_eye(&mut self, eye: Eye, ctx: &mut RenderContext) -> anyhow::Result<()>;
}

/// What one eye contributes to a frame submission.
#[derive(Debug, Clone, Copy)]
pub struct EyeSubmission {
    pub eye: Eye,
    pub texture: TextureHandle,
    /// The pose the texture was rendered with; resubmitted unchanged for
    /// eyes that were skipped or failed this frame.
    pub pose: EyePose,
    pub descriptor: EyeRenderDescriptor,
}

/// The per-frame bundle handed to the session's distortion/present stage.
/// Constructed and consumed within one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission {
    pub frame_index: u64,
    pub eyes: PerEye<EyeSubmission>,
}

/// Outcome of one frame. A degraded eye had its previous image
/// resubmitted; the frame itself still completed.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub rendered: Vec<Eye>,
    pub degraded: Vec<Eye>,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Quality/performance knob in (0, 1]; eye targets are sized
    /// `ceil(recommended * render_scale)`.
    pub render_scale: f32,
    /// Texels per display pixel at screen center, forwarded to the
    /// session's size recommendation.
    pub pixel_density: f32,
    pub tracking: TrackingCaps,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.0,
            pixel_density: 1.0,
            tracking: TrackingCaps::ORIENTATION
                | TrackingCaps::POSITION
                | TrackingCaps::MAG_YAW_CORRECTION,
        }
    }
}

/// Drives the per-eye render loop against an [`HmdSession`] and a pair of
/// [`EyeTarget`]s.
pub struct StereoFrameController<S: HmdSession, T: EyeTarget> {
    session: S,
    targets: PerEye<T>,
    descriptors: PerEye<EyeRenderDescriptor>,
    recommended: PerEye<UVec2>,
    /// Texture and pose of the last image each eye actually produced.
    /// Starts as the freshly cleared allocation with an identity pose, so
    /// a degraded first frame still submits a valid image.
    last_good: PerEye<(TextureHandle, EyePose)>,
    frame_index: u64,
    render_scale: f32,
    pending_scale: Option<f32>,
    eye_per_frame: bool,
    last_eye_rendered: Option<Eye>,
}

impl<S: HmdSession, T: EyeTarget> StereoFrameController<S, T> {
    /// Configures tracking, derives the per-eye descriptors and allocates
    /// both eye targets. Configuration problems (degenerate FOV, invalid
    /// scale, failed tracking attach) fail here, before any frame runs.
    pub fn new(mut session: S, mut targets: PerEye<T>, config: ControllerConfig) -> RigResult<Self> {
        session.configure_tracking(config.tracking)?;

        let ipd = session.interpupillary_distance();
        let recommended = PerEye::from_fn(|eye| {
            session.recommended_target_size(eye, session.default_fov(eye), config.pixel_density)
        });
        let descriptors = PerEye::try_from_fn(|eye| {
            EyeRenderDescriptor::compute(
                eye,
                session.default_fov(eye),
                recommended[eye],
                ipd,
                config.render_scale,
            )
        })?;
        for eye in Eye::BOTH {
            targets[eye].init(descriptors[eye].target_size)?;
        }
        let last_good =
            PerEye::from_fn(|eye| (targets[eye].color_handle(), EyePose::default()));

        Ok(Self {
            session,
            targets,
            descriptors,
            recommended,
            last_good,
            frame_index: 0,
            render_scale: config.render_scale,
            pending_scale: None,
            eye_per_frame: false,
            last_eye_rendered: None,
        })
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn descriptor(&self, eye: Eye) -> &EyeRenderDescriptor {
        &self.descriptors[eye]
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn render_scale(&self) -> f32 {
        self.render_scale
    }

    /// Requests a new render scale. Takes effect at the next frame start,
    /// never mid-frame, because it reallocates the eye targets.
    pub fn set_render_scale(&mut self, scale: f32) -> RigResult<()> {
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(stereo_core::ConfigError::InvalidRenderScale(scale).into());
        }
        self.pending_scale = Some(scale);
        Ok(())
    }

    /// When enabled, only one eye is rendered per frame, alternating; the
    /// other eye resubmits its previous image and pose. For scenes that
    /// cannot hold full frame rate.
    pub fn set_eye_per_frame(&mut self, enabled: bool) {
        self.eye_per_frame = enabled;
    }

    pub fn eye_per_frame(&self) -> bool {
        self.eye_per_frame
    }

    /// Runs one full frame: begin, per-eye transform setup + scene render
    /// into that eye's target, end with both textures and the poses that
    /// produced them.
    ///
    /// The begin/end pair completes exactly once even when an eye fails;
    /// a failed eye is reported in the [`FrameReport`] and its previous
    /// image resubmitted. Only session begin/end failures (device lost
    /// and the like) surface as `Err`.
    pub fn render_frame(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut dyn SceneRenderer,
    ) -> RigResult<FrameReport> {
        self.apply_pending_scale();

        self.frame_index += 1;
        let frame = self.frame_index;
        let entry_depths = (ctx.projection.depth(), ctx.modelview.depth());

        self.session.begin_frame(frame)?;
        scene.per_frame(ctx);

        let order = self.session.eye_render_order();
        let mut report = FrameReport {
            frame_index: frame,
            ..FrameReport::default()
        };

        for eye in order {
            // Alternate eyes when we are not keeping up with the display.
            if self.eye_per_frame && self.last_eye_rendered == Some(eye) {
                continue;
            }

            // Late pose fetch: as close to the draw as possible.
            let offset = self.descriptors[eye].view_offset;
            let pose = self.session.eye_pose(frame, eye, offset);
            let projection = self.descriptors[eye].projection;

            let drawn = ctx.with_push(|ctx| {
                // The projection slot belongs to the controller here:
                // replace, never compose.
                *ctx.projection.top_mut() = projection;

                // View = translate(offset) * inverse(pose) * world. The
                // eye offset applies in head space, after the head
                // inverse; swapping these produces wrong parallax.
                ctx.modelview.pre_multiply(pose.view_matrix());
                ctx.modelview.pre_multiply(Mat4::from_translation(offset));

                if let Err(err) = self.targets[eye].activate() {
                    log::error!("{eye:?} target activation failed, resubmitting previous image: {err}");
                    return false;
                }
                let result = scene.render_eye(eye, ctx);
                self.targets[eye].deactivate();
                match result {
                    Ok(()) => true,
                    Err(err) => {
                        log::error!("{eye:?} scene render failed, resubmitting previous image: {err:#}");
                        false
                    }
                }
            });

            if drawn {
                // Only the pose of an eye we actually rendered may be
                // submitted as updated.
                self.last_good[eye] = (self.targets[eye].color_handle(), pose);
                self.last_eye_rendered = Some(eye);
                report.rendered.push(eye);
            } else {
                report.degraded.push(eye);
            }

            if self.eye_per_frame {
                break;
            }
        }

        let submission = FrameSubmission {
            frame_index: frame,
            eyes: PerEye::from_fn(|eye| {
                let (texture, pose) = self.last_good[eye];
                EyeSubmission {
                    eye,
                    texture,
                    pose,
                    descriptor: self.descriptors[eye],
                }
            }),
        };
        self.session.end_frame(&submission)?;

        debug_assert_eq!(
            (ctx.projection.depth(), ctx.modelview.depth()),
            entry_depths,
            "render_frame must leave the stacks balanced"
        );
        Ok(report)
    }

    /// Applies a deferred render-scale change: recomputes descriptors and
    /// reallocates targets. An eye whose reallocation fails keeps its old
    /// descriptor and target.
    fn apply_pending_scale(&mut self) {
        let Some(scale) = self.pending_scale.take() else {
            return;
        };
        let ipd = self.session.interpupillary_distance();
        for eye in Eye::BOTH {
            let computed = EyeRenderDescriptor::compute(
                eye,
                self.descriptors[eye].fov,
                self.recommended[eye],
                ipd,
                scale,
            );
            match computed {
                Ok(desc) => {
                    if let Err(err) = self.targets[eye].init(desc.target_size) {
                        log::error!("{eye:?} target reallocation at scale {scale} failed: {err}");
                        continue;
                    }
                    self.descriptors[eye] = desc;
                    // The old texture is gone; keep the pose, repoint the
                    // stale-resubmission handle at the fresh allocation.
                    self.last_good[eye].0 = self.targets[eye].color_handle();
                }
                Err(err) => log::error!("render scale {scale} rejected for {eye:?}: {err}"),
            }
        }
        self.render_scale = scale;
        log::debug!("render scale now {scale}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DistortionCaps;
    use crate::StereoError;
    use glam::{vec3, Quat, UVec2, Vec3};
    use std::cell::RefCell;
    use std::rc::Rc;
    use stereo_core::FovPort;

    const LEFT_FOV: FovPort = FovPort {
        up_tan: 0.96,
        down_tan: 1.09,
        left_tan: 0.87,
        right_tan: 0.90,
    };
    const SIZE: UVec2 = UVec2::new(1182, 1461);
    const IPD: f32 = 0.064;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Begin(u64),
        End {
            frame: u64,
            textures: [TextureHandle; 2],
            poses: [EyePose; 2],
        },
    }

    struct MockSession {
        order: [Eye; 2],
        pose: PerEye<EyePose>,
        events: Rc<RefCell<Vec<Event>>>,
        in_frame: bool,
        fov_override: Option<FovPort>,
    }

    impl MockSession {
        fn new(order: [Eye; 2]) -> (Self, Rc<RefCell<Vec<Event>>>) {
            let events = Rc::new(RefCell::new(Vec::new()));
            let pose = PerEye::from_fn(|eye| {
                EyePose::new(
                    Quat::from_rotation_y(match eye {
                        Eye::Left => 0.3,
                        Eye::Right => 0.31,
                    }),
                    vec3(0.05, 1.7, -0.1),
                )
            });
            (
                Self {
                    order,
                    pose,
                    events: events.clone(),
                    in_frame: false,
                    fov_override: None,
                },
                events,
            )
        }
    }

    impl HmdSession for MockSession {
        fn eye_render_order(&self) -> [Eye; 2] {
            self.order
        }

        fn default_fov(&self, eye: Eye) -> FovPort {
            let f = self.fov_override.unwrap_or(LEFT_FOV);
            match eye {
                Eye::Left => f,
                // Mirrored horizontally for the right lens.
                Eye::Right => FovPort::new(f.up_tan, f.down_tan, f.right_tan, f.left_tan),
            }
        }

        fn recommended_target_size(&self, _eye: Eye, _fov: FovPort, density: f32) -> UVec2 {
            UVec2::new(
                (SIZE.x as f32 * density) as u32,
                (SIZE.y as f32 * density) as u32,
            )
        }

        fn configure_tracking(&mut self, _caps: TrackingCaps) -> RigResult<()> {
            Ok(())
        }

        fn distortion_caps(&self) -> DistortionCaps {
            DistortionCaps::default()
        }

        fn interpupillary_distance(&self) -> f32 {
            IPD
        }

        fn player_eye_height(&self) -> f32 {
            1.675
        }

        fn begin_frame(&mut self, frame_index: u64) -> RigResult<()> {
            assert!(!self.in_frame, "begin_frame while a frame is open");
            self.in_frame = true;
            self.events.borrow_mut().push(Event::Begin(frame_index));
            Ok(())
        }

        fn eye_pose(&mut self, _frame: u64, eye: Eye, _offset: Vec3) -> EyePose {
            self.pose[eye]
        }

        fn end_frame(&mut self, submission: &FrameSubmission) -> RigResult<()> {
            assert!(self.in_frame, "end_frame without begin_frame");
            self.in_frame = false;
            self.events.borrow_mut().push(Event::End {
                frame: submission.frame_index,
                textures: [
                    submission.eyes[Eye::Left].texture,
                    submission.eyes[Eye::Right].texture,
                ],
                poses: [
                    submission.eyes[Eye::Left].pose,
                    submission.eyes[Eye::Right].pose,
                ],
            });
            Ok(())
        }
    }

    /// Tracks live allocations across reallocation so leaks/double-frees
    /// show up as counter mismatches.
    #[derive(Default)]
    struct AllocLog {
        live: usize,
        total: usize,
    }

    struct MockTarget {
        size: Option<UVec2>,
        handle: TextureHandle,
        log: Rc<RefCell<AllocLog>>,
    }

    impl MockTarget {
        fn new(log: Rc<RefCell<AllocLog>>) -> Self {
            Self {
                size: None,
                handle: TextureHandle(0),
                log,
            }
        }
    }

    impl EyeTarget for MockTarget {
        fn init(&mut self, size: UVec2) -> RigResult<()> {
            if self.size == Some(size) {
                return Ok(());
            }
            let mut log = self.log.borrow_mut();
            if self.size.is_some() {
                log.live -= 1;
            }
            log.live += 1;
            log.total += 1;
            self.handle = TextureHandle(log.total as u64);
            self.size = Some(size);
            Ok(())
        }

        fn size(&self) -> UVec2 {
            self.size.unwrap_or(UVec2::ZERO)
        }

        fn activate(&mut self) -> RigResult<()> {
            Ok(())
        }

        fn deactivate(&mut self) {}

        fn color_handle(&self) -> TextureHandle {
            self.handle
        }
    }

    struct Recording {
        calls: Vec<(Eye, Mat4, Mat4)>,
        fail_eye: Option<Eye>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                fail_eye: None,
            }
        }
    }

    impl SceneRenderer for Recording {
        fn render_eye(&mut self, eye: Eye, ctx: &mut RenderContext) -> anyhow::Result<()> {
            if self.fail_eye == Some(eye) {
                anyhow::bail!("injected failure");
            }
            self.calls
                .push((eye, ctx.projection.top(), ctx.modelview.top()));
            // Scene code pushes and pops internally; balance is its own
            // responsibility and the controller's guard catches the rest.
            ctx.modelview.with_push(|mv| {
                mv.translate(vec3(0.0, 0.0, -5.0));
            });
            Ok(())
        }
    }

    fn controller(
        order: [Eye; 2],
    ) -> (
        StereoFrameController<MockSession, MockTarget>,
        Rc<RefCell<Vec<Event>>>,
        Rc<RefCell<AllocLog>>,
    ) {
        let (session, events) = MockSession::new(order);
        let log = Rc::new(RefCell::new(AllocLog::default()));
        let targets = PerEye::from_fn(|_| MockTarget::new(log.clone()));
        let controller =
            StereoFrameController::new(session, targets, ControllerConfig::default()).unwrap();
        (controller, events, log)
    }

    #[test]
    fn view_composition_matches_contract() {
        let (mut controller, _, _) = controller(Eye::BOTH);
        let mut ctx = RenderContext::new();
        let world = Mat4::from_rotation_translation(Quat::from_rotation_x(0.2), vec3(1.0, 0.0, 4.0));
        ctx.modelview.transform(world);

        let mut scene = Recording::new();
        let report = controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(report.rendered, vec![Eye::Left, Eye::Right]);

        for (eye, proj, view) in &scene.calls {
            let desc = controller.descriptor(*eye);
            let pose = controller.session().pose[*eye];
            let expected =
                Mat4::from_translation(desc.view_offset) * pose.view_matrix() * world;
            assert!(
                view.abs_diff_eq(expected, 1e-5),
                "{eye:?} view mismatch:\n{view:?}\nvs\n{expected:?}"
            );
            assert!(proj.abs_diff_eq(desc.projection, 1e-6));
        }

        // IPD 0.064 puts the left eye at +0.032 m.
        assert_eq!(
            controller.descriptor(Eye::Left).view_offset,
            vec3(0.032, 0.0, 0.0)
        );
    }

    #[test]
    fn stacks_balanced_after_frame() {
        let (mut controller, _, _) = controller(Eye::BOTH);
        let mut ctx = RenderContext::new();
        ctx.modelview.push();
        ctx.modelview.translate(vec3(0.0, -1.7, 0.0));
        let depths = (ctx.projection.depth(), ctx.modelview.depth());

        let mut scene = Recording::new();
        controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!((ctx.projection.depth(), ctx.modelview.depth()), depths);

        // Same with a failing eye.
        scene.fail_eye = Some(Eye::Left);
        controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!((ctx.projection.depth(), ctx.modelview.depth()), depths);
    }

    #[test]
    fn begin_end_paired_exactly_once_under_failure() {
        let (mut controller, events, _) = controller(Eye::BOTH);
        let mut ctx = RenderContext::new();
        let mut scene = Recording::new();

        // Frame 1 renders both eyes.
        controller.render_frame(&mut ctx, &mut scene).unwrap();
        let right_pose_frame1 = match &events.borrow()[1] {
            Event::End { poses, .. } => poses[1],
            other => panic!("expected End, got {other:?}"),
        };

        // Frame 2: the right eye fails.
        scene.fail_eye = Some(Eye::Right);
        let report = controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(report.rendered, vec![Eye::Left]);
        assert_eq!(report.degraded, vec![Eye::Right]);

        let events = events.borrow();
        let begins = events.iter().filter(|e| matches!(e, Event::Begin(_))).count();
        let ends = events.iter().filter(|e| matches!(e, Event::End { .. })).count();
        assert_eq!((begins, ends), (2, 2));

        match &events[3] {
            Event::End { textures, poses, .. } => {
                // Two valid textures despite the failure, and the failed
                // eye resubmits the pose it was last rendered with.
                assert!(textures.iter().all(|t| t.0 != 0));
                assert_eq!(poses[1], right_pose_frame1);
            }
            other => panic!("expected End, got {other:?}"),
        }
    }

    #[test]
    fn hmd_render_order_is_followed() {
        let (mut controller, _, _) = controller([Eye::Right, Eye::Left]);
        let mut ctx = RenderContext::new();
        let mut scene = Recording::new();
        controller.render_frame(&mut ctx, &mut scene).unwrap();
        let order: Vec<Eye> = scene.calls.iter().map(|(eye, _, _)| *eye).collect();
        assert_eq!(order, vec![Eye::Right, Eye::Left]);
    }

    #[test]
    fn eye_per_frame_alternates_and_resubmits() {
        let (mut controller, events, _) = controller(Eye::BOTH);
        controller.set_eye_per_frame(true);
        let mut ctx = RenderContext::new();
        let mut scene = Recording::new();

        let r1 = controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(r1.rendered, vec![Eye::Left]);
        // The right eye was never rendered: its submission still carries
        // the initial (cleared) image and default pose.
        match &events.borrow()[1] {
            Event::End { poses, .. } => assert_eq!(poses[1], EyePose::default()),
            other => panic!("expected End, got {other:?}"),
        }

        let r2 = controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(r2.rendered, vec![Eye::Right]);
        let r3 = controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(r3.rendered, vec![Eye::Left]);
    }

    #[test]
    fn render_scale_reallocates_at_frame_start() {
        let (mut controller, events, log) = controller(Eye::BOTH);
        let mut ctx = RenderContext::new();
        let mut scene = Recording::new();
        controller.render_frame(&mut ctx, &mut scene).unwrap();

        let before = controller.descriptor(Eye::Left).target_size;
        controller.set_render_scale(0.5).unwrap();
        // Not applied until the next frame starts.
        assert_eq!(controller.descriptor(Eye::Left).target_size, before);

        controller.render_frame(&mut ctx, &mut scene).unwrap();
        assert_eq!(
            controller.descriptor(Eye::Left).target_size,
            UVec2::new(591, 731)
        );
        // One live allocation per eye after the reallocation.
        assert_eq!(log.borrow().live, 2);

        // The submitted handles are the fresh allocations, never the
        // released ones.
        match events.borrow().last().unwrap() {
            Event::End { textures, .. } => {
                assert!(textures.iter().all(|t| t.0 > 2));
            }
            other => panic!("expected End, got {other:?}"),
        };
    }

    #[test]
    fn same_size_reinit_keeps_one_allocation() {
        let log = Rc::new(RefCell::new(AllocLog::default()));
        let mut target = MockTarget::new(log.clone());
        target.init(UVec2::new(64, 64)).unwrap();
        target.init(UVec2::new(64, 64)).unwrap();
        assert_eq!(log.borrow().live, 1);
        assert_eq!(log.borrow().total, 1);
        target.init(UVec2::new(32, 32)).unwrap();
        assert_eq!(log.borrow().live, 1);
        assert_eq!(log.borrow().total, 2);
    }

    #[test]
    fn invalid_render_scale_is_rejected() {
        let (mut controller, _, _) = controller(Eye::BOTH);
        assert!(matches!(
            controller.set_render_scale(0.0),
            Err(StereoError::Config(_))
        ));
        assert!(matches!(
            controller.set_render_scale(1.5),
            Err(StereoError::Config(_))
        ));
    }

    #[test]
    fn degenerate_fov_fails_at_construction() {
        let (mut session, _) = MockSession::new(Eye::BOTH);
        session.fov_override = Some(FovPort::new(0.0, 1.0, 1.0, 1.0));
        let log = Rc::new(RefCell::new(AllocLog::default()));
        let targets = PerEye::from_fn(|_| MockTarget::new(log.clone()));
        let result = StereoFrameController::new(session, targets, ControllerConfig::default());
        assert!(matches!(result, Err(StereoError::Config(_))));
    }
}
