//! Per-eye off-screen render targets and the registry that shares their
//! attachments with the scene and the presenter.

use glam::UVec2;
use hmd_rig::{EyeTarget, RigResult, StereoError, TextureHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stereo_core::{Eye, PerEye};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Color+depth attachments of one eye target. The textures are kept
/// alive for the lifetime of the views.
pub struct EyeAttachments {
    pub color_view: wgpu::TextureView,
    pub depth_view: wgpu::TextureView,
    pub size: UVec2,
    _color_tex: wgpu::Texture,
    _depth_tex: wgpu::Texture,
}

/// Maps texture handles to live attachments and tracks the current
/// allocation per eye. Shared (cheaply cloned) between the eye targets,
/// the scene renderer and the presenting session.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    by_handle: HashMap<u64, Arc<EyeAttachments>>,
    current: PerEye<Option<TextureHandle>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn install(&self, eye: Eye, handle: TextureHandle, attachments: Arc<EyeAttachments>) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.current[eye].take() {
            inner.by_handle.remove(&old.0);
        }
        inner.by_handle.insert(handle.0, attachments);
        inner.current[eye] = Some(handle);
    }

    /// Attachments currently allocated for `eye`.
    pub fn current(&self, eye: Eye) -> Option<Arc<EyeAttachments>> {
        let inner = self.inner.lock();
        let handle = inner.current[eye]?;
        inner.by_handle.get(&handle.0).cloned()
    }

    /// Attachments for an explicit handle (e.g. from a frame submission).
    pub fn lookup(&self, handle: TextureHandle) -> Option<Arc<EyeAttachments>> {
        self.inner.lock().by_handle.get(&handle.0).cloned()
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A wgpu-backed [`EyeTarget`]: one color and one depth texture sized to
/// the eye's descriptor, reallocated when the size changes. A fresh
/// handle is minted per allocation so stale handles never alias new
/// textures.
pub struct WgpuEyeTarget {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    eye: Eye,
    registry: TargetRegistry,
    attachments: Option<Arc<EyeAttachments>>,
    handle: TextureHandle,
    active: bool,
}

impl WgpuEyeTarget {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        eye: Eye,
        registry: TargetRegistry,
    ) -> Self {
        Self {
            device,
            queue,
            eye,
            registry,
            attachments: None,
            handle: TextureHandle(0),
            active: false,
        }
    }

    pub fn attachments(&self) -> Option<Arc<EyeAttachments>> {
        self.attachments.clone()
    }

    fn clear(&self, attachments: &EyeAttachments) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Eye Target Clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Eye Target Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &attachments.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &attachments.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl EyeTarget for WgpuEyeTarget {
    fn init(&mut self, size: UVec2) -> RigResult<()> {
        if let Some(att) = &self.attachments {
            if att.size == size {
                return Ok(());
            }
        }

        let max_dim = self.device.limits().max_texture_dimension_2d;
        if size.x == 0 || size.y == 0 || size.x > max_dim || size.y > max_dim {
            return Err(StereoError::TargetAllocation(format!(
                "{:?} target size {}x{} outside device limits (max {})",
                self.eye, size.x, size.y, max_dim
            )));
        }

        // Release the old allocation before the new one becomes visible;
        // consumers holding an Arc keep the GPU-side lifetime sound.
        self.attachments = None;

        let tex_size = wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        };
        let create_tex = |label: &str, format, usage| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: tex_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color_tex = create_tex(
            "Eye Color Target",
            COLOR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let depth_tex = create_tex(
            "Eye Depth Target",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        let attachments = Arc::new(EyeAttachments {
            color_view: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            size,
            _color_tex: color_tex,
            _depth_tex: depth_tex,
        });

        // Clear once at allocation so the handle is always a valid image,
        // even if this eye is never rendered.
        self.clear(&attachments);

        self.handle = TextureHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        self.registry
            .install(self.eye, self.handle, attachments.clone());
        self.attachments = Some(attachments);
        log::debug!("{:?} eye target allocated at {}x{}", self.eye, size.x, size.y);
        Ok(())
    }

    fn size(&self) -> UVec2 {
        self.attachments
            .as_ref()
            .map(|a| a.size)
            .unwrap_or(UVec2::ZERO)
    }

    fn activate(&mut self) -> RigResult<()> {
        let attachments = self
            .attachments
            .clone()
            .ok_or_else(|| StereoError::TargetAllocation("activate before init".into()))?;
        debug_assert!(!self.active, "eye target already active");
        self.clear(&attachments);
        self.active = true;
        Ok(())
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn color_handle(&self) -> TextureHandle {
        self.handle
    }
}
