//! Background overlay producer.
//!
//! A worker thread periodically redraws a small status texture (a radar
//! sweep) and hands it to the render thread through the single-slot
//! exchange. A texture displaced before the render thread picked it up,
//! or replaced after the GPU started sampling it, goes through the
//! fence-gated retire queue instead of being dropped in place.

use hmd_rig::{RetireQueue, SwapSlot};
use hmd_rig_wgpu::WgpuFence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const OVERLAY_SIZE: u32 = 128;

/// A finished overlay image; the texture stays alive as long as the view.
pub struct OverlayImage {
    pub view: wgpu::TextureView,
    _texture: wgpu::Texture,
}

pub type OverlaySlot = Arc<SwapSlot<OverlayImage>>;
pub type OverlayRetireQueue = Arc<RetireQueue<OverlayImage, WgpuFence>>;

pub struct OverlayProducer {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl OverlayProducer {
    pub fn spawn(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        slot: OverlaySlot,
        retired: OverlayRetireQueue,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let worker = std::thread::Builder::new()
            .name("overlay-producer".into())
            .spawn(move || {
                let mut tick: u32 = 0;
                while !stop_flag.load(Ordering::Acquire) {
                    let image = produce(&device, &queue, tick);
                    if let Some(displaced) = slot.publish(image) {
                        // Never consumed, but the upload was already
                        // queued; let the fence decide when it is gone.
                        retired.retire(displaced, WgpuFence::new(&queue));
                    }
                    tick = tick.wrapping_add(1);
                    std::thread::sleep(Duration::from_millis(100));
                }
            })
            .expect("failed to spawn overlay producer");
        Self {
            stop,
            worker: Some(worker),
        }
    }
}

impl Drop for OverlayProducer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn produce(device: &wgpu::Device, queue: &wgpu::Queue, tick: u32) -> OverlayImage {
    let pixels = draw_sweep(tick);

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Overlay Texture"),
        size: wgpu::Extent3d {
            width: OVERLAY_SIZE,
            height: OVERLAY_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(OVERLAY_SIZE * 4),
            rows_per_image: Some(OVERLAY_SIZE),
        },
        wgpu::Extent3d {
            width: OVERLAY_SIZE,
            height: OVERLAY_SIZE,
            depth_or_array_layers: 1,
        },
    );

    OverlayImage {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        _texture: texture,
    }
}

/// A rotating radar sweep with a fixed outer ring. Deliberately cheap;
/// the point is the hand-off, not the artwork.
fn draw_sweep(tick: u32) -> Vec<u8> {
    let size = OVERLAY_SIZE as i32;
    let center = (size / 2) as f32;
    let sweep = tick as f32 * 0.2;
    let mut pixels = vec![0u8; (size * size * 4) as usize];

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let r = (dx * dx + dy * dy).sqrt();
            let ring = (r - center * 0.85).abs() < 1.5;
            let angle = dy.atan2(dx);
            let mut delta = (angle - sweep) % (std::f32::consts::TAU);
            if delta < 0.0 {
                delta += std::f32::consts::TAU;
            }
            let in_sweep = r < center * 0.85 && delta < 0.9;

            let idx = ((y * size + x) * 4) as usize;
            if ring {
                pixels[idx..idx + 4].copy_from_slice(&[64, 255, 128, 230]);
            } else if in_sweep {
                let fade = (1.0 - delta / 0.9) * (1.0 - r / (center * 0.85));
                let a = (fade * 180.0) as u8;
                pixels[idx..idx + 4].copy_from_slice(&[32, 200, 96, a]);
            }
        }
    }
    pixels
}
