//! The demo scene: an instanced cube field with a head-locked overlay,
//! drawn once per eye with whatever projection/view the frame controller
//! has put on the stacks.

use crate::overlay::{OverlayImage, OverlayRetireQueue, OverlaySlot};
use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use hmd_rig::SceneRenderer;
use hmd_rig_wgpu::{TargetRegistry, WgpuFence, COLOR_FORMAT, DEPTH_FORMAT, OPENGL_TO_WGPU_MATRIX};
use std::sync::Arc;
use stereo_core::{Eye, RenderContext};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 3],
    normal: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Instance {
    offset: [f32; 3],
    scale: [f32; 3],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUbo {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayUbo {
    mvp: [[f32; 4]; 4],
}

pub struct CubeScene {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    registry: TargetRegistry,

    cube_pipeline: wgpu::RenderPipeline,
    camera_ubo: wgpu::Buffer,
    camera_bind: wgpu::BindGroup,
    cube_vbo: wgpu::Buffer,
    instance_vbo: wgpu::Buffer,
    instance_count: u32,

    overlay_pipeline: wgpu::RenderPipeline,
    overlay_layout: wgpu::BindGroupLayout,
    overlay_ubo: wgpu::Buffer,
    overlay_sampler: wgpu::Sampler,
    overlay_bind: Option<wgpu::BindGroup>,
    overlay_current: Option<OverlayImage>,
    overlay_slot: OverlaySlot,
    overlay_retired: OverlayRetireQueue,
}

impl CubeScene {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        registry: TargetRegistry,
        overlay_slot: OverlaySlot,
        overlay_retired: OverlayRetireQueue,
    ) -> Self {
        // --- Cube pipeline ---
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<CameraUbo>() as u64
                    ),
                },
                count: None,
            }],
        });

        let cube_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cubes.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/cubes.wgsl").into()),
        });

        let cube_pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cube PipelineLayout"),
            bind_group_layouts: &[&camera_layout],
            push_constant_ranges: &[],
        });

        let vbuf_layouts = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        shader_location: 0,
                        offset: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                    wgpu::VertexAttribute {
                        shader_location: 1,
                        offset: 12,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                ],
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Instance>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &[
                    wgpu::VertexAttribute {
                        shader_location: 2,
                        offset: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                    wgpu::VertexAttribute {
                        shader_location: 3,
                        offset: 12,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                    wgpu::VertexAttribute {
                        shader_location: 4,
                        offset: 24,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                ],
            },
        ];

        let cube_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cube Pipeline"),
            layout: Some(&cube_pipe_layout),
            vertex: wgpu::VertexState {
                module: &cube_shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &cube_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let camera_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera UBO"),
            size: std::mem::size_of::<CameraUbo>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_ubo.as_entire_binding(),
            }],
        });

        let cube_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube VBO"),
            contents: bytemuck::cast_slice(&cube_vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let instances = make_instances();
        let instance_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cube Instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // --- Overlay pipeline ---
        let overlay_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<OverlayUbo>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/overlay.wgsl").into()),
        });

        let overlay_pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay PipelineLayout"),
            bind_group_layouts: &[&overlay_layout],
            push_constant_ranges: &[],
        });

        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Overlay Pipeline"),
            layout: Some(&overlay_pipe_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let overlay_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Overlay UBO"),
            size: std::mem::size_of::<OverlayUbo>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let overlay_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Overlay Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            registry,
            cube_pipeline,
            camera_ubo,
            camera_bind,
            cube_vbo,
            instance_vbo,
            instance_count: instances.len() as u32,
            overlay_pipeline,
            overlay_layout,
            overlay_ubo,
            overlay_sampler,
            overlay_bind: None,
            overlay_current: None,
            overlay_slot,
            overlay_retired,
        }
    }
}

impl SceneRenderer for CubeScene {
    fn per_frame(&mut self, _ctx: &mut RenderContext) {
        // Resources whose fences signaled are finally released here.
        drop(self.overlay_retired.drain_ready());

        // Pick up a freshly composited overlay, if any. The texture it
        // replaces may still be sampled by in-flight GPU work, so it is
        // retired behind a fence instead of dropped.
        if let Some(image) = self.overlay_slot.take() {
            if let Some(old) = self.overlay_current.take() {
                self.overlay_retired.retire(old, WgpuFence::new(&self.queue));
            }
            self.overlay_bind = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Overlay Bind"),
                layout: &self.overlay_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&image.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.overlay_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.overlay_ubo.as_entire_binding(),
                    },
                ],
            }));
            self.overlay_current = Some(image);
        }
    }

    fn render_eye(&mut self, eye: Eye, ctx: &mut RenderContext) -> Result<()> {
        let attachments = self
            .registry
            .current(eye)
            .ok_or_else(|| anyhow!("no attachments allocated for {eye:?}"))?;

        // The stacks carry GL-convention matrices; convert at the edge.
        let proj = OPENGL_TO_WGPU_MATRIX * ctx.projection.top();
        let view_proj = proj * ctx.modelview.top();
        self.queue.write_buffer(
            &self.camera_ubo,
            0,
            bytemuck::bytes_of(&CameraUbo {
                view_proj: view_proj.to_cols_array_2d(),
            }),
        );

        // Head-locked HUD: one meter out, ignoring the modelview.
        let hud_model =
            Mat4::from_translation(Vec3::new(0.0, -0.25, -1.0)) * Mat4::from_scale(Vec3::splat(0.4));
        self.queue.write_buffer(
            &self.overlay_ubo,
            0,
            bytemuck::bytes_of(&OverlayUbo {
                mvp: (proj * hud_model).to_cols_array_2d(),
            }),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &attachments.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        // The eye target cleared itself on activation.
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &attachments.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.cube_pipeline);
            pass.set_bind_group(0, &self.camera_bind, &[]);
            pass.set_vertex_buffer(0, self.cube_vbo.slice(..));
            pass.set_vertex_buffer(1, self.instance_vbo.slice(..));
            pass.draw(0..36, 0..self.instance_count);

            if let Some(overlay_bind) = &self.overlay_bind {
                pass.set_pipeline(&self.overlay_pipeline);
                pass.set_bind_group(0, overlay_bind, &[]);
                pass.draw(0..6, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

/// 36 vertices, 6 faces, outward normals.
fn cube_vertices() -> Vec<Vertex> {
    // (normal, four corners counter-clockwise seen from outside)
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [0.0, 0.0, 1.0],
            [
                [-1.0, -1.0, 1.0],
                [1.0, -1.0, 1.0],
                [1.0, 1.0, 1.0],
                [-1.0, 1.0, 1.0],
            ],
        ),
        (
            [0.0, 0.0, -1.0],
            [
                [1.0, -1.0, -1.0],
                [-1.0, -1.0, -1.0],
                [-1.0, 1.0, -1.0],
                [1.0, 1.0, -1.0],
            ],
        ),
        (
            [1.0, 0.0, 0.0],
            [
                [1.0, -1.0, 1.0],
                [1.0, -1.0, -1.0],
                [1.0, 1.0, -1.0],
                [1.0, 1.0, 1.0],
            ],
        ),
        (
            [-1.0, 0.0, 0.0],
            [
                [-1.0, -1.0, -1.0],
                [-1.0, -1.0, 1.0],
                [-1.0, 1.0, 1.0],
                [-1.0, 1.0, -1.0],
            ],
        ),
        (
            [0.0, 1.0, 0.0],
            [
                [-1.0, 1.0, 1.0],
                [1.0, 1.0, 1.0],
                [1.0, 1.0, -1.0],
                [-1.0, 1.0, -1.0],
            ],
        ),
        (
            [0.0, -1.0, 0.0],
            [
                [-1.0, -1.0, -1.0],
                [1.0, -1.0, -1.0],
                [1.0, -1.0, 1.0],
                [-1.0, -1.0, 1.0],
            ],
        ),
    ];

    let mut vertices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        for index in [0, 1, 2, 0, 2, 3] {
            vertices.push(Vertex {
                pos: corners[index],
                normal,
            });
        }
    }
    vertices
}

/// One cube at arm's length, a ring of pillars, and a tiled floor.
fn make_instances() -> Vec<Instance> {
    let mut instances = Vec::new();

    instances.push(Instance {
        offset: [0.0, 1.5, -1.5],
        scale: [0.15; 3],
        color: [0.9, 0.45, 0.2],
    });

    let ring = 12;
    for i in 0..ring {
        let angle = i as f32 / ring as f32 * std::f32::consts::TAU;
        let hue = i as f32 / ring as f32;
        instances.push(Instance {
            offset: [angle.cos() * 5.0, 1.0, angle.sin() * 5.0],
            scale: [0.25, 1.0, 0.25],
            color: hue_to_rgb(hue),
        });
    }

    let half = 6i32;
    for gx in -half..=half {
        for gz in -half..=half {
            let shade = if (gx + gz).rem_euclid(2) == 0 { 0.35 } else { 0.25 };
            instances.push(Instance {
                offset: [gx as f32, -0.01, gz as f32],
                scale: [0.49, 0.01, 0.49],
                color: [shade, shade, shade + 0.05],
            });
        }
    }

    instances
}

fn hue_to_rgb(hue: f32) -> [f32; 3] {
    let h = hue * 6.0;
    let c = 0.8;
    let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + 0.15, g + 0.15, b + 0.15]
}
