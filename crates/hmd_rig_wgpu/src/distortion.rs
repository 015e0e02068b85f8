//! Barrel distortion + chromatic aberration composite pass.

use stereo_core::{Eye, PerEye};
use wgpu::util::DeviceExt;

/// Full-screen triangle vertices.
const FS_TRI: [[f32; 2]; 3] = [[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]];

/// Warp coefficients of the lens being corrected for. Defaults are
/// first-generation developer-kit optics.
#[derive(Debug, Clone, Copy)]
pub struct DistortionParams {
    /// Brown radial polynomial coefficients.
    pub warp_k: [f32; 4],
    /// Chromatic aberration terms: red scale, red r² term, blue scale,
    /// blue r² term.
    pub chrom_ab: [f32; 4],
    /// Horizontal lens-center offset from the viewport center, in per-eye
    /// NDC units; mirrored for the right eye (lenses sit toward the nose).
    pub lens_center_offset: f32,
    /// How much the warped image is shrunk to fit the viewport; larger
    /// values show more of the rendered field.
    pub fit_scale: f32,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self {
            warp_k: [1.0, 0.22, 0.24, 0.0],
            chrom_ab: [0.996, -0.004, 1.014, 0.0],
            lens_center_offset: 0.152,
            fit_scale: 1.4,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DistortionUbo {
    lens_center: [f32; 2],
    scale_in: [f32; 2],
    scale_out: [f32; 2],
    _pad: [f32; 2],
    warp_k: [f32; 4],
    chrom_ab: [f32; 4],
}

/// Composites the two distortion-corrected eye images side-by-side into
/// the destination view.
pub struct DistortionPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    ubos: PerEye<wgpu::Buffer>,
    fs_vbo: wgpu::Buffer,
}

impl DistortionPass {
    pub fn new(device: &wgpu::Device, out_fmt: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Distortion Layout"),
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
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<DistortionUbo>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("distortion.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/distortion.wgsl").into()),
        });

        let pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Distortion PipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Distortion Pipeline"),
            layout: Some(&pipe_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        shader_location: 0,
                        offset: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: out_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Distortion Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let ubos = PerEye::from_fn(|eye| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(match eye {
                    Eye::Left => "Distortion UBO L",
                    Eye::Right => "Distortion UBO R",
                }),
                size: std::mem::size_of::<DistortionUbo>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let fs_vbo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Distortion FS VBO"),
            contents: bytemuck::cast_slice(&FS_TRI),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            pipeline,
            layout,
            sampler,
            ubos,
            fs_vbo,
        }
    }

    fn ubo_for(&self, eye: Eye, aspect: f32, params: &DistortionParams) -> DistortionUbo {
        // The lens sits toward the nose: right of center for the left
        // eye, left of center for the right.
        let side = match eye {
            Eye::Left => 1.0,
            Eye::Right => -1.0,
        };
        let lens_center = [0.5 + side * params.lens_center_offset * 0.25, 0.5];
        DistortionUbo {
            lens_center,
            scale_in: [2.0, 2.0 / aspect],
            scale_out: [0.5 / params.fit_scale, 0.5 * aspect / params.fit_scale],
            _pad: [0.0; 2],
            warp_k: params.warp_k,
            chrom_ab: params.chrom_ab,
        }
    }

    /// Draws both distorted eyes side-by-side into `dst` (left eye on the
    /// left half). `sources` are the per-eye color attachments; the whole
    /// destination is cleared first.
    pub fn composite(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        dst: &wgpu::TextureView,
        sources: PerEye<&wgpu::TextureView>,
        dst_size: (u32, u32),
        params: &DistortionParams,
    ) {
        let half_w = (dst_size.0 / 2).max(1) as f32;
        let height = dst_size.1.max(1) as f32;
        let aspect = half_w / height;

        // Bind groups must be built before the pass opens.
        let binds = PerEye::from_fn(|eye| {
            queue.write_buffer(
                &self.ubos[eye],
                0,
                bytemuck::bytes_of(&self.ubo_for(eye, aspect, params)),
            );
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Distortion Bind"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(sources[eye]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.ubos[eye].as_entire_binding(),
                    },
                ],
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Distortion Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, self.fs_vbo.slice(..));
        for eye in Eye::BOTH {
            let x = match eye {
                Eye::Left => 0.0,
                Eye::Right => half_w,
            };
            pass.set_viewport(x, 0.0, half_w, height, 0.0, 1.0);
            pass.set_scissor_rect(x as u32, 0, half_w as u32, height as u32);
            pass.set_bind_group(0, &binds[eye], &[]);
            pass.draw(0..3, 0..1);
        }
    }
}
