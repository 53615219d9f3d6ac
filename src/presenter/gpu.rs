// SPDX-License-Identifier: GPL-3.0-only

//! wgpu presenter
//!
//! Draws the frame texture onto an offscreen RGBA render target with a
//! full-viewport quad. The quad's vertex buffer, the shader pipeline and the
//! sampler are created once; the frame texture and render target are created
//! by `resize` and reused by every `present` at that size.

use super::FramePresenter;
use crate::errors::{AppError, AppResult};
use crate::frame::{Dimensions, PixelBuffer};
use crate::gpu::{self, GpuDeviceInfo};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const QUAD_SHADER: &str = include_str!("quad.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Triangle strip covering clip space. Texture row 0 maps to the top edge.
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

/// Objects that live as long as the presenter
struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
}

/// Objects sized to the current surface
struct SurfaceTargets {
    dims: Dimensions,
    frame_texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl SurfaceTargets {
    fn destroy(self) {
        self.frame_texture.destroy();
        self.target.destroy();
        self.readback.destroy();
    }
}

pub struct GpuPresenter {
    context: Option<GpuContext>,
    targets: Option<SurfaceTargets>,
    snapshot: PixelBuffer,
    has_presented: bool,
    texture_allocations: u32,
    presents: u64,
}

impl GpuPresenter {
    /// Create the GPU context, shader pipeline and quad geometry.
    ///
    /// Fails with [`AppError::SurfaceUnsupported`] when no adapter or device
    /// can be obtained.
    pub fn new() -> AppResult<Self> {
        let (device, queue, info) =
            pollster::block_on(gpu::create_render_device("edgecam presenter"))
                .map_err(AppError::SurfaceUnsupported)?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edgecam quad shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edgecam frame bind group layout"),
            entries: &[
                // Frame texture
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
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edgecam quad pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("edgecam quad pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SURFACE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        // Texture and surface always share dimensions, so texels map 1:1
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("edgecam frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("edgecam quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        info!(
            adapter = %info.adapter_name,
            backend = ?info.backend,
            "GPU presenter ready"
        );

        Ok(Self {
            context: Some(GpuContext {
                device,
                queue,
                info,
                pipeline,
                bind_group_layout,
                sampler,
                vertex_buffer,
            }),
            targets: None,
            snapshot: PixelBuffer::default(),
            has_presented: false,
            texture_allocations: 0,
            presents: 0,
        })
    }

    /// Adapter the presenter renders on
    pub fn device_info(&self) -> Option<&GpuDeviceInfo> {
        self.context.as_ref().map(|c| &c.info)
    }

    /// How many times the frame texture has been created
    pub fn texture_allocations(&self) -> u32 {
        self.texture_allocations
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    fn create_targets(ctx: &GpuContext, dims: Dimensions) -> SurfaceTargets {
        let size = wgpu::Extent3d {
            width: dims.width,
            height: dims.height,
            depth_or_array_layers: 1,
        };

        let frame_texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecam frame texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let frame_view = frame_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edgecam surface"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edgecam frame bind group"),
            layout: &ctx.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&frame_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&ctx.sampler),
                },
            ],
        });

        let padded_bytes_per_row = gpu::padded_bytes_per_row(dims.width);
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("edgecam surface readback"),
            size: padded_bytes_per_row as u64 * dims.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        SurfaceTargets {
            dims,
            frame_texture,
            bind_group,
            target,
            target_view,
            readback,
            padded_bytes_per_row,
        }
    }
}

impl FramePresenter for GpuPresenter {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn resize(&mut self, dims: Dimensions) -> AppResult<()> {
        let Some(ctx) = self.context.as_ref() else {
            return Err(AppError::InvalidState("presenter has been disposed".into()));
        };
        if dims.is_empty() {
            return Err(AppError::Present(format!("cannot size surface to {}", dims)));
        }
        if self.targets.as_ref().is_some_and(|t| t.dims == dims) {
            return Ok(());
        }

        let max = ctx.device.limits().max_texture_dimension_2d;
        if dims.width > max || dims.height > max {
            return Err(AppError::Present(format!(
                "{} exceeds the GPU texture limit of {}",
                dims, max
            )));
        }

        if let Some(old) = self.targets.take() {
            debug!(old = %old.dims, new = %dims, "Recreating frame texture");
            old.destroy();
        }

        self.targets = Some(Self::create_targets(ctx, dims));
        self.has_presented = false;
        self.texture_allocations += 1;
        info!(width = dims.width, height = dims.height, "GPU surface resized");
        Ok(())
    }

    fn present(&mut self, pixels: &PixelBuffer) -> AppResult<()> {
        let (Some(ctx), Some(targets)) = (self.context.as_ref(), self.targets.as_ref()) else {
            return Err(AppError::InvalidState(
                "present called before resize".into(),
            ));
        };
        if pixels.dimensions() != targets.dims {
            return Err(AppError::Present(format!(
                "frame is {}, surface is {}",
                pixels.dimensions(),
                targets.dims
            )));
        }

        let size = wgpu::Extent3d {
            width: targets.dims.width,
            height: targets.dims.height,
            depth_or_array_layers: 1,
        };

        // Full replace of the single frame texture
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &targets.frame_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pixels.stride() as u32),
                rows_per_image: Some(targets.dims.height),
            },
            size,
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edgecam present"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("edgecam quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.target_view,
                    depth_slice: None,
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
            pass.set_viewport(
                0.0,
                0.0,
                targets.dims.width as f32,
                targets.dims.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&ctx.pipeline);
            pass.set_bind_group(0, &targets.bind_group, &[]);
            pass.set_vertex_buffer(0, ctx.vertex_buffer.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        ctx.queue.submit(Some(encoder.finish()));

        self.has_presented = true;
        self.presents += 1;
        Ok(())
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.targets.as_ref().map(|t| t.dims)
    }

    fn read_back(&mut self) -> AppResult<Option<&PixelBuffer>> {
        let (Some(ctx), Some(targets)) = (self.context.as_ref(), self.targets.as_ref()) else {
            return Ok(None);
        };
        if !self.has_presented {
            return Ok(None);
        }

        let dims = targets.dims;
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edgecam readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &targets.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &targets.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(targets.padded_bytes_per_row),
                    rows_per_image: Some(dims.height),
                },
            },
            wgpu::Extent3d {
                width: dims.width,
                height: dims.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let padded = pollster::block_on(gpu::read_buffer_async(&ctx.device, &targets.readback))
            .map_err(AppError::Present)?;

        // Strip row padding
        self.snapshot.reshape(dims);
        let row_bytes = self.snapshot.stride();
        let pitch = targets.padded_bytes_per_row as usize;
        for (dst, src) in self
            .snapshot
            .as_bytes_mut()
            .chunks_exact_mut(row_bytes)
            .zip(padded.chunks(pitch))
        {
            dst.copy_from_slice(&src[..row_bytes]);
        }

        Ok(Some(&self.snapshot))
    }

    fn dispose(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.destroy();
        }
        match self.context.take() {
            Some(ctx) => {
                ctx.vertex_buffer.destroy();
                info!(
                    presents = self.presents,
                    texture_allocations = self.texture_allocations,
                    "GPU presenter disposed"
                );
            }
            None => debug!("GPU presenter already disposed"),
        }
        self.has_presented = false;
    }
}

impl Drop for GpuPresenter {
    fn drop(&mut self) {
        if self.context.is_some() {
            warn!("GPU presenter dropped without dispose, releasing resources");
            self.dispose();
        }
    }
}
