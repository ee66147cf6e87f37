//! wgpu backend implementation.
//!
//! The device and queue come from the host - the hosting pipeline owns the
//! GPU command stream, this backend only records into it. Commands issued
//! between `begin_render_pass` and `end_render_pass` are buffered and
//! replayed into a `wgpu::CommandEncoder` when the pass ends; the host calls
//! [`WgpuBackend::submit`] once the frame's graph has run.

use std::collections::HashMap;
use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::blit::{BlitUniform, SharedParameterBlock};
use crate::error::{BackendError, BackendResult};
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

use super::{
    BlendMode, LoadOp, PipelineDescriptor, PipelineHandle, RenderBackend, RenderPassDescriptor,
    StoreOp, TextureHandle,
};

/// Buffered render pass command.
enum PassCommand {
    SetPipeline(PipelineHandle),
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// Bind group is built eagerly at bind time so the parameter snapshot is
    /// captured even though the pass is replayed later.
    BindParameters(wgpu::BindGroup),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

/// Render pass with buffered commands, replayed on `end_render_pass`.
struct PendingPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<PassCommand>,
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDescriptor,
}

/// wgpu backend.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    textures: HashMap<u64, TextureEntry>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,
    next_texture_id: u64,
    next_pipeline_id: u64,

    blit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// Bound in the texture slot when the parameter block has none, so the
    /// fetch-variant pipelines can share the blit bind group layout.
    fallback_view: wgpu::TextureView,

    encoder: Option<wgpu::CommandEncoder>,
    pending_pass: Option<PendingPass>,
}

impl WgpuBackend {
    /// Create a backend over a host-supplied device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit_params"),
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
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // 1x1 placeholder; wgpu zero-initializes it.
        let fallback = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("blit_fallback"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device,
            queue,
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            next_texture_id: 1,
            next_pipeline_id: 1,
            blit_layout,
            sampler,
            fallback_view,
            encoder: None,
            pending_pass: None,
        }
    }

    /// Create a backend on whatever adapter is available, without a surface.
    pub fn headless() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .ok_or_else(|| BackendError::InitializationFailed("no suitable adapter".to_string()))?;

        log::info!("WgpuBackend: using adapter {}", adapter.get_info().name);

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        Ok(Self::new(device, queue))
    }

    /// Register a texture owned by the host (such as its frame color target)
    /// so graph passes can reference it.
    pub fn register_external_texture(
        &mut self,
        texture: wgpu::Texture,
        desc: TextureDescriptor,
    ) -> TextureHandle {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                view,
                desc,
            },
        );
        TextureHandle(id)
    }

    /// Submit everything recorded so far to the queue.
    pub fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn convert_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    fn convert_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn ensure_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("pass_graph"),
                })
        })
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_format(desc.format),
            usage: Self::convert_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                view,
                desc: desc.clone(),
            },
        );

        log::trace!(
            "WgpuBackend: created texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.textures.remove(&texture.0) {
            entry.texture.destroy();
        }
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.textures.get(&texture.0).map(|e| e.desc.clone())
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle> {
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
            });

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&self.blit_layout],
                push_constant_ranges: &[],
            });

        let blend = match desc.blend {
            BlendMode::Replace => wgpu::BlendState::REPLACE,
            BlendMode::KeepDestination => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Zero,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: desc.vs_entry.as_str(),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: desc.fs_entry.as_str(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Self::convert_format(desc.target_format),
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;
        self.pipelines.insert(id, pipeline);

        log::trace!("WgpuBackend: compiled pipeline {:?}", desc.label);
        Ok(PipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.ensure_encoder();
        self.pending_pass = Some(PendingPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_pass.take() else {
            return;
        };
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let attachment = &pending.descriptor.color_attachment;
        let Some(entry) = self.textures.get(&attachment.target.0) else {
            log::error!("WgpuBackend: render pass target is not a known texture");
            return;
        };

        let ops = wgpu::Operations {
            load: match &attachment.load_op {
                LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: color[0] as f64,
                    g: color[1] as f64,
                    b: color[2] as f64,
                    a: color[3] as f64,
                }),
                LoadOp::Load => wgpu::LoadOp::Load,
            },
            store: match attachment.store_op {
                StoreOp::Store => wgpu::StoreOp::Store,
                StoreOp::Discard => wgpu::StoreOp::Discard,
            },
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &entry.view,
                    resolve_target: None,
                    ops,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in &pending.commands {
                match command {
                    PassCommand::SetPipeline(handle) => {
                        if let Some(pipeline) = self.pipelines.get(&handle.0) {
                            render_pass.set_pipeline(pipeline);
                        }
                    }
                    PassCommand::SetViewport {
                        x,
                        y,
                        width,
                        height,
                    } => {
                        render_pass.set_viewport(*x, *y, *width, *height, 0.0, 1.0);
                    }
                    PassCommand::BindParameters(bind_group) => {
                        render_pass.set_bind_group(0, bind_group, &[]);
                    }
                    PassCommand::Draw {
                        vertices,
                        instances,
                    } => {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                }
            }
        }
    }

    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        if let Some(pending) = self.pending_pass.as_mut() {
            pending.commands.push(PassCommand::SetPipeline(pipeline));
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if let Some(pending) = self.pending_pass.as_mut() {
            pending.commands.push(PassCommand::SetViewport {
                x,
                y,
                width,
                height,
            });
        }
    }

    fn bind_parameters(&mut self, params: &SharedParameterBlock) {
        let uniform = BlitUniform {
            scale_bias: params.scale_bias(),
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("blit_uniform"),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let view = params
            .texture()
            .and_then(|t| self.textures.get(&t.0))
            .map(|e| &e.view)
            .unwrap_or(&self.fallback_view);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit_params"),
            layout: &self.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        });

        if let Some(pending) = self.pending_pass.as_mut() {
            pending.commands.push(PassCommand::BindParameters(bind_group));
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(pending) = self.pending_pass.as_mut() {
            pending.commands.push(PassCommand::Draw {
                vertices,
                instances,
            });
        }
    }
}
