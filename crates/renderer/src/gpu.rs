//! wgpu implementation of the shader, texture and frame seams.
//! wgpu = 26.x, winit = 0.30.x
//!
//! Frame commands are recorded between `clear` and `present` and encoded into
//! a single render pass at `present`. Pipelines are built lazily for each
//! distinct set of enabled attributes; shader inputs that no enabled attribute
//! feeds read from a constant buffer instead.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use asset::texture::TextureData;
use corelib::{ShaderError, ShaderStage, TextureError};
use wgpu::{
    AddressMode, BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BlendState, Buffer, BufferBindingType,
    BufferDescriptor, BufferUsages, ColorTargetState, ColorWrites, CommandEncoderDescriptor,
    DepthBiasState, DepthStencilState, Device, DeviceDescriptor, ErrorFilter, Extent3d, Features,
    FilterMode, FragmentState, Instance, InstanceDescriptor, Limits, LoadOp, Operations,
    PipelineLayout, PipelineLayoutDescriptor, PowerPreference, PresentMode, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    Sampler, SamplerBindingType, SamplerDescriptor, ShaderModule, ShaderModuleDescriptor,
    ShaderSource, ShaderStages, StoreOp, Surface, SurfaceConfiguration, SurfaceTexture, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureSampleType, TextureUsages,
    TextureView, TextureViewDescriptor, TextureViewDimension, VertexBufferLayout, VertexFormat,
    VertexState, VertexStepMode, util::DeviceExt,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    backend::{
        BufferHandle, FrameBackend, FrameError, TextureHandle, TextureLoader, UniformValue,
        VertexAttribute,
    },
    shader::{
        AttributeInfo, NagaShaderPipeline, ProgramHandle, ResourceInfo, ResourceKind,
        ShaderHandle, ShaderPipeline, UniformLocation,
    },
};

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// Value read by unfed inputs: uv (0,0), normal (0,0,1).
const ATTRIBUTE_DEFAULTS: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// Vertex buffers are never created smaller than this.
const MIN_VERTEX_FLOATS: usize = 4;

/// Sampling policy applied to every loaded texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureConfig {
    pub mipmaps: bool,
    pub filter: FilterMode,
    pub wrap: AddressMode,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            mipmaps: true,
            filter: FilterMode::Linear,
            wrap: AddressMode::Repeat,
        }
    }
}

struct GpuTexture {
    #[allow(dead_code)]
    texture: Texture,
    view: TextureView,
    mip_levels: u32,
}

/// CPU copy of a uniform block, flushed to its buffer at present.
struct UniformBlock {
    binding: u32,
    buffer: Buffer,
    staging: Vec<u8>,
    dirty: bool,
}

struct GpuProgram {
    vertex_module: ShaderModule,
    vertex_entry: String,
    fragment_module: ShaderModule,
    fragment_entry: String,
    inputs: Vec<AttributeInfo>,
    resources: Vec<ResourceInfo>,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    blocks: Vec<UniformBlock>,
    pipelines: HashMap<Vec<VertexAttribute>, RenderPipeline>,
    bind_groups: HashMap<Option<TextureHandle>, BindGroup>,
}

struct DrawCall {
    program: ProgramHandle,
    buffer: BufferHandle,
    attributes: Vec<VertexAttribute>,
    texture: Option<TextureHandle>,
    first: u32,
    count: u32,
}

/// Bind state and draws recorded since `clear`.
struct Frame {
    target: SurfaceTexture,
    view: TextureView,
    clear: wgpu::Color,
    program: Option<ProgramHandle>,
    buffer: Option<BufferHandle>,
    attributes: Vec<VertexAttribute>,
    texture: Option<TextureHandle>,
    draws: Vec<DrawCall>,
}

pub struct GpuState {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,

    // Depth
    depth_view: TextureView,

    // Resources
    shaders: NagaShaderPipeline,
    programs: HashMap<ProgramHandle, GpuProgram>,
    buffers: Vec<Buffer>,
    defaults_buffer: Buffer,
    textures: Vec<GpuTexture>,
    fallback_texture: GpuTexture,
    sampler: Sampler,
    texture_config: TextureConfig,

    frame: Option<Frame>,

    // Size cache
    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(
        window: Arc<Window>,
        backends: wgpu::Backends,
        texture_config: TextureConfig,
    ) -> Result<Self> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        // Instance & surface
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .context("create_surface failed")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        let info = adapter.get_info();
        log::info!("Using adapter '{}' ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("PhongView Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("request_device failed")?;

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .context("surface reports no alpha modes")?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let depth_view = create_depth_view(&device, &surface_config);

        let defaults_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Attribute defaults"),
            contents: bytemuck::cast_slice(&ATTRIBUTE_DEFAULTS),
            usage: BufferUsages::VERTEX,
        });
        let fallback_texture =
            upload_texture(&device, &queue, &TextureData::solid([255; 4]), false, "White");
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("Diffuse sampler"),
            address_mode_u: texture_config.wrap,
            address_mode_v: texture_config.wrap,
            address_mode_w: texture_config.wrap,
            mag_filter: texture_config.filter,
            min_filter: texture_config.filter,
            mipmap_filter: texture_config.filter,
            ..Default::default()
        });

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            depth_view,
            shaders: NagaShaderPipeline::new(),
            programs: HashMap::new(),
            buffers: Vec::new(),
            defaults_buffer,
            textures: Vec::new(),
            fallback_texture,
            sampler,
            texture_config,
            frame: None,
            width,
            height,
        })
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    pub fn recreate_surface(&mut self) {
        // Anything recorded against the old surface texture is dropped.
        self.frame = None;
        self.resize(self.width, self.height);
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    fn create_program(&self, handle: ProgramHandle) -> Result<GpuProgram, ShaderError> {
        let linked = self
            .shaders
            .program(handle)
            .ok_or(ShaderError::UnknownHandle(handle.0))?;
        if let Some(r) = linked.resources.iter().find(|r| r.slot.group != 0) {
            return Err(ShaderError::Link {
                diagnostic: format!(
                    "'{}' uses bind group {}; only group 0 is supported",
                    r.name, r.slot.group
                ),
            });
        }
        let vs = self
            .shaders
            .shader(linked.vertex)
            .ok_or(ShaderError::UnknownHandle(linked.vertex.0))?;
        let fs = self
            .shaders
            .shader(linked.fragment)
            .ok_or(ShaderError::UnknownHandle(linked.fragment.0))?;

        self.device.push_error_scope(ErrorFilter::Validation);

        let vertex_module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Vertex stage"),
            source: ShaderSource::Wgsl(vs.source().into()),
        });
        let fragment_module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Fragment stage"),
            source: ShaderSource::Wgsl(fs.source().into()),
        });

        let entries: Vec<BindGroupLayoutEntry> = linked
            .resources
            .iter()
            .map(|r| BindGroupLayoutEntry {
                binding: r.slot.binding,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: match r.kind {
                    ResourceKind::UniformBlock { size } => BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(size as u64),
                    },
                    ResourceKind::Texture => BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    ResourceKind::Sampler => BindingType::Sampler(SamplerBindingType::Filtering),
                },
                count: None,
            })
            .collect();
        let bind_group_layout = self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Program BGL"),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Program PipelineLayout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let blocks = linked
            .resources
            .iter()
            .filter_map(|r| match r.kind {
                ResourceKind::UniformBlock { size } => Some(UniformBlock {
                    binding: r.slot.binding,
                    buffer: self.device.create_buffer(&BufferDescriptor {
                        label: Some(r.name.as_str()),
                        size: size as u64,
                        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                    staging: vec![0; size as usize],
                    dirty: true,
                }),
                _ => None,
            })
            .collect();

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::Link {
                diagnostic: err.to_string(),
            });
        }

        Ok(GpuProgram {
            vertex_module,
            vertex_entry: vs.entry_point().to_owned(),
            fragment_module,
            fragment_entry: fs.entry_point().to_owned(),
            inputs: linked.attributes.clone(),
            resources: linked.resources.clone(),
            bind_group_layout,
            pipeline_layout,
            blocks,
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
        })
    }

    /// Build the pipeline for this attribute set unless it already exists.
    fn ensure_pipeline(
        &mut self,
        handle: ProgramHandle,
        attributes: &[VertexAttribute],
    ) -> Result<(), FrameError> {
        let color_format = self.surface_config.format;
        let program = self
            .programs
            .get_mut(&handle)
            .ok_or(FrameError::UnknownHandle {
                kind: "program",
                index: handle.0,
            })?;
        if program.pipelines.contains_key(attributes) {
            return Ok(());
        }

        let is_input = |location: u32| program.inputs.iter().any(|i| i.location == location);
        let fed = attributes
            .iter()
            .filter(|a| is_input(a.location))
            .map(|a| {
                Ok(wgpu::VertexAttribute {
                    format: vertex_format(a.components)?,
                    offset: a.offset as u64,
                    shader_location: a.location,
                })
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        let unfed = program
            .inputs
            .iter()
            .filter(|i| !attributes.iter().any(|a| a.location == i.location))
            .map(|i| {
                Ok(wgpu::VertexAttribute {
                    format: vertex_format(i.components)?,
                    offset: 0,
                    shader_location: i.location,
                })
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        let stride = attributes.first().map_or(0, |a| a.stride as u64);
        let buffers = [
            VertexBufferLayout {
                array_stride: stride,
                step_mode: VertexStepMode::Vertex,
                attributes: &fed,
            },
            VertexBufferLayout {
                array_stride: 0,
                step_mode: VertexStepMode::Vertex,
                attributes: &unfed,
            },
        ];

        self.device.push_error_scope(ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&program.pipeline_layout),
            vertex: VertexState {
                module: &program.vertex_module,
                entry_point: Some(&program.vertex_entry),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &program.fragment_module,
                entry_point: Some(&program.fragment_entry),
                targets: &[Some(ColorTargetState {
                    format: color_format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            // Depth test only; OBJ winding is not guaranteed.
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FrameError::Gpu(format!("pipeline creation failed: {err}")));
        }

        log::debug!(
            "Built pipeline for program {} ({} fed, {} defaulted inputs)",
            handle.0,
            fed.len(),
            unfed.len()
        );
        program.pipelines.insert(attributes.to_vec(), pipeline);
        Ok(())
    }

    fn ensure_bind_group(
        &mut self,
        handle: ProgramHandle,
        texture: Option<TextureHandle>,
    ) -> Result<(), FrameError> {
        let program = self
            .programs
            .get_mut(&handle)
            .ok_or(FrameError::UnknownHandle {
                kind: "program",
                index: handle.0,
            })?;
        if program.bind_groups.contains_key(&texture) {
            return Ok(());
        }

        let view = match texture {
            Some(t) => {
                &self
                    .textures
                    .get(t.0 as usize)
                    .ok_or(FrameError::UnknownHandle {
                        kind: "texture",
                        index: t.0,
                    })?
                    .view
            }
            None => &self.fallback_texture.view,
        };

        let entries: Vec<BindGroupEntry> = program
            .resources
            .iter()
            .filter_map(|r| {
                let resource = match r.kind {
                    ResourceKind::UniformBlock { .. } => program
                        .blocks
                        .iter()
                        .find(|b| b.binding == r.slot.binding)?
                        .buffer
                        .as_entire_binding(),
                    ResourceKind::Texture => BindingResource::TextureView(view),
                    ResourceKind::Sampler => BindingResource::Sampler(&self.sampler),
                };
                Some(BindGroupEntry {
                    binding: r.slot.binding,
                    resource,
                })
            })
            .collect();

        self.device.push_error_scope(ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Program BG"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FrameError::Gpu(format!("bind group creation failed: {err}")));
        }

        program.bind_groups.insert(texture, bind_group);
        Ok(())
    }
}

impl ShaderPipeline for GpuState {
    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<ShaderHandle, ShaderError> {
        self.shaders.compile(source, stage)
    }

    fn link(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, ShaderError> {
        let handle = self.shaders.link(vertex, fragment)?;
        let program = self.create_program(handle)?;
        self.programs.insert(handle, program);
        Ok(handle)
    }

    fn resolve_attribute(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.shaders.resolve_attribute(program, name)
    }

    fn resolve_uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.shaders.resolve_uniform(program, name)
    }
}

impl TextureLoader for GpuState {
    fn load(&mut self, path: &Path) -> Result<TextureHandle, TextureError> {
        let data = TextureData::load(path)?;

        let max = self.device.limits().max_texture_dimension_2d;
        if !data.is_valid() || data.width > max || data.height > max {
            return Err(TextureError::Unsupported {
                path: path.to_path_buf(),
                width: data.width,
                height: data.height,
                max,
            });
        }

        self.device.push_error_scope(ErrorFilter::Validation);
        let label = path.display().to_string();
        let texture = upload_texture(
            &self.device,
            &self.queue,
            &data,
            self.texture_config.mipmaps,
            &label,
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(TextureError::Upload {
                path: path.to_path_buf(),
                message: err.to_string(),
            });
        }

        log::info!(
            "Texture {label}: {}x{}, {} mip level(s)",
            data.width,
            data.height,
            texture.mip_levels
        );
        self.textures.push(texture);
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }
}

impl FrameBackend for GpuState {
    fn upload_vertices(&mut self, mut data: Vec<f32>) -> BufferHandle {
        if data.len() < MIN_VERTEX_FLOATS {
            data.resize(MIN_VERTEX_FLOATS, 0.0);
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh VB"),
            contents: bytemuck::cast_slice(&data),
            usage: BufferUsages::VERTEX,
        });
        self.buffers.push(buffer);
        BufferHandle(self.buffers.len() as u32 - 1)
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), FrameError> {
        if self.frame.is_some() {
            return Err(FrameError::FrameInFlight);
        }
        let target = self.surface.get_current_texture()?;
        let view = target.texture.create_view(&TextureViewDescriptor::default());
        let [r, g, b, a] = color.map(f64::from);
        self.frame = Some(Frame {
            target,
            view,
            clear: wgpu::Color { r, g, b, a },
            program: None,
            buffer: None,
            attributes: Vec::new(),
            texture: None,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), FrameError> {
        if !self.programs.contains_key(&program) {
            return Err(FrameError::UnknownHandle {
                kind: "program",
                index: program.0,
            });
        }
        frame_mut(&mut self.frame, "use_program")?.program = Some(program);
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle) -> Result<(), FrameError> {
        if buffer.0 as usize >= self.buffers.len() {
            return Err(FrameError::UnknownHandle {
                kind: "buffer",
                index: buffer.0,
            });
        }
        let frame = frame_mut(&mut self.frame, "bind_vertex_buffer")?;
        frame.buffer = Some(buffer);
        frame.attributes.clear();
        Ok(())
    }

    fn enable_attribute(&mut self, attribute: VertexAttribute) -> Result<(), FrameError> {
        let frame = frame_mut(&mut self.frame, "enable_attribute")?;
        frame.attributes.retain(|a| a.location != attribute.location);
        frame.attributes.push(attribute);
        Ok(())
    }

    fn bind_texture(
        &mut self,
        _location: UniformLocation,
        texture: TextureHandle,
    ) -> Result<(), FrameError> {
        if texture.0 as usize >= self.textures.len() {
            return Err(FrameError::UnknownHandle {
                kind: "texture",
                index: texture.0,
            });
        }
        frame_mut(&mut self.frame, "bind_texture")?.texture = Some(texture);
        Ok(())
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), FrameError> {
        let frame = frame_mut(&mut self.frame, "set_uniform")?;
        let handle = frame.program.ok_or(FrameError::NoProgram)?;
        let UniformLocation::Block { slot, offset, size } = location else {
            return Err(FrameError::Gpu(format!(
                "{location:?} is not a uniform block member"
            )));
        };
        let block = self
            .programs
            .get_mut(&handle)
            .and_then(|p| p.blocks.iter_mut().find(|b| b.binding == slot.binding))
            .ok_or_else(|| {
                FrameError::Gpu(format!("no uniform block at binding {}", slot.binding))
            })?;

        let bytes = value.as_bytes();
        let len = bytes.len().min(size as usize);
        let start = offset as usize;
        let dst = block.staging.get_mut(start..start + len).ok_or_else(|| {
            FrameError::Gpu(format!("uniform write at {start}+{len} overruns its block"))
        })?;
        dst.copy_from_slice(&bytes[..len]);
        block.dirty = true;
        Ok(())
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), FrameError> {
        let frame = frame_mut(&mut self.frame, "draw_arrays")?;
        let program = frame.program.ok_or(FrameError::NoProgram)?;
        let buffer = frame
            .buffer
            .ok_or_else(|| FrameError::Gpu("draw issued without a vertex buffer".into()))?;
        if count == 0 {
            return Ok(());
        }
        let mut attributes = frame.attributes.clone();
        attributes.sort_by_key(|a| a.location);
        let texture = frame.texture;

        self.ensure_pipeline(program, &attributes)?;
        self.ensure_bind_group(program, texture)?;

        frame_mut(&mut self.frame, "draw_arrays")?.draws.push(DrawCall {
            program,
            buffer,
            attributes,
            texture,
            first,
            count,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), FrameError> {
        let frame = self.frame.take().ok_or(FrameError::NotDrawing("present"))?;

        for block in self.programs.values_mut().flat_map(|p| p.blocks.iter_mut()) {
            if block.dirty {
                self.queue.write_buffer(&block.buffer, 0, &block.staging);
                block.dirty = false;
            }
        }

        self.device.push_error_scope(ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &frame.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(frame.clear),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for draw in &frame.draws {
                let Some(program) = self.programs.get(&draw.program) else { continue };
                let (Some(pipeline), Some(bind_group), Some(vertices)) = (
                    program.pipelines.get(&draw.attributes),
                    program.bind_groups.get(&draw.texture),
                    self.buffers.get(draw.buffer.0 as usize),
                ) else {
                    continue;
                };
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.set_vertex_buffer(0, vertices.slice(..));
                rpass.set_vertex_buffer(1, self.defaults_buffer.slice(..));
                rpass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FrameError::Gpu(err.to_string()));
        }

        frame.target.present();
        Ok(())
    }
}

fn frame_mut<'a>(
    frame: &'a mut Option<Frame>,
    call: &'static str,
) -> Result<&'a mut Frame, FrameError> {
    frame.as_mut().ok_or(FrameError::NotDrawing(call))
}

fn vertex_format(components: u32) -> Result<VertexFormat, FrameError> {
    match components {
        1 => Ok(VertexFormat::Float32),
        2 => Ok(VertexFormat::Float32x2),
        3 => Ok(VertexFormat::Float32x3),
        4 => Ok(VertexFormat::Float32x4),
        n => Err(FrameError::Gpu(format!(
            "unsupported vertex attribute width {n}"
        ))),
    }
}

/// Upload level 0 and, if requested, a CPU-built mip chain.
fn upload_texture(
    device: &Device,
    queue: &Queue,
    data: &TextureData,
    mipmaps: bool,
    label: &str,
) -> GpuTexture {
    let levels = if mipmaps {
        data.mip_chain()
    } else {
        vec![data.clone()]
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len() as u32,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });

    for (level, mip) in levels.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &mip.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(mip.width * mip.bytes_per_pixel()),
                rows_per_image: Some(mip.height),
            },
            Extent3d {
                width: mip.width,
                height: mip.height,
                depth_or_array_layers: 1,
            },
        );
    }

    let view = texture.create_view(&TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        mip_levels: levels.len() as u32,
    }
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size: Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&TextureViewDescriptor::default())
}
