//! [`GpuDevice`] over wgpu.
//!
//! Bind-model calls only update CPU-side state. `draw_indexed` snapshots the
//! program's uniform block into a per-frame ring slot together with the
//! bound textures and attribute streams; `end_frame` replays the recorded
//! draws in one render pass.

use std::{
    collections::{BTreeSet, HashMap},
    num::NonZeroU64,
    sync::Arc,
};

use wgpu::{
    Adapter, BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, BlendState, Buffer, BufferBindingType, BufferUsages, ColorTargetState,
    ColorWrites, CommandEncoderDescriptor, DepthBiasState, DepthStencilState, Device,
    DeviceDescriptor, ErrorFilter, Extent3d, Features, FragmentState, Instance,
    InstanceDescriptor, Limits, LoadOp, Operations, PipelineLayout, PipelineLayoutDescriptor,
    PowerPreference, PresentMode, Queue, RenderPassColorAttachment, RenderPassDescriptor,
    RenderPipeline, RenderPipelineDescriptor, Sampler, ShaderModule, ShaderModuleDescriptor,
    ShaderSource, ShaderStages, StoreOp, Surface, SurfaceConfiguration, SurfaceError,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    TextureViewDescriptor, VertexAttribute, VertexBufferLayout, VertexState, VertexStepMode,
};
use winit::{dpi::PhysicalSize, window::Window};

use asset::TextureData;

use super::{
    AttributeFormat, AttributeLocation, BufferId, BufferUsage, GpuDevice, ProgramId,
    ProgramSource, ShaderStage, TextureId, TextureUpload, UniformDecl, UniformLocation,
    UniformValue, uniform_block_layout,
};
use crate::{config::RendererConfig, error::GpuError};

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
/// Sampled texture units exposed to programs (group 1).
const TEXTURE_UNITS: usize = 3;
/// Bytes reserved per draw in the uniform ring; a multiple of the
/// dynamic-offset alignment on every backend.
const UNIFORM_SLOT: u64 = 256;

struct GpuBuffer {
    buffer: Buffer,
    size: u64,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: TextureView,
    sampler: Sampler,
}

struct Program {
    pipeline: RenderPipeline,
    uniforms: Vec<UniformDecl>,
    offsets: Vec<u32>,
    block: Vec<u8>,
    attributes: Vec<&'static str>,
    textures: Vec<&'static str>,
}

#[derive(Clone, Copy)]
struct RecordedDraw {
    program: ProgramId,
    uniform_offset: u32,
    textures: [TextureId; TEXTURE_UNITS],
    streams: [(BufferId, u64); 3],
    index_buffer: BufferId,
    index_count: u32,
}

pub struct WgpuDevice {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    depth_view: TextureView,
    clear_color: wgpu::Color,

    // Device/queue
    device: Device,
    queue: Queue,

    // Shared layouts
    texture_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,

    // Uniform ring
    uniform_ring: Buffer,
    uniform_bind_group: BindGroup,
    uniform_staging: Vec<u8>,
    ring_capacity: u32,
    ring_cursor: u32,
    ring_exhausted: bool,

    // Resources
    next_id: u64,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, Program>,
    fallback_texture: TextureId,
    texture_groups: HashMap<[TextureId; TEXTURE_UNITS], BindGroup>,

    // Bind state
    current_program: Option<ProgramId>,
    attributes: HashMap<AttributeLocation, (BufferId, u64)>,
    enabled: BTreeSet<AttributeLocation>,
    bound_units: [Option<TextureId>; TEXTURE_UNITS],

    draws: Vec<RecordedDraw>,
}

impl WgpuDevice {
    /// Create the device and configure a surface for `window`.
    pub async fn new(
        window: Arc<Window>,
        backends: wgpu::Backends,
        config: &RendererConfig,
    ) -> Result<Self, GpuError> {
        let PhysicalSize { width, height } = window.inner_size();

        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::Initialization(e.to_string()))?;
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("ObjView Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| GpuError::Initialization(e.to_string()))?;

        let surface_config = surface_config(&surface, &adapter, width, height)?;
        surface.configure(&device, &surface_config);
        let depth_view = create_depth_view(&device, &surface_config);

        // ==== Layouts ====
        let uniform_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Uniform BGL"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_entries: Vec<BindGroupLayoutEntry> = (0..TEXTURE_UNITS as u32)
            .flat_map(|unit| {
                [
                    BindGroupLayoutEntry {
                        binding: unit * 2,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: unit * 2 + 1,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Texture BGL"),
            entries: &texture_entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Object PipelineLayout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // ==== Uniform ring ====
        let ring_capacity = config.max_draws_per_frame.max(1);
        let uniform_ring = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform ring"),
            size: UNIFORM_SLOT * u64::from(ring_capacity),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform BG"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_ring,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_SLOT),
                }),
            }],
        });

        let [r, g, b, a] = config.clear_color;
        let mut this = Self {
            surface,
            surface_config,
            depth_view,
            clear_color: wgpu::Color { r, g, b, a },
            device,
            queue,
            texture_layout,
            pipeline_layout,
            uniform_ring,
            uniform_bind_group,
            uniform_staging: vec![0; (UNIFORM_SLOT * u64::from(ring_capacity)) as usize],
            ring_capacity,
            ring_cursor: 0,
            ring_exhausted: false,
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            fallback_texture: TextureId(0),
            texture_groups: HashMap::new(),
            current_program: None,
            attributes: HashMap::new(),
            enabled: BTreeSet::new(),
            bound_units: [None; TEXTURE_UNITS],
            draws: Vec::new(),
        };

        // Unbound units sample opaque white.
        let white = [TextureData::solid([255, 255, 255, 255])];
        this.fallback_texture = this.create_texture(&TextureUpload {
            label: "Fallback white",
            levels: &white,
            clamp: true,
        })?;
        Ok(this)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn aspect(&self) -> f32 {
        self.surface_config.width as f32 / self.surface_config.height as f32
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        let (width, height) = self.size();
        self.resize(width, height);
    }

    /// Start recording a frame.
    pub fn begin_frame(&mut self) {
        self.draws.clear();
        self.ring_cursor = 0;
        self.ring_exhausted = false;
    }

    /// Replay the recorded draws into the next surface texture and present.
    pub fn end_frame(&mut self) -> Result<(), SurfaceError> {
        let used = UNIFORM_SLOT as usize * self.ring_cursor as usize;
        if used > 0 {
            self.queue
                .write_buffer(&self.uniform_ring, 0, &self.uniform_staging[..used]);
        }

        let draws = std::mem::take(&mut self.draws);
        for draw in &draws {
            self.ensure_texture_group(draw.textures);
        }

        let frame = self.surface.get_current_texture()?;
        let view = frame.texture.create_view(&Default::default());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("MainPass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.clear_color),
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

            for draw in &draws {
                let Some(program) = self.programs.get(&draw.program) else {
                    continue;
                };
                let Some(index) = self.buffers.get(&draw.index_buffer) else {
                    continue;
                };
                let Some(textures) = self.texture_groups.get(&draw.textures) else {
                    continue;
                };
                let streams: Option<Vec<_>> = draw
                    .streams
                    .iter()
                    .map(|(id, offset)| self.buffers.get(id).map(|b| b.buffer.slice(*offset..)))
                    .collect();
                let Some(streams) = streams else {
                    continue;
                };

                rpass.set_pipeline(&program.pipeline);
                rpass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
                rpass.set_bind_group(1, textures, &[]);
                for (slot, slice) in streams.into_iter().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, slice);
                }
                rpass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint16);
                rpass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_texture_group(&mut self, key: [TextureId; TEXTURE_UNITS]) {
        if self.texture_groups.contains_key(&key) {
            return;
        }
        let resolve = |id: &TextureId| {
            self.textures
                .get(id)
                .or_else(|| self.textures.get(&self.fallback_texture))
        };
        let Some(resolved) = key.iter().map(resolve).collect::<Option<Vec<_>>>() else {
            return;
        };
        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .enumerate()
            .flat_map(|(unit, texture)| {
                [
                    wgpu::BindGroupEntry {
                        binding: unit as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: unit as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ]
            })
            .collect();
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture BG"),
            layout: &self.texture_layout,
            entries: &entries,
        });
        self.texture_groups.insert(key, group);
    }

    fn compile(
        &self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<ShaderModule, GpuError> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(GpuError::ShaderCompile {
                stage,
                label: label.to_string(),
                log: err.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn program(&self, program: ProgramId) -> Result<&Program, GpuError> {
        self.programs
            .get(&program)
            .ok_or(GpuError::UnknownProgram(program))
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
        label: &str,
    ) -> Result<BufferId, GpuError> {
        let usage_flags = match usage {
            BufferUsage::Vertex => BufferUsages::VERTEX,
            BufferUsage::Index => BufferUsages::INDEX,
        } | BufferUsages::COPY_DST;
        let padded = size.max(1).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded,
            usage: usage_flags,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::BufferCreation {
                label: label.to_string(),
                reason: err.to_string(),
            });
        }
        log::debug!("Allocated {:?} buffer '{}' ({} bytes)", usage, label, size);

        let id = BufferId(self.allocate());
        self.buffers.insert(id, GpuBuffer { buffer, size });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let target = self
            .buffers
            .get(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?;
        let len = data.len() as u64;
        if offset + len > target.size {
            return Err(GpuError::OutOfBounds {
                buffer,
                offset,
                len,
                size: target.size,
            });
        }
        if len % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&target.buffer, offset, data);
        } else {
            // Copies are 4-byte granular; the allocation was padded for this.
            let mut padded = data.to_vec();
            padded.resize(len.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize, 0);
            self.queue.write_buffer(&target.buffer, offset, &padded);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.buffer.destroy();
        }
    }

    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> Result<TextureId, GpuError> {
        let fail = |reason: String| GpuError::TextureCreation {
            label: upload.label.to_string(),
            reason,
        };
        let base = upload
            .levels
            .first()
            .ok_or_else(|| fail("no image levels".to_string()))?;
        for (level, data) in upload.levels.iter().enumerate() {
            if !data.is_valid() {
                return Err(fail(format!("mip level {level} has malformed pixel data")));
            }
        }

        self.device.push_error_scope(ErrorFilter::Validation);
        let texture = self.device.create_texture(&TextureDescriptor {
            label: Some(upload.label),
            size: Extent3d {
                width: base.width,
                height: base.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: upload.levels.len() as u32,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (level, data) in upload.levels.iter().enumerate() {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &data.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(data.width * data.bytes_per_pixel()),
                    rows_per_image: Some(data.height),
                },
                Extent3d {
                    width: data.width,
                    height: data.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(fail(err.to_string()));
        }

        let address_mode = if upload.clamp {
            wgpu::AddressMode::ClampToEdge
        } else {
            wgpu::AddressMode::Repeat
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(upload.label),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let view = texture.create_view(&TextureViewDescriptor::default());

        let id = TextureId(self.allocate());
        self.textures.insert(
            id,
            GpuTexture {
                _texture: texture,
                view,
                sampler,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if texture == self.fallback_texture {
            return;
        }
        if self.textures.remove(&texture).is_some() {
            self.texture_groups.retain(|key, _| !key.contains(&texture));
            for unit in &mut self.bound_units {
                if *unit == Some(texture) {
                    *unit = None;
                }
            }
        }
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramId, GpuError> {
        let (offsets, block_size) = uniform_block_layout(source.uniforms);
        if u64::from(block_size) > UNIFORM_SLOT {
            return Err(GpuError::ProgramLink {
                label: source.label.to_string(),
                log: format!(
                    "uniform block is {block_size} bytes; at most {UNIFORM_SLOT} fit a slot"
                ),
            });
        }
        if source.textures.len() > TEXTURE_UNITS {
            return Err(GpuError::ProgramLink {
                label: source.label.to_string(),
                log: format!(
                    "{} textures declared; {TEXTURE_UNITS} units available",
                    source.textures.len()
                ),
            });
        }

        let vertex = self.compile(ShaderStage::Vertex, source.label, source.vertex)?;
        let fragment = self.compile(ShaderStage::Fragment, source.label, source.fragment)?;

        let attributes: Vec<[VertexAttribute; 1]> = source
            .attributes
            .iter()
            .enumerate()
            .map(|(location, (_, format))| {
                [VertexAttribute {
                    format: vertex_format(*format),
                    offset: 0,
                    shader_location: location as u32,
                }]
            })
            .collect();
        let buffers: Vec<VertexBufferLayout> = source
            .attributes
            .iter()
            .zip(&attributes)
            .map(|((_, format), attribute)| VertexBufferLayout {
                array_stride: format.size(),
                step_mode: VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        self.device.push_error_scope(ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(source.label),
            layout: Some(&self.pipeline_layout),
            vertex: VertexState {
                module: &vertex,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &fragment,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: self.surface_config.format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
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
            return Err(GpuError::ProgramLink {
                label: source.label.to_string(),
                log: err.to_string(),
            });
        }

        let id = ProgramId(self.allocate());
        self.programs.insert(
            id,
            Program {
                pipeline,
                uniforms: source.uniforms.to_vec(),
                offsets,
                block: vec![0; block_size as usize],
                attributes: source.attributes.iter().map(|(name, _)| *name).collect(),
                textures: source.textures.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        let index = program.uniforms.iter().position(|u| u.name == name)?;
        Some(UniformLocation(index as u32))
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        let program = self.programs.get(&program)?;
        let index = program.attributes.iter().position(|a| *a == name)?;
        Some(AttributeLocation(index as u32))
    }

    fn texture_unit(&self, program: ProgramId, name: &str) -> Option<u32> {
        let program = self.programs.get(&program)?;
        program
            .textures
            .iter()
            .position(|t| *t == name)
            .map(|unit| unit as u32)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), GpuError> {
        self.program(program)?;
        self.current_program = Some(program);
        Ok(())
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), GpuError> {
        let id = self.current_program.ok_or(GpuError::NoProgramBound)?;
        let program = self
            .programs
            .get_mut(&id)
            .ok_or(GpuError::UnknownProgram(id))?;
        let index = location.0 as usize;
        let decl = program.uniforms.get(index).ok_or(GpuError::UniformType {
            program: id,
            location: location.0,
            expected: "a declared uniform",
        })?;
        if decl.kind != value.kind() {
            return Err(GpuError::UniformType {
                program: id,
                location: location.0,
                expected: decl.kind.name(),
            });
        }
        let offset = program.offsets[index] as usize;
        let bytes = value.to_bytes();
        program.block[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) -> Result<(), GpuError> {
        if !self.textures.contains_key(&texture) {
            return Err(GpuError::UnknownTexture(texture));
        }
        let slot = self
            .bound_units
            .get_mut(unit as usize)
            .ok_or(GpuError::TextureUnit {
                unit,
                units: TEXTURE_UNITS as u32,
            })?;
        *slot = Some(texture);
        Ok(())
    }

    fn unbind_texture(&mut self, unit: u32) {
        if let Some(slot) = self.bound_units.get_mut(unit as usize) {
            *slot = None;
        }
    }

    fn set_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: BufferId,
        offset: u64,
        _format: AttributeFormat,
    ) -> Result<(), GpuError> {
        let size = self
            .buffers
            .get(&buffer)
            .ok_or(GpuError::UnknownBuffer(buffer))?
            .size;
        if offset > size {
            return Err(GpuError::OutOfBounds {
                buffer,
                offset,
                len: 0,
                size,
            });
        }
        self.attributes.insert(location, (buffer, offset));
        Ok(())
    }

    fn enable_vertex_attribute(&mut self, location: AttributeLocation) {
        self.enabled.insert(location);
    }

    fn disable_vertex_attribute(&mut self, location: AttributeLocation) {
        self.enabled.remove(&location);
    }

    fn draw_indexed(&mut self, index_buffer: BufferId, index_count: u32) -> Result<(), GpuError> {
        let id = self.current_program.ok_or(GpuError::NoProgramBound)?;
        let program = self
            .programs
            .get(&id)
            .ok_or(GpuError::UnknownProgram(id))?;

        let mut streams = [(index_buffer, 0); 3];
        for (slot, stream) in streams.iter_mut().enumerate() {
            let location = AttributeLocation(slot as u32);
            let source = self
                .attributes
                .get(&location)
                .filter(|_| self.enabled.contains(&location))
                .ok_or(GpuError::AttributeNotReady(location))?;
            *stream = *source;
        }
        let size = self
            .buffers
            .get(&index_buffer)
            .ok_or(GpuError::UnknownBuffer(index_buffer))?
            .size;
        let len = u64::from(index_count) * 2;
        if len > size {
            return Err(GpuError::OutOfBounds {
                buffer: index_buffer,
                offset: 0,
                len,
                size,
            });
        }

        if self.ring_cursor >= self.ring_capacity {
            if !self.ring_exhausted {
                log::warn!(
                    "Uniform ring full ({} draws); skipping the rest of this frame",
                    self.ring_capacity
                );
                self.ring_exhausted = true;
            }
            return Ok(());
        }
        let slot_start = (u64::from(self.ring_cursor) * UNIFORM_SLOT) as usize;
        let block = &program.block;
        self.uniform_staging[slot_start..slot_start + block.len()].copy_from_slice(block);

        let textures = self.bound_units.map(|t| t.unwrap_or(self.fallback_texture));
        self.draws.push(RecordedDraw {
            program: id,
            uniform_offset: slot_start as u32,
            textures,
            streams,
            index_buffer,
            index_count,
        });
        self.ring_cursor += 1;
        Ok(())
    }
}

fn vertex_format(format: AttributeFormat) -> wgpu::VertexFormat {
    match format {
        AttributeFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        AttributeFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

fn surface_config(
    surface: &Surface<'static>,
    adapter: &Adapter,
    width: u32,
    height: u32,
) -> Result<SurfaceConfiguration, GpuError> {
    // Surface format (prefer sRGB)
    let caps = surface.get_capabilities(adapter);
    let surface_format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or_else(|| GpuError::Surface("adapter reports no surface formats".to_string()))?;
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    Ok(SurfaceConfiguration {
        usage: TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: width.max(1),
        height: height.max(1),
        present_mode: PresentMode::AutoVsync,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
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
