//! wgpu-based implementation of the renderer capability.
//!
//! Shader filters run as fullscreen-quad fragment passes. Fragment shaders
//! follow a fixed binding convention: group 0 holds the input textures at
//! bindings `0..n` (slot order matches the filter's declared upstream order)
//! and the sampler at binding `n`. WGSL sources are loaded verbatim; `.glsl`
//! and `.frag` sources are translated to WGSL through naga.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result as AnyResult};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::{GpuContext, Renderer, SamplingMode, ScalingAlgorithm, ShaderHandle, TextureHandle};
use crate::error::{RenderError, Result};
use crate::frame::{PixelFormat, QuadVertex, VideoFrame};

/// Shared vertex shader for all fullscreen passes, in WGSL.
const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;

/// Passthrough fragment shader used by the scale blit.
const BLIT_FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_sampler: sampler;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_sampler, tex_coords);
}
"#;

/// A compiled fragment shader plus its render pipelines, one per input arity.
struct CompiledShader {
    module: wgpu::ShaderModule,
    entry_point: &'static str,
    pipelines: HashMap<usize, wgpu::RenderPipeline>,
}

/// Renderer capability backed by wgpu.
pub struct WgpuRenderer {
    ctx: GpuContext,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_module: wgpu::ShaderModule,
    point_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    bind_group_layouts: HashMap<usize, wgpu::BindGroupLayout>,
    shaders: HashMap<u64, CompiledShader>,
    textures: HashMap<u64, wgpu::Texture>,
    frame_texture: TextureHandle,
    output_target: TextureHandle,
    upscaler: ScalingAlgorithm,
    downscaler: ScalingAlgorithm,
    blit_shader: ShaderHandle,
    next_id: u64,
}

impl WgpuRenderer {
    /// Creates a renderer with the given decoded-frame and output sizes.
    pub fn new(
        input_size: (u32, u32),
        output_size: (u32, u32),
    ) -> AnyResult<Self> {
        let ctx = GpuContext::new()?;

        let vertex_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let vertex_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
        });

        let point_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Point Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let linear_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut renderer = Self {
            ctx,
            vertex_buffer,
            index_buffer,
            vertex_module,
            point_sampler,
            linear_sampler,
            bind_group_layouts: HashMap::new(),
            shaders: HashMap::new(),
            textures: HashMap::new(),
            frame_texture: TextureHandle::new(0, 0, 0),
            output_target: TextureHandle::new(0, 0, 0),
            upscaler: ScalingAlgorithm::Bilinear,
            downscaler: ScalingAlgorithm::Bilinear,
            blit_shader: ShaderHandle::new(0),
            next_id: 1,
        };

        renderer.frame_texture = renderer.create_texture(input_size.0, input_size.1);
        renderer.output_target = renderer.create_texture(output_size.0, output_size.1);
        renderer.blit_shader =
            renderer.register_module(BLIT_FRAGMENT_SHADER.to_string(), "fs_main", "Blit Shader")?;

        info!(
            "wgpu renderer initialized ({}x{} -> {}x{})",
            input_size.0, input_size.1, output_size.0, output_size.1
        );
        Ok(renderer)
    }

    /// Configures the scaling algorithms used for final output scaling.
    pub fn set_scalers(&mut self, upscaler: ScalingAlgorithm, downscaler: ScalingAlgorithm) {
        self.upscaler = upscaler;
        self.downscaler = downscaler;
    }

    /// Uploads a decoded frame, reallocating the frame texture on size change.
    ///
    /// After a size change the host must notify the active script through
    /// `on_input_size_changed()`.
    pub fn upload_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let rgba = frame.to_rgba();

        if self.frame_texture.size() != (rgba.width, rgba.height) {
            info!(
                "frame size changed to {}x{}, reallocating frame texture",
                rgba.width, rgba.height
            );
            let old = self.frame_texture.clone();
            self.frame_texture = self.create_texture(rgba.width, rgba.height);
            self.release_texture(&old);
        }

        let texture = self
            .textures
            .get(&self.frame_texture.id())
            .ok_or_else(|| anyhow!("frame texture missing from pool"))?;

        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(rgba.width * 4),
                rows_per_image: Some(rgba.height),
            },
            wgpu::Extent3d {
                width: rgba.width,
                height: rgba.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Resizes the output render target.
    ///
    /// After a size change the host must notify the active script through
    /// `on_output_size_changed()`.
    pub fn set_output_size(&mut self, width: u32, height: u32) {
        if self.output_target.size() == (width, height) {
            return;
        }
        info!("output size changed to {}x{}", width, height);
        let old = self.output_target.clone();
        self.output_target = self.create_texture(width, height);
        self.release_texture(&old);
    }

    /// Reads the output render target back into a CPU frame.
    pub fn read_output(&mut self) -> Result<VideoFrame> {
        let (width, height) = self.output_target.size();
        let texture = self
            .textures
            .get(&self.output_target.id())
            .ok_or_else(|| anyhow!("output target missing from pool"))?;

        // copy_texture_to_buffer requires 256-byte aligned rows
        let align_mask = 255;
        let padded_bytes_per_row = ((width as usize * 4) + align_mask) & !align_mask;
        let buffer_size = (padded_bytes_per_row * height as usize) as wgpu::BufferAddress;

        let readback_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = readback_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.ctx
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow!("device poll failed: {:?}", e))?;
        receiver
            .recv()
            .map_err(|e| anyhow!("readback channel closed: {}", e))?
            .map_err(|e| anyhow!("buffer mapping failed: {:?}", e))?;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = width as usize * 4;
        let mut output_data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * padded_bytes_per_row;
            output_data.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        readback_buffer.unmap();

        Ok(VideoFrame::from_data(
            width,
            height,
            PixelFormat::Rgba,
            output_data,
        ))
    }

    /// Converts GLSL fragment shader source to WGSL.
    fn glsl_to_wgsl(glsl: &str) -> AnyResult<String> {
        let mut frontend = Frontend::default();
        let options = Options::from(ShaderStage::Fragment);
        let module = frontend
            .parse(&options, glsl)
            .map_err(|e| anyhow!("GLSL parse error: {:?}", e))?;

        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        let info = validator
            .validate(&module)
            .map_err(|e| anyhow!("Shader validation error: {:?}", e))?;
        naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
            .map_err(|e| anyhow!("WGSL generation error: {:?}", e))
    }

    /// Creates a shader module from WGSL source and registers it.
    fn register_module(
        &mut self,
        wgsl: String,
        entry_point: &'static str,
        label: &str,
    ) -> AnyResult<ShaderHandle> {
        let error_scope = self.ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(wgsl)),
        });
        if let Some(error) = pollster::block_on(error_scope.pop()) {
            return Err(anyhow!("shader module rejected: {}", error));
        }

        let handle = ShaderHandle::new(self.next_id);
        self.next_id += 1;
        self.shaders.insert(
            handle.id(),
            CompiledShader {
                module,
                entry_point,
                pipelines: HashMap::new(),
            },
        );
        Ok(handle)
    }

    /// Bind group layout for a pass with `arity` input textures: bindings
    /// `0..arity` are textures, binding `arity` is the sampler.
    fn ensure_layout(&mut self, arity: usize) {
        if self.bind_group_layouts.contains_key(&arity) {
            return;
        }

        let mut entries = Vec::new();
        for binding in 0..arity as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: arity as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let layout = self
            .ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("Bind Group Layout ({} inputs)", arity)),
                entries: &entries,
            });
        self.bind_group_layouts.insert(arity, layout);
    }

    /// Builds (and caches) the render pipeline for `shader` at `arity` inputs.
    fn ensure_pipeline(&mut self, shader: &ShaderHandle, arity: usize) -> AnyResult<()> {
        self.ensure_layout(arity);

        let compiled = self
            .shaders
            .get(&shader.id())
            .ok_or_else(|| anyhow!("unknown shader handle {}", shader.id()))?;
        if compiled.pipelines.contains_key(&arity) {
            return Ok(());
        }

        let layout = &self.bind_group_layouts[&arity];
        let pipeline_layout = self
            .ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[layout],
                immediate_size: 0,
            });

        let pipeline = self
            .ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("Render Pipeline (shader {})", shader.id())),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.vertex_module,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &compiled.module,
                    entry_point: Some(compiled.entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        if let Some(compiled) = self.shaders.get_mut(&shader.id()) {
            compiled.pipelines.insert(arity, pipeline);
        }
        Ok(())
    }
}

impl Renderer for WgpuRenderer {
    fn compile_shader(&mut self, path: &Path) -> Result<ShaderHandle> {
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::ShaderIo {
            path: path.to_path_buf(),
            source,
        })?;

        let is_glsl = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("glsl") | Some("frag")
        );
        let (wgsl, entry_point) = if is_glsl {
            let wgsl = Self::glsl_to_wgsl(&source).map_err(|source| {
                RenderError::ShaderCompilation {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            (wgsl, "main")
        } else {
            (source, "fs_main")
        };

        debug!("compiled shader {:?}", path);
        self.register_module(wgsl, entry_point, &path.display().to_string())
            .map_err(|source| RenderError::ShaderCompilation {
                path: path.to_path_buf(),
                source,
            })
    }

    fn release_shader(&mut self, shader: &ShaderHandle) {
        if self.shaders.remove(&shader.id()).is_none() {
            debug!("release of unknown shader handle {}", shader.id());
        }
    }

    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        let handle = TextureHandle::new(self.next_id, width, height);
        self.next_id += 1;

        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Pooled Texture {}", handle.id())),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.textures.insert(handle.id(), texture);
        handle
    }

    fn release_texture(&mut self, texture: &TextureHandle) {
        if self.textures.remove(&texture.id()).is_none() {
            debug!("release of unknown texture handle {}", texture.id());
        }
    }

    fn frame_texture(&self) -> TextureHandle {
        self.frame_texture.clone()
    }

    fn output_target(&self) -> TextureHandle {
        self.output_target.clone()
    }

    fn input_size(&self) -> (u32, u32) {
        self.frame_texture.size()
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_target.size()
    }

    fn upscaler(&self) -> ScalingAlgorithm {
        self.upscaler
    }

    fn downscaler(&self) -> ScalingAlgorithm {
        self.downscaler
    }

    fn execute_shader(
        &mut self,
        shader: &ShaderHandle,
        inputs: &[TextureHandle],
        output: &TextureHandle,
        sampling: SamplingMode,
    ) -> Result<()> {
        self.ensure_pipeline(shader, inputs.len())?;

        let compiled = self
            .shaders
            .get(&shader.id())
            .ok_or_else(|| anyhow!("unknown shader handle {}", shader.id()))?;
        let pipeline = compiled
            .pipelines
            .get(&inputs.len())
            .ok_or_else(|| anyhow!("missing pipeline for {} inputs", inputs.len()))?;

        let mut input_views = Vec::with_capacity(inputs.len());
        for input in inputs {
            let texture = self
                .textures
                .get(&input.id())
                .ok_or_else(|| anyhow!("unknown texture handle {}", input.id()))?;
            input_views.push(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        }
        let output_texture = self
            .textures
            .get(&output.id())
            .ok_or_else(|| anyhow!("unknown texture handle {}", output.id()))?;
        let output_view = output_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = match sampling {
            SamplingMode::Point => &self.point_sampler,
            SamplingMode::Linear => &self.linear_sampler,
        };

        let mut bind_group_entries = Vec::with_capacity(inputs.len() + 1);
        for (binding, view) in input_views.iter().enumerate() {
            bind_group_entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        bind_group_entries.push(wgpu::BindGroupEntry {
            binding: inputs.len() as u32,
            resource: wgpu::BindingResource::Sampler(sampler),
        });

        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &bind_group_entries,
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Filter Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..6, 0, 0..1);
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        Ok(())
    }

    fn scale(
        &mut self,
        output: &TextureHandle,
        input: &TextureHandle,
        upscaler: ScalingAlgorithm,
        downscaler: ScalingAlgorithm,
    ) -> Result<()> {
        let upscaling = output.width() >= input.width() && output.height() >= input.height();
        let algorithm = if upscaling { upscaler } else { downscaler };
        let sampling = match algorithm {
            ScalingAlgorithm::Nearest => SamplingMode::Point,
            ScalingAlgorithm::Bilinear => SamplingMode::Linear,
        };

        let blit = self.blit_shader.clone();
        self.execute_shader(&blit, std::slice::from_ref(input), output, sampling)
    }
}
