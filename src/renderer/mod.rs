//! Renderer capability consumed by the filter graph.
//!
//! The graph core never talks to the GPU directly. Everything it needs
//! (shader compilation, a texture pool, shader execution, scaling) goes
//! through the [`Renderer`] trait. [`WgpuRenderer`] is the bundled wgpu
//! implementation; tests substitute a recording mock.

mod context;
mod wgpu_backend;

pub use context::GpuContext;
pub use wgpu_backend::WgpuRenderer;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque reference to a texture owned by a renderer's pool.
///
/// Handles are cheap to clone; they carry the geometry so filters can make
/// sizing decisions without a round trip to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureHandle {
    id: u64,
    width: u32,
    height: u32,
}

impl TextureHandle {
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Opaque reference to a compiled shader owned by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderHandle {
    id: u64,
}

impl ShaderHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Texture sampling mode for a shader filter's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Nearest neighbor sampling - sharp, pixelated
    #[default]
    Point,
    /// Linear interpolation sampling - smooth
    Linear,
}

/// Scaling algorithm used when blitting between differently sized textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAlgorithm {
    Nearest,
    Bilinear,
}

/// GPU capability consumed (never implemented) by the filter graph core.
///
/// All resources handed out by a renderer remain owned by it; callers hold
/// handles and release them through the same renderer.
pub trait Renderer {
    /// Compile the shader file at `path`. Failures are fatal for the script
    /// that requested the compilation.
    fn compile_shader(&mut self, path: &Path) -> Result<ShaderHandle>;

    /// Release a compiled shader.
    fn release_shader(&mut self, shader: &ShaderHandle);

    /// Allocate a render-target texture in the pool.
    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle;

    /// Release a pooled texture.
    fn release_texture(&mut self, texture: &TextureHandle);

    /// The current decoded video frame.
    fn frame_texture(&self) -> TextureHandle;

    /// The final output render target.
    fn output_target(&self) -> TextureHandle;

    /// Size of the decoded video frame.
    fn input_size(&self) -> (u32, u32);

    /// Size of the output render target.
    fn output_size(&self) -> (u32, u32);

    /// The host-configured upscaling algorithm.
    fn upscaler(&self) -> ScalingAlgorithm;

    /// The host-configured downscaling algorithm.
    fn downscaler(&self) -> ScalingAlgorithm;

    /// Run `shader` over `inputs` (bound positionally to input slots),
    /// writing into `output`.
    fn execute_shader(
        &mut self,
        shader: &ShaderHandle,
        inputs: &[TextureHandle],
        output: &TextureHandle,
        sampling: SamplingMode,
    ) -> Result<()>;

    /// Blit `input` into `output`, picking `upscaler` or `downscaler`
    /// depending on the geometry change.
    fn scale(
        &mut self,
        output: &TextureHandle,
        input: &TextureHandle,
        upscaler: ScalingAlgorithm,
        downscaler: ScalingAlgorithm,
    ) -> Result<()>;
}

/// Shared renderer reference used throughout a script instance.
///
/// The host drives everything from a single thread, so `Rc<RefCell<_>>` is
/// the sharing model; renderers are never sent across threads.
pub type RendererRef = Rc<RefCell<dyn Renderer>>;
