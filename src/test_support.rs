//! Recording renderer double for graph-semantics tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::anyhow;

use crate::error::{RenderError, Result};
use crate::renderer::{
    Renderer, RendererRef, SamplingMode, ScalingAlgorithm, ShaderHandle, TextureHandle,
};

/// Installs a test-writer subscriber once so failing tests show the
/// reallocation and disposal logs they triggered.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One recorded `execute_shader` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderExecution {
    pub shader: u64,
    pub inputs: Vec<u64>,
    pub output: u64,
    pub sampling: SamplingMode,
}

/// One recorded `scale` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCall {
    pub output: TextureHandle,
    pub input: TextureHandle,
    pub upscaler: ScalingAlgorithm,
    pub downscaler: ScalingAlgorithm,
}

/// Renderer that records every interaction instead of touching a GPU.
pub struct MockRenderer {
    next_id: u64,
    frame_texture: TextureHandle,
    output_target: TextureHandle,
    pub upscaler: ScalingAlgorithm,
    pub downscaler: ScalingAlgorithm,
    pub compiled: Vec<PathBuf>,
    pub live_shaders: HashSet<u64>,
    pub live_textures: HashSet<u64>,
    pub released_shaders: Vec<u64>,
    pub released_textures: Vec<u64>,
    pub executions: Vec<ShaderExecution>,
    pub scale_calls: Vec<ScaleCall>,
    /// When set, `compile_shader` fails like a broken shader file would.
    pub fail_compile: bool,
}

impl MockRenderer {
    pub fn new(input_size: (u32, u32), output_size: (u32, u32)) -> Self {
        let mut mock = Self {
            next_id: 1,
            frame_texture: TextureHandle::new(0, 0, 0),
            output_target: TextureHandle::new(0, 0, 0),
            upscaler: ScalingAlgorithm::Bilinear,
            downscaler: ScalingAlgorithm::Nearest,
            compiled: Vec::new(),
            live_shaders: HashSet::new(),
            live_textures: HashSet::new(),
            released_shaders: Vec::new(),
            released_textures: Vec::new(),
            executions: Vec::new(),
            scale_calls: Vec::new(),
            fail_compile: false,
        };
        mock.frame_texture = mock.create_texture(input_size.0, input_size.1);
        mock.output_target = mock.create_texture(output_size.0, output_size.1);
        mock
    }

    /// Convenience constructor returning both the concrete handle (for
    /// assertions) and the shared trait object the code under test consumes.
    pub fn shared(
        input_size: (u32, u32),
        output_size: (u32, u32),
    ) -> (Rc<RefCell<MockRenderer>>, RendererRef) {
        init_tracing();
        let mock = Rc::new(RefCell::new(Self::new(input_size, output_size)));
        let renderer: RendererRef = mock.clone();
        (mock, renderer)
    }

    /// Simulates the host decoding video at a new resolution.
    pub fn set_input_size(&mut self, width: u32, height: u32) {
        let old = self.frame_texture.clone();
        self.frame_texture = self.create_texture(width, height);
        self.release_texture(&old);
    }

    /// Simulates the host resizing the output render target.
    pub fn set_output_size(&mut self, width: u32, height: u32) {
        let old = self.output_target.clone();
        self.output_target = self.create_texture(width, height);
        self.release_texture(&old);
    }
}

impl Renderer for MockRenderer {
    fn compile_shader(&mut self, path: &Path) -> Result<ShaderHandle> {
        if self.fail_compile {
            return Err(RenderError::ShaderCompilation {
                path: path.to_path_buf(),
                source: anyhow!("mock compilation failure"),
            });
        }
        let handle = ShaderHandle::new(self.next_id);
        self.next_id += 1;
        self.compiled.push(path.to_path_buf());
        self.live_shaders.insert(handle.id());
        Ok(handle)
    }

    fn release_shader(&mut self, shader: &ShaderHandle) {
        self.live_shaders.remove(&shader.id());
        self.released_shaders.push(shader.id());
    }

    fn create_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        let handle = TextureHandle::new(self.next_id, width, height);
        self.next_id += 1;
        self.live_textures.insert(handle.id());
        handle
    }

    fn release_texture(&mut self, texture: &TextureHandle) {
        self.live_textures.remove(&texture.id());
        self.released_textures.push(texture.id());
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
        if !self.live_shaders.contains(&shader.id()) {
            return Err(RenderError::Gpu(anyhow!(
                "execute with unknown shader {}",
                shader.id()
            )));
        }
        for texture in inputs.iter().chain(std::iter::once(output)) {
            if !self.live_textures.contains(&texture.id()) {
                return Err(RenderError::Gpu(anyhow!(
                    "execute with unknown texture {}",
                    texture.id()
                )));
            }
        }
        self.executions.push(ShaderExecution {
            shader: shader.id(),
            inputs: inputs.iter().map(|t| t.id()).collect(),
            output: output.id(),
            sampling,
        });
        Ok(())
    }

    fn scale(
        &mut self,
        output: &TextureHandle,
        input: &TextureHandle,
        upscaler: ScalingAlgorithm,
        downscaler: ScalingAlgorithm,
    ) -> Result<()> {
        self.scale_calls.push(ScaleCall {
            output: output.clone(),
            input: input.clone(),
            upscaler,
            downscaler,
        });
        Ok(())
    }
}
