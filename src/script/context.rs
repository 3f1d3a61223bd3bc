//! Base implementation shared by all render scripts.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::debug;

use super::paths;
use crate::error::{RenderError, Result};
use crate::filter::{Filter, FilterRef, InputFilter, ShaderFilter};
use crate::renderer::{Renderer, RendererRef, SamplingMode, ShaderHandle, TextureHandle};

/// Renderer binding, filter-creation helpers, shader loading, and disposal.
///
/// Concrete scripts own one context and delegate the default lifecycle
/// behavior to it; the context tracks every filter it creates so that
/// `dispose` releases the whole graph deterministically. `Drop` re-runs
/// disposal as a backstop, but explicit `dispose` is the release path.
pub struct ScriptContext {
    renderer: Option<RendererRef>,
    input_filter: Option<FilterRef>,
    shader_dir: String,
    shader_root: Option<PathBuf>,
    filters: Vec<FilterRef>,
    disposed: bool,
}

impl ScriptContext {
    /// Creates a context whose shader files live under
    /// `RenderScripts/<shader_dir>` next to the host binary.
    pub fn new(shader_dir: impl Into<String>) -> Self {
        Self {
            renderer: None,
            input_filter: None,
            shader_dir: shader_dir.into(),
            shader_root: None,
            filters: Vec::new(),
            disposed: false,
        }
    }

    /// Overrides the shader data root (default: next to the executable).
    pub fn set_shader_root(&mut self, root: PathBuf) {
        self.shader_root = Some(root);
    }

    /// Binds the renderer. Must be called before any filter-creation helper.
    pub fn setup(&mut self, renderer: RendererRef) {
        self.renderer = Some(renderer);
    }

    /// The bound renderer, or `RendererNotBound` before `setup`.
    pub fn renderer(&self) -> Result<RendererRef> {
        self.renderer.clone().ok_or(RenderError::RendererNotBound)
    }

    /// Directory holding this script's shader files.
    pub fn shader_data_dir(&self) -> PathBuf {
        match &self.shader_root {
            Some(root) => paths::script_data_dir_in(root, &self.shader_dir),
            None => paths::script_data_dir(&self.shader_dir),
        }
    }

    /// The default input filter over the renderer's decoded frame, created
    /// lazily on first access and reused across frames.
    pub fn input_filter(&mut self) -> Result<FilterRef> {
        if let Some(filter) = &self.input_filter {
            return Ok(filter.clone());
        }
        let renderer = self.renderer()?;
        let filter: FilterRef = Rc::new(RefCell::new(InputFilter::new(renderer)));
        self.input_filter = Some(filter.clone());
        Ok(filter)
    }

    /// Compiles a shader file from this script's shader directory.
    /// Compilation failures are fatal for the script instance.
    pub fn compile_shader(&self, shader_file_name: &str) -> Result<ShaderHandle> {
        let renderer = self.renderer()?;
        let path = self.shader_data_dir().join(shader_file_name);
        let handle = renderer.borrow_mut().compile_shader(&path)?;
        Ok(handle)
    }

    /// Creates a point-sampled single-input shader filter.
    pub fn create_filter(&mut self, shader: ShaderHandle, input: FilterRef) -> Result<FilterRef> {
        self.create_filter_with_sampling(shader, SamplingMode::Point, vec![input])
    }

    /// Creates a shader filter over an ordered upstream list.
    ///
    /// Fails with `RendererNotBound` before `setup`, and with `NoUpstream`
    /// for an empty list; no partial filter is created in either case.
    pub fn create_filter_with_sampling(
        &mut self,
        shader: ShaderHandle,
        sampling: SamplingMode,
        inputs: Vec<FilterRef>,
    ) -> Result<FilterRef> {
        let renderer = self.renderer()?;
        let filter: FilterRef = Rc::new(RefCell::new(ShaderFilter::new(
            renderer, shader, sampling, inputs,
        )?));
        self.filters.push(filter.clone());
        Ok(filter)
    }

    /// Runs one frame cycle on `filter` and returns its output texture.
    pub fn get_frame(&self, filter: &FilterRef) -> Result<TextureHandle> {
        let mut filter = filter.borrow_mut();
        filter.new_frame();
        filter.render()?;
        filter
            .output_texture()
            .ok_or(RenderError::UpstreamNotRendered)
    }

    /// Default per-frame behavior: evaluate the graph and scale its output
    /// into the renderer's output target with the configured algorithms.
    pub fn render_to_output(&self, root: &FilterRef) -> Result<()> {
        let frame = self.get_frame(root)?;
        let target = self.renderer()?.borrow().output_target();
        self.scale(&target, &frame)
    }

    /// Scales `input` into `output` with the renderer's configured
    /// up/downscale algorithms.
    pub fn scale(&self, output: &TextureHandle, input: &TextureHandle) -> Result<()> {
        let renderer = self.renderer()?;
        let (upscaler, downscaler) = {
            let renderer = renderer.borrow();
            (renderer.upscaler(), renderer.downscaler())
        };
        let result = renderer
            .borrow_mut()
            .scale(output, input, upscaler, downscaler);
        result
    }

    /// Releases every filter this context created, then detaches from the
    /// renderer. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        for filter in self.filters.drain(..) {
            filter.borrow_mut().dispose();
        }
        self.input_filter = None;
        self.renderer = None;
    }
}

impl Drop for ScriptContext {
    fn drop(&mut self) {
        if !self.disposed {
            debug!("script context dropped without explicit dispose");
            self.dispose();
        }
    }
}
