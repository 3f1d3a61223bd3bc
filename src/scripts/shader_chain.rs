//! Configuration-driven linear shader chain.
//!
//! The simplest useful render script: an ordered list of shader files, each
//! applied over the previous stage's output, with the final stage scaled
//! into the output target. Chains are described in YAML:
//!
//! ```yaml
//! name: SharpenChain
//! description: Edge-adaptive sharpening
//! stages:
//!   - file: luma.wgsl
//!   - file: sharpen.wgsl
//!     linear_sampling: true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RenderError, Result};
use crate::filter::FilterRef;
use crate::renderer::{RendererRef, SamplingMode};
use crate::script::{RenderScript, ScriptContext, ScriptDescriptor};

/// One shader stage in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStage {
    /// Shader file name, resolved against the script's shader directory.
    pub file: String,
    /// Sample the stage input linearly instead of point sampling.
    #[serde(default)]
    pub linear_sampling: bool,
}

/// Declarative description of a shader chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain name; doubles as the script identifier.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Shader directory under the scripts root; defaults to `name`.
    #[serde(default)]
    pub shader_dir: Option<String>,
    /// Ordered shader stages; must not be empty.
    pub stages: Vec<ChainStage>,
}

/// Render script applying a linear chain of shader stages to the frame.
pub struct ShaderChainScript {
    ctx: ScriptContext,
    config: ChainConfig,
    root: Option<FilterRef>,
}

impl ShaderChainScript {
    /// Creates a chain script from a parsed configuration.
    pub fn new(config: ChainConfig) -> Result<Self> {
        if config.stages.is_empty() {
            return Err(RenderError::InvalidConfig(
                "a shader chain needs at least one stage".into(),
            ));
        }
        let shader_dir = config
            .shader_dir
            .clone()
            .unwrap_or_else(|| config.name.clone());
        Ok(Self {
            ctx: ScriptContext::new(shader_dir),
            config,
            root: None,
        })
    }

    /// Parses a YAML chain description.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ChainConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RenderError::InvalidConfig(e.to_string()))?;
        Self::new(config)
    }

    /// Loads a YAML chain description from disk.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path).map_err(|source| RenderError::ShaderIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Overrides the shader data root (default: next to the executable).
    pub fn set_shader_root(&mut self, root: PathBuf) {
        self.ctx.set_shader_root(root);
    }
}

impl RenderScript for ShaderChainScript {
    fn descriptor(&self) -> ScriptDescriptor {
        ScriptDescriptor {
            id: self.config.name.clone(),
            name: self.config.name.clone(),
            description: self.config.description.clone(),
        }
    }

    fn setup(&mut self, renderer: RendererRef) -> Result<()> {
        self.ctx.setup(renderer);

        let mut current = self.ctx.input_filter()?;
        for stage in &self.config.stages {
            let shader = self.ctx.compile_shader(&stage.file)?;
            let sampling = if stage.linear_sampling {
                SamplingMode::Linear
            } else {
                SamplingMode::Point
            };
            current = self
                .ctx
                .create_filter_with_sampling(shader, sampling, vec![current])?;
        }
        self.root = Some(current);

        info!(
            "shader chain '{}' ready with {} stages",
            self.config.name,
            self.config.stages.len()
        );
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let root = self.root.as_ref().ok_or(RenderError::RendererNotBound)?;
        self.ctx.render_to_output(root)
    }

    fn dispose(&mut self) {
        self.root = None;
        self.ctx.dispose();
    }
}
