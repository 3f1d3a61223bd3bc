//! Iris: GPU filter-graph render scripts for real-time video post-processing
//!
//! A render script owns a directed, lazily-evaluated graph of shader-based
//! image filters that transforms a decoded video frame into a final output
//! texture. The graph core is GPU-agnostic and talks to the device through
//! the [`renderer::Renderer`] capability; a wgpu implementation is bundled.

pub mod error;
pub mod filter;
pub mod frame;
pub mod renderer;
pub mod script;
pub mod scripts;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{RenderError, Result};
pub use filter::{Filter, FilterRef, InputFilter, ShaderFilter};
pub use renderer::{Renderer, RendererRef, SamplingMode, ScalingAlgorithm};
pub use script::{RenderScript, ScriptContext, ScriptDescriptor, ScriptInputDescriptor};
