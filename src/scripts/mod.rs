//! Bundled render scripts.

mod shader_chain;

pub use shader_chain::{ChainConfig, ChainStage, ShaderChainScript};
