//! Error types for filter graphs and render scripts.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by filter graphs, render scripts, and renderer backends.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A filter-creation helper was used before `setup()` bound a renderer.
    #[error("renderer is not bound; call setup() before creating filters")]
    RendererNotBound,

    /// A shader filter was constructed with an empty upstream list.
    #[error("a shader filter requires at least one upstream filter")]
    NoUpstream,

    /// A filter was re-entered while it was already evaluating its upstreams.
    #[error("filter graph evaluation re-entered a node; the graph contains a cycle")]
    CyclicGraph,

    /// An upstream filter reported success but exposed no output texture.
    #[error("upstream filter produced no output texture")]
    UpstreamNotRendered,

    /// A filter was asked to render after its resources were released.
    #[error("filter has been disposed")]
    FilterDisposed,

    /// Optional behavior that this script deliberately does not provide.
    #[error("{0} has not been implemented")]
    NotImplemented(&'static str),

    /// A shader source file could not be read.
    #[error("failed to read shader {path:?}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A shader failed to compile; fatal for the owning script instance.
    #[error("failed to compile shader {path:?}")]
    ShaderCompilation {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Malformed script configuration.
    #[error("invalid script configuration: {0}")]
    InvalidConfig(String),

    /// A failure inside the GPU backend.
    #[error(transparent)]
    Gpu(#[from] anyhow::Error),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
