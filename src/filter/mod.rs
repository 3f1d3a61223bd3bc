//! Filter graph core.
//!
//! A filter is a graph node that produces a GPU texture: either by exposing
//! one directly ([`InputFilter`]) or by rendering a shader over one or more
//! upstream filters ([`ShaderFilter`]). Evaluation is lazy and pull-based:
//! nothing runs until a downstream consumer asks for an output, and each node
//! renders at most once per frame cycle.

mod input;
mod shader;

pub use input::InputFilter;
pub use shader::ShaderFilter;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::renderer::TextureHandle;

/// Per-node evaluation state within one frame cycle.
///
/// `Rendering` is only observable mid-evaluation; seeing it from `render()`
/// means the graph re-entered a node and therefore contains a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Output is invalid; the node must render before it can be read.
    Stale,
    /// The node is currently evaluating its upstreams.
    Rendering,
    /// Output is valid until the next `new_frame()`.
    Fresh,
}

/// A node in the filter graph.
pub trait Filter {
    /// Invalidates this node's cached output and, recursively, its
    /// upstreams. Must be called once per displayed frame before `render()`;
    /// filters are reused across frames and are not told about new frames
    /// any other way.
    fn new_frame(&mut self);

    /// Produces (or reuses) this node's output texture. Upstreams are
    /// evaluated depth-first in declared order. Rendering an already fresh
    /// node is a no-op.
    fn render(&mut self) -> Result<()>;

    /// The most recently rendered output; `None` unless the node is fresh.
    fn output_texture(&self) -> Option<TextureHandle>;

    /// Releases any GPU resources this node owns. Idempotent. The default
    /// is a no-op for nodes that own nothing.
    fn dispose(&mut self) {}
}

/// Shared filter reference; graph structure is single-threaded by design.
pub type FilterRef = Rc<RefCell<dyn Filter>>;
