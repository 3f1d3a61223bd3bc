//! Render script contract and base behavior.
//!
//! A render script owns one filter graph and the host-facing lifecycle:
//! `setup` binds the renderer, `render` runs once per displayed frame, and
//! `dispose` releases everything deterministically. Concrete scripts
//! implement [`RenderScript`] and delegate the shared plumbing to an owned
//! [`ScriptContext`], overriding only the hooks they need.

mod context;
pub mod paths;

pub use context::ScriptContext;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::frame::PixelFormat;
use crate::renderer::RendererRef;

/// Static identity of a script, read by the host for discovery and
/// configuration UI. Not part of the rendering hot path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    /// Stable identifier, unique among installed scripts.
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
}

/// Input-shape constraints a script places on the frames it accepts.
/// Empty/`None` fields mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInputDescriptor {
    /// Pixel formats the script can consume; empty means any.
    #[serde(default)]
    pub supported_formats: Vec<PixelFormat>,
    /// Largest input the script is prepared to handle.
    #[serde(default)]
    pub max_size: Option<(u32, u32)>,
}

/// Host-facing lifecycle of a render script.
///
/// Call order: `setup` → (`initialize`) → any number of size-change
/// notifications and `render` calls → `destroy` → `dispose`. Every hook
/// except `descriptor`, `setup`, `render`, and `dispose` has a default
/// implementation, so concrete scripts override only what they need.
pub trait RenderScript {
    /// Static identity metadata.
    fn descriptor(&self) -> ScriptDescriptor;

    /// Input constraints; the default accepts anything.
    fn input_descriptor(&self) -> ScriptInputDescriptor {
        ScriptInputDescriptor::default()
    }

    /// Binds the renderer and builds the filter graph. Shader compilation
    /// failures here are fatal for this script instance.
    fn setup(&mut self, renderer: RendererRef) -> Result<()>;

    /// Hook for attaching to host-level events; default no-op.
    fn initialize(&mut self, _instance_id: u32) {}

    /// Hook for detaching from host-level events; default no-op.
    fn destroy(&mut self) {}

    /// Notification that the decoded frame geometry changed. Scripts caching
    /// size-dependent resources override this; default no-op.
    fn on_input_size_changed(&mut self) {}

    /// Notification that the output target geometry changed; default no-op.
    fn on_output_size_changed(&mut self) {}

    /// Renders one frame into the renderer's output target.
    fn render(&mut self) -> Result<()>;

    /// Opens the script's configuration dialog, returning whether settings
    /// changed. The default signals explicitly that no dialog exists, so
    /// hosts can tell "no UI" from "broken UI".
    fn show_config_dialog(&mut self) -> Result<bool> {
        Err(RenderError::NotImplemented("config dialog"))
    }

    /// Releases all shader and filter resources. Idempotent; safe to call
    /// any number of times.
    fn dispose(&mut self);
}
