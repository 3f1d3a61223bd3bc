//! Shader resource path resolution.
//!
//! Shader files live under a fixed `RenderScripts` directory next to the
//! host binary, in one subdirectory per script. The subdirectory name is an
//! explicit, stable identifier chosen at script construction; scripts that
//! need a different layout override it there.

use std::path::{Path, PathBuf};

/// Directory next to the host binary holding all script shader data.
pub const SCRIPTS_DIR: &str = "RenderScripts";

/// Root of the shader data layout, next to the current executable.
///
/// Falls back to the working directory when the executable path cannot be
/// determined (some sandboxed hosts).
pub fn scripts_root() -> PathBuf {
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(SCRIPTS_DIR)
}

/// Shader data directory for one script under the default root.
pub fn script_data_dir(script_dir: &str) -> PathBuf {
    script_data_dir_in(&scripts_root(), script_dir)
}

/// Shader data directory for one script under an explicit root.
pub fn script_data_dir_in(root: &Path, script_dir: &str) -> PathBuf {
    root.join(script_dir)
}
