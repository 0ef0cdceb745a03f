//! Configuration state: compiled defaults plus an optional TOML overlay.
pub mod defaults;
mod state;
pub mod toml_loader;

pub use state::{ConfigurationState, Entry};

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

/// Overlay location used when `--config` is not given.
pub const DEFAULT_OVERLAY: &str = "/etc/syscfg/state.toml";

/// Resolve the overlay path from an explicit argument or the default.
#[must_use]
pub fn overlay_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| PathBuf::from(DEFAULT_OVERLAY), Path::to_path_buf)
}

/// Build the effective configuration state: the compiled profile with the
/// overlay at `path` applied on top.
///
/// # Errors
///
/// Returns an error if the overlay exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<ConfigurationState> {
    let mut state = defaults::profile();
    let overlay =
        toml_loader::load(path).with_context(|| format!("loading {}", path.display()))?;
    state.merge(overlay);
    Ok(state)
}
