//! CLI command implementations

pub mod backends;
pub mod generate;
pub mod login;
pub mod upsample;

use anyhow::{anyhow, Result};
use kiln_gen::{create_backend, GenerativeBackend, KilnConfig};
use std::sync::Arc;

/// Resolve the backend to use: explicit flag, else the configured default
pub fn resolve_backend(
    requested: Option<&str>,
    config: &KilnConfig,
) -> Result<Arc<dyn GenerativeBackend>> {
    let name = requested.unwrap_or_else(|| config.default_backend());
    if !config.is_enabled(name) {
        return Err(anyhow!("backend '{}' is disabled in config", name));
    }
    create_backend(name, config).map_err(|e| anyhow!("{}", e))
}
