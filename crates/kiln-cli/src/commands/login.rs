//! Login command

use anyhow::{anyhow, Result};
use kiln_gen::config::{KilnConfig, KilnConfigFile};
use std::path::Path;

const LOCAL_CONFIG: &str = ".kiln/config.toml";

pub fn run(token: &str, backend_name: Option<&str>) -> Result<()> {
    let config = KilnConfig::load().map_err(|e| anyhow!("{}", e))?;
    let backend = super::resolve_backend(backend_name, &config)?;

    if !backend.login_with_token(token) {
        return Err(anyhow!("backend '{}' rejected the token", backend.name()));
    }
    println!("Token accepted by backend '{}'", backend.name());

    store_token(Path::new(LOCAL_CONFIG), backend.name(), token).map_err(|e| anyhow!("{}", e))?;
    println!("Stored in {}", LOCAL_CONFIG);

    Ok(())
}

/// Write the token into the project-local config, preserving everything else
fn store_token(path: &Path, backend_name: &str, token: &str) -> kiln_core::Result<()> {
    let mut file: KilnConfigFile = if path.exists() {
        toml::from_str(&std::fs::read_to_string(path)?)?
    } else {
        KilnConfigFile::default()
    };

    file.backends
        .entry(backend_name.to_string())
        .or_default()
        .token = Some(token.to_string());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(&file)?)?;
    Ok(())
}
