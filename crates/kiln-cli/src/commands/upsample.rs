//! Upsample command

use anyhow::{anyhow, Result};
use kiln_gen::{load_image_asset, save_image_asset, KilnConfig};
use std::path::Path;

pub fn run(name: &str, dir: &str, backend_name: Option<&str>) -> Result<()> {
    let config = KilnConfig::load().map_err(|e| anyhow!("{}", e))?;
    let backend = super::resolve_backend(backend_name, &config)?;

    let dir = Path::new(dir);
    let source = load_image_asset(dir, name).map_err(|e| anyhow!("{}", e))?;
    println!(
        "Upsampling {} ({}) on backend '{}'...",
        name,
        source.size,
        backend.name()
    );

    let start = std::time::Instant::now();
    let result = backend.upsample(&source);
    if let Some(error) = &result.error {
        return Err(anyhow!("upsample failed: {}", error));
    }
    println!(
        "Upsampled to {} in {:.1}s",
        result.size,
        start.elapsed().as_secs_f64()
    );

    let out_name = format!("{}_2x", name);
    let saved = save_image_asset(dir, &out_name, &result).map_err(|e| anyhow!("{}", e))?;
    println!("Saved {}", saved.image_path.display());

    Ok(())
}
