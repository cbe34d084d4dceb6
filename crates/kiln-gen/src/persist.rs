//! Image-asset persistence
//!
//! Saves a completed generation as a PNG next to a `.asset.toml` sidecar
//! carrying the parameters that produced it, so a saved image can be traced
//! back to its generation and re-imported with context.

use crate::options::{GenerationOptions, ImageResult};
use kiln_core::{pixels_to_bytes, ContentHash, KilnError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths and metadata of a saved image asset
#[derive(Debug, Clone)]
pub struct SavedAsset {
    pub image_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub content_hash: String,
}

#[derive(Serialize, Deserialize)]
struct AssetSidecar {
    asset: AssetMetadata,
}

#[derive(Serialize, Deserialize)]
struct AssetMetadata {
    name: String,
    width: u32,
    height: u32,
    upsampled: bool,
    content_hash: String,
    options: GenerationOptions,
}

/// Durably store a completed image result under `dest_dir/name`.
///
/// Fails on empty names, failed results and empty pixel buffers; never
/// overwrites silently - an existing asset of the same name is replaced as a
/// unit (PNG first, sidecar second).
pub fn save_image_asset(
    dest_dir: &Path,
    name: &str,
    result: &ImageResult,
) -> Result<SavedAsset> {
    if name.is_empty() {
        return Err(KilnError::PersistError("asset name is empty".to_string()));
    }
    if result.is_failure() {
        return Err(KilnError::PersistError(
            "cannot save a failed generation".to_string(),
        ));
    }
    if result.pixels.is_empty() || result.size.is_empty() {
        return Err(KilnError::PersistError("result has no pixels".to_string()));
    }

    std::fs::create_dir_all(dest_dir)?;

    let bytes = pixels_to_bytes(&result.pixels);
    let image_path = dest_dir.join(format!("{}.png", name));
    let img = image::RgbaImage::from_raw(result.size.width, result.size.height, bytes)
        .ok_or_else(|| {
            KilnError::PersistError("pixel buffer does not match image size".to_string())
        })?;
    img.save(&image_path)
        .map_err(|e| KilnError::PersistError(format!("Failed to save PNG: {}", e)))?;

    let content_hash = ContentHash::from_file(&image_path)?.to_prefixed_hex();

    let sidecar = AssetSidecar {
        asset: AssetMetadata {
            name: name.to_string(),
            width: result.size.width,
            height: result.size.height,
            upsampled: result.upsampled,
            content_hash: content_hash.clone(),
            options: result.options.clone(),
        },
    };
    let sidecar_path = dest_dir.join(format!("{}.asset.toml", name));
    let content = toml::to_string_pretty(&sidecar)
        .map_err(|e| KilnError::PersistError(format!("Failed to serialize sidecar: {}", e)))?;
    std::fs::write(&sidecar_path, content)?;

    Ok(SavedAsset {
        image_path,
        sidecar_path,
        content_hash,
    })
}

/// Load a previously saved asset back into an [`ImageResult`]
pub fn load_image_asset(dest_dir: &Path, name: &str) -> Result<ImageResult> {
    let image_path = dest_dir.join(format!("{}.png", name));
    let sidecar_path = dest_dir.join(format!("{}.asset.toml", name));

    let img = image::open(&image_path)
        .map_err(|e| KilnError::PersistError(format!("Failed to read {}: {}", image_path.display(), e)))?
        .to_rgba8();
    let size = kiln_core::FrameSize::new(img.width(), img.height());
    let pixels = kiln_core::bytes_to_pixels(img.as_raw());

    let content = std::fs::read_to_string(&sidecar_path)?;
    let sidecar: AssetSidecar = toml::from_str(&content).map_err(|e| {
        KilnError::PersistError(format!("Failed to parse {}: {}", sidecar_path.display(), e))
    })?;

    Ok(ImageResult {
        pixels,
        size,
        options: sidecar.asset.options,
        upsampled: sidecar.asset.upsampled,
        completed: true,
        error: None,
    })
}
