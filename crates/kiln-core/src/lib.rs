//! Kiln Core - Foundational types for the Kiln generation toolkit
//!
//! This crate provides the types every other Kiln crate depends on:
//! - `KilnError` and the `Result` alias
//! - `Vec3`, `Rotator`, `CameraPose` - spatial types for camera mirroring
//! - `FrameSize`, `Rgba8` - pixel buffer types
//! - `ContentHash` - SHA-256 based content hashing for saved assets

mod error;
mod hash;
mod types;

pub use error::{KilnError, Result};
pub use hash::ContentHash;
pub use types::{bytes_to_pixels, pixels_to_bytes, CameraPose, FrameSize, Rgba8, Rotator, Vec3};
