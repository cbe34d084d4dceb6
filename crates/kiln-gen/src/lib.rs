//! Kiln Gen - generative model backends
//!
//! Defines the contract between the editor-side capture pipeline and the
//! external generative-model service: model options, composed generation
//! input, image results, the `GenerativeBackend` trait with a registry of
//! concrete backends (mock, remote), layered configuration, and image-asset
//! persistence.

pub mod backend;
pub mod backends;
pub mod config;
pub mod options;
pub mod persist;

pub use backend::GenerativeBackend;
pub use backends::{available_backends, create_backend};
pub use config::KilnConfig;
pub use options::{
    GenerationInput, GenerationOptions, ImageResult, ModelOptions, PaddingMode, ProgressUpdate,
};
pub use persist::{load_image_asset, save_image_asset, SavedAsset};
