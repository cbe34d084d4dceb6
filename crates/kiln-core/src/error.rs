//! Error types for Kiln

use thiserror::Error;

/// The main error type for Kiln operations
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("A frame capture is already in flight")]
    CaptureInFlight,

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Layer error: {0}")]
    LayerError(String),

    #[error("Generation error: {0}")]
    GenerationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Persist error: {0}")]
    PersistError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

/// Result type alias for Kiln operations
pub type Result<T> = std::result::Result<T, KilnError>;

impl From<toml::de::Error> for KilnError {
    fn from(err: toml::de::Error) -> Self {
        KilnError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for KilnError {
    fn from(err: toml::ser::Error) -> Self {
        KilnError::TomlSerError(err.to_string())
    }
}
