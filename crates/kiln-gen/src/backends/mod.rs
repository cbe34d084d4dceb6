//! Backend registry
//!
//! Maps backend names to concrete implementations, selected by configuration
//! at startup.

pub mod mock;
pub mod remote;

use crate::backend::GenerativeBackend;
use crate::config::KilnConfig;
use kiln_core::{KilnError, Result};
use std::sync::Arc;

/// Create a backend by name with configuration
pub fn create_backend(name: &str, config: &KilnConfig) -> Result<Arc<dyn GenerativeBackend>> {
    match name {
        "mock" => Ok(Arc::new(mock::MockBackend::new())),
        "remote" => Ok(Arc::new(remote::RemoteBackend::from_config(config)?)),
        _ => Err(KilnError::GenerationError(format!(
            "Unknown backend '{}'. Available: mock, remote",
            name
        ))),
    }
}

/// List all available backend names
pub fn available_backends() -> Vec<&'static str> {
    vec!["mock", "remote"]
}
