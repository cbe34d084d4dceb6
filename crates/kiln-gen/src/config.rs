//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `KILN_{BACKEND}_TOKEN`
//! 2. Project-local: `.kiln/config.toml`
//! 3. Global: `~/.kiln/config.toml`

use crate::options::PaddingMode;
use kiln_core::{KilnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Backend-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_backend")]
    pub default_backend: String,
    #[serde(default)]
    pub allow_unsafe_content: bool,
    #[serde(default)]
    pub padding_mode: PaddingMode,
    /// Seconds the camera must stay still before a live preview refresh
    #[serde(default = "default_preview_delay")]
    pub live_preview_delay_secs: f32,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            allow_unsafe_content: false,
            padding_mode: PaddingMode::default(),
            live_preview_delay_secs: default_preview_delay(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_backend() -> String {
    "remote".to_string()
}
fn default_preview_delay() -> f32 {
    0.5
}
fn default_output_dir() -> String {
    ".kiln/generated".to_string()
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfigFile {
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default)]
pub struct KilnConfig {
    pub backends: HashMap<String, BackendConfig>,
    pub generation: GenerationConfig,
}

impl KilnConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = KilnConfigFile::default();

        // Layer 1: Global config (~/.kiln/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                Self::merge_into(&mut config, global);
            }
        }

        // Layer 2: Project-local config (.kiln/config.toml)
        let local_path = PathBuf::from(".kiln/config.toml");
        if local_path.exists() {
            let local = Self::load_file(&local_path)?;
            Self::merge_into(&mut config, local);
        }

        // Layer 3: Environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(KilnConfig {
            backends: config.backends,
            generation: config.generation,
        })
    }

    /// Load config from a specific file path only (for testing)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(KilnConfig {
            backends: config.backends,
            generation: config.generation,
        })
    }

    /// Get the stored token for a backend
    pub fn token(&self, backend_name: &str) -> Option<&str> {
        self.backends
            .get(backend_name)
            .and_then(|b| b.token.as_deref())
    }

    /// Get the API URL for a backend
    pub fn api_url(&self, backend_name: &str) -> Option<&str> {
        self.backends
            .get(backend_name)
            .and_then(|b| b.api_url.as_deref())
    }

    /// Check if a backend is enabled
    pub fn is_enabled(&self, backend_name: &str) -> bool {
        self.backends
            .get(backend_name)
            .map(|b| b.enabled)
            .unwrap_or(true)
    }

    /// Name of the backend to load at startup
    pub fn default_backend(&self) -> &str {
        &self.generation.default_backend
    }

    /// Debounce delay for live preview camera tracking
    pub fn live_preview_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(self.generation.live_preview_delay_secs.max(0.0))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".kiln").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<KilnConfigFile> {
        let content = std::fs::read_to_string(path)?;
        let config: KilnConfigFile = toml::from_str(&content).map_err(|e| {
            KilnError::ConfigError(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    fn merge_into(base: &mut KilnConfigFile, overlay: KilnConfigFile) {
        for (name, backend) in overlay.backends {
            let entry = base.backends.entry(name).or_default();
            if backend.token.is_some() {
                entry.token = backend.token;
            }
            if backend.api_url.is_some() {
                entry.api_url = backend.api_url;
            }
            entry.enabled = backend.enabled;
        }

        if overlay.generation.default_backend != default_backend() {
            base.generation.default_backend = overlay.generation.default_backend;
        }
        if overlay.generation.allow_unsafe_content {
            base.generation.allow_unsafe_content = true;
        }
        if overlay.generation.padding_mode != PaddingMode::default() {
            base.generation.padding_mode = overlay.generation.padding_mode;
        }
        if overlay.generation.live_preview_delay_secs != default_preview_delay() {
            base.generation.live_preview_delay_secs = overlay.generation.live_preview_delay_secs;
        }
        if overlay.generation.output_dir != default_output_dir() {
            base.generation.output_dir = overlay.generation.output_dir;
        }
    }

    fn apply_env_overrides(config: &mut KilnConfigFile) {
        let backend_names = ["remote"];
        for name in &backend_names {
            let env_key = format!("KILN_{}_TOKEN", name.to_uppercase());
            if let Ok(token) = std::env::var(&env_key) {
                let entry = config.backends.entry(name.to_string()).or_default();
                entry.token = Some(token);
            }
        }
    }
}
