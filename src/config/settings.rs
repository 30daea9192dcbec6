//! TOML-based configuration for the composite resolver.
//!
//! Example configuration:
//! ```toml
//! [resolver]
//! max_depth = 32
//!
//! [diagnostics]
//! error_code = "could-not-resolve-composite-source"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MANTIS_COMPOSITE_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub resolver: ResolverSettings,
    pub diagnostics: DiagnosticSettings,
}

/// Limits on the candidate search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// How many nested composites and joins a single resolution may
    /// descend through.
    pub max_depth: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticSettings {
    /// Code attached to every resolution diagnostic.
    pub error_code: String,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            error_code: "could-not-resolve-composite-source".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `MANTIS_COMPOSITE_CONFIG`
    /// 2. `./mantis-composite.toml`
    /// 3. `~/.config/mantis-composite/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("mantis-composite.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mantis-composite").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.resolver.max_depth == 0 {
            return Err(SettingsError::InvalidConfig(
                "resolver.max_depth must be at least 1".to_string(),
            ));
        }
        if self.diagnostics.error_code.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "diagnostics.error_code must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
