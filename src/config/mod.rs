//! Configuration module.
//!
//! Resolver limits and diagnostic settings, loaded from TOML.

mod settings;

pub use settings::{
    DiagnosticSettings, ResolverSettings, Settings, SettingsError, CONFIG_ENV_VAR,
};
