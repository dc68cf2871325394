//! Binder Configuration
//!
//! Handles parsing of calli.toml files.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`CalliConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "calli.toml";

/// Environment variable overriding [`CalliConfig::debug`].
pub const DEBUG_ENV_VAR: &str = "CALLI_DEBUG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching calli.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct CalliConfig {
    /// Emit load and bind diagnostics
    #[serde(default = "default_true")]
    pub debug: bool,

    /// Platform loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Library aliases: requested name -> file to open
    #[serde(default)]
    pub libraries: HashMap<String, PathBuf>,
}

impl Default for CalliConfig {
    fn default() -> Self {
        Self {
            debug: true,
            loader: LoaderConfig::default(),
            libraries: HashMap::new(),
        }
    }
}

impl CalliConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: CalliConfig = toml::from_str(&content)?;
        config.resolve_relative_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }

    /// Apply `CALLI_DEBUG` if it is set to a recognised value.
    pub fn apply_env(mut self) -> Self {
        if let Some(debug) = std::env::var(DEBUG_ENV_VAR).ok().and_then(|v| parse_flag(&v)) {
            self.debug = debug;
        }
        self
    }

    /// Relative search paths and alias targets are relative to the config file.
    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        for path in &mut self.loader.search_paths {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
        for target in self.libraries.values_mut() {
            // Bare names are left to the platform search
            if target.is_relative() && target.components().count() > 1 {
                *target = base_dir.join(&*target);
            }
        }
    }
}

/// Platform loader settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoaderConfig {
    /// Directories searched after the platform's own search rules
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
