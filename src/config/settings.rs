//! TOML-based configuration for engine-bridge.
//!
//! Supports a config file (engine-bridge.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [engine]
//! kind = "library"              # or "binary"
//! engines_dir = "${HOME}/.cache/engines"
//! platform = "debian-openssl-3.0.x"
//!
//! [invocation]
//! retry_budget = 4
//! max_output_bytes = 1000000000
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::EngineKind;

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "ENGINE_BRIDGE_CONFIG";

/// Config file name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "engine-bridge.toml";

/// Default number of warm-up retries.
pub const DEFAULT_RETRY_BUDGET: u32 = 4;

/// Default ceiling for each captured output stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_000_000_000;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Engine selection and discovery.
    pub engine: EngineSettings,

    /// Per-call invocation limits.
    pub invocation: InvocationSettings,
}

/// Engine selection and discovery.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Preferred engine kind when neither the caller nor the environment picks one.
    pub kind: Option<EngineKind>,

    /// Primary directory to search for engine artifacts (supports ${ENV_VAR} expansion).
    pub engines_dir: Option<String>,

    /// Platform tag override, skipping host detection.
    pub platform: Option<String>,
}

/// Per-call invocation limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InvocationSettings {
    /// How many times a warming-up engine is re-invoked.
    pub retry_budget: u32,

    /// Ceiling for each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
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
    /// 1. Environment variable `ENGINE_BRIDGE_CONFIG`
    /// 2. `./engine-bridge.toml`
    /// 3. `~/.config/engine-bridge/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("engine-bridge").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// The configured engines directory with environment variables expanded.
    pub fn engines_dir(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.engine
            .engines_dir
            .as_deref()
            .map(|dir| expand_env_vars(dir).map(PathBuf::from))
            .transpose()
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.invocation.max_output_bytes == 0 {
            return Err(SettingsError::InvalidConfig(
                "invocation.max_output_bytes must be greater than zero".to_string(),
            ));
        }
        if matches!(self.engine.platform.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(SettingsError::InvalidConfig(
                "engine.platform must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
            result.push_str(&lookup_var(var_name)?);
        } else {
            // $VAR ends at the first non-alphanumeric/underscore
            let mut var_name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                result.push('$');
            } else {
                result.push_str(&lookup_var(var_name)?);
            }
        }
    }

    Ok(result)
}

fn lookup_var(name: String) -> Result<String, SettingsError> {
    env::var(&name).map_err(|_| SettingsError::MissingEnvVar(name))
}
