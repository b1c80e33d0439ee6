//! Configuration module for engine-bridge.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, EngineSettings, InvocationSettings, Settings, SettingsError, CONFIG_ENV,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_RETRY_BUDGET, LOCAL_CONFIG_FILE,
};
