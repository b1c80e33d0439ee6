//! Everything a pipeline run needs from its surroundings.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Settings, SettingsError};
use crate::engine::{ArtifactResolver, EngineKind, Platform, SearchRoots, ENGINE_TYPE_ENV};
use crate::error::OperationError;
use crate::transport::{DynamicLibraryLoader, LibraryLoader};

/// Env var that disables forced terminal colors in the engine.
pub const NO_COLOR_ENV: &str = "NO_COLOR";

/// Shared environment for engine calls.
///
/// Holds a snapshot of the process environment so that resolution and
/// engine selection can be driven from tests without touching real env vars.
#[derive(Clone)]
pub struct EngineContext {
    settings: Settings,
    env: HashMap<String, String>,
    platform: Platform,
    search_roots: SearchRoots,
    library_loader: Arc<dyn LibraryLoader>,
}

impl EngineContext {
    /// Build a context from the running process and the given settings.
    pub fn from_environment(settings: Settings) -> Result<Self, SettingsError> {
        let platform = match settings.engine.platform.as_deref() {
            Some(tag) => Platform::new(tag),
            None => Platform::detect(),
        };
        let search_roots = SearchRoots::from_current_exe(settings.engines_dir()?);

        Ok(Self {
            env: std::env::vars().collect(),
            platform,
            search_roots,
            library_loader: Arc::new(DynamicLibraryLoader),
            settings,
        })
    }

    /// Replace the environment snapshot.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_search_roots(mut self, search_roots: SearchRoots) -> Self {
        self.search_roots = search_roots;
        self
    }

    pub fn with_library_loader(mut self, loader: Arc<dyn LibraryLoader>) -> Self {
        self.library_loader = loader;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn search_roots(&self) -> &SearchRoots {
        &self.search_roots
    }

    /// A non-empty variable from the environment snapshot.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Pick the engine kind for one call.
    ///
    /// Priority: `explicit`, then `QUERY_ENGINE_TYPE`, then the settings
    /// file, then the platform default.
    pub fn engine_kind(&self, explicit: Option<EngineKind>) -> Result<EngineKind, OperationError> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        if let Some(value) = self.env_var(ENGINE_TYPE_ENV) {
            return value.parse();
        }
        Ok(self
            .settings
            .engine
            .kind
            .unwrap_or_else(EngineKind::platform_default))
    }

    pub fn resolver(&self) -> ArtifactResolver<'_> {
        ArtifactResolver::new(&self.env, &self.platform, &self.search_roots)
    }

    pub(crate) fn library_loader(&self) -> Arc<dyn LibraryLoader> {
        Arc::clone(&self.library_loader)
    }

    /// Variables added to every engine subprocess.
    pub(crate) fn engine_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::from([("RUST_BACKTRACE".to_string(), "1".to_string())]);
        if self.env_var(NO_COLOR_ENV).is_none() {
            env.insert("CLICOLOR_FORCE".to_string(), "1".to_string());
        }
        env
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("settings", &self.settings)
            .field("platform", &self.platform)
            .field("search_roots", &self.search_roots)
            .finish_non_exhaustive()
    }
}
