//! Engine artifacts: what kind of engine to run and where its file lives.
//!
//! The query engine ships in two forms. A standalone executable is driven as
//! a subprocess, and a dynamically linked library is loaded into this process.
//! Both are named after the host [`Platform`] and located by the
//! [`ArtifactResolver`].

mod platform;
mod resolver;
pub mod snapshot;

pub use platform::{linux_platform_tag, DistroFamily, LinuxHost, Platform};
pub use resolver::{ArtifactResolver, SearchRoots};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OperationError;

/// Env var selecting the engine kind (`binary` or `library`).
pub const ENGINE_TYPE_ENV: &str = "QUERY_ENGINE_TYPE";

/// Env var pointing at a specific engine executable.
pub const BINARY_PATH_ENV: &str = "QUERY_ENGINE_BINARY";

/// Env var pointing at a specific engine library.
pub const LIBRARY_PATH_ENV: &str = "QUERY_ENGINE_LIBRARY";

/// How the engine is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Run the engine executable as a subprocess.
    Binary,
    /// Load the engine library into this process.
    Library,
}

impl EngineKind {
    /// The kind used when nothing else selects one.
    ///
    /// The library is the default wherever it is published; other hosts
    /// fall back to the executable.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            EngineKind::Library
        } else {
            EngineKind::Binary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Binary => "binary",
            EngineKind::Library => "library",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(EngineKind::Binary),
            "library" => Ok(EngineKind::Library),
            _ => Err(OperationError::UnknownEngineType(s.to_string())),
        }
    }
}

/// A logical engine: one artifact family with its own override variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalEngine {
    QueryEngineBinary,
    QueryEngineLibrary,
}

impl LogicalEngine {
    pub fn for_kind(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Binary => LogicalEngine::QueryEngineBinary,
            EngineKind::Library => LogicalEngine::QueryEngineLibrary,
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            LogicalEngine::QueryEngineBinary => EngineKind::Binary,
            LogicalEngine::QueryEngineLibrary => EngineKind::Library,
        }
    }

    /// The env var that pins this engine to an explicit path.
    pub fn env_var(&self) -> &'static str {
        match self {
            LogicalEngine::QueryEngineBinary => BINARY_PATH_ENV,
            LogicalEngine::QueryEngineLibrary => LIBRARY_PATH_ENV,
        }
    }

    /// The artifact file name for a platform.
    pub fn artifact_name(&self, platform: &Platform) -> String {
        match self {
            LogicalEngine::QueryEngineBinary if platform.is_windows() => {
                format!("query-engine-{platform}.exe")
            }
            LogicalEngine::QueryEngineBinary => format!("query-engine-{platform}"),
            LogicalEngine::QueryEngineLibrary if platform.is_windows() => {
                format!("query_engine-{platform}.dll.node")
            }
            LogicalEngine::QueryEngineLibrary if platform.is_darwin() => {
                format!("libquery_engine-{platform}.dylib.node")
            }
            LogicalEngine::QueryEngineLibrary => format!("libquery_engine-{platform}.so.node"),
        }
    }
}

/// A resolved engine artifact, tagged by how it must be driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// An executable on disk.
    Binary { path: PathBuf },
    /// A loadable library on disk.
    Library { path: PathBuf },
}

impl ArtifactLocation {
    pub fn new(kind: EngineKind, path: PathBuf) -> Self {
        match kind {
            EngineKind::Binary => ArtifactLocation::Binary { path },
            EngineKind::Library => ArtifactLocation::Library { path },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ArtifactLocation::Binary { path } | ArtifactLocation::Library { path } => path,
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            ArtifactLocation::Binary { .. } => EngineKind::Binary,
            ArtifactLocation::Library { .. } => EngineKind::Library,
        }
    }
}
