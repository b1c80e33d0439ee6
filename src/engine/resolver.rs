//! Locate the engine artifact on disk.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::platform::Platform;
use super::snapshot;
use super::{ArtifactLocation, LogicalEngine};
use crate::error::OperationError;

/// Directories searched for engine artifacts, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoots {
    /// Dedicated engines directory.
    pub engines_dir: Option<PathBuf>,
    /// Directory the packaged layouts are relative to.
    pub anchor_dir: PathBuf,
    /// Directory of the running executable.
    pub runtime_dir: Option<PathBuf>,
}

impl SearchRoots {
    /// Roots anchored at the directory of the running executable.
    ///
    /// Without an explicit engines directory, `<exe dir>/engines` is used.
    pub fn from_current_exe(engines_dir: Option<PathBuf>) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            engines_dir: Some(engines_dir.unwrap_or_else(|| exe_dir.join("engines"))),
            anchor_dir: exe_dir.clone(),
            runtime_dir: Some(exe_dir),
        }
    }

    /// Candidate directories: the engines directory, one and two levels
    /// above the anchor, then the runtime directory. Duplicates are dropped.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let parent = self.anchor_dir.parent();
        let grandparent = parent.and_then(Path::parent);

        let mut dirs: Vec<PathBuf> = Vec::new();
        let ordered = [
            self.engines_dir.as_deref(),
            parent,
            grandparent,
            self.runtime_dir.as_deref(),
        ];
        for dir in ordered.into_iter().flatten() {
            if !dirs.iter().any(|seen| seen == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
        dirs
    }
}

/// Resolves a [`LogicalEngine`] to an artifact on disk.
///
/// Resolution order:
/// 1. An explicit override path, if it exists.
/// 2. The engine's env var, which must point to an existing file when set.
/// 3. The [`SearchRoots`] candidates, in order.
///
/// Artifacts inside a packaged snapshot are copied out before use.
pub struct ArtifactResolver<'a> {
    env: &'a HashMap<String, String>,
    platform: &'a Platform,
    roots: &'a SearchRoots,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(
        env: &'a HashMap<String, String>,
        platform: &'a Platform,
        roots: &'a SearchRoots,
    ) -> Self {
        Self {
            env,
            platform,
            roots,
        }
    }

    /// Resolve an engine to a usable artifact.
    ///
    /// Snapshot artifacts are copied out on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// - [`OperationError::EnvOverrideMissing`] if the engine's env var names
    ///   a path that does not exist.
    /// - [`OperationError::ArtifactNotFound`] if no candidate directory holds
    ///   the artifact.
    /// - [`OperationError::SnapshotCopy`] if a snapshot artifact cannot be
    ///   copied out.
    pub async fn resolve(
        &self,
        engine: LogicalEngine,
        override_path: Option<&Path>,
    ) -> Result<ArtifactLocation, OperationError> {
        let path = self.locate(engine, override_path)?;
        let path = if snapshot::is_snapshot_path(&path) {
            materialize_off_thread(path).await?
        } else {
            path
        };

        debug!(engine = ?engine, path = %path.display(), "resolved engine artifact");
        Ok(ArtifactLocation::new(engine.kind(), path))
    }

    fn locate(
        &self,
        engine: LogicalEngine,
        override_path: Option<&Path>,
    ) -> Result<PathBuf, OperationError> {
        if let Some(path) = override_path {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            debug!(path = %path.display(), "engine override does not exist, ignoring it");
        }

        let var = engine.env_var();
        if let Some(value) = self.env.get(var).filter(|value| !value.is_empty()) {
            let path = PathBuf::from(value);
            if path.exists() {
                return Ok(path);
            }
            return Err(OperationError::EnvOverrideMissing { var, path });
        }

        let name = engine.artifact_name(self.platform);
        let mut searched = Vec::new();
        for dir in self.roots.candidates() {
            let candidate = dir.join(&name);
            searched.push(dir);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(OperationError::ArtifactNotFound {
            name,
            platform: self.platform.to_string(),
            searched,
        })
    }
}

/// Copy a snapshot artifact out on the blocking pool; it reads and hashes the whole file.
async fn materialize_off_thread(path: PathBuf) -> Result<PathBuf, OperationError> {
    let source = path.clone();
    tokio::task::spawn_blocking(move || snapshot::materialize(&source))
        .await
        .map_err(|err| OperationError::SnapshotCopy {
            path,
            source: io::Error::other(err.to_string()),
        })?
}
