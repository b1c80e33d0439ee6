//! Support for engines shipped inside a packaged, read-only snapshot.
//!
//! Self-contained executables mount their bundled files under a virtual
//! prefix. Native code cannot be executed or loaded from there, so the
//! artifact is copied to a content-addressed file in the temp directory.
//!
//! # Caching
//!
//! The copy is named after the SHA-256 of the artifact. If it already exists
//! and has the correct size, it is reused.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::OperationError;

/// Path prefixes of packaged snapshot file systems.
pub const SNAPSHOT_PREFIXES: &[&str] = &["/snapshot/", "C:\\snapshot\\"];

/// Check if a path lives inside a packaged snapshot.
pub fn is_snapshot_path(path: &Path) -> bool {
    let path = path.to_string_lossy();
    SNAPSHOT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Directory that receives materialized artifacts.
pub fn materialize_dir() -> PathBuf {
    std::env::temp_dir().join("engine-bridge")
}

/// Copy a snapshot artifact to the default temp location.
pub fn materialize(path: &Path) -> Result<PathBuf, OperationError> {
    materialize_into(path, &materialize_dir())
}

/// Copy an artifact into `dir` under a content-addressed name.
///
/// The copy is staged in a temporary file in `dir`, made executable and then
/// renamed over the target, so concurrent callers only ever observe a
/// complete executable copy.
///
/// Returns the path of the executable copy.
pub fn materialize_into(path: &Path, dir: &Path) -> Result<PathBuf, OperationError> {
    let copy_err = |source| OperationError::SnapshotCopy {
        path: path.to_path_buf(),
        source,
    };

    let bytes = fs::read(path).map_err(copy_err)?;
    let digest = format!("{:x}", Sha256::digest(&bytes));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "engine".to_string());
    let target = dir.join(format!("{}-{}", &digest[..16], file_name));

    if let Ok(metadata) = fs::metadata(&target) {
        if metadata.len() as usize == bytes.len() && is_executable(&metadata) {
            debug!(path = %target.display(), "reusing materialized engine");
            return Ok(target);
        }
    }

    fs::create_dir_all(dir).map_err(copy_err)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(copy_err)?;
    staged.write_all(&bytes).map_err(copy_err)?;
    staged.flush().map_err(copy_err)?;

    // Set executable permissions (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755)).map_err(copy_err)?;
    }

    staged.persist(&target).map_err(|err| copy_err(err.error))?;

    debug!(from = %path.display(), to = %target.display(), "materialized engine from snapshot");
    Ok(target)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 == 0o111
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}
