//! Datamodel input staging.
//!
//! A subprocess engine reads its schema from a file named in the environment.
//! Callers may hand over either a path or the schema text itself; text is
//! written to a uniquely named temporary file for the duration of one call.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::OperationError;

const TEMP_PREFIX: &str = "schema-";
const TEMP_SUFFIX: &str = ".prisma";

/// A datamodel handed to an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationInput {
    /// A caller-owned schema file. Never deleted.
    Path(PathBuf),
    /// Schema text.
    Text(String),
}

impl InvocationInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        InvocationInput::Path(path.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        InvocationInput::Text(text.into())
    }

    /// The caller's path, if the input is a file.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            InvocationInput::Path(path) => Some(path),
            InvocationInput::Text(_) => None,
        }
    }

    /// The schema text, if it was given inline.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InvocationInput::Path(_) => None,
            InvocationInput::Text(text) => Some(text),
        }
    }
}

/// A datamodel file that is valid for the lifetime of the guard.
///
/// Temporary files are removed by [`InputGuard::release`]. If the guard is
/// dropped without being released (for example during unwinding), the
/// temporary file is still removed.
#[derive(Debug)]
pub struct InputGuard {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl InputGuard {
    /// Materialize an input as a file.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::TempInput`] if the temporary file cannot be
    /// created or written.
    pub fn acquire(input: &InvocationInput) -> Result<Self, OperationError> {
        match input {
            InvocationInput::Path(path) => Ok(Self {
                path: path.clone(),
                temp: None,
            }),
            InvocationInput::Text(text) => {
                let mut file = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .suffix(TEMP_SUFFIX)
                    .tempfile()
                    .map_err(OperationError::TempInput)?;
                file.write_all(text.as_bytes())
                    .and_then(|_| file.flush())
                    .map_err(OperationError::TempInput)?;

                let temp = file.into_temp_path();
                debug!(path = %temp.display(), "wrote temp datamodel");
                Ok(Self {
                    path: temp.to_path_buf(),
                    temp: Some(temp),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the temporary file, if any.
    ///
    /// A failure to delete is logged and otherwise ignored.
    pub fn release(self) {
        if let Some(temp) = self.temp {
            if let Err(err) = temp.close() {
                warn!(path = %self.path.display(), error = %err, "failed to remove temp datamodel");
            }
        }
    }
}

/// Run `body` with a file path for `input`, cleaning up afterwards.
///
/// The temporary file, if one was needed, is removed whether `body`
/// succeeds or fails.
pub async fn with_input<R, F, Fut>(input: &InvocationInput, body: F) -> Result<R, OperationError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = R>,
{
    let guard = InputGuard::acquire(input)?;
    let result = body(guard.path().to_path_buf()).await;
    guard.release();
    Ok(result)
}
