//! Run the engine executable as a child process.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{EngineCall, EngineTransport, RawOutcome};
use crate::config::DEFAULT_MAX_OUTPUT_BYTES;
use crate::error::TransportCause;

/// Spawns the engine executable once per call.
///
/// The child inherits this process's environment plus the extra variables
/// given here. Both output streams are drained concurrently and bounded by
/// `max_output_bytes` each.
#[derive(Debug, Clone)]
pub struct SubprocessTransport {
    artifact: PathBuf,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    max_output_bytes: usize,
}

impl SubprocessTransport {
    pub fn new(artifact: impl Into<PathBuf>, env: HashMap<String, String>) -> Self {
        Self {
            artifact: artifact.into(),
            env,
            cwd: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Run the engine from this working directory.
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }
}

#[async_trait]
impl EngineTransport for SubprocessTransport {
    async fn invoke(&self, call: &EngineCall) -> RawOutcome {
        debug!(
            operation = call.operation,
            engine = %self.artifact.display(),
            args = ?call.args,
            "spawning engine"
        );
        run_process(
            &self.artifact,
            &call.args,
            &self.env,
            self.cwd.as_deref(),
            self.max_output_bytes,
        )
        .await
    }
}

/// Spawn `artifact` with `args` and wait for it to exit.
///
/// Exit code zero yields [`RawOutcome::Success`] with the captured stdout.
/// Any other exit yields [`RawOutcome::ProcessFailure`]. Spawn and capture
/// failures, including an output stream over `max_output_bytes`, yield
/// [`RawOutcome::TransportFailure`]; the child is killed in that case.
pub async fn run_process(
    artifact: &Path,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: Option<&Path>,
    max_output_bytes: usize,
) -> RawOutcome {
    let mut command = Command::new(artifact);
    command
        .args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return RawOutcome::TransportFailure(TransportCause::Spawn(err)),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return RawOutcome::TransportFailure(TransportCause::Io(io::Error::other(
            "engine stdio was not captured",
        )));
    };

    let captured = tokio::try_join!(
        read_capped(stdout, max_output_bytes),
        read_capped(stderr, max_output_bytes)
    );
    let (stdout, stderr) = match captured {
        Ok(streams) => streams,
        Err(cause) => {
            if let Err(err) = child.kill().await {
                warn!(error = %err, "failed to kill engine process");
            }
            return RawOutcome::TransportFailure(cause);
        }
    };

    let status = match child.wait().await {
        Ok(status) => status,
        Err(err) => return RawOutcome::TransportFailure(TransportCause::Io(err)),
    };

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    if status.success() {
        RawOutcome::Success(stdout)
    } else {
        debug!(exit_code = ?status.code(), "engine exited unsuccessfully");
        RawOutcome::ProcessFailure {
            exit_code: status.code(),
            stdout,
            stderr,
        }
    }
}

/// Read a stream to the end, failing once it exceeds `limit` bytes.
async fn read_capped<R>(reader: R, limit: usize) -> Result<Vec<u8>, TransportCause>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = reader.take((limit as u64).saturating_add(1));
    limited
        .read_to_end(&mut buf)
        .await
        .map_err(TransportCause::Io)?;

    if buf.len() > limit {
        return Err(TransportCause::OutputLimitExceeded { limit });
    }
    Ok(buf)
}
