//! Transports that carry one call to the engine and bring back its raw result.
//!
//! ```text
//!                 EngineCall
//!                     │
//!        ┌────────────┴────────────┐
//!        ▼                         ▼
//! SubprocessTransport        LibraryTransport
//! (spawn executable,         (load module, call
//!  capture stdout/stderr)     exported entry point)
//!        │                         │
//!        └────────────┬────────────┘
//!                     ▼
//!                 RawOutcome
//! ```
//!
//! Transports never interpret engine output. Turning a [`RawOutcome`] into a
//! value or an error is the job of the decoder and the classifier.

mod library;
mod subprocess;

pub use library::{
    DynamicLibraryLoader, EngineLibrary, LibraryLoader, LibraryTransport, LoadedModule,
    FREE_STRING_SYMBOL,
};
pub use subprocess::{run_process, SubprocessTransport};

use async_trait::async_trait;

use crate::error::TransportCause;

/// Raw result of one engine call, before classification.
#[derive(Debug)]
pub enum RawOutcome {
    /// The call completed. Holds stdout or the returned string.
    Success(String),
    /// The engine could not be reached or its output could not be captured.
    TransportFailure(TransportCause),
    /// The engine process ran and exited unsuccessfully.
    ///
    /// `exit_code` is `None` when the process was terminated by a signal.
    ProcessFailure {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl RawOutcome {
    /// The engine's primary output, when there is one.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            RawOutcome::Success(stdout) | RawOutcome::ProcessFailure { stdout, .. } => Some(stdout),
            RawOutcome::TransportFailure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RawOutcome::Success(_))
    }
}

/// Exported library entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    GetConfig,
    GetDmmf,
    Version,
    DebugPanic,
}

impl EntryPoint {
    /// The exported symbol name.
    pub fn symbol(&self) -> &'static str {
        match self {
            EntryPoint::GetConfig => "query_engine_get_config",
            EntryPoint::GetDmmf => "query_engine_dmmf",
            EntryPoint::Version => "query_engine_version",
            EntryPoint::DebugPanic => "query_engine_debug_panic",
        }
    }

    /// Whether the entry point takes a JSON request.
    pub fn takes_request(&self) -> bool {
        !matches!(self, EntryPoint::Version)
    }
}

/// One engine call, in both transport shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    /// Short operation name used in logs.
    pub operation: &'static str,
    /// Command-line arguments for the executable.
    pub args: Vec<String>,
    /// Library entry point.
    pub entry: EntryPoint,
    /// JSON request for the library entry point.
    pub request: Option<String>,
}

/// Something that can carry an [`EngineCall`] to an engine.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Perform the call once.
    async fn invoke(&self, call: &EngineCall) -> RawOutcome;
}
