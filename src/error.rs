//! Error taxonomy for engine invocations.
//!
//! Every failed call ends in exactly one [`EngineError`] variant:
//!
//! - [`EngineError::Panic`] - the native engine crashed.
//! - [`EngineError::Application`] - the engine ran to completion and reported
//!   a structured error (for example a schema parsing error).
//! - [`EngineError::Operation`] - this layer failed on its own (artifact
//!   resolution, temp files, spawning, loading, decoding).

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error code the engine uses for schema parsing/validation failures.
pub const SCHEMA_PARSING_ERROR_CODE: &str = "P1012";

/// Boxed error used where the concrete cause depends on the loader.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ============================================================================
// Classified errors
// ============================================================================

/// A classified engine failure.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The native engine crashed.
    #[error("{0}")]
    Panic(Box<PanicReport>),

    /// The engine completed and reported a structured error.
    #[error("{}", render_application_message(.code, .message))]
    Application {
        /// Engine error code, if one was reported.
        code: Option<String>,
        /// Human-readable message from the engine.
        message: String,
    },

    /// A failure in this layer.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl EngineError {
    /// Create a panic error from a report.
    pub fn panic(report: PanicReport) -> Self {
        Self::Panic(Box::new(report))
    }

    /// Create an application error.
    pub fn application(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
        }
    }

    /// Check if this error is a native engine crash.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }

    /// The panic report, if this error is a crash.
    pub fn panic_report(&self) -> Option<&PanicReport> {
        match self {
            Self::Panic(report) => Some(report),
            _ => None,
        }
    }

    /// The engine error code, if this is an application error carrying one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Application { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

fn render_application_message(code: &Option<String>, message: &str) -> String {
    match code.as_deref() {
        Some(SCHEMA_PARSING_ERROR_CODE) => format!("Schema parsing\n{message}"),
        Some(code) => format!("Error {code}: {message}"),
        None => message.to_string(),
    }
}

/// Area of the system a panic came from, used when filing crash reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorArea {
    /// The engine ran as a subprocess.
    QueryEngineCli,
    /// The engine ran as an in-process library.
    QueryEngineLibrary,
}

impl ErrorArea {
    /// Returns the identifier used in crash reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorArea::QueryEngineCli => "QUERY_ENGINE_BINARY_CLI",
            ErrorArea::QueryEngineLibrary => "QUERY_ENGINE_LIBRARY_CLI",
        }
    }
}

/// Everything needed to build a crash report for a native engine panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    /// Short description of the failure.
    pub message: String,
    /// Native stack trace or stderr captured from the engine.
    pub native_stack: String,
    /// The request that was being served, e.g. `query-engine get-dmmf`.
    pub request: String,
    /// Where the panic happened.
    pub area: ErrorArea,
    /// Path of the schema given to the engine, when there was one.
    pub schema_path: Option<PathBuf>,
    /// Schema text given to the engine, when there was one.
    pub schema: Option<String>,
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the query engine panicked while handling `{}`: {}",
            self.request, self.message
        )
    }
}

// ============================================================================
// Operation errors
// ============================================================================

/// Failures of this layer itself.
#[derive(Error, Debug)]
pub enum OperationError {
    /// An engine override env var points to a missing path.
    #[error("environment variable {var} is set to {}, but that path does not exist", .path.display())]
    EnvOverrideMissing {
        /// The env var name.
        var: &'static str,
        /// The path it points to.
        path: PathBuf,
    },

    /// No artifact was found in any search directory.
    #[error(
        "could not find {name} for platform \"{platform}\". Searched locations:\n{}",
        render_searched(.searched)
    )]
    ArtifactNotFound {
        /// Artifact file name that was looked for.
        name: String,
        /// Platform tag used to build the name.
        platform: String,
        /// Every directory that was probed, in order.
        searched: Vec<PathBuf>,
    },

    /// Copying an artifact out of a read-only packaged snapshot failed.
    #[error("failed to copy {} out of the packaged snapshot: {source}", .path.display())]
    SnapshotCopy {
        /// The artifact inside the snapshot.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unknown value for the engine type selector.
    #[error("unknown engine type \"{0}\"; expected \"binary\" or \"library\"")]
    UnknownEngineType(String),

    /// Writing the temporary datamodel file failed.
    #[error("unable to write temp datamodel file: {0}")]
    TempInput(#[source] io::Error),

    /// Reading a caller-supplied datamodel file failed.
    #[error("unable to read datamodel at {}: {source}", .path.display())]
    ReadInput {
        /// The datamodel path.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serializing a library request failed.
    #[error("failed to serialize engine request: {0}")]
    SerializeRequest(#[source] serde_json::Error),

    /// The engine output could not be decoded.
    #[error("problem while parsing the query engine response: {reason}\n{preview}")]
    Decode {
        /// What went wrong.
        reason: String,
        /// Bounded preview of the undecodable text.
        preview: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The engine could not be reached.
    #[error("{context}: {cause}")]
    Transport {
        /// Which request was being served.
        context: String,
        #[source]
        cause: TransportCause,
    },

    /// The engine failed and its output is not a recognized error payload.
    #[error("{}", render_unrecognized(.exit_code, .output))]
    UnrecognizedFailure {
        /// Exit code of the engine process, if it exited normally.
        exit_code: Option<i32>,
        /// Bounded preview of the raw output.
        output: String,
    },
}

fn render_searched(searched: &[PathBuf]) -> String {
    searched
        .iter()
        .map(|dir| format!("  {}", dir.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_unrecognized(exit_code: &Option<i32>, output: &str) -> String {
    match *exit_code {
        Some(code) => format!("query engine exited with code {code}:\n{output}"),
        None => format!("query engine failed:\n{output}"),
    }
}

// ============================================================================
// Transport causes
// ============================================================================

/// Why a transport could not complete a call.
#[derive(Error, Debug)]
pub enum TransportCause {
    /// Failed to spawn the engine process.
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[source] io::Error),

    /// Failed to read engine output or wait for the process.
    #[error("failed to read from engine process: {0}")]
    Io(#[source] io::Error),

    /// The engine produced more output than allowed.
    #[error("engine output exceeded the limit of {limit} bytes")]
    OutputLimitExceeded {
        /// The configured ceiling.
        limit: usize,
    },

    /// Failed to load the engine library.
    #[error("unable to load engine library {}: {source}", .path.display())]
    Load {
        /// The library path.
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Loading the engine library unwound instead of returning.
    #[error("loading engine library {} unwound: {message}", .path.display())]
    LoadUnwound {
        /// The library path.
        path: PathBuf,
        /// Panic payload message, if it was a string.
        message: String,
    },

    /// The engine library does not export an entry point.
    #[error("engine library does not export `{symbol}`: {source}")]
    MissingSymbol {
        /// The symbol name.
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// The request could not be passed across the C boundary.
    #[error("request for `{symbol}` contains an interior NUL byte")]
    InvalidRequest {
        /// The symbol name.
        symbol: &'static str,
    },

    /// An entry point returned a null pointer.
    #[error("engine library returned null from `{symbol}`")]
    NullResponse {
        /// The symbol name.
        symbol: &'static str,
    },

    /// An entry point returned bytes that are not UTF-8.
    #[error("engine library returned invalid UTF-8 from `{symbol}`")]
    InvalidUtf8 {
        /// The symbol name.
        symbol: &'static str,
    },

    /// The call unwound instead of returning.
    #[error("engine library call `{symbol}` unwound: {message}")]
    Unwound {
        /// The symbol name.
        symbol: &'static str,
        /// Panic payload message, if it was a string.
        message: String,
    },

    /// The blocking task running the call failed.
    #[error("engine library task failed: {0}")]
    Join(String),
}
