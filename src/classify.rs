//! Turn a failed [`RawOutcome`] into exactly one [`EngineError`].
//!
//! Precedence, highest first:
//! 1. Transport failures become operation errors.
//! 2. Exit code 101 or a `panicked at` marker on stderr is a native panic.
//! 3. A structured error payload is a panic when it says so, otherwise an
//!    application error.
//! 4. Anything else is an unrecognized failure.

use std::path::Path;

use crate::error::{EngineError, ErrorArea, OperationError, PanicReport};
use crate::protocol::{self, EngineErrorPayload};
use crate::transport::RawOutcome;

/// Exit code of a Rust process that panicked.
pub const PANIC_EXIT_CODE: i32 = 101;

/// Marker the Rust runtime prints on stderr when a thread panics.
pub const PANIC_MARKER: &str = "panicked at";

const MISSING_LIBSSL: &str = "error while loading shared libraries: libssl.so";

const OPENSSL_HINT: &str = "Your Linux installation is missing the OpenSSL package. \
You can install it like so:\napt-get -qy update && apt-get -qy install openssl";

/// What was being attempted when the engine failed.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// The request label, e.g. `query-engine get-dmmf`.
    pub request: &'a str,
    pub area: ErrorArea,
    pub schema_path: Option<&'a Path>,
    pub schema: Option<&'a str>,
}

impl<'a> FailureContext<'a> {
    pub fn new(request: &'a str, area: ErrorArea) -> Self {
        Self {
            request,
            area,
            schema_path: None,
            schema: None,
        }
    }

    pub fn with_schema_path(mut self, schema_path: Option<&'a Path>) -> Self {
        self.schema_path = schema_path;
        self
    }

    pub fn with_schema(mut self, schema: Option<&'a str>) -> Self {
        self.schema = schema;
        self
    }

    fn panic_report(&self, message: String, native_stack: String) -> EngineError {
        EngineError::panic(PanicReport {
            message,
            native_stack,
            request: self.request.to_string(),
            area: self.area,
            schema_path: self.schema_path.map(Path::to_path_buf),
            schema: self.schema.map(str::to_string),
        })
    }
}

/// Classify an outcome that did not produce a usable value.
///
/// A [`RawOutcome::Success`] reaching here carries an in-band error payload
/// from a library call; without one it is reported as unrecognized.
pub fn classify(outcome: RawOutcome, ctx: &FailureContext<'_>) -> EngineError {
    match outcome {
        RawOutcome::TransportFailure(cause) => OperationError::Transport {
            context: format!("unable to run `{}`", ctx.request),
            cause,
        }
        .into(),
        RawOutcome::ProcessFailure {
            exit_code,
            stdout,
            stderr,
        } => classify_process_failure(exit_code, stdout, stderr, ctx),
        RawOutcome::Success(raw) => match protocol::embedded_error(&raw) {
            Some(payload) => classify_payload(payload, ctx),
            None => OperationError::UnrecognizedFailure {
                exit_code: None,
                output: protocol::preview(&raw),
            }
            .into(),
        },
    }
}

/// Classify a structured error payload.
pub fn classify_payload(payload: EngineErrorPayload, ctx: &FailureContext<'_>) -> EngineError {
    if payload.is_panic() {
        let native_stack = payload.backtrace.unwrap_or_else(|| payload.message.clone());
        return ctx.panic_report(payload.message, native_stack);
    }

    EngineError::Application {
        code: payload.error_code,
        message: with_openssl_hint(payload.message),
    }
}

/// Check the panic signals of a finished process.
pub fn is_panic_exit(exit_code: Option<i32>, stderr: &str) -> bool {
    exit_code == Some(PANIC_EXIT_CODE) || stderr.contains(PANIC_MARKER)
}

fn classify_process_failure(
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    ctx: &FailureContext<'_>,
) -> EngineError {
    if is_panic_exit(exit_code, &stderr) {
        let message = match exit_code {
            Some(code) => format!("Command failed with exit code {code}: {}", ctx.request),
            None => format!("Command was terminated: {}", ctx.request),
        };
        return ctx.panic_report(message, stderr);
    }

    let output = if stderr.trim().is_empty() { stdout } else { stderr };
    match protocol::decode_error_payload(&output) {
        Some(payload) => classify_payload(payload, ctx),
        None => OperationError::UnrecognizedFailure {
            exit_code,
            output: protocol::preview(&with_openssl_hint(output)),
        }
        .into(),
    }
}

fn with_openssl_hint(message: String) -> String {
    if message.contains(MISSING_LIBSSL) {
        format!("{message}\n{OPENSSL_HINT}")
    } else {
        message
    }
}
