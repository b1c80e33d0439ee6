//! Pipelines that fetch one fact from the engine.
//!
//! Every pipeline runs the same steps:
//!
//! ```text
//! pick kind ─▶ resolve artifact ─┬─ binary ──▶ stage input ─▶ spawn (retry while warming up)
//!                                └─ library ─▶ read input  ─▶ load + call
//!                                                   │
//!                       decode value ◀── success ───┴─── failure ──▶ classify
//! ```
//!
//! The operations differ only in their arguments, entry point and decoder.

mod context;
mod get_config;
mod get_dmmf;
mod version;

pub use context::{EngineContext, NO_COLOR_ENV};
pub use get_config::{get_config, GetConfigOptions, GET_CONFIG_REQUEST};
pub use get_dmmf::{
    get_dmmf, GetDmmfOptions, DEPRECATED_PREVIEW_FEATURES, FORCE_PANIC_ENV, GET_DMMF_REQUEST,
};
pub use version::{get_version, VERSION_REQUEST};

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::classify::{classify, FailureContext};
use crate::engine::{ArtifactLocation, EngineKind, LogicalEngine};
use crate::error::{EngineResult, ErrorArea, OperationError};
use crate::input::{with_input, InvocationInput};
use crate::protocol::{self, DebugPanicRequest, GetConfigRequest, GetDmmfRequest};
use crate::retry::invoke_with_retry;
use crate::transport::{
    EngineCall, EngineTransport, EntryPoint, LibraryTransport, RawOutcome, SubprocessTransport,
};

/// Env var through which a subprocess engine receives the schema path.
pub const DML_PATH_ENV: &str = "PRISMA_DML_PATH";

/// Caller options shared by every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Use this artifact when it exists.
    pub engine_path: Option<PathBuf>,
    /// Force the engine kind.
    pub engine_kind: Option<EngineKind>,
    /// Working directory for a subprocess engine.
    pub cwd: Option<PathBuf>,
    /// Warm-up retry budget; the settings value when unset.
    pub retry: Option<u32>,
}

impl EngineOptions {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    pub fn engine_kind(mut self, kind: EngineKind) -> Self {
        self.engine_kind = Some(kind);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn retry(mut self, budget: u32) -> Self {
        self.retry = Some(budget);
        self
    }
}

/// Body of a library request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LibraryRequest<'a> {
    Empty,
    Config { ignore_env_var_errors: bool },
    Dmmf { preview_features: &'a [String] },
    DebugPanic { message: &'a str },
}

impl LibraryRequest<'_> {
    fn encode(&self, datamodel: &str) -> Result<Option<String>, OperationError> {
        let encoded = match *self {
            LibraryRequest::Empty => return Ok(None),
            LibraryRequest::Config {
                ignore_env_var_errors,
            } => protocol::encode_request(&GetConfigRequest {
                datamodel,
                ignore_env_var_errors,
            })?,
            LibraryRequest::Dmmf { preview_features } => protocol::encode_request(&GetDmmfRequest {
                datamodel,
                preview_features,
            })?,
            LibraryRequest::DebugPanic { message } => {
                protocol::encode_request(&DebugPanicRequest { message })?
            }
        };
        Ok(Some(encoded))
    }
}

/// One operation, in both transport shapes.
#[derive(Debug, Clone)]
pub(crate) struct Operation<'a> {
    /// Short name used in logs.
    pub name: &'static str,
    /// Request label used in crash reports.
    pub request: &'static str,
    pub args: Vec<String>,
    pub entry: EntryPoint,
    pub library_request: LibraryRequest<'a>,
    pub input: Option<&'a InvocationInput>,
}

impl Operation<'_> {
    fn call(&self, request: Option<String>) -> EngineCall {
        EngineCall {
            operation: self.name,
            args: self.args.clone(),
            entry: self.entry,
            request,
        }
    }
}

/// Run an operation and return the engine's successful raw output.
pub(crate) async fn run(
    ctx: &EngineContext,
    op: &Operation<'_>,
    options: &EngineOptions,
) -> EngineResult<String> {
    let span = info_span!("engine_call", operation = op.name, invocation_id = %Uuid::new_v4());
    dispatch(ctx, op, options).instrument(span).await
}

async fn dispatch(
    ctx: &EngineContext,
    op: &Operation<'_>,
    options: &EngineOptions,
) -> EngineResult<String> {
    let kind = ctx.engine_kind(options.engine_kind)?;
    debug!(kind = %kind, "selected engine kind");

    let location = ctx
        .resolver()
        .resolve(LogicalEngine::for_kind(kind), options.engine_path.as_deref())
        .await?;

    match location {
        ArtifactLocation::Binary { path } => run_binary(ctx, op, options, path).await,
        ArtifactLocation::Library { path } => run_library(ctx, op, path).await,
    }
}

async fn run_binary(
    ctx: &EngineContext,
    op: &Operation<'_>,
    options: &EngineOptions,
    artifact: PathBuf,
) -> EngineResult<String> {
    match op.input {
        None => invoke_binary(ctx, op, options, &artifact, None).await,
        Some(input) => {
            with_input(input, move |dml_path| async move {
                invoke_binary(ctx, op, options, &artifact, Some(&dml_path)).await
            })
            .await?
        }
    }
}

async fn invoke_binary(
    ctx: &EngineContext,
    op: &Operation<'_>,
    options: &EngineOptions,
    artifact: &Path,
    dml_path: Option<&Path>,
) -> EngineResult<String> {
    let settings = &ctx.settings().invocation;

    let mut env = ctx.engine_env();
    if let Some(path) = dml_path {
        env.insert(DML_PATH_ENV.to_string(), path.to_string_lossy().into_owned());
    }

    let transport = SubprocessTransport::new(artifact, env)
        .with_cwd(options.cwd.clone())
        .with_max_output_bytes(settings.max_output_bytes);
    let budget = options.retry.unwrap_or(settings.retry_budget);

    let outcome = invoke_with_retry(&transport, &op.call(None), budget).await;

    let failure = FailureContext::new(op.request, ErrorArea::QueryEngineCli)
        .with_schema_path(op.input.and_then(InvocationInput::as_path))
        .with_schema(op.input.and_then(InvocationInput::as_text));
    settle(outcome, &failure)
}

async fn run_library(ctx: &EngineContext, op: &Operation<'_>, path: PathBuf) -> EngineResult<String> {
    let datamodel: Option<Cow<'_, str>> = match op.input {
        None => None,
        Some(InvocationInput::Text(text)) => Some(Cow::Borrowed(text.as_str())),
        Some(InvocationInput::Path(schema_path)) => {
            let text = tokio::fs::read_to_string(schema_path)
                .await
                .map_err(|source| OperationError::ReadInput {
                    path: schema_path.clone(),
                    source,
                })?;
            Some(Cow::Owned(text))
        }
    };

    let failure = FailureContext::new(op.request, ErrorArea::QueryEngineLibrary)
        .with_schema_path(op.input.and_then(InvocationInput::as_path))
        .with_schema(datamodel.as_deref());

    let request = op.library_request.encode(datamodel.as_deref().unwrap_or_default())?;
    let transport = match LibraryTransport::open(ctx.library_loader(), path).await {
        Ok(transport) => transport,
        Err(cause) => return Err(classify(RawOutcome::TransportFailure(cause), &failure)),
    };

    let outcome = transport.invoke(&op.call(request)).await;
    settle(outcome, &failure)
}

/// Keep a clean success, classify everything else.
fn settle(outcome: RawOutcome, failure: &FailureContext<'_>) -> EngineResult<String> {
    match outcome {
        RawOutcome::Success(raw) if protocol::embedded_error(&raw).is_none() => Ok(raw),
        other => Err(classify(other, failure)),
    }
}
