//! Fetch the data model meta format document of a schema.

use tracing::{info, warn};

use super::{run, EngineContext, EngineOptions, LibraryRequest, Operation};
use crate::error::EngineResult;
use crate::input::InvocationInput;
use crate::protocol::{decode_response, DmmfDocument};
use crate::transport::EntryPoint;

/// Request label for crash reports.
pub const GET_DMMF_REQUEST: &str = "query-engine get-dmmf";

/// Setting this env var makes the engine panic instead of answering.
pub const FORCE_PANIC_ENV: &str = "FORCE_PANIC_QUERY_ENGINE_GET_DMMF";

/// Preview features that are now always on and must not be passed.
pub const DEPRECATED_PREVIEW_FEATURES: &[&str] = &["middlewares"];

/// Options for [`get_dmmf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDmmfOptions {
    pub input: InvocationInput,
    pub engine: EngineOptions,
    /// Preview features to enable in the engine.
    pub preview_features: Vec<String>,
}

impl GetDmmfOptions {
    pub fn new(input: InvocationInput) -> Self {
        Self {
            input,
            engine: EngineOptions::default(),
            preview_features: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    pub fn preview_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preview_features = features.into_iter().map(Into::into).collect();
        self
    }
}

fn active_preview_features(features: &[String]) -> Vec<String> {
    features
        .iter()
        .filter(|feature| {
            let deprecated = DEPRECATED_PREVIEW_FEATURES.contains(&feature.as_str());
            if deprecated {
                info!(feature = %feature, "preview feature is now generally available, skipping it");
            }
            !deprecated
        })
        .cloned()
        .collect()
}

fn subprocess_args(preview_features: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    if !preview_features.is_empty() {
        args.push(format!("--enable-experimental={}", preview_features.join(",")));
    }
    args.extend(["--enable-raw-queries", "cli", "dmmf"].map(String::from));
    args
}

fn debug_panic_args() -> Vec<String> {
    ["cli", "debug-panic", "--message", FORCE_PANIC_ENV]
        .map(String::from)
        .to_vec()
}

/// Ask the engine for the DMMF document of a schema.
///
/// # Errors
///
/// Returns [`crate::EngineError`] when the engine cannot be found or run,
/// when it rejects the schema, or when its answer cannot be decoded.
pub async fn get_dmmf(ctx: &EngineContext, options: &GetDmmfOptions) -> EngineResult<DmmfDocument> {
    let preview_features = active_preview_features(&options.preview_features);

    let op = if ctx.env_var(FORCE_PANIC_ENV).is_some() {
        warn!("{FORCE_PANIC_ENV} is set, forcing an engine panic");
        Operation {
            name: "get-dmmf",
            request: GET_DMMF_REQUEST,
            args: debug_panic_args(),
            entry: EntryPoint::DebugPanic,
            library_request: LibraryRequest::DebugPanic {
                message: FORCE_PANIC_ENV,
            },
            input: Some(&options.input),
        }
    } else {
        Operation {
            name: "get-dmmf",
            request: GET_DMMF_REQUEST,
            args: subprocess_args(&preview_features),
            entry: EntryPoint::GetDmmf,
            library_request: LibraryRequest::Dmmf {
                preview_features: &preview_features,
            },
            input: Some(&options.input),
        }
    };

    let raw = run(ctx, &op, &options.engine).await?;
    Ok(decode_response(&raw)?)
}
