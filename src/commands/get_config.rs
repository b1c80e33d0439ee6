//! Fetch the datasource and generator configuration of a schema.

use super::{run, EngineContext, EngineOptions, LibraryRequest, Operation};
use crate::error::EngineResult;
use crate::input::InvocationInput;
use crate::protocol::{decode_response, ConfigMetaFormat};
use crate::transport::EntryPoint;

/// Request label for crash reports.
pub const GET_CONFIG_REQUEST: &str = "query-engine get-config";

/// Options for [`get_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetConfigOptions {
    pub input: InvocationInput,
    pub engine: EngineOptions,
    /// Resolve `env()` references leniently instead of failing on unset vars.
    pub ignore_env_var_errors: bool,
}

impl GetConfigOptions {
    pub fn new(input: InvocationInput) -> Self {
        Self {
            input,
            engine: EngineOptions::default(),
            ignore_env_var_errors: false,
        }
    }

    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    pub fn ignore_env_var_errors(mut self, ignore: bool) -> Self {
        self.ignore_env_var_errors = ignore;
        self
    }
}

fn subprocess_args(ignore_env_var_errors: bool) -> Vec<String> {
    let mut args = vec!["cli".to_string(), "get-config".to_string()];
    if ignore_env_var_errors {
        args.push("--ignoreEnvVarErrors".to_string());
    }
    args
}

/// Ask the engine for the datasources and generators declared in a schema.
///
/// # Errors
///
/// Returns [`crate::EngineError`] when the engine cannot be found or run,
/// when it rejects the schema, or when its answer cannot be decoded.
pub async fn get_config(
    ctx: &EngineContext,
    options: &GetConfigOptions,
) -> EngineResult<ConfigMetaFormat> {
    let op = Operation {
        name: "get-config",
        request: GET_CONFIG_REQUEST,
        args: subprocess_args(options.ignore_env_var_errors),
        entry: EntryPoint::GetConfig,
        library_request: LibraryRequest::Config {
            ignore_env_var_errors: options.ignore_env_var_errors,
        },
        input: Some(&options.input),
    };

    let raw = run(ctx, &op, &options.engine).await?;
    Ok(decode_response(&raw)?)
}
