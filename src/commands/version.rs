//! Fetch the engine version string.

use super::{run, EngineContext, EngineOptions, LibraryRequest, Operation};
use crate::error::EngineResult;
use crate::protocol::decode_text;
use crate::transport::EntryPoint;

/// Request label for crash reports.
pub const VERSION_REQUEST: &str = "query-engine version";

/// Ask the engine for its version, e.g. `query-engine 2.30.0`.
pub async fn get_version(ctx: &EngineContext, options: &EngineOptions) -> EngineResult<String> {
    let op = Operation {
        name: "version",
        request: VERSION_REQUEST,
        args: vec!["--version".to_string()],
        entry: EntryPoint::Version,
        library_request: LibraryRequest::Empty,
        input: None,
    };

    let raw = run(ctx, &op, options).await?;
    Ok(decode_text(&raw))
}
