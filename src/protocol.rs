//! Wire types exchanged with the query engine, and the response decoder.
//!
//! The engine answers with JSON on stdout (or as the returned string of a
//! library call). Some engine builds print log lines before the document, so
//! decoding starts at the first `{`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::OperationError;

/// Maximum number of characters kept when quoting undecodable output.
pub const PREVIEW_CHARS: usize = 500;

// ============================================================================
// Responses
// ============================================================================

/// Datasources and generators declared in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetaFormat {
    pub datasources: Vec<DataSource>,
    pub generators: Vec<GeneratorConfig>,
    /// Non-fatal warnings reported by the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A `datasource` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub active_provider: String,
    pub url: EnvValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<String>,
}

/// A value that is either literal or read from an env var.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvValue {
    #[serde(default)]
    pub from_env_var: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A `generator` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    pub name: String,
    pub provider: EnvValue,
    #[serde(default)]
    pub output: Option<EnvValue>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub binary_targets: Vec<EnvValue>,
    #[serde(default)]
    pub preview_features: Vec<String>,
}

/// The data model meta format document.
///
/// The three sections are kept as opaque JSON; consumers walk them as needed.
/// `datamodel` is required so that unrelated objects do not decode as an
/// empty document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DmmfDocument {
    pub datamodel: serde_json::Value,
    #[serde(default)]
    pub schema: serde_json::Value,
    #[serde(default)]
    pub mappings: serde_json::Value,
}

/// Structured error the engine writes on failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineErrorPayload {
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub backtrace: Option<String>,
    #[serde(default)]
    pub is_panic: Option<bool>,
}

impl EngineErrorPayload {
    pub fn is_panic(&self) -> bool {
        self.is_panic.unwrap_or(false)
    }
}

// ============================================================================
// Library requests
// ============================================================================

/// Request for the `get_config` entry point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigRequest<'a> {
    pub datamodel: &'a str,
    pub ignore_env_var_errors: bool,
}

/// Request for the `dmmf` entry point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDmmfRequest<'a> {
    pub datamodel: &'a str,
    #[serde(skip_serializing_if = "no_features")]
    pub preview_features: &'a [String],
}

fn no_features(features: &&[String]) -> bool {
    features.is_empty()
}

/// Request for the `debug_panic` entry point.
#[derive(Debug, Clone, Serialize)]
pub struct DebugPanicRequest<'a> {
    pub message: &'a str,
}

/// Serialize a library request.
pub fn encode_request<T: Serialize>(request: &T) -> Result<String, OperationError> {
    serde_json::to_string(request).map_err(OperationError::SerializeRequest)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a JSON response, ignoring anything before the first `{`.
///
/// # Errors
///
/// Returns [`OperationError::Decode`] with a bounded preview of the text if
/// there is no JSON object or it does not match `T`.
pub fn decode_response<T: DeserializeOwned>(raw: &str) -> Result<T, OperationError> {
    let Some(start) = raw.find('{') else {
        return Err(OperationError::Decode {
            reason: "response contains no JSON object".to_string(),
            preview: preview(raw),
            source: None,
        });
    };

    serde_json::from_str(&raw[start..]).map_err(|err| OperationError::Decode {
        reason: err.to_string(),
        preview: preview(raw),
        source: Some(err),
    })
}

/// Decode a plain-text response: the output minus its trailing newline.
pub fn decode_text(raw: &str) -> String {
    let text = raw.strip_suffix('\n').unwrap_or(raw);
    text.strip_suffix('\r').unwrap_or(text).to_string()
}

/// Parse an engine error payload out of failure output.
pub fn decode_error_payload(output: &str) -> Option<EngineErrorPayload> {
    let start = output.find('{')?;
    serde_json::from_str(output[start..].trim_end()).ok()
}

/// Detect an error reported in-band by a library call.
///
/// Library entry points return errors as a JSON object with a top-level
/// `is_panic` key instead of failing the call.
pub fn embedded_error(raw: &str) -> Option<EngineErrorPayload> {
    if !raw.contains("\"is_panic\"") {
        return None;
    }
    let start = raw.find('{')?;
    let value: serde_json::Value = serde_json::from_str(&raw[start..]).ok()?;
    if value.get("is_panic").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Truncate text for inclusion in an error message.
pub fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
