//! End-to-end tests of the pipelines against an in-memory engine library.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use engine_bridge::transport::{EngineLibrary, EntryPoint, LibraryLoader};
use engine_bridge::{
    get_config, get_dmmf, get_version, EngineContext, EngineError, EngineKind, EngineOptions,
    ErrorArea, GetConfigOptions, GetDmmfOptions, InvocationInput, OperationError, Settings,
    TransportCause,
};
use serde_json::Value;
use tempfile::TempDir;

const SCHEMA: &str = "model User { id Int @id }";

type Responder = fn(EntryPoint, Option<&str>) -> Result<String, TransportCause>;

/// Records every call and answers through a fixed responder.
struct FakeLibrary {
    calls: Mutex<Vec<(EntryPoint, Option<String>)>>,
    respond: Responder,
}

impl FakeLibrary {
    fn new(respond: Responder) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond,
        })
    }

    fn calls(&self) -> Vec<(EntryPoint, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    fn last_request(&self) -> Value {
        let calls = self.calls();
        let (_, request) = calls.last().expect("library was never called");
        serde_json::from_str(request.as_deref().unwrap()).unwrap()
    }
}

impl EngineLibrary for FakeLibrary {
    fn call(&self, entry: EntryPoint, request: Option<&str>) -> Result<String, TransportCause> {
        self.calls
            .lock()
            .unwrap()
            .push((entry, request.map(str::to_string)));
        (self.respond)(entry, request)
    }
}

struct FakeLoader {
    library: Arc<FakeLibrary>,
    loaded: Mutex<Vec<PathBuf>>,
}

impl LibraryLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn EngineLibrary>, TransportCause> {
        self.loaded.lock().unwrap().push(path.to_path_buf());
        let library: Arc<dyn EngineLibrary> = self.library.clone();
        Ok(library)
    }
}

struct BrokenLoader;

impl LibraryLoader for BrokenLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn EngineLibrary>, TransportCause> {
        Err(TransportCause::Load {
            path: path.to_path_buf(),
            source: Box::new(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid ELF header",
            )),
        })
    }
}

/// A library file on disk plus a context that loads it through `loader`.
struct Harness {
    dir: TempDir,
    library_path: PathBuf,
    ctx: EngineContext,
}

impl Harness {
    fn new(loader: Arc<dyn LibraryLoader>, env: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let library_path = dir.path().join("libquery_engine.so.node");
        fs::write(&library_path, b"\x7fELF").unwrap();

        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ctx = EngineContext::from_environment(Settings::default())
            .unwrap()
            .with_env(env)
            .with_library_loader(loader);

        Self {
            dir,
            library_path,
            ctx,
        }
    }

    fn with_library(library: &Arc<FakeLibrary>, env: &[(&str, &str)]) -> Self {
        let loader = FakeLoader {
            library: library.clone(),
            loaded: Mutex::new(Vec::new()),
        };
        Self::new(Arc::new(loader), env)
    }

    fn options(&self) -> EngineOptions {
        EngineOptions::default()
            .engine_path(&self.library_path)
            .engine_kind(EngineKind::Library)
    }
}

fn well_behaved(entry: EntryPoint, _request: Option<&str>) -> Result<String, TransportCause> {
    Ok(match entry {
        EntryPoint::Version => "0123456789abcdef".to_string(),
        EntryPoint::GetConfig => {
            r#"{"datasources":[{"name":"db","provider":"postgresql","activeProvider":"postgresql","url":{"fromEnvVar":"DATABASE_URL","value":null}}],"generators":[],"warnings":[]}"#
                .to_string()
        }
        EntryPoint::GetDmmf => r#"{"datamodel":{"models":[]},"schema":{},"mappings":{}}"#.to_string(),
        EntryPoint::DebugPanic => {
            r#"{"is_panic":true,"message":"FORCE_PANIC_QUERY_ENGINE_GET_DMMF","backtrace":"0: query_engine::debug_panic"}"#
                .to_string()
        }
    })
}

fn schema_error(_entry: EntryPoint, _request: Option<&str>) -> Result<String, TransportCause> {
    Ok(r#"{"is_panic":false,"message":"Error validating model \"User\"","error_code":"P1012"}"#.to_string())
}

fn panicking(_entry: EntryPoint, _request: Option<&str>) -> Result<String, TransportCause> {
    Ok(r#"{"is_panic":true,"message":"index out of bounds","backtrace":"0: query_core::build"}"#.to_string())
}

fn unwinding(_entry: EntryPoint, _request: Option<&str>) -> Result<String, TransportCause> {
    panic!("unwound across the boundary")
}

#[tokio::test]
async fn test_get_config_sends_datamodel() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[]);
    let options = GetConfigOptions::new(InvocationInput::text(SCHEMA))
        .with_engine(harness.options())
        .ignore_env_var_errors(true);

    let config = get_config(&harness.ctx, &options).await.unwrap();

    assert_eq!(config.datasources.len(), 1);
    assert_eq!(config.datasources[0].name, "db");

    let calls = library.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, EntryPoint::GetConfig);
    let request = library.last_request();
    assert_eq!(request["datamodel"], SCHEMA);
    assert_eq!(request["ignoreEnvVarErrors"], true);
}

#[tokio::test]
async fn test_get_dmmf_reads_path_input() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[]);
    let schema = harness.dir.path().join("schema.prisma");
    fs::write(&schema, SCHEMA).unwrap();

    let options = GetDmmfOptions::new(InvocationInput::path(&schema))
        .with_engine(harness.options())
        .preview_features(["middlewares", "fullTextSearch"]);
    let document = get_dmmf(&harness.ctx, &options).await.unwrap();

    assert_eq!(document.datamodel["models"], Value::Array(Vec::new()));
    let request = library.last_request();
    assert_eq!(request["datamodel"], SCHEMA);
    assert_eq!(request["previewFeatures"], serde_json::json!(["fullTextSearch"]));
    assert!(schema.exists());
}

#[tokio::test]
async fn test_get_dmmf_without_preview_features_omits_field() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[]);
    let options = GetDmmfOptions::new(InvocationInput::text(SCHEMA)).with_engine(harness.options());

    get_dmmf(&harness.ctx, &options).await.unwrap();

    assert!(library.last_request().get("previewFeatures").is_none());
}

#[tokio::test]
async fn test_missing_schema_file_is_read_error() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[]);
    let missing = harness.dir.path().join("missing.prisma");

    let options = GetDmmfOptions::new(InvocationInput::path(&missing)).with_engine(harness.options());
    let err = get_dmmf(&harness.ctx, &options).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Operation(OperationError::ReadInput { ref path, .. }) if *path == missing
    ));
    assert!(library.calls().is_empty());
}

#[tokio::test]
async fn test_version_calls_without_request() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[]);

    let version = get_version(&harness.ctx, &harness.options()).await.unwrap();

    assert_eq!(version, "0123456789abcdef");
    assert_eq!(library.calls(), vec![(EntryPoint::Version, None)]);
}

#[tokio::test]
async fn test_embedded_schema_error() {
    let library = FakeLibrary::new(schema_error);
    let harness = Harness::with_library(&library, &[]);
    let options = GetDmmfOptions::new(InvocationInput::text(SCHEMA)).with_engine(harness.options());

    let err = get_dmmf(&harness.ctx, &options).await.unwrap_err();

    assert!(!err.is_panic());
    assert_eq!(err.error_code(), Some("P1012"));
    assert_eq!(err.to_string(), "Schema parsing\nError validating model \"User\"");
}

#[tokio::test]
async fn test_embedded_panic_reports_library_area() {
    let library = FakeLibrary::new(panicking);
    let harness = Harness::with_library(&library, &[]);
    let schema = harness.dir.path().join("schema.prisma");
    fs::write(&schema, SCHEMA).unwrap();

    let options = GetConfigOptions::new(InvocationInput::path(&schema)).with_engine(harness.options());
    let err = get_config(&harness.ctx, &options).await.unwrap_err();

    let report = err.panic_report().unwrap();
    assert_eq!(report.message, "index out of bounds");
    assert_eq!(report.native_stack, "0: query_core::build");
    assert_eq!(report.area, ErrorArea::QueryEngineLibrary);
    assert_eq!(report.request, "query-engine get-config");
    assert_eq!(report.schema_path.as_deref(), Some(schema.as_path()));
    assert_eq!(report.schema.as_deref(), Some(SCHEMA));
}

#[tokio::test]
async fn test_forced_panic_uses_debug_entry_point() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[("FORCE_PANIC_QUERY_ENGINE_GET_DMMF", "1")]);
    let options = GetDmmfOptions::new(InvocationInput::text(SCHEMA)).with_engine(harness.options());

    let err = get_dmmf(&harness.ctx, &options).await.unwrap_err();

    assert!(err.is_panic());
    let calls = library.calls();
    assert_eq!(calls[0].0, EntryPoint::DebugPanic);
    assert_eq!(
        library.last_request()["message"],
        "FORCE_PANIC_QUERY_ENGINE_GET_DMMF"
    );
}

#[tokio::test]
async fn test_load_failure_is_operation_error() {
    let harness = Harness::new(Arc::new(BrokenLoader), &[]);
    let options = GetConfigOptions::new(InvocationInput::text(SCHEMA)).with_engine(harness.options());

    let err = get_config(&harness.ctx, &options).await.unwrap_err();

    match err {
        EngineError::Operation(OperationError::Transport {
            cause: TransportCause::Load { path, .. },
            ..
        }) => assert_eq!(path, harness.library_path),
        other => panic!("expected load failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unwinding_call_is_transport_failure() {
    let library = FakeLibrary::new(unwinding);
    let harness = Harness::with_library(&library, &[]);

    let err = get_version(&harness.ctx, &harness.options()).await.unwrap_err();

    match err {
        EngineError::Operation(OperationError::Transport {
            cause: TransportCause::Unwound { symbol, message },
            ..
        }) => {
            assert_eq!(symbol, "query_engine_version");
            assert_eq!(message, "unwound across the boundary");
        }
        other => panic!("expected unwound failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_library_kind_from_env() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[("QUERY_ENGINE_TYPE", "library")]);
    let options = EngineOptions::default().engine_path(&harness.library_path);

    let version = get_version(&harness.ctx, &options).await.unwrap();
    assert_eq!(version, "0123456789abcdef");
}

#[tokio::test]
async fn test_unknown_engine_type() {
    let library = FakeLibrary::new(well_behaved);
    let harness = Harness::with_library(&library, &[("QUERY_ENGINE_TYPE", "wasm")]);
    let options = EngineOptions::default().engine_path(&harness.library_path);

    let err = get_version(&harness.ctx, &options).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Operation(OperationError::UnknownEngineType(ref value)) if value == "wasm"
    ));
}
