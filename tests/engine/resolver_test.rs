//! Tests for engine artifact resolution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use engine_bridge::engine::{ArtifactResolver, LogicalEngine, Platform, SearchRoots};
use engine_bridge::{ArtifactLocation, OperationError};
use tempfile::TempDir;

const PLATFORM: &str = "debian-openssl-3.0.x";

struct Layout {
    _root: TempDir,
    engines_dir: PathBuf,
    anchor_dir: PathBuf,
    runtime_dir: PathBuf,
}

impl Layout {
    /// `<root>/app/node_modules/bridge` as the anchor, `<root>/engines` and `<root>/bin`.
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let engines_dir = root.path().join("engines");
        let anchor_dir = root.path().join("app").join("node_modules").join("bridge");
        let runtime_dir = root.path().join("bin");
        fs::create_dir_all(&anchor_dir).unwrap();
        fs::create_dir_all(&runtime_dir).unwrap();
        Self {
            _root: root,
            engines_dir,
            anchor_dir,
            runtime_dir,
        }
    }

    fn roots(&self) -> SearchRoots {
        SearchRoots {
            engines_dir: Some(self.engines_dir.clone()),
            anchor_dir: self.anchor_dir.clone(),
            runtime_dir: Some(self.runtime_dir.clone()),
        }
    }
}

fn touch(path: &Path) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"engine").unwrap();
    path.to_path_buf()
}

fn env(pairs: &[(&str, &Path)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string_lossy().into_owned()))
        .collect()
}

#[tokio::test]
async fn test_override_wins_over_env_var() {
    let layout = Layout::new();
    let explicit = touch(&layout.runtime_dir.join("my-engine"));
    let from_env = touch(&layout.runtime_dir.join("env-engine"));

    let env = env(&[("QUERY_ENGINE_BINARY", &from_env)]);
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver
        .resolve(LogicalEngine::QueryEngineBinary, Some(&explicit))
        .await
        .unwrap();
    assert_eq!(location, ArtifactLocation::Binary { path: explicit });
}

#[tokio::test]
async fn test_missing_override_falls_back_to_env_var() {
    let layout = Layout::new();
    let from_env = touch(&layout.runtime_dir.join("libengine.so.node"));

    let env = env(&[("QUERY_ENGINE_LIBRARY", &from_env)]);
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver
        .resolve(
            LogicalEngine::QueryEngineLibrary,
            Some(Path::new("/not/there/libengine.so.node")),
        )
        .await
        .unwrap();
    assert_eq!(location, ArtifactLocation::Library { path: from_env });
}

#[tokio::test]
async fn test_env_var_to_missing_path_fails_without_searching() {
    let layout = Layout::new();
    // A valid artifact in the search path must not be picked up.
    touch(&layout.engines_dir.join(format!("query-engine-{PLATFORM}")));

    let missing = layout.runtime_dir.join("gone");
    let env = env(&[("QUERY_ENGINE_BINARY", &missing)]);
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let err = resolver
        .resolve(LogicalEngine::QueryEngineBinary, None)
        .await
        .unwrap_err();
    match err {
        OperationError::EnvOverrideMissing { var, path } => {
            assert_eq!(var, "QUERY_ENGINE_BINARY");
            assert_eq!(path, missing);
        }
        other => panic!("expected env override error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_search_order_prefers_engines_dir() {
    let layout = Layout::new();
    let name = format!("query-engine-{PLATFORM}");
    let in_engines = touch(&layout.engines_dir.join(&name));
    touch(&layout.runtime_dir.join(&name));

    let env = HashMap::new();
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver.resolve(LogicalEngine::QueryEngineBinary, None).await.unwrap();
    assert_eq!(location.path(), in_engines);
}

#[tokio::test]
async fn test_search_finds_artifact_one_level_above_anchor() {
    let layout = Layout::new();
    let name = format!("query-engine-{PLATFORM}");
    // <root>/app/node_modules
    let beside = touch(&layout.anchor_dir.parent().unwrap().join(&name));

    let missing = layout.runtime_dir.join("not-created");
    let roots = SearchRoots {
        engines_dir: Some(missing.join("engines")),
        anchor_dir: layout.anchor_dir.clone(),
        runtime_dir: Some(missing),
    };
    let env = HashMap::new();
    let platform = Platform::new(PLATFORM);
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver.resolve(LogicalEngine::QueryEngineBinary, None).await.unwrap();
    assert_eq!(location, ArtifactLocation::Binary { path: beside });
}

#[tokio::test]
async fn test_search_finds_packaged_layout_above_anchor() {
    let layout = Layout::new();
    let name = format!("libquery_engine-{PLATFORM}.so.node");
    // Two levels above the anchor: <root>/app
    let packaged = touch(&layout.anchor_dir.parent().unwrap().parent().unwrap().join(&name));

    let env = HashMap::new();
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver.resolve(LogicalEngine::QueryEngineLibrary, None).await.unwrap();
    assert_eq!(location, ArtifactLocation::Library { path: packaged });
}

#[tokio::test]
async fn test_not_found_lists_every_searched_directory() {
    let layout = Layout::new();

    let env = HashMap::new();
    let platform = Platform::new(PLATFORM);
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let err = resolver
        .resolve(LogicalEngine::QueryEngineBinary, None)
        .await
        .unwrap_err();
    match err {
        OperationError::ArtifactNotFound {
            name,
            platform,
            searched,
        } => {
            assert_eq!(name, format!("query-engine-{PLATFORM}"));
            assert_eq!(platform, PLATFORM);
            assert_eq!(searched, roots.candidates());
            assert_eq!(searched.len(), 4);
        }
        other => panic!("expected not-found error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_windows_binary_name() {
    let layout = Layout::new();
    let exe = touch(&layout.runtime_dir.join("query-engine-windows.exe"));

    let env = HashMap::new();
    let platform = Platform::new("windows");
    let roots = layout.roots();
    let resolver = ArtifactResolver::new(&env, &platform, &roots);

    let location = resolver.resolve(LogicalEngine::QueryEngineBinary, None).await.unwrap();
    assert_eq!(location.path(), exe);
}
