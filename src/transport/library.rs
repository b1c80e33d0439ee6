//! Load the engine library into this process and call its entry points.
//!
//! The library exports C functions that take a NUL-terminated JSON request
//! and return a NUL-terminated string owned by the library, which must be
//! handed back through [`FREE_STRING_SYMBOL`]. Calls run on the blocking pool
//! and a panic that unwinds across the boundary is caught and reported as a
//! transport failure.

use std::any::Any;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;
use tracing::debug;

use super::{EngineCall, EngineTransport, EntryPoint, RawOutcome};
use crate::error::TransportCause;

/// Exported function that releases strings returned by the engine.
pub const FREE_STRING_SYMBOL: &str = "query_engine_free_string";

type RequestFn = unsafe extern "C-unwind" fn(*const c_char) -> *mut c_char;
type VersionFn = unsafe extern "C-unwind" fn() -> *mut c_char;
type FreeStringFn = unsafe extern "C" fn(*mut c_char);

/// An engine library that is ready to serve calls.
pub trait EngineLibrary: Send + Sync {
    /// Call an entry point and return its string result.
    fn call(&self, entry: EntryPoint, request: Option<&str>) -> Result<String, TransportCause>;
}

/// Turns a library path into a callable [`EngineLibrary`].
pub trait LibraryLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn EngineLibrary>, TransportCause>;
}

/// Loads engine libraries with the platform's dynamic linker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicLibraryLoader;

impl LibraryLoader for DynamicLibraryLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn EngineLibrary>, TransportCause> {
        let module = LoadedModule::open(path)?;
        Ok(Arc::new(module))
    }
}

/// A dynamically loaded engine library.
#[derive(Debug)]
pub struct LoadedModule {
    path: PathBuf,
    library: Library,
}

impl LoadedModule {
    /// Load the library at `path`.
    ///
    /// On glibc Linux the library is opened with deep binding so that its
    /// own OpenSSL symbols win over any already loaded into the process.
    pub fn open(path: &Path) -> Result<Self, TransportCause> {
        let library = open_library(path).map_err(|err| TransportCause::Load {
            path: path.to_path_buf(),
            source: Box::new(err),
        })?;
        debug!(path = %path.display(), "loaded engine library");
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn free(&self, ptr: *mut c_char) -> Result<(), TransportCause> {
        // SAFETY: the symbol has the engine's documented free-string signature.
        let free = unsafe { self.library.get::<FreeStringFn>(FREE_STRING_SYMBOL.as_bytes()) }
            .map_err(|source| TransportCause::MissingSymbol {
                symbol: FREE_STRING_SYMBOL,
                source,
            })?;
        // SAFETY: `ptr` was returned by this library and is freed exactly once.
        unsafe { free(ptr) };
        Ok(())
    }
}

impl EngineLibrary for LoadedModule {
    fn call(&self, entry: EntryPoint, request: Option<&str>) -> Result<String, TransportCause> {
        let symbol = entry.symbol();
        let missing = |source| TransportCause::MissingSymbol { symbol, source };

        let raw = if entry.takes_request() {
            let request = CString::new(request.unwrap_or("{}"))
                .map_err(|_| TransportCause::InvalidRequest { symbol })?;
            // SAFETY: request entry points take one C string and return an owned C string.
            let func = unsafe { self.library.get::<RequestFn>(symbol.as_bytes()) }.map_err(missing)?;
            // SAFETY: `request` outlives the call.
            unsafe { func(request.as_ptr()) }
        } else {
            // SAFETY: the version entry point takes no arguments.
            let func = unsafe { self.library.get::<VersionFn>(symbol.as_bytes()) }.map_err(missing)?;
            unsafe { func() }
        };

        if raw.is_null() {
            return Err(TransportCause::NullResponse { symbol });
        }

        // SAFETY: non-null results are NUL-terminated strings owned by the library.
        let text = unsafe { CStr::from_ptr(raw) }
            .to_str()
            .map(str::to_owned)
            .map_err(|_| TransportCause::InvalidUtf8 { symbol });
        self.free(raw)?;
        text
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};

    const RTLD_DEEPBIND: std::os::raw::c_int = 0x8;

    // SAFETY: loading runs the library's initializers; engine libraries have none with preconditions.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_LOCAL | RTLD_DEEPBIND) }?;
    Ok(library.into())
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: loading runs the library's initializers; engine libraries have none with preconditions.
    unsafe { Library::new(path) }
}

/// Calls an in-process engine library on the blocking thread pool.
#[derive(Clone)]
pub struct LibraryTransport {
    module: Arc<dyn EngineLibrary>,
}

impl LibraryTransport {
    pub fn new(module: Arc<dyn EngineLibrary>) -> Self {
        Self { module }
    }

    /// Load the library at `path` through `loader`.
    pub async fn open(loader: Arc<dyn LibraryLoader>, path: PathBuf) -> Result<Self, TransportCause> {
        let target = path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            panic::catch_unwind(AssertUnwindSafe(|| loader.load(&target)))
        })
        .await;

        match joined {
            Ok(Ok(loaded)) => loaded.map(Self::new),
            Ok(Err(payload)) => Err(TransportCause::LoadUnwound {
                path,
                message: panic_message(payload.as_ref()),
            }),
            Err(err) => Err(TransportCause::Join(err.to_string())),
        }
    }
}

#[async_trait]
impl EngineTransport for LibraryTransport {
    async fn invoke(&self, call: &EngineCall) -> RawOutcome {
        let module = Arc::clone(&self.module);
        let entry = call.entry;
        let request = call.request.clone();
        debug!(operation = call.operation, symbol = entry.symbol(), "calling engine library");

        let joined = tokio::task::spawn_blocking(move || {
            panic::catch_unwind(AssertUnwindSafe(|| module.call(entry, request.as_deref())))
        })
        .await;

        match joined {
            Ok(Ok(Ok(text))) => RawOutcome::Success(text),
            Ok(Ok(Err(cause))) => RawOutcome::TransportFailure(cause),
            Ok(Err(payload)) => RawOutcome::TransportFailure(TransportCause::Unwound {
                symbol: entry.symbol(),
                message: panic_message(payload.as_ref()),
            }),
            Err(err) => RawOutcome::TransportFailure(TransportCause::Join(err.to_string())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
