//! # engine-bridge
//!
//! Dispatch layer that asks a native query engine for facts about a schema:
//! its configuration, its data model meta format (DMMF) document, and the
//! engine version.
//!
//! ## Architecture
//!
//! The engine is either an executable driven over stdio or a library loaded
//! into this process. Callers do not need to know which:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        commands (get_config, get_dmmf, get_version)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine::ArtifactResolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │       ArtifactLocation::Binary | ArtifactLocation::Library│
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [input + transport]
//! ┌─────────────────────────────────────────────────────────┐
//! │   SubprocessTransport (retry)  │  LibraryTransport       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ RawOutcome
//! ┌─────────────────────────────────────────────────────────┐
//! │      protocol::decode_*        │   classify::classify    │
//! │       (typed value)            │   (EngineError)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use engine_bridge::{get_dmmf, EngineContext, GetDmmfOptions, InvocationInput, Settings};
//!
//! let ctx = EngineContext::from_environment(Settings::load()?)?;
//! let options = GetDmmfOptions::new(InvocationInput::path("prisma/schema.prisma"));
//! let document = get_dmmf(&ctx, &options).await?;
//! ```

pub mod classify;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod protocol;
pub mod retry;
pub mod telemetry;
pub mod transport;

pub use commands::{
    get_config, get_dmmf, get_version, EngineContext, EngineOptions, GetConfigOptions,
    GetDmmfOptions,
};
pub use config::{Settings, SettingsError};
pub use engine::{ArtifactLocation, EngineKind, LogicalEngine, Platform};
pub use error::{EngineError, EngineResult, ErrorArea, OperationError, PanicReport, TransportCause};
pub use input::InvocationInput;
pub use protocol::{ConfigMetaFormat, DmmfDocument};
