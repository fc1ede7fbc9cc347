//! # quire-plugin
//!
//! Plugin engine for Quire. Provides:
//!
//! - Plugin registry with persisted enable/disable state
//! - Plugin loader for TOML plugin files, with directory discovery
//! - Hook pipeline with per-hook failure isolation and context rollback
//! - Conversion context shared by all hooks of one run
//! - Conversion driver that runs the hook stages around parse, render and package

pub mod context;
pub mod driver;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod pipeline;
pub mod plugin;
pub mod prelude;
pub mod registry;
pub mod state;
pub mod summary;

pub use context::{ConversionContext, Metadata, PluginData};
pub use driver::{ConversionDriver, ConversionReport};
pub use error::{LoadCause, PluginError, PluginResult};
pub use hooks::{Artifact, Hook, HookError, HookKind};
pub use loader::PluginLoader;
pub use manager::PluginManager;
pub use pipeline::{HookPipeline, HookWarning, PipelineOutcome};
pub use plugin::Plugin;
pub use registry::{PluginInfo, PluginRegistry, PluginSummary};
pub use state::{JsonFileStateStore, MemoryStateStore, StateStore};
pub use summary::RunSummary;
