//! Plugin manager: wires loader, registry, state store and pipeline together.
//!
//! This is what the host owns for its lifetime and hands to the CLI and the
//! conversion driver by reference. Call [`PluginManager::shutdown`] on exit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use quire_core::config::PluginsConfig;

use crate::error::PluginResult;
use crate::loader::{DiscoveryFailure, PluginLoader};
use crate::pipeline::HookPipeline;
use crate::plugin::Plugin;
use crate::registry::{PluginInfo, PluginRegistry, PluginSummary};
use crate::state::{JsonFileStateStore, StateStore};

/// Outcome of [`PluginManager::discover`].
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Names of newly registered plugins, in discovery order.
    pub registered: Vec<String>,
    /// Files that could not be loaded or registered.
    pub failures: Vec<DiscoveryFailure>,
}

/// Owns the plugin subsystem.
#[derive(Debug)]
pub struct PluginManager {
    loader: PluginLoader,
    registry: Arc<PluginRegistry>,
    pipeline: HookPipeline,
    directories: Vec<PathBuf>,
}

impl PluginManager {
    /// Creates a manager over an existing state store.
    pub fn new(store: Arc<dyn StateStore>, config: &PluginsConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new(store));
        let pipeline =
            HookPipeline::new(registry.clone()).with_merge_policy(config.metadata_merge_policy);

        Self {
            loader: PluginLoader::new(),
            registry,
            pipeline,
            directories: config.discovery_directories(),
        }
    }

    /// Creates a manager scanning only `directories`, without startup discovery.
    pub fn with_directories(store: Arc<dyn StateStore>, directories: Vec<PathBuf>) -> Self {
        let config = PluginsConfig {
            directories,
            include_default_directories: false,
            auto_discover: false,
            ..Default::default()
        };
        Self::new(store, &config)
    }

    /// Opens the configured state file and, if enabled, runs discovery.
    pub async fn from_config(config: &PluginsConfig) -> PluginResult<Self> {
        let store = JsonFileStateStore::open(config.effective_state_file()).await?;
        let manager = Self::new(Arc::new(store), config);

        if config.auto_discover {
            let outcome = manager.discover().await;
            for failure in &outcome.failures {
                warn!(
                    path = %failure.path.display(),
                    error = %failure.error,
                    "Plugin not loaded during startup discovery"
                );
            }
        }

        Ok(manager)
    }

    /// Loads a plugin file and registers it. Errors propagate.
    pub async fn load_path(&self, path: &Path, auto_enable: bool) -> PluginResult<PluginInfo> {
        let plugin = self.loader.load_from_path(path).await?;
        self.registry.load(plugin, auto_enable).await
    }

    /// Registers a plugin built in code.
    pub async fn register(&self, plugin: Plugin, auto_enable: bool) -> PluginResult<PluginInfo> {
        self.registry.load(plugin, auto_enable).await
    }

    /// Scans the discovery directories and registers what it finds.
    ///
    /// Nothing here is fatal: unreadable files and name collisions are
    /// returned as failures.
    pub async fn discover(&self) -> DiscoveryOutcome {
        let report = self.loader.discover(&self.directories).await;
        let mut outcome = DiscoveryOutcome {
            registered: Vec::new(),
            failures: report.failures,
        };

        for plugin in report.plugins {
            let path = plugin.source().map(PathBuf::from).unwrap_or_default();
            match self.registry.load(plugin, false).await {
                Ok(info) => outcome.registered.push(info.name),
                Err(error) => outcome.failures.push(DiscoveryFailure { path, error }),
            }
        }

        info!(
            registered = outcome.registered.len(),
            failed = outcome.failures.len(),
            "Plugins discovered"
        );
        outcome
    }

    /// Lists plugins in registration order.
    pub async fn list(&self) -> Vec<PluginSummary> {
        self.registry.list().await
    }

    /// Enables a plugin.
    pub async fn enable(&self, name: &str) -> PluginResult<()> {
        self.registry.enable(name).await
    }

    /// Disables a plugin.
    pub async fn disable(&self, name: &str) -> PluginResult<()> {
        self.registry.disable(name).await
    }

    /// Full metadata for one plugin.
    pub async fn info(&self, name: &str) -> PluginResult<PluginInfo> {
        self.registry.info(name).await
    }

    /// Unregisters a plugin.
    pub async fn unload(&self, name: &str) -> PluginResult<()> {
        self.registry.unload(name).await.map(|_| ())
    }

    /// Directories scanned by [`discover`](Self::discover).
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// The hook pipeline.
    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    /// The plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Flushes persisted state.
    pub async fn shutdown(&self) -> PluginResult<()> {
        self.registry.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::state::MemoryStateStore;

    const PLUGIN: &str = r#"
[[plugin]]
name = "lang"
version = "1.0.0"

[[plugin.metadata_resolver]]
op = "set_default"
key = "language"
value = "en"
"#;

    #[tokio::test]
    async fn test_discover_reports_duplicates() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        std::fs::write(first.path().join("lang.toml"), PLUGIN).expect("write");
        std::fs::write(second.path().join("lang.toml"), PLUGIN).expect("write");

        let manager = PluginManager::with_directories(
            Arc::new(MemoryStateStore::new()),
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        let outcome = manager.discover().await;

        assert_eq!(outcome.registered, vec!["lang".to_string()]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, second.path().join("lang.toml"));
        assert!(matches!(
            outcome.failures[0].error,
            PluginError::DuplicateName { .. }
        ));
        assert!(!manager.info("lang").await.expect("info").enabled);
    }

    #[tokio::test]
    async fn test_from_config_persists_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plugins_dir = dir.path().join("plugins");
        std::fs::create_dir(&plugins_dir).expect("mkdir");
        std::fs::write(plugins_dir.join("lang.toml"), PLUGIN).expect("write");

        let config = PluginsConfig {
            directories: vec![plugins_dir],
            include_default_directories: false,
            state_file: Some(dir.path().join("state.json")),
            ..Default::default()
        };

        let manager = PluginManager::from_config(&config).await.expect("manager");
        assert_eq!(manager.list().await.len(), 1);
        manager.enable("lang").await.expect("enable");
        manager.shutdown().await.expect("shutdown");
        drop(manager);

        let manager = PluginManager::from_config(&config).await.expect("manager");
        assert!(manager.info("lang").await.expect("info").enabled);
    }
}
