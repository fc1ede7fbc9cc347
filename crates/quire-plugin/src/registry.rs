//! Plugin registry: the catalogue of loaded plugins and their enabled state.
//!
//! Plugins are kept in registration order, which is also the order their
//! hooks run in. All mutations go through one write lock, and enable/disable
//! write through to the [`StateStore`] before the in-memory flag flips.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::hooks::{Hook, HookKind};
use crate::plugin::Plugin;
use crate::state::StateStore;

/// Full description of a registered plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Author or maintainer.
    pub author: String,
    /// File the plugin was loaded from.
    pub source: Option<PathBuf>,
    /// Whether the plugin is currently enabled.
    pub enabled: bool,
    /// Hook names per declared kind, in declaration order.
    pub hooks: BTreeMap<HookKind, Vec<String>>,
    /// When the plugin was registered.
    pub loaded_at: DateTime<Utc>,
}

/// One row of [`PluginRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Plugin name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Whether the plugin is enabled.
    pub enabled: bool,
}

/// A hook together with the plugin that contributed it.
#[derive(Debug, Clone)]
pub struct RegisteredHook {
    /// Owning plugin.
    pub plugin: String,
    /// Position among the plugin's hooks of the same kind.
    pub position: usize,
    /// The hook.
    pub hook: Hook,
}

#[derive(Debug)]
struct RegistryEntry {
    plugin: Arc<Plugin>,
    enabled: bool,
    loaded_at: DateTime<Utc>,
}

impl RegistryEntry {
    fn info(&self) -> PluginInfo {
        let plugin = &self.plugin;
        let hooks = plugin
            .hook_kinds()
            .into_iter()
            .map(|kind| {
                let names = plugin
                    .hooks(kind)
                    .iter()
                    .map(|h| h.name().to_string())
                    .collect();
                (kind, names)
            })
            .collect();

        PluginInfo {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
            author: plugin.author().to_string(),
            source: plugin.source().map(PathBuf::from),
            enabled: self.enabled,
            hooks,
            loaded_at: self.loaded_at,
        }
    }
}

/// Registry of all loaded plugins.
#[derive(Debug)]
pub struct PluginRegistry {
    /// Plugin name → entry, in registration order.
    plugins: RwLock<IndexMap<String, RegistryEntry>>,
    /// Durable enabled state.
    store: Arc<dyn StateStore>,
}

impl PluginRegistry {
    /// Creates an empty registry backed by the given store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            plugins: RwLock::new(IndexMap::new()),
            store,
        }
    }

    /// Registers a plugin.
    ///
    /// The plugin starts enabled if the store already records it as enabled,
    /// or if `auto_enable` is set (which is then persisted). Otherwise it
    /// starts disabled. On error the registry is left unchanged.
    pub async fn load(&self, plugin: Plugin, auto_enable: bool) -> PluginResult<PluginInfo> {
        let name = plugin.name().to_string();
        let mut plugins = self.plugins.write().await;

        if plugins.contains_key(&name) {
            return Err(PluginError::DuplicateName { name });
        }

        let stored = self.store.is_enabled(&name).await?;
        if auto_enable && !stored {
            self.store.set_enabled(&name, true).await?;
        }

        let entry = RegistryEntry {
            plugin: Arc::new(plugin),
            enabled: auto_enable || stored,
            loaded_at: Utc::now(),
        };
        let info = entry.info();

        info!(
            plugin = %name,
            version = %info.version,
            enabled = info.enabled,
            hooks = entry.plugin.hook_count(),
            "Plugin registered"
        );

        plugins.insert(name, entry);
        Ok(info)
    }

    /// Removes a plugin. Its persisted enabled state is kept for next time.
    pub async fn unload(&self, name: &str) -> PluginResult<Arc<Plugin>> {
        let mut plugins = self.plugins.write().await;
        let entry = plugins
            .shift_remove(name)
            .ok_or_else(|| PluginError::not_found(name))?;

        info!(plugin = %name, "Plugin unloaded");
        Ok(entry.plugin)
    }

    /// Lists `(name, version, enabled)` for every plugin in registration order.
    ///
    /// The result is a snapshot; iterate it as often as needed.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .map(|entry| PluginSummary {
                name: entry.plugin.name().to_string(),
                version: entry.plugin.version().to_string(),
                enabled: entry.enabled,
            })
            .collect()
    }

    /// Enables a plugin. Enabling an enabled plugin is a no-op.
    pub async fn enable(&self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, true).await
    }

    /// Disables a plugin. Disabling a disabled plugin is a no-op.
    pub async fn disable(&self, name: &str) -> PluginResult<()> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<()> {
        let mut plugins = self.plugins.write().await;
        let entry = plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::not_found(name))?;

        // another process may have changed the store since load; always write through
        self.store.set_enabled(name, enabled).await?;

        if entry.enabled == enabled {
            debug!(plugin = %name, enabled, "Plugin state unchanged");
        } else {
            entry.enabled = enabled;
            info!(plugin = %name, enabled, "Plugin state changed");
        }
        Ok(())
    }

    /// Full metadata for one plugin.
    pub async fn info(&self, name: &str) -> PluginResult<PluginInfo> {
        let plugins = self.plugins.read().await;
        plugins
            .get(name)
            .map(RegistryEntry::info)
            .ok_or_else(|| PluginError::not_found(name))
    }

    /// Hooks of one kind from every enabled plugin: registration order
    /// across plugins, declaration order within a plugin.
    pub async fn hooks_of_kind(&self, kind: HookKind) -> Vec<RegisteredHook> {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .filter(|entry| entry.enabled)
            .flat_map(|entry| {
                entry
                    .plugin
                    .hooks(kind)
                    .iter()
                    .enumerate()
                    .map(|(position, hook)| RegisteredHook {
                        plugin: entry.plugin.name().to_string(),
                        position,
                        hook: hook.clone(),
                    })
            })
            .collect()
    }

    /// Gets a plugin by name.
    pub async fn get(&self, name: &str) -> Option<Arc<Plugin>> {
        let plugins = self.plugins.read().await;
        plugins.get(name).map(|entry| entry.plugin.clone())
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// Checks whether a plugin is registered and enabled.
    pub async fn is_enabled(&self, name: &str) -> bool {
        let plugins = self.plugins.read().await;
        plugins.get(name).map(|entry| entry.enabled).unwrap_or(false)
    }

    /// Returns plugin count.
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// The backing state store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Flushes the state store. Call when the host shuts down.
    pub async fn shutdown(&self) -> PluginResult<()> {
        let _plugins = self.plugins.write().await;
        self.store.flush().await?;
        info!("Plugin registry shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FnPostConvert;
    use crate::state::MemoryStateStore;

    fn plugin(name: &str, hooks: &[&str]) -> Plugin {
        hooks
            .iter()
            .fold(Plugin::builder(name, "1.0.0"), |builder, hook| {
                builder.post_convert(FnPostConvert::new(hook, |html, _| Ok(html)))
            })
            .build()
            .expect("valid plugin")
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::new(Arc::new(MemoryStateStore::new()))
    }

    #[tokio::test]
    async fn test_load_defaults_to_disabled() {
        let registry = registry();
        let info = registry.load(plugin("a", &["h"]), false).await.expect("load");
        assert!(!info.enabled);
        assert!(registry.hooks_of_kind(HookKind::PostConvert).await.is_empty());

        let info = registry.load(plugin("b", &["h"]), true).await.expect("load");
        assert!(info.enabled);
        assert!(registry.store().is_enabled("b").await.expect("store"));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let registry = registry();
        registry.load(plugin("a", &["h1"]), true).await.expect("load");

        let err = registry
            .load(plugin("a", &["h2", "h3"]), false)
            .await
            .expect_err("duplicate");
        assert!(matches!(err, PluginError::DuplicateName { ref name } if name == "a"));

        let info = registry.info("a").await.expect("info");
        assert_eq!(info.hooks[&HookKind::PostConvert], vec!["h1".to_string()]);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_list_keeps_registration_order() {
        let registry = registry();
        for name in ["zeta", "alpha", "mid"] {
            registry.load(plugin(name, &[]), false).await.expect("load");
        }
        registry.enable("alpha").await.expect("enable");

        let names: Vec<_> = registry.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            registry.list().await[1],
            PluginSummary {
                name: "alpha".into(),
                version: "1.0.0".into(),
                enabled: true,
            }
        );
    }

    #[tokio::test]
    async fn test_hooks_of_kind_order() {
        let registry = registry();
        registry.load(plugin("b", &["b1", "b2"]), true).await.expect("load");
        registry.load(plugin("skip", &["s1"]), false).await.expect("load");
        registry.load(plugin("a", &["a1"]), true).await.expect("load");

        let order: Vec<_> = registry
            .hooks_of_kind(HookKind::PostConvert)
            .await
            .into_iter()
            .map(|h| format!("{}:{}:{}", h.plugin, h.hook.name(), h.position))
            .collect();
        assert_eq!(order, vec!["b:b1:0", "b:b2:1", "a:a1:0"]);

        let again: Vec<_> = registry
            .hooks_of_kind(HookKind::PostConvert)
            .await
            .into_iter()
            .map(|h| format!("{}:{}:{}", h.plugin, h.hook.name(), h.position))
            .collect();
        assert_eq!(order, again);
        assert!(registry.hooks_of_kind(HookKind::PreConvert).await.is_empty());
    }

    #[tokio::test]
    async fn test_enable_disable_idempotent() {
        let registry = registry();
        registry.load(plugin("a", &["h"]), false).await.expect("load");

        registry.enable("a").await.expect("enable");
        registry.enable("a").await.expect("enable again");
        assert!(registry.is_enabled("a").await);
        assert_eq!(registry.hooks_of_kind(HookKind::PostConvert).await.len(), 1);

        registry.disable("a").await.expect("disable");
        registry.disable("a").await.expect("disable again");
        assert!(!registry.is_enabled("a").await);
        assert!(!registry.store().is_enabled("a").await.expect("store"));
    }

    #[tokio::test]
    async fn test_enable_writes_through_when_store_moved_on() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let first = PluginRegistry::new(store.clone());
        let second = PluginRegistry::new(store.clone());
        first.load(plugin("a", &["h"]), false).await.expect("load");
        second.load(plugin("a", &["h"]), false).await.expect("load");

        second.enable("a").await.expect("enable");
        assert!(store.is_enabled("a").await.expect("store"));

        // `first` still believes "a" is disabled
        first.disable("a").await.expect("disable");
        assert!(!store.is_enabled("a").await.expect("store"));
    }

    #[tokio::test]
    async fn test_unknown_name_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.enable("ghost").await,
            Err(PluginError::NotFound { .. })
        ));
        assert!(matches!(
            registry.disable("ghost").await,
            Err(PluginError::NotFound { .. })
        ));
        assert!(matches!(
            registry.info("ghost").await,
            Err(PluginError::NotFound { .. })
        ));
        assert!(matches!(
            registry.unload("ghost").await,
            Err(PluginError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stored_state_applied_on_load() {
        let store = Arc::new(MemoryStateStore::new());
        store.set_enabled("a", true).await.expect("seed");

        let registry = PluginRegistry::new(store);
        let info = registry.load(plugin("a", &["h"]), false).await.expect("load");
        assert!(info.enabled);
    }

    #[tokio::test]
    async fn test_unload_then_reload() {
        let registry = registry();
        registry.load(plugin("a", &["h"]), true).await.expect("load");
        registry.load(plugin("b", &[]), false).await.expect("load");

        let removed = registry.unload("a").await.expect("unload");
        assert_eq!(removed.name(), "a");
        assert!(!registry.contains("a").await);

        // enabled state survives the unload
        let info = registry.load(plugin("a", &["h"]), false).await.expect("reload");
        assert!(info.enabled);
        let names: Vec<_> = registry.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
