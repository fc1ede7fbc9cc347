//! The plugin unit: a name, a version, and the hooks it contributes per stage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::hooks::{Hook, HookKind, MetadataResolverHook, PostConvertHook, PreConvertHook};

/// A loaded plugin.
///
/// Enabled/disabled state is not part of the plugin itself; the registry
/// tracks it so toggling never touches the plugin's hooks.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    version: String,
    description: String,
    author: String,
    source: Option<PathBuf>,
    hooks: BTreeMap<HookKind, Vec<Hook>>,
}

impl Plugin {
    /// Starts building a plugin.
    pub fn builder(name: &str, version: &str) -> PluginBuilder {
        PluginBuilder {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
            source: None,
            hooks: BTreeMap::new(),
        }
    }

    /// Unique plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string. Informational only.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Short description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Author or maintainer.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// File the plugin was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Hooks of one kind, in declaration order.
    pub fn hooks(&self, kind: HookKind) -> &[Hook] {
        self.hooks.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Kinds this plugin contributes hooks to, in lifecycle order.
    pub fn hook_kinds(&self) -> Vec<HookKind> {
        self.hooks
            .iter()
            .filter(|(_, hooks)| !hooks.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Total number of hooks across all kinds.
    pub fn hook_count(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }
}

/// Builder for [`Plugin`].
#[derive(Debug)]
pub struct PluginBuilder {
    name: String,
    version: String,
    description: String,
    author: String,
    source: Option<PathBuf>,
    hooks: BTreeMap<HookKind, Vec<Hook>>,
}

impl PluginBuilder {
    /// Sets the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Sets the author.
    pub fn author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    /// Records the source file.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Appends a hook to the list of its kind.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.entry(hook.kind()).or_default().push(hook);
        self
    }

    /// Appends a pre-convert hook.
    pub fn pre_convert(self, hook: impl PreConvertHook + 'static) -> Self {
        self.hook(Hook::pre_convert(hook))
    }

    /// Appends a post-convert hook.
    pub fn post_convert(self, hook: impl PostConvertHook + 'static) -> Self {
        self.hook(Hook::post_convert(hook))
    }

    /// Appends a metadata resolver.
    pub fn metadata_resolver(self, hook: impl MetadataResolverHook + 'static) -> Self {
        self.hook(Hook::metadata_resolver(hook))
    }

    /// Validates and builds the plugin.
    ///
    /// Names must be non-empty and use only ASCII letters, digits, `-`, `_`
    /// or `.`, since they double as state-store keys.
    pub fn build(self) -> Result<Plugin, String> {
        if self.name.is_empty() {
            return Err("plugin name must not be empty".to_string());
        }
        if let Some(bad) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(format!(
                "plugin name '{}' contains invalid character '{}'",
                self.name, bad
            ));
        }
        if self.version.trim().is_empty() {
            return Err(format!("plugin '{}' has an empty version", self.name));
        }

        Ok(Plugin {
            name: self.name,
            version: self.version,
            description: self.description,
            author: self.author,
            source: self.source,
            hooks: self.hooks,
        })
    }
}
