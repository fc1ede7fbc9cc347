//! Plugin loader: turns plugin files into [`Plugin`]s and scans directories.
//!
//! Explicit loads are strict: a file must hold exactly one definition.
//! Discovery is lenient: an ambiguous file contributes its first definition,
//! and any file that fails is reported without stopping the scan.

pub mod manifest;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{LoadCause, PluginError, PluginResult};
use crate::plugin::Plugin;

use self::manifest::{ManifestFile, PluginManifest};

/// File extension recognised as a plugin file.
pub const PLUGIN_FILE_EXTENSION: &str = "toml";

/// A file that discovery could not load.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// The file.
    pub path: PathBuf,
    /// Why it failed.
    pub error: PluginError,
}

/// Outcome of a discovery scan.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Plugins loaded, in scan order.
    pub plugins: Vec<Plugin>,
    /// Files that failed, in scan order.
    pub failures: Vec<DiscoveryFailure>,
}

/// Loads plugin files.
#[derive(Debug, Clone, Default)]
pub struct PluginLoader;

impl PluginLoader {
    /// Creates a loader.
    pub fn new() -> Self {
        Self
    }

    /// Loads exactly one plugin from a file.
    ///
    /// Fails if the file cannot be read or parsed, declares no plugin, or
    /// declares more than one.
    pub async fn load_from_path(&self, path: &Path) -> PluginResult<Plugin> {
        let definitions = self.read_definitions(path).await?;

        if definitions.len() > 1 {
            let names = definitions
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PluginError::load(
                path,
                LoadCause::Ambiguous {
                    count: definitions.len(),
                    names,
                },
            ));
        }

        let plugin = Self::build(path, definitions)?;
        info!(
            path = %path.display(),
            plugin = %plugin.name(),
            version = %plugin.version(),
            "Plugin file loaded"
        );
        Ok(plugin)
    }

    /// Scans directories (non-recursively) for plugin files.
    ///
    /// Missing directories are skipped. Files are visited in name order
    /// within each directory, directories in the order given.
    pub async fn discover(&self, directories: &[PathBuf]) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for dir in directories {
            let candidates = match Self::candidates(dir).await {
                Ok(candidates) => candidates,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(dir = %dir.display(), "Plugin directory does not exist, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Cannot scan plugin directory");
                    report.failures.push(DiscoveryFailure {
                        path: dir.clone(),
                        error: PluginError::load(dir, LoadCause::Io(e)),
                    });
                    continue;
                }
            };

            for path in candidates {
                match self.load_first(&path).await {
                    Ok(plugin) => {
                        debug!(path = %path.display(), plugin = %plugin.name(), "Discovered plugin");
                        report.plugins.push(plugin);
                    }
                    Err(error) => {
                        warn!(path = %path.display(), error = %error, "Skipping plugin file");
                        report.failures.push(DiscoveryFailure { path, error });
                    }
                }
            }
        }

        info!(
            loaded = report.plugins.len(),
            failed = report.failures.len(),
            "Plugin discovery finished"
        );
        report
    }

    async fn load_first(&self, path: &Path) -> PluginResult<Plugin> {
        let mut definitions = self.read_definitions(path).await?;
        if definitions.len() > 1 {
            warn!(
                path = %path.display(),
                count = definitions.len(),
                "Several plugin definitions found, using the first"
            );
            definitions.truncate(1);
        }
        Self::build(path, definitions)
    }

    async fn read_definitions(&self, path: &Path) -> PluginResult<Vec<PluginManifest>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PluginError::load(path, LoadCause::Io(e)))?;
        let file = ManifestFile::parse(&text).map_err(|cause| PluginError::load(path, cause))?;
        Ok(file.plugin)
    }

    fn build(path: &Path, definitions: Vec<PluginManifest>) -> PluginResult<Plugin> {
        let definition = definitions
            .into_iter()
            .next()
            .ok_or_else(|| PluginError::load(path, LoadCause::NoDefinition))?;
        definition
            .into_plugin(path)
            .map_err(|cause| PluginError::load(path, cause))
    }

    async fn candidates(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(PLUGIN_FILE_EXTENSION));
            if is_file && matches_ext {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}
