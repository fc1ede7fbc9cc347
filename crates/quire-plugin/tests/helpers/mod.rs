//! Shared helpers for quire-plugin integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_core::config::BuildOptions;
use quire_plugin::state::JsonFileStateStore;
use quire_plugin::{ConversionContext, PluginManager};

/// A scratch host: a plugin directory and a state file inside a tempdir.
pub struct TestHost {
    /// Keeps the tempdir alive.
    pub root: tempfile::TempDir,
    /// Directory scanned for plugin files.
    pub plugins_dir: PathBuf,
    /// State file location.
    pub state_file: PathBuf,
}

impl TestHost {
    /// Create an empty host.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create tempdir");
        let plugins_dir = root.path().join("plugins");
        std::fs::create_dir(&plugins_dir).expect("Failed to create plugin dir");
        let state_file = root.path().join("state.json");
        Self {
            root,
            plugins_dir,
            state_file,
        }
    }

    /// Write a plugin file into the plugin directory.
    pub fn write_plugin(&self, file_name: &str, contents: &str) -> PathBuf {
        let path = self.plugins_dir.join(file_name);
        std::fs::write(&path, contents).expect("Failed to write plugin file");
        path
    }

    /// Start a manager over the JSON state file. Each call simulates a restart.
    pub async fn start(&self) -> PluginManager {
        let store = JsonFileStateStore::open(&self.state_file)
            .await
            .expect("Failed to open state store");
        PluginManager::with_directories(Arc::new(store), vec![self.plugins_dir.clone()])
    }
}

/// Fresh context for a run over `book.docx`.
pub fn context() -> ConversionContext {
    ConversionContext::new(
        Path::new("book.docx"),
        Path::new("book.epub"),
        Arc::new(BuildOptions::default()),
    )
}

/// Plugin file with one literal post-convert replacement.
pub fn replace_plugin(name: &str, from: &str, to: &str) -> String {
    format!(
        r#"[[plugin]]
name = "{name}"
version = "1.0.0"

[[plugin.post_convert]]
op = "replace"
from = "{from}"
to = "{to}"
"#
    )
}

/// Plugin file with one metadata resolver that sets `key` to `value`.
pub fn set_metadata_plugin(name: &str, key: &str, value: &str) -> String {
    format!(
        r#"[[plugin]]
name = "{name}"
version = "1.0.0"

[[plugin.metadata_resolver]]
op = "set"
key = "{key}"
value = "{value}"
"#
    )
}

/// Plugin file with one `set_default` resolver; `value` is a TOML literal.
pub fn set_default_plugin(name: &str, key: &str, value: &str) -> String {
    format!(
        r#"[[plugin]]
name = "{name}"
version = "1.0.0"

[[plugin.metadata_resolver]]
op = "set_default"
key = "{key}"
value = {value}
"#
    )
}
