//! Plugin system configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the pipeline settles two metadata resolvers writing the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMergePolicy {
    /// The later resolver in pipeline order overwrites silently.
    #[default]
    LastWriterWins,
    /// The first resolver to set a key keeps it; later writes are reverted.
    FirstWriterWins,
    /// The later resolver overwrites, and the conflict is reported.
    WarnOnConflict,
}

impl std::fmt::Display for MetadataMergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastWriterWins => write!(f, "last_writer_wins"),
            Self::FirstWriterWins => write!(f, "first_writer_wins"),
            Self::WarnOnConflict => write!(f, "warn_on_conflict"),
        }
    }
}

/// Plugin system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Extra directories scanned during discovery, in order.
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    /// Whether the user config directory and `./plugins` are scanned too.
    #[serde(default = "default_true")]
    pub include_default_directories: bool,
    /// Where enabled/disabled state is persisted.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Whether discovery runs automatically when the manager starts.
    #[serde(default = "default_true")]
    pub auto_discover: bool,
    /// Conflict policy for metadata resolvers.
    #[serde(default)]
    pub metadata_merge_policy: MetadataMergePolicy,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            include_default_directories: true,
            state_file: None,
            auto_discover: true,
            metadata_merge_policy: MetadataMergePolicy::default(),
        }
    }
}

impl PluginsConfig {
    /// Directories scanned during discovery: configured ones first, then the
    /// well-known defaults. Duplicates are dropped.
    pub fn discovery_directories(&self) -> Vec<PathBuf> {
        let mut dirs = self.directories.clone();

        if self.include_default_directories {
            if let Some(config_dir) = dirs::config_dir() {
                dirs.push(config_dir.join("quire").join("plugins"));
            }
            dirs.push(PathBuf::from("plugins"));
        }

        let mut seen = std::collections::HashSet::new();
        dirs.retain(|d| seen.insert(d.clone()));
        dirs
    }

    /// Resolve the state file location.
    pub fn effective_state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("quire")
                .join("plugins-state.json")
        })
    }
}

fn default_true() -> bool {
    true
}
