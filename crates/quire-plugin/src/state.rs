//! Persistent enabled/disabled state, keyed by plugin name.
//!
//! A name with no entry counts as disabled, so a newly discovered plugin
//! never activates on its own.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};

/// Backing store for plugin enabled state.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Names of all plugins recorded as enabled.
    async fn get_enabled_set(&self) -> PluginResult<BTreeSet<String>>;

    /// Records a plugin as enabled or disabled. Must be durable on return.
    async fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<()>;

    /// Whether a plugin is recorded as enabled.
    async fn is_enabled(&self, name: &str) -> PluginResult<bool> {
        Ok(self.get_enabled_set().await?.contains(name))
    }

    /// Writes out anything not yet persisted. Stores that persist in
    /// `set_enabled` have nothing to do here.
    async fn flush(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// One persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Whether the plugin is enabled.
    pub enabled: bool,
    /// When the entry last changed.
    pub updated_at: DateTime<Utc>,
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    plugins: BTreeMap<String, StateEntry>,
}

/// State store backed by a JSON file.
///
/// The file is the only source of truth: reads load it fresh and every change
/// is a read-modify-write under an exclusive lock on a `.lock` sibling, so
/// several processes sharing one file never drop each other's changes. The
/// new content lands through a uniquely named temporary file and a rename,
/// so readers never see a partial write.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    /// Opens the store, checking that an existing file is readable.
    pub async fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let store = Self { path: path.into() };
        let state = store.load().await?;

        debug!(
            path = %store.path.display(),
            entries = state.plugins.len(),
            "Plugin state store opened"
        );
        Ok(store)
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full entry for a plugin, if recorded.
    pub async fn entry(&self, name: &str) -> PluginResult<Option<StateEntry>> {
        Ok(self.load().await?.plugins.remove(name))
    }

    async fn load(&self) -> PluginResult<StateFile> {
        let path = self.path.clone();
        blocking(move || read_state(&path)).await
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_enabled_set(&self) -> PluginResult<BTreeSet<String>> {
        let state = self.load().await?;
        Ok(state
            .plugins
            .into_iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, _)| name)
            .collect())
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<()> {
        let path = self.path.clone();
        let key = name.to_string();
        let changed = blocking(move || update_state(&path, &key, enabled)).await?;

        if changed {
            info!(plugin = %name, enabled, path = %self.path.display(), "Plugin state persisted");
        } else {
            debug!(plugin = %name, enabled, "Plugin state already recorded");
        }
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> PluginResult<T>
where
    F: FnOnce() -> PluginResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PluginError::State(format!("state store task failed: {e}")))?
}

fn read_state(path: &Path) -> PluginResult<StateFile> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            PluginError::State(format!("corrupt state file '{}': {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
        Err(e) => Err(io_error("read", path, e)),
    }
}

/// Re-reads, changes and rewrites the file while holding the lock.
/// Returns whether anything changed.
fn update_state(path: &Path, name: &str, enabled: bool) -> PluginResult<bool> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| io_error("create", &dir, e))?;

    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);
    let lock = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| io_error("open", &lock_path, e))?;
    lock.lock_exclusive()
        .map_err(|e| io_error("lock", &lock_path, e))?;

    let mut state = read_state(path)?;
    if state.plugins.get(name).map(|e| e.enabled) == Some(enabled) {
        return Ok(false);
    }
    state.plugins.insert(
        name.to_string(),
        StateEntry {
            enabled,
            updated_at: Utc::now(),
        },
    );

    let bytes = serde_json::to_vec_pretty(&state)
        .map_err(|e| PluginError::State(format!("cannot serialize state: {e}")))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_error("create temp in", &dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_error("write", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| io_error("replace", path, e.error))?;

    // released on drop as well; unlocking explicitly surfaces errors
    FileExt::unlock(&lock).map_err(|e| io_error("unlock", &lock_path, e))?;
    Ok(true)
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> PluginError {
    PluginError::State(format!("cannot {action} '{}': {e}", path.display()))
}

/// Volatile state store for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    enabled: Mutex<BTreeMap<String, bool>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_enabled_set(&self) -> PluginResult<BTreeSet<String>> {
        let enabled = self.enabled.lock().await;
        Ok(enabled
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> PluginResult<()> {
        self.enabled.lock().await.insert(name.to_string(), enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStateStore::open(dir.path().join("state.json"))
            .await
            .expect("open");
        assert!(store.get_enabled_set().await.expect("set").is_empty());
        assert!(!store.is_enabled("anything").await.expect("lookup"));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStateStore::open(&path).await.expect("open");
        store.set_enabled("toc", true).await.expect("enable");
        store.set_enabled("cover", true).await.expect("enable");
        store.set_enabled("cover", false).await.expect("disable");
        drop(store);

        let reopened = JsonFileStateStore::open(&path).await.expect("reopen");
        let enabled = reopened.get_enabled_set().await.expect("set");
        assert!(enabled.contains("toc"));
        assert!(!enabled.contains("cover"));
        let cover = reopened.entry("cover").await.expect("entry");
        assert_eq!(cover.map(|e| e.enabled), Some(false));
    }

    #[tokio::test]
    async fn test_two_stores_on_one_file_keep_both_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let first = JsonFileStateStore::open(&path).await.expect("open");
        let second = JsonFileStateStore::open(&path).await.expect("open");

        second.set_enabled("toc", true).await.expect("enable");
        first.set_enabled("cover", true).await.expect("enable");
        assert_eq!(
            first.get_enabled_set().await.expect("set"),
            BTreeSet::from(["cover".to_string(), "toc".to_string()])
        );

        first.flush().await.expect("flush");
        second.set_enabled("cover", false).await.expect("disable");

        let reopened = JsonFileStateStore::open(&path).await.expect("reopen");
        assert_eq!(
            reopened.get_enabled_set().await.expect("set"),
            BTreeSet::from(["toc".to_string()])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let mut tasks = Vec::new();
        for i in 0..16 {
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                let store = JsonFileStateStore::open(path).await.expect("open");
                store
                    .set_enabled(&format!("plugin-{i}"), true)
                    .await
                    .expect("enable");
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        let store = JsonFileStateStore::open(&path).await.expect("open");
        assert_eq!(store.get_enabled_set().await.expect("set").len(), 16);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "state.json" && name != "state.json.lock")
            .collect();
        assert!(leftovers.is_empty(), "stray files: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").expect("write");

        let err = JsonFileStateStore::open(&path).await.expect_err("corrupt");
        assert!(matches!(err, PluginError::State(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::new();
        store.set_enabled("a", true).await.expect("set");
        store.set_enabled("b", false).await.expect("set");
        assert_eq!(
            store.get_enabled_set().await.expect("set"),
            BTreeSet::from(["a".to_string()])
        );
    }
}
