//! Conversion context: the per-run record shared by every hook.
//!
//! Exactly one context exists per conversion run. It is deliberately not
//! `Clone`, and hooks only ever receive a `&mut` borrow scoped to their own
//! invocation, so nothing can hold on to it after the run ends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use quire_core::config::BuildOptions;

/// Book metadata as consumed by the EPUB packager.
pub type Metadata = serde_json::Map<String, Value>;

/// Maximum number of characters kept in [`ConversionContext::content_preview`].
pub const CONTENT_PREVIEW_CHARS: usize = 2000;

/// A non-text resource (image, font, stylesheet) found in the manuscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Name inside the package, e.g. `images/figure1.png`.
    pub name: String,
    /// MIME type.
    pub media_type: String,
    /// Where the extracted bytes live on disk.
    pub path: PathBuf,
}

/// What the parser learned about the manuscript, recorded into the context
/// before post-convert hooks run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseSummary {
    /// Plain-text rendering of the manuscript (truncated on record).
    pub text: String,
    /// Number of chapters detected.
    pub chapter_count: usize,
    /// Embedded resources.
    pub resources: Vec<ResourceRef>,
}

/// Cross-plugin side channel.
///
/// Entries are grouped by namespace, conventionally the name of the plugin
/// that wrote them. The grouping is advisory: any hook may read or write any
/// namespace, which is how cooperating plugins pass data along.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    namespaces: BTreeMap<String, serde_json::Map<String, Value>>,
}

impl PluginData {
    /// Gets a value from a namespace.
    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.namespaces.get(namespace).and_then(|ns| ns.get(key))
    }

    /// Gets a string value from a namespace.
    pub fn get_str(&self, namespace: &str, key: &str) -> Option<&str> {
        self.get(namespace, key).and_then(|v| v.as_str())
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, namespace: &str, key: &str, value: Value) -> Option<Value> {
        self.namespace_mut(namespace).insert(key.to_string(), value)
    }

    /// Removes a value.
    pub fn remove(&mut self, namespace: &str, key: &str) -> Option<Value> {
        let ns = self.namespaces.get_mut(namespace)?;
        let removed = ns.remove(key);
        if ns.is_empty() {
            self.namespaces.remove(namespace);
        }
        removed
    }

    /// Returns a whole namespace.
    pub fn namespace(&self, namespace: &str) -> Option<&serde_json::Map<String, Value>> {
        self.namespaces.get(namespace)
    }

    /// Returns a whole namespace for writing, creating it if needed.
    pub fn namespace_mut(&mut self, namespace: &str) -> &mut serde_json::Map<String, Value> {
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    /// Names of all namespaces that hold data.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Returns whether no data has been written.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Copy of the hook-mutable parts of a context, taken before each hook so a
/// failing hook leaves no trace.
#[derive(Debug, Clone)]
pub(crate) struct ContextSnapshot {
    metadata: Metadata,
    plugin_data: PluginData,
}

/// The per-run context.
#[derive(Debug)]
pub struct ConversionContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    input_path: PathBuf,
    output_path: PathBuf,
    build_options: Arc<BuildOptions>,
    content_preview: Option<String>,
    chapter_count: Option<usize>,
    resources: Vec<ResourceRef>,
    /// Authoritative metadata read back by the packager.
    pub metadata: Metadata,
    /// Free-form inter-plugin data.
    pub plugin_data: PluginData,
}

impl ConversionContext {
    /// Creates the context for a new run.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        build_options: Arc<BuildOptions>,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            input_path: input_path.into(),
            output_path: output_path.into(),
            build_options,
            content_preview: None,
            chapter_count: None,
            resources: Vec::new(),
            metadata: Metadata::new(),
            plugin_data: PluginData::default(),
        }
    }

    /// Seeds the initial metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identifier of this run, used in log fields.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The manuscript the run was started with.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Where the finished package is written.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Build configuration snapshot.
    pub fn build_options(&self) -> &BuildOptions {
        &self.build_options
    }

    /// Beginning of the manuscript text. `None` until the manuscript is parsed.
    pub fn content_preview(&self) -> Option<&str> {
        self.content_preview.as_deref()
    }

    /// Chapter count. `None` until the manuscript is parsed.
    pub fn chapter_count(&self) -> Option<usize> {
        self.chapter_count
    }

    /// Embedded resources. Empty until the manuscript is parsed.
    pub fn resources(&self) -> &[ResourceRef] {
        &self.resources
    }

    /// Whether parse results have been recorded.
    pub fn is_parsed(&self) -> bool {
        self.chapter_count.is_some()
    }

    /// Records what the parser found. Called by the driver between the
    /// pre-convert and post-convert stages.
    pub fn record_parse(&mut self, summary: ParseSummary) {
        let preview: String = summary.text.chars().take(CONTENT_PREVIEW_CHARS).collect();
        self.content_preview = Some(preview);
        self.chapter_count = Some(summary.chapter_count);
        self.resources = summary.resources;
    }

    pub(crate) fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            metadata: self.metadata.clone(),
            plugin_data: self.plugin_data.clone(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: ContextSnapshot) {
        self.metadata = snapshot.metadata;
        self.plugin_data = snapshot.plugin_data;
    }
}
