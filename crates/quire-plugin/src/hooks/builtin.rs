//! Declarative hook operations that manifest-based plugins are built from.
//!
//! Every operation is validated (regexes compiled, names bound) when the
//! manifest is loaded, so nothing is interpreted by convention at run time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::definitions::{HookError, MetadataResolverHook, PostConvertHook, PreConvertHook};
use crate::context::{ConversionContext, Metadata};

// ── Pre-convert ──

/// Copies the manuscript into a directory and hands the copy downstream.
#[derive(Debug, Clone)]
pub struct CopyTo {
    /// Target directory, created on demand.
    pub directory: PathBuf,
}

#[async_trait]
impl PreConvertHook for CopyTo {
    fn name(&self) -> &str {
        "copy_to"
    }

    async fn pre_convert(
        &self,
        document: PathBuf,
        _ctx: &mut ConversionContext,
    ) -> Result<PathBuf, HookError> {
        let file_name = document
            .file_name()
            .ok_or_else(|| HookError::new(format!("'{}' has no file name", document.display())))?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let target = self.directory.join(file_name);
        if same_file(&document, &target).await? {
            return Ok(document);
        }
        tokio::fs::copy(&document, &target).await?;
        Ok(target)
    }
}

/// Whether two paths name the same existing file, however they are spelled.
async fn same_file(a: &Path, b: &Path) -> Result<bool, HookError> {
    let a = tokio::fs::canonicalize(a).await?;
    match tokio::fs::canonicalize(b).await {
        Ok(b) => Ok(a == b),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Fails unless the manuscript has one of the listed extensions.
#[derive(Debug, Clone)]
pub struct RequireExtension {
    /// Accepted extensions, lowercase, without the dot.
    pub extensions: Vec<String>,
}

#[async_trait]
impl PreConvertHook for RequireExtension {
    fn name(&self) -> &str {
        "require_extension"
    }

    async fn pre_convert(
        &self,
        document: PathBuf,
        _ctx: &mut ConversionContext,
    ) -> Result<PathBuf, HookError> {
        let ext = document
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if self.extensions.iter().any(|allowed| *allowed == ext) {
            Ok(document)
        } else {
            Err(HookError::new(format!(
                "'{}' does not have an accepted extension ({})",
                document.display(),
                self.extensions.join(", ")
            )))
        }
    }
}

/// Writes a value into the plugin's own `plugin_data` namespace.
#[derive(Debug, Clone)]
pub struct SetPluginData {
    /// Namespace, the owning plugin's name.
    pub namespace: String,
    /// Key inside the namespace.
    pub key: String,
    /// Value to store.
    pub value: Value,
}

#[async_trait]
impl PreConvertHook for SetPluginData {
    fn name(&self) -> &str {
        "set_plugin_data"
    }

    async fn pre_convert(
        &self,
        document: PathBuf,
        ctx: &mut ConversionContext,
    ) -> Result<PathBuf, HookError> {
        ctx.plugin_data
            .insert(&self.namespace, &self.key, self.value.clone());
        Ok(document)
    }
}

// ── Post-convert ──

/// Literal text replacement.
#[derive(Debug, Clone)]
pub struct Replace {
    /// Text to find.
    pub from: String,
    /// Replacement text.
    pub to: String,
}

#[async_trait]
impl PostConvertHook for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    async fn post_convert(
        &self,
        html: String,
        _ctx: &mut ConversionContext,
    ) -> Result<String, HookError> {
        Ok(html.replace(&self.from, &self.to))
    }
}

/// Regex replacement; `$1`-style group references are expanded.
#[derive(Debug, Clone)]
pub struct RegexReplace {
    /// Compiled pattern.
    pub pattern: Regex,
    /// Replacement template.
    pub replacement: String,
}

#[async_trait]
impl PostConvertHook for RegexReplace {
    fn name(&self) -> &str {
        "regex_replace"
    }

    async fn post_convert(
        &self,
        html: String,
        _ctx: &mut ConversionContext,
    ) -> Result<String, HookError> {
        Ok(self
            .pattern
            .replace_all(&html, self.replacement.as_str())
            .into_owned())
    }
}

/// Inserts text before the HTML.
#[derive(Debug, Clone)]
pub struct Prepend {
    /// Text to insert.
    pub text: String,
}

#[async_trait]
impl PostConvertHook for Prepend {
    fn name(&self) -> &str {
        "prepend"
    }

    async fn post_convert(
        &self,
        html: String,
        _ctx: &mut ConversionContext,
    ) -> Result<String, HookError> {
        Ok(format!("{}{}", self.text, html))
    }
}

/// Inserts text after the HTML.
#[derive(Debug, Clone)]
pub struct Append {
    /// Text to insert.
    pub text: String,
}

#[async_trait]
impl PostConvertHook for Append {
    fn name(&self) -> &str {
        "append"
    }

    async fn post_convert(
        &self,
        mut html: String,
        _ctx: &mut ConversionContext,
    ) -> Result<String, HookError> {
        html.push_str(&self.text);
        Ok(html)
    }
}

// ── Metadata ──

/// Sets a key, overriding any existing value.
#[derive(Debug, Clone)]
pub struct SetMetadata {
    /// Metadata key.
    pub key: String,
    /// Value.
    pub value: Value,
}

#[async_trait]
impl MetadataResolverHook for SetMetadata {
    fn name(&self) -> &str {
        "set"
    }

    async fn resolve(
        &self,
        mut metadata: Metadata,
        _ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        metadata.insert(self.key.clone(), self.value.clone());
        Ok(metadata)
    }
}

/// Sets a key only if it is absent.
#[derive(Debug, Clone)]
pub struct SetDefault {
    /// Metadata key.
    pub key: String,
    /// Value used when the key is missing.
    pub value: Value,
}

#[async_trait]
impl MetadataResolverHook for SetDefault {
    fn name(&self) -> &str {
        "set_default"
    }

    async fn resolve(
        &self,
        mut metadata: Metadata,
        _ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        metadata
            .entry(self.key.clone())
            .or_insert_with(|| self.value.clone());
        Ok(metadata)
    }
}

/// Removes a key.
#[derive(Debug, Clone)]
pub struct RemoveMetadata {
    /// Metadata key.
    pub key: String,
}

#[async_trait]
impl MetadataResolverHook for RemoveMetadata {
    fn name(&self) -> &str {
        "remove"
    }

    async fn resolve(
        &self,
        mut metadata: Metadata,
        _ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        metadata.remove(&self.key);
        Ok(metadata)
    }
}

/// Copies a `plugin_data` entry into metadata when present.
#[derive(Debug, Clone)]
pub struct FromPluginData {
    /// Namespace to read from.
    pub namespace: String,
    /// Key inside the namespace.
    pub key: String,
    /// Metadata key to write.
    pub into: String,
}

#[async_trait]
impl MetadataResolverHook for FromPluginData {
    fn name(&self) -> &str {
        "from_plugin_data"
    }

    async fn resolve(
        &self,
        mut metadata: Metadata,
        ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        if let Some(value) = ctx.plugin_data.get(&self.namespace, &self.key) {
            metadata.insert(self.into.clone(), value.clone());
        }
        Ok(metadata)
    }
}

/// Records the parsed chapter count under a key.
#[derive(Debug, Clone)]
pub struct ChapterCount {
    /// Metadata key.
    pub key: String,
}

#[async_trait]
impl MetadataResolverHook for ChapterCount {
    fn name(&self) -> &str {
        "chapter_count"
    }

    async fn resolve(
        &self,
        mut metadata: Metadata,
        ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        let count = ctx
            .chapter_count()
            .ok_or_else(|| HookError::new("chapter count is not available before parsing"))?;
        metadata.insert(self.key.clone(), Value::from(count));
        Ok(metadata)
    }
}
