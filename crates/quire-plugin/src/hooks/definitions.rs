//! Hook kinds, the three hook contracts, and the artifacts they transform.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ConversionContext, Metadata};

/// The pipeline stages a hook can bind to, ordered by the conversion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Runs on the manuscript path before it is parsed.
    PreConvert,
    /// Runs on the generated HTML.
    PostConvert,
    /// Runs on the metadata map before packaging.
    MetadataResolver,
}

impl HookKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [HookKind; 3] = [Self::PreConvert, Self::PostConvert, Self::MetadataResolver];

    /// Returns the identifier used in plugin manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreConvert => "pre_convert",
            Self::PostConvert => "post_convert",
            Self::MetadataResolver => "metadata_resolver",
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HookKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown hook kind '{s}'"))
    }
}

/// Failure reported by a hook. The pipeline turns it into a warning.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    /// Creates a hook error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<std::io::Error> for HookError {
    fn from(err: std::io::Error) -> Self {
        Self(format!("I/O error: {err}"))
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Hook run before the manuscript is parsed.
///
/// Returning the same path means the document was edited in place (or left
/// alone); returning a new path hands a modified copy to the next hook.
#[async_trait]
pub trait PreConvertHook: Send + Sync + Debug {
    /// Name used in logs and warnings.
    fn name(&self) -> &str;

    /// Transforms the document path.
    async fn pre_convert(
        &self,
        document: PathBuf,
        ctx: &mut ConversionContext,
    ) -> Result<PathBuf, HookError>;
}

/// Hook run on the generated HTML.
#[async_trait]
pub trait PostConvertHook: Send + Sync + Debug {
    /// Name used in logs and warnings.
    fn name(&self) -> &str;

    /// Transforms the HTML.
    async fn post_convert(
        &self,
        html: String,
        ctx: &mut ConversionContext,
    ) -> Result<String, HookError>;
}

/// Hook that adds, overrides or removes metadata entries.
#[async_trait]
pub trait MetadataResolverHook: Send + Sync + Debug {
    /// Name used in logs and warnings.
    fn name(&self) -> &str;

    /// Transforms the metadata map.
    ///
    /// The returned map is authoritative. When the driver resolves the
    /// context's metadata, anything written directly to `ctx.metadata`
    /// during this call is replaced by the returned map.
    async fn resolve(
        &self,
        metadata: Metadata,
        ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError>;
}

/// A hook bound to exactly one stage.
#[derive(Debug, Clone)]
pub enum Hook {
    /// Pre-convert hook.
    PreConvert(Arc<dyn PreConvertHook>),
    /// Post-convert hook.
    PostConvert(Arc<dyn PostConvertHook>),
    /// Metadata resolver.
    MetadataResolver(Arc<dyn MetadataResolverHook>),
}

impl Hook {
    /// Wraps a pre-convert hook.
    pub fn pre_convert(hook: impl PreConvertHook + 'static) -> Self {
        Self::PreConvert(Arc::new(hook))
    }

    /// Wraps a post-convert hook.
    pub fn post_convert(hook: impl PostConvertHook + 'static) -> Self {
        Self::PostConvert(Arc::new(hook))
    }

    /// Wraps a metadata resolver.
    pub fn metadata_resolver(hook: impl MetadataResolverHook + 'static) -> Self {
        Self::MetadataResolver(Arc::new(hook))
    }

    /// The stage this hook binds to.
    pub fn kind(&self) -> HookKind {
        match self {
            Self::PreConvert(_) => HookKind::PreConvert,
            Self::PostConvert(_) => HookKind::PostConvert,
            Self::MetadataResolver(_) => HookKind::MetadataResolver,
        }
    }

    /// The hook's name.
    pub fn name(&self) -> &str {
        match self {
            Self::PreConvert(h) => h.name(),
            Self::PostConvert(h) => h.name(),
            Self::MetadataResolver(h) => h.name(),
        }
    }

    /// Runs the hook on an artifact of the matching kind.
    pub async fn invoke(
        &self,
        artifact: Artifact,
        ctx: &mut ConversionContext,
    ) -> Result<Artifact, HookError> {
        match (self, artifact) {
            (Self::PreConvert(h), Artifact::Document(path)) => {
                h.pre_convert(path, ctx).await.map(Artifact::Document)
            }
            (Self::PostConvert(h), Artifact::Html(html)) => {
                h.post_convert(html, ctx).await.map(Artifact::Html)
            }
            (Self::MetadataResolver(h), Artifact::Metadata(metadata)) => {
                h.resolve(metadata, ctx).await.map(Artifact::Metadata)
            }
            (hook, artifact) => Err(HookError::new(format!(
                "{} hook cannot handle a {} artifact",
                hook.kind(),
                artifact.kind()
            ))),
        }
    }
}

/// The value folded through one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Manuscript path (pre-convert).
    Document(PathBuf),
    /// Generated HTML (post-convert).
    Html(String),
    /// Metadata map (metadata-resolver).
    Metadata(Metadata),
}

impl Artifact {
    /// The stage this artifact belongs to.
    pub fn kind(&self) -> HookKind {
        match self {
            Self::Document(_) => HookKind::PreConvert,
            Self::Html(_) => HookKind::PostConvert,
            Self::Metadata(_) => HookKind::MetadataResolver,
        }
    }

    /// Unwraps a document path.
    pub fn into_document(self) -> Option<PathBuf> {
        match self {
            Self::Document(path) => Some(path),
            _ => None,
        }
    }

    /// Unwraps HTML.
    pub fn into_html(self) -> Option<String> {
        match self {
            Self::Html(html) => Some(html),
            _ => None,
        }
    }

    /// Unwraps metadata.
    pub fn into_metadata(self) -> Option<Metadata> {
        match self {
            Self::Metadata(metadata) => Some(metadata),
            _ => None,
        }
    }
}
