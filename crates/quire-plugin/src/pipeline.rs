//! Hook pipeline: folds an artifact through every enabled hook of a stage.
//!
//! Hooks run strictly one after another in registry order. A hook that
//! returns an error or panics is skipped: its output is discarded, the
//! context is rolled back to what it was before the hook ran, and a
//! [`HookWarning`] is recorded. The fold then continues with the artifact
//! as it stood before the failing hook.
//!
//! No timeout is applied; a hook that never returns blocks its run.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quire_core::config::MetadataMergePolicy;

use crate::context::{ConversionContext, Metadata};
use crate::error::{PluginError, PluginResult};
use crate::hooks::{Artifact, HookKind};
use crate::registry::{PluginRegistry, RegisteredHook};

/// Why a warning was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The hook returned an error and was skipped.
    Failed,
    /// The hook panicked and was skipped.
    Panicked,
    /// The hook changed a metadata key another plugin had set in the same run.
    MetadataConflict,
}

/// A non-fatal problem recorded while running a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookWarning {
    /// Stage the hook belongs to.
    pub stage: HookKind,
    /// Plugin that contributed the hook.
    pub plugin: String,
    /// Hook name.
    pub hook: String,
    /// Position among the plugin's hooks of this stage.
    pub position: usize,
    /// What happened.
    pub kind: WarningKind,
    /// Details.
    pub message: String,
}

impl HookWarning {
    fn new(registered: &RegisteredHook, kind: WarningKind, message: String) -> Self {
        Self {
            stage: registered.hook.kind(),
            plugin: registered.plugin.clone(),
            hook: registered.hook.name().to_string(),
            position: registered.position,
            kind,
            message,
        }
    }

    /// Whether the hook's transformation was dropped.
    pub fn is_skipped(&self) -> bool {
        matches!(self.kind, WarningKind::Failed | WarningKind::Panicked)
    }

    /// The equivalent [`PluginError::HookExecution`], as logged when the hook is skipped.
    pub fn to_error(&self) -> PluginError {
        PluginError::HookExecution {
            plugin: self.plugin.clone(),
            hook: self.hook.clone(),
            message: self.message.clone(),
        }
    }
}

impl std::fmt::Display for HookWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind {
            WarningKind::Failed => "failed, skipped",
            WarningKind::Panicked => "panicked, skipped",
            WarningKind::MetadataConflict => "metadata conflict",
        };
        write!(
            f,
            "[{}] {}/{}#{} {}: {}",
            self.stage, self.plugin, self.hook, self.position, label, self.message
        )
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome<T> {
    /// The final artifact.
    pub artifact: T,
    /// Warnings, in the order they occurred.
    pub warnings: Vec<HookWarning>,
}

impl<T> PipelineOutcome<T> {
    fn unchanged(artifact: T) -> Self {
        Self {
            artifact,
            warnings: Vec::new(),
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> PipelineOutcome<U> {
        PipelineOutcome {
            artifact: f(self.artifact),
            warnings: self.warnings,
        }
    }
}

/// Runs hook stages against the registry's enabled plugins.
///
/// The pipeline keeps no per-run state, so one instance can serve any number
/// of runs, including concurrent ones, as long as each has its own context.
#[derive(Debug, Clone)]
pub struct HookPipeline {
    registry: Arc<PluginRegistry>,
    merge_policy: MetadataMergePolicy,
}

impl HookPipeline {
    /// Creates a pipeline with the last-writer-wins metadata policy.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            merge_policy: MetadataMergePolicy::default(),
        }
    }

    /// Sets how conflicting metadata writes are settled.
    pub fn with_merge_policy(mut self, policy: MetadataMergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// The active merge policy.
    pub fn merge_policy(&self) -> MetadataMergePolicy {
        self.merge_policy
    }

    /// Runs the hooks of `kind` over an artifact of the same kind.
    pub async fn run(
        &self,
        kind: HookKind,
        artifact: Artifact,
        ctx: &mut ConversionContext,
    ) -> PluginResult<PipelineOutcome<Artifact>> {
        if artifact.kind() != kind {
            return Err(PluginError::StageMismatch {
                expected: kind,
                actual: artifact.kind(),
            });
        }

        Ok(match artifact {
            Artifact::Document(path) => self
                .run_pre_convert(path, ctx)
                .await
                .map(Artifact::Document),
            Artifact::Html(html) => self.run_post_convert(html, ctx).await.map(Artifact::Html),
            Artifact::Metadata(metadata) => self
                .run_metadata_resolver(metadata, ctx)
                .await
                .map(Artifact::Metadata),
        })
    }

    /// Runs pre-convert hooks over the manuscript path.
    pub async fn run_pre_convert(
        &self,
        document: PathBuf,
        ctx: &mut ConversionContext,
    ) -> PipelineOutcome<PathBuf> {
        self.fold(
            HookKind::PreConvert,
            document,
            Artifact::Document,
            Artifact::into_document,
            ctx,
        )
        .await
    }

    /// Runs post-convert hooks over the generated HTML.
    pub async fn run_post_convert(
        &self,
        html: String,
        ctx: &mut ConversionContext,
    ) -> PipelineOutcome<String> {
        self.fold(
            HookKind::PostConvert,
            html,
            Artifact::Html,
            Artifact::into_html,
            ctx,
        )
        .await
    }

    /// Runs metadata resolvers over a metadata map, applying the merge policy.
    pub async fn run_metadata_resolver(
        &self,
        metadata: Metadata,
        ctx: &mut ConversionContext,
    ) -> PipelineOutcome<Metadata> {
        let hooks = self.registry.hooks_of_kind(HookKind::MetadataResolver).await;
        if hooks.is_empty() {
            return PipelineOutcome::unchanged(metadata);
        }
        debug!(
            stage = %HookKind::MetadataResolver,
            run_id = %ctx.run_id(),
            hooks = hooks.len(),
            policy = %self.merge_policy,
            "Running stage"
        );

        let mut current = metadata;
        let mut warnings = Vec::new();
        // metadata key -> plugin that last wrote it during this run
        let mut writers: HashMap<String, String> = HashMap::new();

        for registered in &hooks {
            let produced = match self
                .invoke_isolated(registered, Artifact::Metadata(current.clone()), ctx)
                .await
            {
                Ok(artifact) => artifact.into_metadata(),
                Err(warning) => {
                    warnings.push(warning);
                    continue;
                }
            };
            let Some(mut next) = produced else {
                warnings.push(HookWarning::new(
                    registered,
                    WarningKind::Failed,
                    "hook returned an artifact of the wrong kind".to_string(),
                ));
                continue;
            };

            for key in changed_keys(&current, &next) {
                let earlier = writers.get(&key).filter(|w| **w != registered.plugin).cloned();
                let Some(earlier) = earlier else {
                    writers.insert(key, registered.plugin.clone());
                    continue;
                };

                match self.merge_policy {
                    MetadataMergePolicy::LastWriterWins => {
                        writers.insert(key, registered.plugin.clone());
                    }
                    MetadataMergePolicy::WarnOnConflict => {
                        warnings.push(HookWarning::new(
                            registered,
                            WarningKind::MetadataConflict,
                            format!("overrode key '{key}' set by plugin '{earlier}'"),
                        ));
                        writers.insert(key, registered.plugin.clone());
                    }
                    MetadataMergePolicy::FirstWriterWins => {
                        match current.get(&key) {
                            Some(value) => {
                                next.insert(key.clone(), value.clone());
                            }
                            None => {
                                next.remove(&key);
                            }
                        }
                        warnings.push(HookWarning::new(
                            registered,
                            WarningKind::MetadataConflict,
                            format!("change to key '{key}' reverted; set first by plugin '{earlier}'"),
                        ));
                    }
                }
            }

            current = next;
        }

        PipelineOutcome {
            artifact: current,
            warnings,
        }
    }

    /// Runs metadata resolvers over the context's own metadata and stores
    /// the result back into the context.
    pub async fn resolve_context_metadata(&self, ctx: &mut ConversionContext) -> Vec<HookWarning> {
        let metadata = ctx.metadata.clone();
        let outcome = self.run_metadata_resolver(metadata, ctx).await;
        ctx.metadata = outcome.artifact;
        outcome.warnings
    }

    async fn fold<T: Clone>(
        &self,
        kind: HookKind,
        initial: T,
        wrap: fn(T) -> Artifact,
        unwrap: fn(Artifact) -> Option<T>,
        ctx: &mut ConversionContext,
    ) -> PipelineOutcome<T> {
        let hooks = self.registry.hooks_of_kind(kind).await;
        if hooks.is_empty() {
            return PipelineOutcome::unchanged(initial);
        }
        debug!(stage = %kind, run_id = %ctx.run_id(), hooks = hooks.len(), "Running stage");

        let mut current = initial;
        let mut warnings = Vec::new();

        for registered in &hooks {
            match self
                .invoke_isolated(registered, wrap(current.clone()), ctx)
                .await
                .map(unwrap)
            {
                Ok(Some(next)) => current = next,
                Ok(None) => warnings.push(HookWarning::new(
                    registered,
                    WarningKind::Failed,
                    "hook returned an artifact of the wrong kind".to_string(),
                )),
                Err(warning) => warnings.push(warning),
            }
        }

        PipelineOutcome {
            artifact: current,
            warnings,
        }
    }

    /// Invokes one hook, rolling the context back if it fails or panics.
    async fn invoke_isolated(
        &self,
        registered: &RegisteredHook,
        artifact: Artifact,
        ctx: &mut ConversionContext,
    ) -> Result<Artifact, HookWarning> {
        let snapshot = ctx.snapshot();
        let run_id = ctx.run_id();

        let result = AssertUnwindSafe(registered.hook.invoke(artifact, ctx))
            .catch_unwind()
            .await;

        let warning = match result {
            Ok(Ok(artifact)) => {
                debug!(
                    stage = %registered.hook.kind(),
                    plugin = %registered.plugin,
                    hook = %registered.hook.name(),
                    "Hook completed"
                );
                return Ok(artifact);
            }
            Ok(Err(e)) => HookWarning::new(registered, WarningKind::Failed, e.to_string()),
            Err(panic) => HookWarning::new(registered, WarningKind::Panicked, panic_message(&*panic)),
        };

        ctx.restore(snapshot);
        warn!(
            stage = %warning.stage,
            plugin = %warning.plugin,
            hook = %warning.hook,
            run_id = %run_id,
            error = %warning.to_error(),
            "Hook failed, skipping"
        );
        Err(warning)
    }
}

fn changed_keys(before: &Metadata, after: &Metadata) -> BTreeSet<String> {
    before
        .keys()
        .chain(after.keys())
        .filter(|key| before.get(*key) != after.get(*key))
        .cloned()
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "hook panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use quire_core::config::BuildOptions;

    use super::*;
    use crate::hooks::{FnMetadataResolver, FnPostConvert, FnPreConvert, HookError};
    use crate::plugin::Plugin;
    use crate::state::MemoryStateStore;

    fn context() -> ConversionContext {
        ConversionContext::new("book.docx", "book.epub", Arc::new(BuildOptions::default()))
    }

    async fn registry_with(plugins: Vec<Plugin>) -> Arc<PluginRegistry> {
        let registry = Arc::new(PluginRegistry::new(Arc::new(MemoryStateStore::new())));
        for plugin in plugins {
            registry.load(plugin, true).await.expect("load");
        }
        registry
    }

    fn appender(name: &str, suffix: &'static str) -> Plugin {
        Plugin::builder(name, "1.0.0")
            .post_convert(FnPostConvert::new("append", move |html, _| {
                Ok(format!("{html}{suffix}"))
            }))
            .build()
            .expect("plugin")
    }

    fn setter(name: &str, key: &'static str, value: &'static str) -> Plugin {
        Plugin::builder(name, "1.0.0")
            .metadata_resolver(FnMetadataResolver::new("set", move |mut md, _| {
                md.insert(key.to_string(), json!(value));
                Ok(md)
            }))
            .build()
            .expect("plugin")
    }

    #[tokio::test]
    async fn test_identity_without_hooks() {
        let pipeline = HookPipeline::new(registry_with(vec![]).await);
        let mut ctx = context();

        let outcome = pipeline
            .run_post_convert("<p>x</p>".to_string(), &mut ctx)
            .await;
        assert_eq!(outcome.artifact, "<p>x</p>");
        assert!(outcome.warnings.is_empty());

        let mut md = Metadata::new();
        md.insert("title".into(), json!("T"));
        let outcome = pipeline.run_metadata_resolver(md.clone(), &mut ctx).await;
        assert_eq!(outcome.artifact, md);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_failing_hook_is_skipped() {
        let failing = Plugin::builder("broken", "0.1.0")
            .post_convert(FnPostConvert::new("explode", |_, ctx| {
                ctx.plugin_data.insert("broken", "touched", json!(true));
                ctx.metadata.insert("corrupt".into(), json!(1));
                Err(HookError::new("boom"))
            }))
            .build()
            .expect("plugin");

        let pipeline = HookPipeline::new(
            registry_with(vec![appender("a", "-a"), failing, appender("c", "-c")]).await,
        );
        let mut ctx = context();
        let outcome = pipeline.run_post_convert("x".to_string(), &mut ctx).await;

        assert_eq!(outcome.artifact, "x-a-c");
        assert_eq!(outcome.warnings.len(), 1);
        let warning = &outcome.warnings[0];
        assert_eq!(warning.plugin, "broken");
        assert_eq!(warning.hook, "explode");
        assert_eq!(warning.kind, WarningKind::Failed);
        assert_eq!(warning.message, "boom");
        assert!(warning.is_skipped());
        assert_eq!(
            warning.to_error().to_string(),
            "Hook 'explode' of plugin 'broken' failed: boom"
        );

        // side effects of the failed hook are rolled back
        assert!(ctx.plugin_data.is_empty());
        assert!(!ctx.metadata.contains_key("corrupt"));
    }

    #[tokio::test]
    async fn test_panicking_hook_is_contained() {
        let panicking = Plugin::builder("panicky", "0.1.0")
            .pre_convert(FnPreConvert::new("boom", |_, _| panic!("hook blew up")))
            .build()
            .expect("plugin");
        let renamer = Plugin::builder("renamer", "0.1.0")
            .pre_convert(FnPreConvert::new("rename", |path, _| {
                Ok(path.with_extension("cleaned.docx"))
            }))
            .build()
            .expect("plugin");

        let pipeline = HookPipeline::new(registry_with(vec![panicking, renamer]).await);
        let mut ctx = context();
        let outcome = pipeline
            .run_pre_convert(PathBuf::from("book.docx"), &mut ctx)
            .await;

        assert_eq!(outcome.artifact, PathBuf::from("book.cleaned.docx"));
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::Panicked);
        assert_eq!(outcome.warnings[0].message, "hook blew up");
    }

    #[tokio::test]
    async fn test_hooks_see_side_effects_of_earlier_hooks() {
        let writer = Plugin::builder("writer", "1.0.0")
            .pre_convert(FnPreConvert::new("note", |path, ctx| {
                ctx.plugin_data.insert("writer", "seen", json!("yes"));
                Ok(path)
            }))
            .build()
            .expect("plugin");
        let reader = Plugin::builder("reader", "1.0.0")
            .pre_convert(FnPreConvert::new("check", |path, ctx| {
                match ctx.plugin_data.get_str("writer", "seen") {
                    Some("yes") => Ok(path),
                    _ => Err(HookError::new("writer did not run first")),
                }
            }))
            .build()
            .expect("plugin");

        let pipeline = HookPipeline::new(registry_with(vec![writer, reader]).await);
        let outcome = pipeline
            .run_pre_convert("book.docx".into(), &mut context())
            .await;
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_mismatched_artifact() {
        let pipeline = HookPipeline::new(registry_with(vec![]).await);
        let err = pipeline
            .run(
                HookKind::PostConvert,
                Artifact::Document("a.docx".into()),
                &mut context(),
            )
            .await
            .expect_err("mismatch");
        assert!(matches!(
            err,
            PluginError::StageMismatch {
                expected: HookKind::PostConvert,
                actual: HookKind::PreConvert,
            }
        ));
    }

    #[tokio::test]
    async fn test_merge_policy_last_writer_wins() {
        let pipeline = HookPipeline::new(
            registry_with(vec![setter("a", "title", "A"), setter("b", "title", "B")]).await,
        );
        let outcome = pipeline
            .run_metadata_resolver(Metadata::new(), &mut context())
            .await;
        assert_eq!(outcome.artifact.get("title"), Some(&json!("B")));
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_merge_policy_first_writer_wins() {
        let pipeline = HookPipeline::new(
            registry_with(vec![setter("a", "title", "A"), setter("b", "title", "B")]).await,
        )
        .with_merge_policy(MetadataMergePolicy::FirstWriterWins);
        let outcome = pipeline
            .run_metadata_resolver(Metadata::new(), &mut context())
            .await;
        assert_eq!(outcome.artifact.get("title"), Some(&json!("A")));
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::MetadataConflict);
        assert_eq!(outcome.warnings[0].plugin, "b");
    }

    #[tokio::test]
    async fn test_merge_policy_warn_on_conflict() {
        let pipeline = HookPipeline::new(
            registry_with(vec![setter("a", "title", "A"), setter("b", "title", "B")]).await,
        )
        .with_merge_policy(MetadataMergePolicy::WarnOnConflict);
        let outcome = pipeline
            .run_metadata_resolver(Metadata::new(), &mut context())
            .await;
        assert_eq!(outcome.artifact.get("title"), Some(&json!("B")));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].message.contains("'a'"));
    }

    #[tokio::test]
    async fn test_override_of_driver_metadata_is_not_a_conflict() {
        let pipeline = HookPipeline::new(registry_with(vec![setter("a", "title", "A")]).await)
            .with_merge_policy(MetadataMergePolicy::FirstWriterWins);
        let mut ctx = context();
        ctx.metadata.insert("title".into(), json!("From manuscript"));

        let warnings = pipeline.resolve_context_metadata(&mut ctx).await;
        assert!(warnings.is_empty());
        assert_eq!(ctx.metadata.get("title"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_resolver_direct_metadata_writes_are_replaced() {
        let sneaky = Plugin::builder("sneaky", "1.0.0")
            .metadata_resolver(FnMetadataResolver::new("side", |mut md, ctx| {
                ctx.metadata.insert("smuggled".into(), json!(true));
                md.insert("returned".into(), json!(true));
                Ok(md)
            }))
            .build()
            .expect("plugin");

        let pipeline = HookPipeline::new(registry_with(vec![sneaky]).await);
        let mut ctx = context();
        ctx.metadata.insert("title".into(), json!("A"));

        let warnings = pipeline.resolve_context_metadata(&mut ctx).await;
        assert!(warnings.is_empty());
        assert_eq!(ctx.metadata.get("returned"), Some(&json!(true)));
        assert!(!ctx.metadata.contains_key("smuggled"));
        assert_eq!(ctx.metadata.get("title"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_disabled_plugins_do_not_run() {
        let registry = registry_with(vec![appender("a", "-a"), appender("b", "-b")]).await;
        registry.disable("a").await.expect("disable");

        let pipeline = HookPipeline::new(registry);
        let outcome = pipeline.run_post_convert("x".into(), &mut context()).await;
        assert_eq!(outcome.artifact, "x-b");
    }
}
