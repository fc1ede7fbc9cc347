//! Conversion driver: runs the three hook stages at their fixed points.
//!
//! The parser, renderer and packager are external collaborators reached
//! through narrow traits. The driver owns the stage order:
//!
//! ```text
//! pre_convert ─► parse ─► render ─► post_convert ─► metadata_resolver ─► package
//! ```
//!
//! Post-convert hooks see metadata as the parser left it; resolvers run
//! afterwards and only see the HTML through `content_preview`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use quire_core::AppResult;
use quire_core::config::BuildOptions;

use crate::context::{ConversionContext, Metadata, ParseSummary};
use crate::pipeline::HookPipeline;
use crate::summary::RunSummary;

/// What the parser hands back.
#[derive(Debug, Clone, Default)]
pub struct ParsedManuscript {
    /// Summary recorded into the context.
    pub summary: ParseSummary,
    /// Metadata read from the manuscript's document properties.
    pub metadata: Metadata,
    /// Parser-specific intermediate representation for the renderer.
    pub body: serde_json::Value,
}

/// Reads a manuscript.
#[async_trait]
pub trait ManuscriptParser: Send + Sync {
    /// Parses the document at `path`.
    async fn parse(&self, path: &Path, options: &BuildOptions) -> AppResult<ParsedManuscript>;
}

/// Produces HTML from a parsed manuscript.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Renders the manuscript.
    async fn render(
        &self,
        manuscript: &ParsedManuscript,
        ctx: &ConversionContext,
    ) -> AppResult<String>;
}

/// Writes the final e-book.
#[async_trait]
pub trait EpubPackager: Send + Sync {
    /// Packages the HTML and metadata, returning the written file.
    async fn package(
        &self,
        html: &str,
        metadata: &Metadata,
        ctx: &ConversionContext,
    ) -> AppResult<PathBuf>;
}

/// Result of one conversion.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// File written by the packager.
    pub output: PathBuf,
    /// Metadata the package was built with.
    pub metadata: Metadata,
    /// Hook warnings from every stage.
    pub summary: RunSummary,
}

/// Runs conversions through the hook pipeline.
pub struct ConversionDriver {
    pipeline: HookPipeline,
    parser: Arc<dyn ManuscriptParser>,
    renderer: Arc<dyn HtmlRenderer>,
    packager: Arc<dyn EpubPackager>,
    build_options: Arc<BuildOptions>,
}

impl std::fmt::Debug for ConversionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionDriver")
            .field("pipeline", &self.pipeline)
            .field("build_options", &self.build_options)
            .finish()
    }
}

impl ConversionDriver {
    /// Creates a driver.
    pub fn new(
        pipeline: HookPipeline,
        parser: Arc<dyn ManuscriptParser>,
        renderer: Arc<dyn HtmlRenderer>,
        packager: Arc<dyn EpubPackager>,
        build_options: BuildOptions,
    ) -> Self {
        Self {
            pipeline,
            parser,
            renderer,
            packager,
            build_options: Arc::new(build_options),
        }
    }

    /// Converts one manuscript.
    ///
    /// Hook failures never fail the conversion; they end up in the report's
    /// summary. Failures of the parser, renderer or packager do.
    pub async fn convert(&self, input: &Path, output: &Path) -> AppResult<ConversionReport> {
        let mut ctx = ConversionContext::new(input, output, self.build_options.clone());
        let mut summary = RunSummary::new();

        info!(
            run_id = %ctx.run_id(),
            input = %input.display(),
            output = %output.display(),
            "Conversion started"
        );

        let pre = self
            .pipeline
            .run_pre_convert(input.to_path_buf(), &mut ctx)
            .await;
        summary.extend(pre.warnings);
        let document = pre.artifact;

        let parsed = self.parser.parse(&document, ctx.build_options()).await?;
        ctx.record_parse(parsed.summary.clone());
        for (key, value) in &parsed.metadata {
            ctx.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let html = self.renderer.render(&parsed, &ctx).await?;
        let post = self.pipeline.run_post_convert(html, &mut ctx).await;
        summary.extend(post.warnings);
        let html = post.artifact;

        summary.extend(self.pipeline.resolve_context_metadata(&mut ctx).await);

        let written = self.packager.package(&html, &ctx.metadata, &ctx).await?;

        if summary.is_clean() {
            info!(run_id = %ctx.run_id(), output = %written.display(), "Conversion finished");
        } else {
            warn!(
                run_id = %ctx.run_id(),
                output = %written.display(),
                warnings = summary.warnings().len(),
                skipped = summary.skipped_hooks(),
                "Conversion finished with plugin warnings"
            );
        }

        Ok(ConversionReport {
            run_id: ctx.run_id(),
            output: written,
            metadata: ctx.metadata,
            summary,
        })
    }
}
