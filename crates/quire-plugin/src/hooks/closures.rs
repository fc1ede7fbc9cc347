//! Closure-backed hooks for plugins compiled into the host.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::definitions::{HookError, MetadataResolverHook, PostConvertHook, PreConvertHook};
use crate::context::{ConversionContext, Metadata};

type PreConvertFn =
    dyn Fn(PathBuf, &mut ConversionContext) -> Result<PathBuf, HookError> + Send + Sync;
type PostConvertFn =
    dyn Fn(String, &mut ConversionContext) -> Result<String, HookError> + Send + Sync;
type ResolverFn =
    dyn Fn(Metadata, &mut ConversionContext) -> Result<Metadata, HookError> + Send + Sync;

macro_rules! closure_debug {
    ($ty:ident) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("name", &self.name)
                    .field("func", &"<closure>")
                    .finish()
            }
        }
    };
}

/// A pre-convert hook built from a closure.
pub struct FnPreConvert {
    name: String,
    func: Arc<PreConvertFn>,
}

impl FnPreConvert {
    /// Creates a new closure-based pre-convert hook.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(PathBuf, &mut ConversionContext) -> Result<PathBuf, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }
}

closure_debug!(FnPreConvert);

#[async_trait]
impl PreConvertHook for FnPreConvert {
    fn name(&self) -> &str {
        &self.name
    }

    async fn pre_convert(
        &self,
        document: PathBuf,
        ctx: &mut ConversionContext,
    ) -> Result<PathBuf, HookError> {
        (self.func)(document, ctx)
    }
}

/// A post-convert hook built from a closure.
pub struct FnPostConvert {
    name: String,
    func: Arc<PostConvertFn>,
}

impl FnPostConvert {
    /// Creates a new closure-based post-convert hook.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(String, &mut ConversionContext) -> Result<String, HookError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }
}

closure_debug!(FnPostConvert);

#[async_trait]
impl PostConvertHook for FnPostConvert {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post_convert(
        &self,
        html: String,
        ctx: &mut ConversionContext,
    ) -> Result<String, HookError> {
        (self.func)(html, ctx)
    }
}

/// A metadata resolver built from a closure.
pub struct FnMetadataResolver {
    name: String,
    func: Arc<ResolverFn>,
}

impl FnMetadataResolver {
    /// Creates a new closure-based metadata resolver.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(Metadata, &mut ConversionContext) -> Result<Metadata, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }
}

closure_debug!(FnMetadataResolver);

#[async_trait]
impl MetadataResolverHook for FnMetadataResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        metadata: Metadata,
        ctx: &mut ConversionContext,
    ) -> Result<Metadata, HookError> {
        (self.func)(metadata, ctx)
    }
}
