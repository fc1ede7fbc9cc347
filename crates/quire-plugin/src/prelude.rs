//! Prelude for writing plugins in code.

pub use async_trait::async_trait;

pub use crate::context::{ConversionContext, Metadata, PluginData};
pub use crate::hooks::definitions::{
    Hook, HookError, HookKind, MetadataResolverHook, PostConvertHook, PreConvertHook,
};
pub use crate::hooks::closures::{FnMetadataResolver, FnPostConvert, FnPreConvert};
pub use crate::plugin::{Plugin, PluginBuilder};
