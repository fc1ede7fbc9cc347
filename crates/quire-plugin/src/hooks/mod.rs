//! Hook system: stage definitions and the hooks built on them.

pub mod builtin;
pub mod closures;
pub mod definitions;

pub use closures::{FnMetadataResolver, FnPostConvert, FnPreConvert};
pub use definitions::{
    Artifact, Hook, HookError, HookKind, MetadataResolverHook, PostConvertHook, PreConvertHook,
};
