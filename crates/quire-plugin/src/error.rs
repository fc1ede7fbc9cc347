//! Error types for plugin management and hook execution.
//!
//! Registry and loader failures on explicit operations propagate as
//! [`PluginError`]. Hook failures are captured by the pipeline and never
//! reach the conversion driver as errors.

use std::path::PathBuf;

use quire_core::error::{AppError, ErrorKind};
use thiserror::Error;

use crate::hooks::HookKind;

/// Why a plugin source file could not be turned into a plugin.
#[derive(Debug, Error)]
pub enum LoadCause {
    /// The file could not be read.
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid plugin manifest.
    #[error("cannot parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but declares no plugin.
    #[error("no plugin definition found")]
    NoDefinition,

    /// The file declares several plugins and the load was explicit.
    #[error("{count} plugin definitions found ({names}); expected exactly one")]
    Ambiguous {
        /// Number of definitions found.
        count: usize,
        /// Comma-separated names of the definitions.
        names: String,
    },

    /// A definition was found but is not usable.
    #[error("invalid plugin definition: {0}")]
    Invalid(String),
}

/// Errors raised by the plugin registry, loader, state store and pipeline.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A plugin with this name is already registered.
    #[error("Plugin '{name}' is already registered")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// No plugin with this name is registered.
    #[error("Plugin '{name}' not found")]
    NotFound {
        /// The unknown name.
        name: String,
    },

    /// A plugin source file could not be loaded.
    #[error("Failed to load plugin from '{}': {cause}", path.display())]
    Load {
        /// The offending file.
        path: PathBuf,
        /// What went wrong.
        #[source]
        cause: LoadCause,
    },

    /// A hook failed while running. Only ever surfaced as a pipeline warning.
    #[error("Hook '{hook}' of plugin '{plugin}' failed: {message}")]
    HookExecution {
        /// Plugin that contributed the hook.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Failure description.
        message: String,
    },

    /// The enabled-state store could not be read or written.
    #[error("Plugin state store error: {0}")]
    State(String),

    /// The artifact handed to the pipeline does not belong to the requested stage.
    #[error("Artifact of kind '{actual}' cannot run through '{expected}' hooks")]
    StageMismatch {
        /// Requested hook kind.
        expected: HookKind,
        /// Kind of the supplied artifact.
        actual: HookKind,
    },
}

impl PluginError {
    /// Creates a not-found error.
    pub fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    /// Creates a load error for the given path.
    pub fn load(path: impl Into<PathBuf>, cause: LoadCause) -> Self {
        Self::Load {
            path: path.into(),
            cause,
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::DuplicateName { .. } => ErrorKind::Conflict,
            PluginError::NotFound { .. } => ErrorKind::NotFound,
            PluginError::StageMismatch { .. } => ErrorKind::Validation,
            _ => ErrorKind::Plugin,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

/// Convenience alias used throughout the plugin crate.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        let dup: AppError = PluginError::DuplicateName {
            name: "toc".into(),
        }
        .into();
        assert_eq!(dup.kind, ErrorKind::Conflict);

        let missing: AppError = PluginError::not_found("toc").into();
        assert_eq!(missing.kind, ErrorKind::NotFound);
        assert!(missing.message.contains("'toc'"));

        let load: AppError = PluginError::load("a.toml", LoadCause::NoDefinition).into();
        assert_eq!(load.kind, ErrorKind::Plugin);
        assert!(load.message.contains("a.toml"));
    }

    #[test]
    fn test_ambiguous_message() {
        let cause = LoadCause::Ambiguous {
            count: 2,
            names: "a, b".into(),
        };
        assert_eq!(
            cause.to_string(),
            "2 plugin definitions found (a, b); expected exactly one"
        );
    }
}
