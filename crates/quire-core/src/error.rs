//! Unified application error for Quire.
//!
//! Crate-level errors (such as the plugin engine's) convert into
//! [`AppError`] at the boundary, so the CLI reports every failure the same way.

use std::fmt;

use thiserror::Error;

/// Broad category of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A named plugin or file does not exist.
    NotFound,
    /// A name is already taken.
    Conflict,
    /// Caller supplied something unusable.
    Validation,
    /// Configuration could not be loaded.
    Configuration,
    /// The plugin engine failed.
    Plugin,
    /// Parser, renderer or packager failed.
    Conversion,
    /// Filesystem failure.
    Io,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Process exit code the CLI uses for this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::NotFound => 3,
            Self::Conflict => 4,
            Self::Validation | Self::Configuration => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Validation => "invalid input",
            Self::Configuration => "configuration error",
            Self::Plugin => "plugin error",
            Self::Conversion => "conversion failed",
            Self::Io => "i/o error",
            Self::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// Application error carried across crate boundaries.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// Category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Creates an error without a cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping a cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Caller supplied something unusable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, err.to_string(), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(ErrorKind::Configuration, err.to_string(), err)
    }
}
