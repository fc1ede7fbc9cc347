//! Build options snapshot handed to every conversion run.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Read-only build configuration.
///
/// A copy is frozen into each conversion context; hooks can read it but the
/// context never exposes a mutable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Target EPUB version (`"2.0"` or `"3.0"`).
    #[serde(default = "default_epub_version")]
    pub epub_version: String,
    /// Depth of the generated table of contents.
    #[serde(default = "default_toc_depth")]
    pub toc_depth: u8,
    /// Whether each top-level heading starts a new chapter file.
    #[serde(default = "default_true")]
    pub split_chapters: bool,
    /// Language used when the manuscript declares none.
    #[serde(default)]
    pub default_language: Option<String>,
    /// Free-form options read by plugins.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            epub_version: default_epub_version(),
            toc_depth: default_toc_depth(),
            split_chapters: true,
            default_language: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl BuildOptions {
    /// Looks up a free-form option.
    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Rejects values no packager can honor.
    pub fn validate(&self) -> Result<(), AppError> {
        if !matches!(self.epub_version.as_str(), "2.0" | "3.0") {
            return Err(AppError::validation(format!(
                "Unsupported EPUB version '{}', expected \"2.0\" or \"3.0\"",
                self.epub_version
            )));
        }
        if self.toc_depth == 0 {
            return Err(AppError::validation("toc_depth must be at least 1"));
        }
        Ok(())
    }
}

fn default_epub_version() -> String {
    "3.0".to_string()
}

fn default_toc_depth() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_are_valid() {
        BuildOptions::default().validate().expect("valid");
    }

    #[test]
    fn test_rejects_unknown_epub_version() {
        let options = BuildOptions {
            epub_version: "4".into(),
            ..Default::default()
        };
        let err = options.validate().expect_err("invalid");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("'4'"));
    }

    #[test]
    fn test_rejects_empty_toc() {
        let options = BuildOptions {
            toc_depth: 0,
            ..Default::default()
        };
        assert_eq!(
            options.validate().expect_err("invalid").kind,
            ErrorKind::Validation
        );
    }
}
