//! Plugin manifest format.
//!
//! A plugin file is TOML holding one `[[plugin]]` table:
//!
//! ```toml
//! [[plugin]]
//! name = "house-style"
//! version = "1.0.0"
//! description = "Publisher house style"
//!
//! [[plugin.post_convert]]
//! op = "replace"
//! from = "old_text"
//! to = "new_text"
//!
//! [[plugin.metadata_resolver]]
//! op = "set_default"
//! key = "language"
//! value = "en"
//! ```
//!
//! Unknown keys and unknown `op`s are rejected when the file is loaded.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::LoadCause;
use crate::hooks::builtin::{
    Append, ChapterCount, CopyTo, FromPluginData, Prepend, RegexReplace, RemoveMetadata, Replace,
    RequireExtension, SetDefault, SetMetadata, SetPluginData,
};
use crate::plugin::Plugin;

/// Top-level structure of a plugin file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    /// Plugin definitions; exactly one is expected.
    #[serde(default)]
    pub plugin: Vec<PluginManifest>,
}

/// One `[[plugin]]` definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Unique plugin name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// Pre-convert hooks, in order.
    #[serde(default)]
    pub pre_convert: Vec<PreConvertOp>,
    /// Post-convert hooks, in order.
    #[serde(default)]
    pub post_convert: Vec<PostConvertOp>,
    /// Metadata resolvers, in order.
    #[serde(default)]
    pub metadata_resolver: Vec<MetadataOp>,
}

/// Pre-convert operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum PreConvertOp {
    /// Copy the manuscript into `directory` (relative to the plugin file).
    CopyTo {
        /// Target directory.
        directory: PathBuf,
    },
    /// Reject manuscripts without one of these extensions.
    RequireExtension {
        /// Accepted extensions.
        extensions: Vec<String>,
    },
    /// Store a value in this plugin's `plugin_data` namespace.
    SetPluginData {
        /// Key.
        key: String,
        /// Value.
        value: Value,
    },
}

/// Post-convert operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum PostConvertOp {
    /// Literal replacement.
    Replace {
        /// Text to find.
        from: String,
        /// Replacement.
        to: String,
    },
    /// Regex replacement.
    RegexReplace {
        /// Pattern.
        pattern: String,
        /// Replacement template.
        replacement: String,
    },
    /// Insert text before the HTML.
    Prepend {
        /// Text.
        text: String,
    },
    /// Insert text after the HTML.
    Append {
        /// Text.
        text: String,
    },
}

/// Metadata-resolver operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum MetadataOp {
    /// Set, overriding.
    Set {
        /// Key.
        key: String,
        /// Value.
        value: Value,
    },
    /// Set only if absent.
    SetDefault {
        /// Key.
        key: String,
        /// Value.
        value: Value,
    },
    /// Remove a key.
    Remove {
        /// Key.
        key: String,
    },
    /// Copy a `plugin_data` entry into metadata.
    FromPluginData {
        /// Namespace; defaults to this plugin.
        #[serde(default)]
        namespace: Option<String>,
        /// Key inside the namespace.
        key: String,
        /// Metadata key to write.
        into: String,
    },
    /// Record the chapter count.
    ChapterCount {
        /// Metadata key.
        key: String,
    },
}

impl ManifestFile {
    /// Parses manifest text.
    pub fn parse(text: &str) -> Result<Self, LoadCause> {
        Ok(toml::from_str(text)?)
    }
}

impl PluginManifest {
    /// Builds the plugin, compiling every operation into a typed hook.
    ///
    /// `source` is the manifest's path; relative directories resolve
    /// against its parent.
    pub fn into_plugin(self, source: &Path) -> Result<Plugin, LoadCause> {
        let base = source.parent().unwrap_or_else(|| Path::new(""));
        let name = self.name.clone();

        let mut builder = Plugin::builder(&self.name, &self.version)
            .description(&self.description)
            .author(&self.author)
            .source(source);

        for op in self.pre_convert {
            builder = match op {
                PreConvertOp::CopyTo { directory } => builder.pre_convert(CopyTo {
                    directory: base.join(directory),
                }),
                PreConvertOp::RequireExtension { extensions } => {
                    if extensions.is_empty() {
                        return Err(LoadCause::Invalid(
                            "require_extension needs at least one extension".to_string(),
                        ));
                    }
                    builder.pre_convert(RequireExtension {
                        extensions: extensions
                            .into_iter()
                            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                            .collect(),
                    })
                }
                PreConvertOp::SetPluginData { key, value } => builder.pre_convert(SetPluginData {
                    namespace: name.clone(),
                    key,
                    value,
                }),
            };
        }

        for op in self.post_convert {
            builder = match op {
                PostConvertOp::Replace { from, to } => {
                    if from.is_empty() {
                        return Err(LoadCause::Invalid(
                            "replace needs a non-empty 'from'".to_string(),
                        ));
                    }
                    builder.post_convert(Replace { from, to })
                }
                PostConvertOp::RegexReplace {
                    pattern,
                    replacement,
                } => {
                    let pattern = Regex::new(&pattern).map_err(|e| {
                        LoadCause::Invalid(format!("bad regex '{pattern}': {e}"))
                    })?;
                    builder.post_convert(RegexReplace {
                        pattern,
                        replacement,
                    })
                }
                PostConvertOp::Prepend { text } => builder.post_convert(Prepend { text }),
                PostConvertOp::Append { text } => builder.post_convert(Append { text }),
            };
        }

        for op in self.metadata_resolver {
            builder = match op {
                MetadataOp::Set { key, value } => {
                    builder.metadata_resolver(SetMetadata { key, value })
                }
                MetadataOp::SetDefault { key, value } => {
                    builder.metadata_resolver(SetDefault { key, value })
                }
                MetadataOp::Remove { key } => builder.metadata_resolver(RemoveMetadata { key }),
                MetadataOp::FromPluginData {
                    namespace,
                    key,
                    into,
                } => builder.metadata_resolver(FromPluginData {
                    namespace: namespace.unwrap_or_else(|| name.clone()),
                    key,
                    into,
                }),
                MetadataOp::ChapterCount { key } => {
                    builder.metadata_resolver(ChapterCount { key })
                }
            };
        }

        builder.build().map_err(LoadCause::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookKind;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = ManifestFile::parse(
            r#"
[[plugin]]
name = "house-style"
version = "2.1.0"
author = "Press"

[[plugin.pre_convert]]
op = "require_extension"
extensions = [".DOCX"]

[[plugin.post_convert]]
op = "regex_replace"
pattern = "--"
replacement = "&#8212;"

[[plugin.post_convert]]
op = "append"
text = "<!-- styled -->"

[[plugin.metadata_resolver]]
op = "set_default"
key = "tags"
value = []
"#,
        )
        .expect("parse");

        assert_eq!(manifest.plugin.len(), 1);
        let plugin = manifest.plugin[0]
            .clone()
            .into_plugin(Path::new("/plugins/house.toml"))
            .expect("build");

        assert_eq!(plugin.name(), "house-style");
        assert_eq!(plugin.author(), "Press");
        assert_eq!(plugin.source(), Some(Path::new("/plugins/house.toml")));
        assert_eq!(plugin.hooks(HookKind::PreConvert).len(), 1);
        assert_eq!(plugin.hooks(HookKind::PostConvert).len(), 2);
        assert_eq!(plugin.hooks(HookKind::PostConvert)[1].name(), "append");
        assert_eq!(plugin.hooks(HookKind::MetadataResolver).len(), 1);
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = ManifestFile::parse(
            r#"
[[plugin]]
name = "x"
version = "1"

[[plugin.post_convert]]
op = "shell"
command = "rm -rf /"
"#,
        );
        assert!(matches!(result, Err(LoadCause::Parse(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ManifestFile::parse(
            r#"
[[plugin]]
name = "x"
version = "1"
priority = 5
"#,
        );
        assert!(matches!(result, Err(LoadCause::Parse(_))));
    }

    #[test]
    fn test_bad_regex_is_invalid() {
        let manifest = ManifestFile::parse(
            r#"
[[plugin]]
name = "x"
version = "1"

[[plugin.post_convert]]
op = "regex_replace"
pattern = "(unclosed"
replacement = ""
"#,
        )
        .expect("parse");

        let err = manifest.plugin[0]
            .clone()
            .into_plugin(Path::new("x.toml"))
            .expect_err("bad regex");
        assert!(matches!(err, LoadCause::Invalid(ref msg) if msg.contains("(unclosed")));
    }

    #[test]
    fn test_copy_to_resolves_against_manifest_dir() {
        let manifest = ManifestFile::parse(
            r#"
[[plugin]]
name = "x"
version = "1"

[[plugin.pre_convert]]
op = "copy_to"
directory = "work"
"#,
        )
        .expect("parse");

        match &manifest.plugin[0].pre_convert[0] {
            PreConvertOp::CopyTo { directory } => assert_eq!(directory, Path::new("work")),
            other => panic!("unexpected op {other:?}"),
        }
        assert!(
            manifest.plugin[0]
                .clone()
                .into_plugin(Path::new("/etc/quire/x.toml"))
                .is_ok()
        );
    }
}
