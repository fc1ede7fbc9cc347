//! Application configuration schemas.
//!
//! Configuration is deserialized from an optional TOML file merged with
//! `QUIRE_`-prefixed environment variables via the `config` crate. Every
//! section has defaults, so an empty configuration is valid.

pub mod build_options;
pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};

pub use self::build_options::BuildOptions;
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::plugin::{MetadataMergePolicy, PluginsConfig};

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin system settings.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Build options frozen into each conversion context.
    #[serde(default)]
    pub build: BuildOptions,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error. Environment variables such as
    /// `QUIRE_PLUGINS__AUTO_DISCOVER=false` override file values.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("QUIRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.build.validate()?;
        Ok(config)
    }
}
