//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use quire_core::config::AppConfig;
use quire_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

/// Execute config commands
pub fn execute(
    args: &ConfigArgs,
    config: &AppConfig,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => match format {
            OutputFormat::Json => output::print_json(config, "{}"),
            OutputFormat::Table => {
                let rendered = toml::to_string_pretty(config).map_err(|e| {
                    AppError::internal(format!("Failed to render configuration: {e}"))
                })?;
                println!("{rendered}");
            }
        },
        ConfigCommand::Validate => {
            if !std::path::Path::new(config_path).exists() {
                output::print_warning(&format!(
                    "Configuration file '{config_path}' not found, using defaults"
                ));
            }
            output::print_success(&format!("Configuration '{config_path}' is valid"));

            let plugins = &config.plugins;
            let directories = plugins
                .discovery_directories()
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            output::print_kv("Plugin directories", &directories);
            output::print_kv(
                "State file",
                &plugins.effective_state_file().display().to_string(),
            );
            output::print_kv("Auto discover", &plugins.auto_discover.to_string());
            output::print_kv("Merge policy", &plugins.metadata_merge_policy.to_string());
            output::print_kv("EPUB version", &config.build.epub_version);
            output::print_kv("Log level", &config.logging.level);
        }
    }

    Ok(())
}
