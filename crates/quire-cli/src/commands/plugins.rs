//! Plugin management CLI commands.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use quire_core::config::AppConfig;
use quire_core::error::AppError;
use quire_plugin::manager::DiscoveryOutcome;
use quire_plugin::{PluginInfo, PluginManager, PluginSummary};

/// Arguments for plugin commands
#[derive(Debug, Args)]
pub struct PluginsArgs {
    /// Plugin subcommand
    #[command(subcommand)]
    pub command: PluginsCommand,
}

/// Plugin subcommands
#[derive(Debug, Subcommand)]
pub enum PluginsCommand {
    /// Validate and register a plugin file
    Load {
        /// Path to the plugin file
        path: PathBuf,
        /// Enable the plugin right away
        #[arg(long)]
        enable: bool,
    },
    /// List registered plugins
    List,
    /// Enable a plugin
    Enable {
        /// Plugin name
        name: String,
    },
    /// Disable a plugin
    Disable {
        /// Plugin name
        name: String,
    },
    /// Show details of one plugin
    Info {
        /// Plugin name
        name: String,
    },
    /// Scan the plugin directories and report what was found
    Discover,
}

/// Plugin display row for table output
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    /// Plugin name
    name: String,
    /// Version
    version: String,
    /// Status
    status: String,
}

impl From<PluginSummary> for PluginRow {
    fn from(summary: PluginSummary) -> Self {
        Self {
            name: summary.name,
            version: summary.version,
            status: status(summary.enabled).to_string(),
        }
    }
}

/// Discovery failure row for JSON output
#[derive(Debug, Serialize)]
struct FailureRow {
    path: String,
    error: String,
}

/// Execute plugin commands
pub async fn execute(
    args: &PluginsArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let mut plugins_config = config.plugins.clone();
    // `discover` scans itself to report the outcome; `load` registers one file only
    if matches!(
        args.command,
        PluginsCommand::Discover | PluginsCommand::Load { .. }
    ) {
        plugins_config.auto_discover = false;
    }
    let manager = PluginManager::from_config(&plugins_config).await?;

    let result = run(&manager, &args.command, format).await;
    manager.shutdown().await?;
    result
}

async fn run(
    manager: &PluginManager,
    command: &PluginsCommand,
    format: OutputFormat,
) -> Result<(), AppError> {
    match command {
        PluginsCommand::Load { path, enable } => {
            let info = manager.load_path(path, *enable).await?;
            match format {
                OutputFormat::Json => output::print_json(&info, "{}"),
                OutputFormat::Table => {
                    output::print_success(&format!(
                        "Plugin '{}' {} loaded ({})",
                        info.name,
                        info.version,
                        status(info.enabled)
                    ));
                }
            }
            if !in_discovery_directory(manager, path) {
                output::print_warning(
                    "The file is outside every plugin directory and will not be found on the next run",
                );
            }
        }
        PluginsCommand::List => {
            let rows: Vec<PluginRow> = manager
                .list()
                .await
                .into_iter()
                .map(PluginRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        PluginsCommand::Enable { name } => {
            manager.enable(name).await?;
            output::print_success(&format!("Plugin '{name}' enabled"));
        }
        PluginsCommand::Disable { name } => {
            manager.disable(name).await?;
            output::print_success(&format!("Plugin '{name}' disabled"));
        }
        PluginsCommand::Info { name } => {
            let info = manager.info(name).await?;
            match format {
                OutputFormat::Json => output::print_json(&info, "{}"),
                OutputFormat::Table => print_info(&info),
            }
        }
        PluginsCommand::Discover => {
            let outcome = manager.discover().await;
            print_discovery(manager, &outcome, format);
        }
    }

    Ok(())
}

fn print_info(info: &PluginInfo) {
    println!("{}", info.name);
    output::print_kv("Version", &info.version);
    output::print_kv("Status", status(info.enabled));
    if !info.description.is_empty() {
        output::print_kv("Description", &info.description);
    }
    if !info.author.is_empty() {
        output::print_kv("Author", &info.author);
    }
    if let Some(source) = &info.source {
        output::print_kv("Source", &source.display().to_string());
    }
    output::print_kv(
        "Loaded at",
        &info.loaded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    for (kind, hooks) in &info.hooks {
        output::print_kv(kind.as_str(), &hooks.join(", "));
    }
}

fn print_discovery(manager: &PluginManager, outcome: &DiscoveryOutcome, format: OutputFormat) {
    let failures: Vec<FailureRow> = outcome
        .failures
        .iter()
        .map(|f| FailureRow {
            path: f.path.display().to_string(),
            error: f.error.to_string(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "directories": manager.directories(),
                "registered": outcome.registered,
                "failures": failures,
            });
            output::print_json(&report, "{}");
        }
        OutputFormat::Table => {
            for dir in manager.directories() {
                output::print_kv("Scanned", &dir.display().to_string());
            }
            output::print_success(&format!(
                "{} plugin(s) registered",
                outcome.registered.len()
            ));
            for name in &outcome.registered {
                println!("  {name}");
            }
            for failure in &failures {
                output::print_warning(&format!("{}: {}", failure.path, failure.error));
            }
        }
    }
}

fn in_discovery_directory(manager: &PluginManager, path: &Path) -> bool {
    in_any_directory(manager.directories(), path)
}

/// Whether `path` sits directly inside one of `directories`.
fn in_any_directory(directories: &[PathBuf], path: &Path) -> bool {
    let Ok(path) = std::fs::canonicalize(path) else {
        return false;
    };
    let Some(parent) = path.parent() else {
        return false;
    };
    directories.iter().any(|dir| {
        std::fs::canonicalize(dir)
            .map(|dir| dir == parent)
            .unwrap_or(false)
    })
}

fn status(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}
