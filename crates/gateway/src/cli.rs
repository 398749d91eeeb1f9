//! Command-line surface for the `toolgate` binary.

use clap::{Parser, Subcommand};

use tg_domain::config::{Config, ConfigSeverity};

#[derive(Parser)]
#[command(name = "toolgate", about = "Resilient MCP gateway", version)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "toolgate.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway (default when no subcommand is given).
    Run,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Check the config file and report problems.
    Validate,
    /// Print the effective configuration, defaults applied.
    Show,
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Ok(Config::load(path)?)
    } else {
        tracing::warn!(path, "config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Print validation issues. Returns false when any error-severity issue
/// exists.
pub fn validate(config: &Config, path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{path}: OK");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|issue| issue.severity == ConfigSeverity::Error)
}

pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
