//! Config subcommands
//!
//! Shows the effective configuration, which is the config file merged
//! over built-in defaults.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Table};
use kicup_core::{Config, config};

/// Configuration command arguments
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Show current configuration
    Show {
        /// Output as JSON instead of table format
        #[arg(long)]
        json: bool,
    },
}

/// Handle config command
///
/// Defaults to `show` when no subcommand is given.
pub fn cmd_config(args: &ConfigArgs, config: &Config, quiet: bool) -> Result<()> {
    match args.command {
        Some(ConfigSubcommands::Show { json }) => cmd_config_show(config, json, quiet),
        None => cmd_config_show(config, false, quiet),
    }
}

fn cmd_config_show(config: &Config, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", config_table(config));

    if !quiet {
        if let Some(path) = config::get_config_path() {
            println!();
            println!("Config file: {}", path.display());
        }
    }
    Ok(())
}

fn config_table(config: &Config) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Key", "Value"]);

    let runner = &config.runner;
    let tunnel = &config.tunnel;
    let rows: Vec<(&str, String)> = vec![
        ("version", config.version.to_string()),
        ("rootless", config.rootless.to_string()),
        (
            "suppress_slow_command_warnings",
            config.suppress_slow_command_warnings.to_string(),
        ),
        ("ssh_program", config.ssh_program.clone()),
        (
            "context_cache_ttl_secs",
            config.context_cache_ttl_secs.to_string(),
        ),
        (
            "runner.default_timeout_secs",
            runner.default_timeout_secs.to_string(),
        ),
        (
            "runner.slow_timeout_secs",
            runner.slow_timeout_secs.to_string(),
        ),
        ("runner.default_warn_ms", runner.default_warn_ms.to_string()),
        ("runner.slow_warn_ms", runner.slow_warn_ms.to_string()),
        (
            "tunnel.ready_timeout_secs",
            tunnel.ready_timeout_secs.to_string(),
        ),
        ("tunnel.start_attempts", tunnel.start_attempts.to_string()),
        ("tunnel.restart_attempts", tunnel.restart_attempts.to_string()),
        (
            "tunnel.health_check_interval_secs",
            tunnel.health_check_interval_secs.to_string(),
        ),
        (
            "tunnel.metrics_log_interval_secs",
            tunnel.metrics_log_interval_secs.to_string(),
        ),
        (
            "tunnel.health_check_window_secs",
            tunnel.health_check_window_secs.to_string(),
        ),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_nested_sections() {
        let rendered = config_table(&Config::default()).to_string();
        assert!(rendered.contains("ssh_program"));
        assert!(rendered.contains("runner.default_timeout_secs"));
        assert!(rendered.contains("tunnel.health_check_window_secs"));
        assert!(rendered.contains("19"));
    }
}
