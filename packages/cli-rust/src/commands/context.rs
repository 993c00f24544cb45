//! Context subcommands
//!
//! Shows which daemon engine commands will talk to, and the environment
//! that points an engine CLI at it.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use console::style;
use kicup_core::context::validate_remote_context;
use kicup_core::{ContextInfo, Services};

/// Context command arguments
#[derive(Args)]
pub struct ContextArgs {
    #[command(subcommand)]
    command: Option<ContextSubcommands>,
}

#[derive(Subcommand)]
pub enum ContextSubcommands {
    /// Show the resolved daemon context
    Show {
        /// Output as JSON instead of table format
        #[arg(long)]
        json: bool,
    },
    /// Print shell exports that point an engine CLI at the context
    Env,
    /// Check that a remote context is usable
    Validate,
}

/// Handle context command
///
/// Defaults to `show` when no subcommand is given.
pub fn cmd_context(args: &ContextArgs, services: &Services, quiet: bool) -> Result<()> {
    match args.command {
        Some(ContextSubcommands::Show { json }) => cmd_context_show(services, json),
        Some(ContextSubcommands::Env) => cmd_context_env(services),
        Some(ContextSubcommands::Validate) => cmd_context_validate(services, quiet),
        None => cmd_context_show(services, false),
    }
}

fn cmd_context_show(services: &Services, json: bool) -> Result<()> {
    let ctx = services.current_context()?;
    if json {
        let mut value = serde_json::to_value(&*ctx)?;
        value["tls"] = serde_json::Value::Bool(ctx.has_tls());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("{}", context_table(&ctx));
    Ok(())
}

fn context_table(ctx: &ContextInfo) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Key", "Value"]);
    table.add_row(vec![Cell::new("name"), Cell::new(&ctx.name)]);
    table.add_row(vec![
        Cell::new("host"),
        Cell::new(if ctx.host.is_empty() {
            "(local socket)"
        } else {
            ctx.host.as_str()
        }),
    ]);
    table.add_row(vec![
        Cell::new("kind"),
        Cell::new(context_kind(ctx)).fg(if ctx.is_remote {
            Color::Yellow
        } else {
            Color::Green
        }),
    ]);
    table.add_row(vec![
        Cell::new("tls"),
        Cell::new(if ctx.has_tls() { "yes" } else { "no" }),
    ]);
    table
}

fn context_kind(ctx: &ContextInfo) -> &'static str {
    match (ctx.is_remote, ctx.is_ssh) {
        (false, _) => "local",
        (true, true) => "remote (ssh)",
        (true, false) => "remote (tcp)",
    }
}

/// Print `export` lines for the context
///
/// TLS material stays on disk so the printed `DOCKER_CERT_PATH` remains
/// usable after the command exits.
fn cmd_context_env(services: &Services) -> Result<()> {
    let vars = services.resolver().context_environment()?;
    for line in export_lines(&vars) {
        println!("{line}");
    }
    Ok(())
}

fn export_lines(vars: &std::collections::BTreeMap<String, String>) -> Vec<String> {
    vars.iter()
        .map(|(key, value)| format!("export {key}={value:?}"))
        .collect()
}

fn cmd_context_validate(services: &Services, quiet: bool) -> Result<()> {
    let ctx = services.current_context()?;
    validate_remote_context(&ctx)?;
    if !quiet {
        println!(
            "{} Context {} is usable ({})",
            style("\u{2713}").green(),
            style(&ctx.name).cyan(),
            context_kind(&ctx)
        );
    }
    Ok(())
}
