//! Tunnel subcommands
//!
//! Opens supervised SSH tunnels to a remote daemon host and keeps them up
//! until Ctrl-C. The tunnels are stopped when the command returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use console::style;
use kicup_core::tunnel::TunnelMetrics;
use kicup_core::{Engine, Services, SshTunnel, TunnelStatus};

use crate::output::CommandSpinner;

/// Tunnel command arguments
#[derive(Args)]
pub struct TunnelArgs {
    #[command(subcommand)]
    command: TunnelSubcommands,
}

#[derive(Subcommand)]
pub enum TunnelSubcommands {
    /// Forward a local port to the API server on the remote host
    Api {
        /// API server port on the remote host
        #[arg(long)]
        port: u16,
    },
    /// Forward a local port to a node container's sshd
    Container {
        /// Container name
        name: String,

        /// Container engine to use
        #[arg(long, default_value = "docker")]
        engine: Engine,
    },
}

pub async fn cmd_tunnel(args: &TunnelArgs, services: &Services, quiet: bool) -> Result<()> {
    let ctx = services.current_context()?;
    if !ctx.is_remote {
        bail!(
            "Daemon context {:?} is local; tunnels are only needed for remote SSH contexts",
            ctx.name
        );
    }

    let tunnel = match &args.command {
        TunnelSubcommands::Api { port } => {
            let spinner = CommandSpinner::new_maybe(
                &format!("Opening SSH tunnel to API server port {port}..."),
                quiet,
            );
            spinner
                .wrap(
                    services.tunnels().create_api_server_tunnel(&ctx, *port),
                    |t: &Arc<SshTunnel>| format!("Tunnel {} active", t.key()),
                )
                .await?
        }
        TunnelSubcommands::Container { name, engine } => {
            let ssh_port = services.engine().ssh_port(*engine, name).await?;
            let spinner = CommandSpinner::new_maybe(
                &format!("Opening SSH tunnel to {name} (port {ssh_port})..."),
                quiet,
            );
            spinner
                .wrap(
                    services
                        .tunnels()
                        .create_container_ssh_tunnel(&ctx, name, ssh_port),
                    |t: &Arc<SshTunnel>| format!("Tunnel {} active", t.key()),
                )
                .await?
        }
    };

    match &args.command {
        TunnelSubcommands::Api { .. } => println!("{}", tunnel.local_url()),
        TunnelSubcommands::Container { .. } => println!("localhost:{}", tunnel.local_port()),
    }
    if !quiet {
        eprintln!();
        eprintln!("Press {} to stop the tunnel.", style("Ctrl-C").cyan());
    }

    tokio::signal::ctrl_c().await?;

    services.tunnels().log_metrics();
    if !quiet {
        eprintln!();
        eprintln!("{}", metrics_table(&services.tunnels().tunnels()));
    }
    Ok(())
}

fn metrics_table(tunnels: &BTreeMap<String, Arc<SshTunnel>>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "Tunnel",
        "Status",
        "Uptime",
        "Checks",
        "Success",
        "Restarts",
        "Latency",
        "Last OK",
    ]);
    for (key, tunnel) in tunnels {
        let status = tunnel.status();
        table.add_row(metrics_row(key, status, &tunnel.metrics()));
    }
    table
}

fn metrics_row(key: &str, status: TunnelStatus, metrics: &TunnelMetrics) -> Vec<Cell> {
    vec![
        Cell::new(key),
        Cell::new(status).fg(status_color(status)),
        Cell::new(humantime::format_duration(Duration::from_secs(
            metrics.uptime_seconds,
        ))),
        Cell::new(format!(
            "{} ({} failed)",
            metrics.total_checks, metrics.failed_checks
        )),
        Cell::new(format!("{:.1}%", metrics.success_rate())),
        Cell::new(metrics.restart_count),
        Cell::new(format!("{:?}", metrics.avg_latency)),
        Cell::new(
            metrics
                .last_success
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ),
    ]
}

fn status_color(status: TunnelStatus) -> Color {
    match status {
        TunnelStatus::Active => Color::Green,
        TunnelStatus::Unhealthy => Color::Red,
        TunnelStatus::Starting | TunnelStatus::Restarting => Color::Yellow,
        TunnelStatus::Stopped => Color::DarkGrey,
    }
}
