//! Container subcommands
//!
//! Views of a node container (state, logs, published ports, the
//! post-mortem bundle gathered when a container dies on start) plus
//! start and graceful stop.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use kicup_core::hostnet::routable_host_ip_from_inside;
use kicup_core::{Engine, Services};

use crate::output::{CommandSpinner, log_level_style, state_style};

/// Container command arguments
#[derive(Args)]
pub struct ContainerArgs {
    /// Container engine to use
    #[arg(long, global = true, default_value = "docker")]
    engine: Engine,

    #[command(subcommand)]
    command: ContainerSubcommands,
}

#[derive(Subcommand)]
pub enum ContainerSubcommands {
    /// Show the container state
    Status {
        /// Container name
        name: String,
    },
    /// Check whether a container exists and was created by kicup
    Exists {
        /// Container name
        name: String,
    },
    /// Start a stopped container
    Start {
        /// Container name
        name: String,
    },
    /// Power off a container from inside and wait for it to exit
    Stop {
        /// Container name
        name: String,
    },
    /// Print the container logs
    Logs {
        /// Container name
        name: String,

        /// Number of lines to show from the end (0 for all)
        #[arg(short = 'n', long, default_value = "0")]
        lines: usize,
    },
    /// Gather inspect output, logs and daemon info for a failed container
    Debug {
        /// Container name
        name: String,
    },
    /// Show the host port a container port is published on
    Port {
        /// Container name
        name: String,

        /// Container port (defaults to sshd)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show the address the host is reachable at from inside the container
    HostIp {
        /// Container name
        name: String,
    },
}

pub async fn cmd_container(args: &ContainerArgs, services: &Services, quiet: bool) -> Result<()> {
    let client = services.engine();
    let engine = args.engine;
    match &args.command {
        ContainerSubcommands::Status { name } => {
            let state = client.container_status(engine, name).await?;
            if quiet {
                println!("{state}");
            } else {
                println!(
                    "{} {}",
                    style(format!("{name}:")).bold(),
                    state_style(&state.to_string())
                );
            }
        }
        ContainerSubcommands::Exists { name } => {
            let exists = client.container_exists(engine, name).await?;
            let ours = exists && client.is_created_by_kicup(engine, name).await;
            if quiet {
                println!("{exists}");
            } else if !exists {
                println!("{} {}", style(format!("{name}:")).bold(), style("not found").dim());
            } else if ours {
                println!("{} exists (created by kicup)", style(format!("{name}:")).bold());
            } else {
                println!(
                    "{} exists {}",
                    style(format!("{name}:")).bold(),
                    style("(not created by kicup)").yellow()
                );
            }
        }
        ContainerSubcommands::Start { name } => {
            let spinner = CommandSpinner::new_maybe(&format!("Starting {name}..."), quiet);
            spinner
                .wrap(client.container_start(engine, name), |_| format!("Started {name}"))
                .await?;
        }
        ContainerSubcommands::Stop { name } => {
            let spinner = CommandSpinner::new_maybe(&format!("Shutting down {name}..."), quiet);
            spinner
                .wrap(client.shut_down(engine, name), |_| format!("{name} stopped"))
                .await?;
        }
        ContainerSubcommands::Logs { name, lines } => {
            let rr = client.container_logs(engine, name).await?;
            let combined = format!("{}{}", rr.stdout_str(), rr.stderr_str());
            for line in tail(&combined, *lines) {
                println!("{}", log_level_style(line));
            }
        }
        ContainerSubcommands::Debug { name } => {
            if !quiet {
                eprintln!(
                    "{} Full inspect, logs and daemon info are logged at debug level (-vv)",
                    style("Note:").yellow()
                );
            }
            let excerpt = client.post_mortem_debug(engine, name).await;
            if excerpt.is_empty() {
                println!("{}", style("(no log output)").dim());
            } else {
                for line in excerpt.lines() {
                    println!("{}", log_level_style(line));
                }
            }
        }
        ContainerSubcommands::Port { name, port } => {
            let host_port = match port {
                Some(port) => client.forwarded_port(engine, name, *port).await?,
                None => client.ssh_port(engine, name).await?,
            };
            println!("{host_port}");
        }
        ContainerSubcommands::HostIp { name } => {
            let host = routable_host_ip_from_inside(client, engine, name).await?;
            println!("{host}");
        }
    }
    Ok(())
}

/// The last `n` lines of `text`, or all of them when `n` is 0
fn tail(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    if n == 0 || n >= lines.len() {
        return lines;
    }
    lines[lines.len() - n..].to_vec()
}
