//! Network subcommands

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use kicup_core::{Engine, Services};

use crate::output::CommandSpinner;

/// Network command arguments
#[derive(Args)]
pub struct NetworkArgs {
    #[command(subcommand)]
    command: NetworkSubcommands,
}

#[derive(Subcommand)]
pub enum NetworkSubcommands {
    /// Create a cluster network, or reuse an existing one
    Create {
        /// Network name
        name: String,

        /// Container engine to use
        #[arg(long, default_value = "docker")]
        engine: Engine,
    },
    /// Remove a cluster network
    Remove {
        /// Network name
        name: String,
    },
    /// Show the subnet and gateway of a network
    Inspect {
        /// Network name
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn cmd_network(args: &NetworkArgs, services: &Services, quiet: bool) -> Result<()> {
    let engine = services.engine();
    match &args.command {
        NetworkSubcommands::Create { name, engine: kind } => {
            let spinner = CommandSpinner::new_maybe(&format!("Creating network {name}..."), quiet);
            let gateway = spinner
                .wrap(engine.network_create(*kind, name), |gw| {
                    format!("Network {name} ready (gateway {gw})")
                })
                .await?;
            if quiet {
                println!("{gateway}");
            }
        }
        NetworkSubcommands::Remove { name } => {
            let spinner = CommandSpinner::new_maybe(&format!("Removing network {name}..."), quiet);
            spinner
                .wrap(engine.network_remove(name), |_| format!("Network {name} removed"))
                .await?;
        }
        NetworkSubcommands::Inspect { name, json } => {
            let info = engine.network_inspect(name).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}    {}", style("Subnet:").bold(), info.subnet);
                println!("{}   {}", style("Gateway:").bold(), info.gateway);
            }
        }
    }
    Ok(())
}
