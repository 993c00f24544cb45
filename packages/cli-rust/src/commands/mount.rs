//! Mount subcommands
//!
//! Checks `<host path>:<container path>[:<options>]` specs the way node
//! creation parses them.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Table};
use kicup_core::hostnet::{Mount, MountPropagation, parse_mount_spec};

/// Mount command arguments
#[derive(Args)]
pub struct MountArgs {
    #[command(subcommand)]
    command: MountSubcommands,
}

#[derive(Subcommand)]
pub enum MountSubcommands {
    /// Parse a mount spec and show how it will be passed to the engine
    Parse {
        /// Mount spec, e.g. /src:/dst:ro,Z
        spec: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_mount(args: &MountArgs, quiet: bool) -> Result<()> {
    match &args.command {
        MountSubcommands::Parse { spec, json } => {
            let mount = parse_mount_spec(spec)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&mount)?);
            } else if quiet {
                println!("{}", mount.volume_arg());
            } else {
                println!("{}", mount_table(&mount));
            }
        }
    }
    Ok(())
}

fn mount_table(mount: &Mount) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec![
        Cell::new("host_path"),
        Cell::new(if mount.host_path.is_empty() {
            "(anonymous volume)"
        } else {
            mount.host_path.as_str()
        }),
    ]);
    table.add_row(vec![
        Cell::new("container_path"),
        Cell::new(&mount.container_path),
    ]);
    table.add_row(vec![
        Cell::new("readonly"),
        Cell::new(mount.readonly.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("selinux_relabel"),
        Cell::new(mount.selinux_relabel.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("propagation"),
        Cell::new(propagation_name(mount.propagation)),
    ]);
    table.add_row(vec![Cell::new("engine arg"), Cell::new(mount.volume_arg())]);
    table
}

fn propagation_name(propagation: MountPropagation) -> &'static str {
    match propagation {
        MountPropagation::None => "private",
        MountPropagation::HostToContainer => "rslave",
        MountPropagation::Bidirectional => "rshared",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shows_the_engine_argument() {
        let mount = parse_mount_spec("/src:/dst:ro,rshared").unwrap();
        let rendered = mount_table(&mount).to_string();
        assert!(rendered.contains("--volume=/src:/dst:ro,rshared"));
        assert!(rendered.contains("rshared"));
    }

    #[test]
    fn anonymous_volume_is_labelled() {
        let mount = parse_mount_spec("/data").unwrap();
        assert!(mount_table(&mount).to_string().contains("(anonymous volume)"));
    }
}
