//! Info command
//!
//! Shows what the daemon reports about its host.

use anyhow::Result;
use clap::Args;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Table};
use kicup_core::engine::SysInfo;
use kicup_core::{Engine, Services};

use crate::output::CommandSpinner;

/// Info command arguments
#[derive(Args)]
pub struct InfoArgs {
    /// Container engine to ask
    #[arg(long, default_value = "docker")]
    pub engine: Engine,

    /// Output as JSON instead of table format
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_info(args: &InfoArgs, services: &Services, quiet: bool) -> Result<()> {
    let spinner = CommandSpinner::new_maybe(
        &format!("Querying {} daemon...", args.engine),
        quiet || args.json,
    );
    let info = match services.engine().daemon_info(args.engine).await {
        Ok(info) => {
            spinner.success(&format!("{} daemon responded", args.engine));
            info
        }
        Err(e) => {
            spinner.fail(&format!("{} daemon did not respond", args.engine));
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info_table(&info));
    }
    Ok(())
}

fn info_table(info: &SysInfo) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Key", "Value"]);
    table.add_row(vec![Cell::new("cpus"), Cell::new(info.cpus.to_string())]);
    table.add_row(vec![
        Cell::new("memory"),
        Cell::new(format_memory(info.total_memory)),
    ]);
    table.add_row(vec![Cell::new("os_type"), Cell::new(&info.os_type)]);
    table.add_row(vec![
        Cell::new("storage_driver"),
        Cell::new(&info.storage_driver),
    ]);
    table.add_row(vec![
        Cell::new("swarm"),
        Cell::new(if info.swarm_active { "active" } else { "inactive" }),
    ]);
    table
}

/// Bytes as MiB, the unit the daemon's memory limits are checked in
fn format_memory(bytes: i64) -> String {
    format!("{} MiB", bytes / (1024 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_in_mebibytes() {
        assert_eq!(format_memory(2 * 1024 * 1024 * 1024), "2048 MiB");
        assert_eq!(format_memory(0), "0 MiB");
    }

    #[test]
    fn table_lists_every_field() {
        let info = SysInfo {
            cpus: 4,
            total_memory: 1024 * 1024 * 1024,
            os_type: "linux".to_string(),
            swarm_active: false,
            storage_driver: "overlay2".to_string(),
        };
        let rendered = info_table(&info).to_string();
        for needle in ["4", "1024 MiB", "linux", "overlay2", "inactive"] {
            assert!(rendered.contains(needle), "missing {needle}");
        }
    }
}
