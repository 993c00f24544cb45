//! kicup CLI - Inspect the container daemon behind a local cluster
//!
//! This module contains the CLI implementation used by the `kicup` binary.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use kicup_core::{Services, get_version, get_version_long};
use tracing_subscriber::EnvFilter;

/// Inspect and reach the container daemon behind a local cluster
#[derive(Parser)]
#[command(name = "kicup")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and reach the container daemon behind a local cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daemon context commands will run against
    Context(commands::ContextArgs),
    /// Show what the daemon reports about its host
    Info(commands::InfoArgs),
    /// Manage cluster networks
    Network(commands::NetworkArgs),
    /// Inspect node containers
    Container(commands::ContainerArgs),
    /// Open SSH tunnels to a remote daemon host
    Tunnel(commands::TunnelArgs),
    /// Check mount specifications
    Mount(commands::MountArgs),
    /// Show configuration
    Config(commands::ConfigArgs),
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise each `-v` raises the level from
/// `warn`. Logs go to stderr so command output stays pipeable.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Configure color output
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_tracing(cli.verbose, cli.quiet);

    let Some(command) = cli.command else {
        // No command - show a welcome message and hint to use --help
        if !cli.quiet {
            println!(
                "{} {}",
                style("kicup").cyan().bold(),
                style(if cli.verbose > 0 {
                    get_version_long()
                } else {
                    get_version()
                })
                .dim()
            );
            println!();
            println!("Run {} for available commands.", style("--help").green());
        }
        return Ok(());
    };

    let services = Services::global();
    if cli.verbose > 0 {
        if let Some(path) = kicup_core::config::get_config_path() {
            eprintln!("{} Config: {}", style("[info]").cyan(), path.display());
        }
    }

    match command {
        Commands::Context(args) => commands::cmd_context(&args, services, cli.quiet),
        Commands::Config(args) => commands::cmd_config(&args, services.config(), cli.quiet),
        Commands::Mount(args) => commands::cmd_mount(&args, cli.quiet),
        Commands::Info(args) => block_on(services, commands::cmd_info(&args, services, cli.quiet)),
        Commands::Network(args) => {
            block_on(services, commands::cmd_network(&args, services, cli.quiet))
        }
        Commands::Container(args) => {
            block_on(services, commands::cmd_container(&args, services, cli.quiet))
        }
        Commands::Tunnel(args) => {
            block_on(services, commands::cmd_tunnel(&args, services, cli.quiet))
        }
    }
}

/// Run an async command on a fresh runtime
///
/// Tunnels and TLS directories never outlive the command, whether it
/// succeeded or not.
fn block_on(services: &'static Services, command: impl Future<Output = Result<()>>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(command);
    rt.block_on(services.shutdown());
    result
}

/// Print `err` to stderr with cause-specific tips
pub fn report_error(err: &anyhow::Error) {
    eprintln!("{}", output::format_error(err));
}
