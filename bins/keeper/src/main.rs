//! ns-keeper - keep a network namespace configured across reboots.

mod commands;
mod config;
mod output;
mod service;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use netns_keeper::probe::ProbeKind;
use tracing_subscriber::EnvFilter;

use crate::commands::{Context, require_root};
use crate::config::Config;
use crate::output::{OutputFormat, OutputOptions};

#[derive(Parser)]
#[command(
    name = "ns-keeper",
    version,
    about = "Keep a network namespace configured across reboots"
)]
struct Cli {
    /// Configuration file (default: /etc/netns-keeper/config.yaml if present).
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    /// More logging (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the namespace to the configured state.
    Add {
        /// Delete the namespace first and rebuild it.
        #[arg(short, long)]
        force: bool,
    },

    /// Same as `add --force`.
    #[command(name = "force-add")]
    ForceAdd,

    /// Show what `add` would change, without changing anything.
    Plan,

    /// Show the namespace state and the service state.
    Status,

    /// Ping the configured targets from inside the namespace.
    #[command(visible_alias = "test")]
    Test1,

    /// Measure throughput with iperf from inside the namespace.
    Test2,

    /// Install the binary, configuration and systemd units, then enable them.
    Install,

    /// Rewrite the systemd units and reload systemd.
    Update,

    /// Rewrite the units and restart the service.
    Reload,

    /// Rebuild the namespace from scratch and rewrite the units.
    Restart,

    /// Remove the namespace and the installed units.
    #[command(visible_alias = "remove")]
    Delete,

    /// Print the effective configuration.
    Config,
}

impl Command {
    /// Fold shorthand commands into the command they stand for.
    fn normalize(self) -> Self {
        match self {
            Command::ForceAdd => Command::Add { force: true },
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } | Command::ForceAdd => "add",
            Command::Plan => "plan",
            Command::Status => "status",
            Command::Test1 => "test1",
            Command::Test2 => "test2",
            Command::Install => "install",
            Command::Update => "update",
            Command::Reload => "reload",
            Command::Restart => "restart",
            Command::Delete => "delete",
            Command::Config => "config",
        }
    }

    fn needs_root(&self) -> bool {
        !matches!(self, Command::Config)
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, command: Command) -> anyhow::Result<()> {
    if command.needs_root() {
        require_root(command.name())?;
    }

    let (config, source) = Config::load(cli.config.as_deref())?;
    tracing::debug!(%source, namespace = %config.namespace, "configuration loaded");

    let ctx = Context {
        config,
        source,
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        },
        opts: OutputOptions { pretty: cli.pretty },
    };

    match command {
        Command::Add { force } => commands::reconcile::add(&ctx, force).await,
        Command::ForceAdd => commands::reconcile::add(&ctx, true).await,
        Command::Plan => commands::reconcile::plan_only(&ctx).await,
        Command::Status => commands::status::run(&ctx).await,
        Command::Test1 => commands::probe::run(&ctx, ProbeKind::Reachability).await,
        Command::Test2 => commands::probe::run(&ctx, ProbeKind::Throughput).await,
        Command::Install => commands::service::install(&ctx).await,
        Command::Update => commands::service::update(&ctx).await,
        Command::Reload => commands::service::reload(&ctx).await,
        Command::Restart => commands::reconcile::restart(&ctx).await,
        Command::Delete => commands::service::delete(&ctx).await,
        Command::Config => ctx.print(&ctx.config),
    }
}

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command.take() else {
        // No command: list what is available.
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    };

    if let Err(e) = run(cli, command.normalize()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["ns-keeper"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv)
            .unwrap()
            .command
            .map(Command::normalize)
            .unwrap()
    }

    #[test]
    fn test_force_add_forces() {
        assert!(matches!(parse(&["force-add"]), Command::Add { force: true }));
        assert!(matches!(parse(&["add", "--force"]), Command::Add { force: true }));
        assert!(matches!(parse(&["add"]), Command::Add { force: false }));
    }

    #[test]
    fn test_aliases() {
        assert!(matches!(parse(&["remove"]), Command::Delete));
        assert!(matches!(parse(&["test"]), Command::Test1));
    }

    #[test]
    fn test_root_requirement() {
        assert!(!parse(&["config"]).needs_root());
        assert!(parse(&["force-add"]).needs_root());
        assert_eq!(parse(&["force-add"]).name(), "add");
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
