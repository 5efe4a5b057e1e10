//! Pressroom: deployment tracking for content publishes.
//!
//! # Usage
//!
//! ```text
//! pressroom daemon start|stop|status
//! pressroom track <sha> --action <text> [--item <id>]
//! pressroom status [--json]
//! pressroom history [--json] [--show-superseded]
//! pressroom config show|set <key> <value>
//! pressroom watch [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, history::HistoryArgs, status::StatusArgs,
    track::TrackArgs, watch::WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "pressroom",
    version,
    about = "Track content publishes through CI until they land",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or control the background tracker.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Start tracking a publish by its commit sha.
    Track(TrackArgs),

    /// Show the publishing banner and active deployments.
    Status(StatusArgs),

    /// Show reconciled deployment history.
    History(HistoryArgs),

    /// Show or change settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Stream tracker events until interrupted.
    Watch(WatchArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Track(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::History(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Watch(args) => args.run(),
    }
}
