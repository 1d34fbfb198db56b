//! Lookout CLI - watch paths from the terminal
//!
//! Wires an inotify bridge to a tokio loop and prints every change it
//! reports, either as colored lines or as NDJSON.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "lookout")]
#[command(author = "Lookout Contributors")]
#[command(version)]
#[command(about = "Watch files and directories for changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print change events
    Watch {
        /// Files or directories to watch (not recursive)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Comma-separated change kinds (see `lookout events`)
        #[arg(short, long, default_value = "create,delete,close_write")]
        events: String,

        /// How to wake up: `poll` on an interval, or `readable`
        #[arg(short, long)]
        mode: Option<String>,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// JSON file with bridge settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print events as NDJSON
        #[arg(long)]
        json: bool,
    },

    /// List the change kinds that can be watched
    Events,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Watch {
            paths,
            events,
            mode,
            interval_ms,
            config,
            json,
        } => {
            let options = commands::WatchOptions {
                paths,
                events,
                mode,
                interval_ms,
                config,
                json,
            };
            commands::watch(options).await
        }
        Commands::Events => commands::events(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
