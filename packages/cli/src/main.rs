mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{inspect, replay, verify, InspectArgs, ReplayArgs, VerifyArgs};
use std::path::PathBuf;

/// Tiledoc CLI - inspect and replay document history logs
#[derive(Parser, Debug)]
#[command(name = "tiledoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing tiledoc.config.json (defaults to the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log history engine activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the entries of a saved history log
    Inspect(InspectArgs),

    /// Rebuild tree snapshots from a saved history log
    Replay(ReplayArgs),

    /// Check that a saved history log replays and reverts cleanly
    Verify(VerifyArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let config_dir = match cli.config {
        Some(dir) => dir,
        None => std::env::current_dir().expect("Cannot get current directory"),
    };

    let result = match cli.command {
        Command::Inspect(args) => inspect(args),
        Command::Replay(args) => replay(args, &config_dir),
        Command::Verify(args) => verify(args, &config_dir),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
