//! # vernis
//!
//! Vernis - Build-time preprocessor for Blade templates.
//!
//! ## Name Origin
//!
//! **Vernis** (/vɛʁ.ni/) is French for varnish, the last coat an artist
//! brushes over a finished painting. This crate is the command-line entry
//! point that puts that last coat on a template tree: scoped styles and
//! scripts become cached, content-named assets, and every template is
//! rewritten to load them.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vernis")]
#[command(about = "Build-time preprocessor for Blade templates", long_about = None)]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long, action = clap::ArgAction::Version)]
    version: (),
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the template tree (default command)
    #[command(visible_alias = "atelier")]
    Build(commands::build::BuildArgs),
}

fn main() {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Build(args)) => commands::build::run(args),
        None => commands::build::run(commands::build::BuildArgs::default()),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `vernis=info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vernis=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
