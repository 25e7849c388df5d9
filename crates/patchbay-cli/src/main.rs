//! Patchbay CLI - Command-line front end for the patchbay audio graph runtime.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about = "Patchbay audio graph CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an instruction batch and render the graph offline to a WAV file
    Render(commands::render::RenderArgs),

    /// List available node kinds and their parameters
    Kinds(commands::kinds::KindsArgs),

    /// Parse and apply an instruction batch, reporting its status
    Check(commands::check::CheckArgs),

    /// Render a sine test tone built as a node tree
    Tone(commands::tone::ToneArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Kinds(args) => commands::kinds::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Tone(args) => commands::tone::run(args),
    }
}
