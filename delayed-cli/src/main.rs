//! delayed-job — schedule a CI workflow to run later from a copy of a template.
//!
//! # Usage
//!
//! ```text
//! delayed-job schedule --template <file> [--add-tag <tag>] [--target-branch <b>] [--dry-run] ...
//! delayed-job unschedule [--delete-tag]
//! delayed-job transform <template> [--ref <r>] [--tag] [--output <file>] ...
//! ```
//!
//! When run as a GitHub Action every option is also read from its
//! `INPUT_*` variable.

mod commands;
mod outputs;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{schedule::ScheduleArgs, transform::TransformArgs, unschedule::UnscheduleArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "delayed-job",
    version,
    about = "Publish a delayed copy of a workflow and clean it up afterwards",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform the template and publish it into the target repository.
    Schedule(ScheduleArgs),

    /// Remove the scheduled workflow this job was started from.
    Unschedule(UnscheduleArgs),

    /// Transform a template locally without contacting the remote.
    Transform(TransformArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Schedule(args) => args.run(),
        Commands::Unschedule(args) => args.run(),
        Commands::Transform(args) => args.run(),
    }
}

/// Log to stderr so stdout stays usable for documents and outputs.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
