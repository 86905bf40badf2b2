// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # PlantMesh Coordination CLI
//!
//! The `plantmesh` binary drives the coordination engine from the terminal:
//!
//! - `plantmesh config validate <file>` - Parse an agent roster and print the
//!   resolved subscription plan
//! - `plantmesh demo` - Run a scripted coordination session against
//!   in-process mock collaborators
//!
//! All coordination logic lives in `plantmesh-coordinator-core`; this crate
//! only parses arguments, initializes logging, and renders results.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, DemoArgs};

/// PlantMesh - agent coordination for manufacturing operations
#[derive(Parser)]
#[command(name = "plantmesh")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PLANTMESH_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent roster management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run a scripted coordination session with mock collaborators
    #[command(name = "demo")]
    Demo {
        #[command(flatten)]
        args: DemoArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Config { command } => commands::config::handle_command(command).await,
        Commands::Demo { args } => commands::demo::run(args).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plantmesh={level},plantmesh_coordinator_core={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
