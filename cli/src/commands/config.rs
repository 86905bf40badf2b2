// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent roster management commands
//!
//! Commands: validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use plantmesh_coordinator_core::domain::subscription::WILDCARD_EVENT_TYPE;
use plantmesh_coordinator_core::infrastructure::agent_config_parser::AgentConfigParser;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate an agent roster and print the resolved subscription plan
    Validate {
        /// Path to the roster YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Validate { file } => validate(file).await,
    }
}

async fn validate(file: PathBuf) -> Result<()> {
    let roster = AgentConfigParser::parse_file(&file)
        .with_context(|| format!("Roster '{}' failed validation", file.display()))?;

    println!(
        "{} roster '{}' ({} agents)",
        "✓".green().bold(),
        roster.metadata.name.bold(),
        roster.spec.agents.len()
    );
    println!();

    println!("{}", "Subscription plan:".bold());
    let mut subscriptions = 0usize;
    for agent in &roster.spec.agents {
        for event_type in &agent.subscribes {
            subscriptions += 1;
            let rendered = if event_type == WILDCARD_EVENT_TYPE {
                "* (all events)".dimmed().to_string()
            } else {
                event_type.clone()
            };
            println!(
                "  {} ← {} (priority {})",
                rendered,
                agent.id.to_string().cyan(),
                agent.priority
            );
        }
        if agent.subscribes.is_empty() {
            println!(
                "  {} {}",
                agent.id.to_string().cyan(),
                "(no subscriptions)".dimmed()
            );
        }
    }
    println!();

    println!("{}", "Republish wiring (manual dispatches only):".bold());
    for agent in &roster.spec.agents {
        if !agent.publishes.is_empty() {
            println!(
                "  {} → {}",
                agent.id.to_string().cyan(),
                agent.publishes.join(", ")
            );
        }
    }

    println!();
    println!("{subscriptions} subscriptions would be installed");
    Ok(())
}
