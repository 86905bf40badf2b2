// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted coordination session against in-process mock collaborators.
//!
//! Exercises the full engine surface: roster install, event publishing with
//! cascade, a production workflow run, and the metrics snapshots.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use plantmesh_coordinator_core::application::dispatcher::{AgentDispatcher, AgentProcessor};
use plantmesh_coordinator_core::application::production_workflow::{
    ProductionWorkflowConfig, ProductionWorkflowEngine,
};
use plantmesh_coordinator_core::domain::agent::{AgentConfig, AgentId};
use plantmesh_coordinator_core::domain::event::{PublishOptions, PublishReceipt};
use plantmesh_coordinator_core::domain::workflow::FinalDisposition;
use plantmesh_coordinator_core::infrastructure::a2a::{A2ACorrelator, A2ATargetService};
use plantmesh_coordinator_core::infrastructure::agent_config_parser::AgentConfigParser;
use plantmesh_coordinator_core::infrastructure::audit::TracingAuditSink;
use plantmesh_coordinator_core::infrastructure::event_bus::EventBus;
use plantmesh_coordinator_core::infrastructure::rate_limiter::RateLimiter;

#[derive(Args)]
pub struct DemoArgs {
    /// Order analyzed by the production workflow
    #[arg(long, default_value = "PO-1001")]
    order: String,

    /// Compliance result fed to the workflow (try "order BLOCKED: hold")
    #[arg(long, default_value = "COMPLIANT: all required standards satisfied")]
    compliance_text: String,
}

const DEMO_ROSTER: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: AgentRoster
metadata:
  name: demo-plant-floor
spec:
  agents:
    - id: oee-agent
      trigger: event
      subscribes: ["oee/updated"]
      publishes: ["oee/analyzed"]
      priority: 5
    - id: maintenance-agent
      trigger: event
      subscribes: ["oee/analyzed"]
      publishes: ["maintenance/scheduled"]
    - id: audit-agent
      trigger: event
      subscribes: ["*"]
      priority: -10
"#;

/// Canned agent responses; stands in for the external prompting/provider
/// stack.
struct DemoProcessor;

#[async_trait]
impl AgentProcessor for DemoProcessor {
    async fn process(
        &self,
        agent: &AgentConfig,
        message: &str,
        auto_triggered: bool,
    ) -> anyhow::Result<String> {
        let mode = if auto_triggered { "auto" } else { "manual" };
        Ok(format!(
            "{} handled ({mode}): {}",
            agent.id,
            message.chars().take(60).collect::<String>()
        ))
    }
}

struct DemoService {
    text: String,
}

#[async_trait]
impl A2ATargetService for DemoService {
    async fn handle(
        &self,
        _action: &str,
        _payload: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        Ok(json!({ "text": self.text }))
    }
}

pub async fn run(args: DemoArgs) -> Result<()> {
    // -- Wire the engine
    let bus = Arc::new(EventBus::with_default_capacity());
    let rate_limiter = Arc::new(RateLimiter::new(20, Duration::from_secs(60)));
    let dispatcher = Arc::new(AgentDispatcher::new(
        bus.clone(),
        Arc::new(DemoProcessor),
        rate_limiter.clone(),
        Arc::new(TracingAuditSink),
    ));

    let roster = AgentConfigParser::parse_yaml(DEMO_ROSTER)?;
    let installed = dispatcher.install_agents(roster.spec.agents).await;
    println!(
        "{} roster installed ({installed} subscriptions)",
        "✓".green().bold()
    );

    // -- Publish a plant event and show the cascade outcomes
    println!();
    println!("{}", "Publishing oee/updated...".bold());
    let receipt = bus
        .publish(
            "oee/updated",
            json!({"line": "L2", "oee": 0.71, "shift": "B"}),
            "mock-adapter",
            PublishOptions::default(),
        )
        .await;
    render_receipt(&receipt);

    // -- Manual dispatch: republish is allowed, cascading exactly one hop
    println!();
    println!("{}", "Manual dispatch to oee-agent...".bold());
    let outcome = dispatcher
        .dispatch(
            &AgentId::new("oee-agent"),
            "analyze OEE for shift B",
            false,
            None,
        )
        .await;
    println!(
        "  {:?}: {}",
        outcome.status,
        outcome.response.as_deref().unwrap_or("-")
    );

    // -- Production workflow
    let a2a = Arc::new(A2ACorrelator::new(Duration::from_secs(10)));
    let wf_config = ProductionWorkflowConfig::default();
    a2a.register_target(
        wf_config.compliance_agent.clone(),
        Arc::new(DemoService {
            text: args.compliance_text.clone(),
        }),
    )
    .await;
    a2a.register_target(
        wf_config.assessment_agent.clone(),
        Arc::new(DemoService {
            text: "batch assessment: no anomalies".to_string(),
        }),
    )
    .await;
    a2a.register_target(
        wf_config.status_agent.clone(),
        Arc::new(DemoService {
            text: "status recorded in MES".to_string(),
        }),
    )
    .await;

    let engine = ProductionWorkflowEngine::new(a2a, Arc::new(TracingAuditSink), wf_config);

    println!();
    println!(
        "{}",
        format!("Running production workflow for {}...", args.order).bold()
    );
    let workflow = engine.run_order_analysis(&args.order).await?;
    for step in &workflow.steps {
        println!(
            "  step {} {} [{:?}] {}",
            step.ordinal,
            step.name,
            step.status,
            step.result_text().unwrap_or("-").dimmed()
        );
    }
    let disposition = workflow
        .final_status
        .map(|d| match d {
            FinalDisposition::Approved => d.to_string().green().bold(),
            FinalDisposition::Blocked => d.to_string().red().bold(),
            _ => d.to_string().yellow().bold(),
        })
        .unwrap_or_else(|| "NONE".dimmed().bold());
    println!("  disposition: {disposition}");

    // -- Snapshots
    println!();
    println!("{}", "Bus metrics:".bold());
    println!("{}", serde_json::to_string_pretty(&bus.metrics().await)?);
    println!("{}", "Workflow stats:".bold());
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    println!("{}", "Rate limiter:".bold());
    println!("{}", serde_json::to_string_pretty(&rate_limiter.stats())?);

    Ok(())
}

fn render_receipt(receipt: &PublishReceipt) {
    if receipt.results.is_empty() {
        println!("  {}", "(no subscribers)".dimmed());
        return;
    }
    for result in &receipt.results {
        let marker = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {marker} {} {}",
            result.agent_id.to_string().cyan(),
            result
                .error
                .as_deref()
                .unwrap_or("delivered")
                .dimmed()
        );
    }
}
