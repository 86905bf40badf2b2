// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the event coordination pipeline:
//! 1. Parse an agent roster from YAML
//! 2. Install it into the dispatcher (subscription rebuild)
//! 3. Publish events and verify delivery outcomes, admission control,
//!    and the one-hop loop-prevention guarantee

use async_trait::async_trait;
use parking_lot::Mutex;
use plantmesh_coordinator_core::application::dispatcher::{
    AgentDispatcher, AgentProcessor, DispatchStatus,
};
use plantmesh_coordinator_core::domain::agent::{AgentConfig, AgentId};
use plantmesh_coordinator_core::domain::event::{EventFilter, PublishOptions};
use plantmesh_coordinator_core::infrastructure::agent_config_parser::AgentConfigParser;
use plantmesh_coordinator_core::infrastructure::audit::NoopAuditSink;
use plantmesh_coordinator_core::infrastructure::event_bus::EventBus;
use plantmesh_coordinator_core::infrastructure::rate_limiter::RateLimiter;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ROSTER_YAML: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: AgentRoster
metadata:
  name: plant-floor
spec:
  agents:
    - id: oee-agent
      trigger: event
      subscribes: ["oee/updated"]
      publishes: ["oee/analyzed"]
      priority: 5
    - id: maintenance-agent
      trigger: event
      subscribes: ["oee/updated"]
      publishes: ["maintenance/scheduled"]
    - id: flaky-agent
      trigger: event
      subscribes: ["oee/updated"]
"#;

/// Processor that records invocations; agents whose id contains "flaky"
/// raise a provider error.
struct PlantProcessor {
    calls: Mutex<Vec<(String, bool)>>,
}

impl PlantProcessor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AgentProcessor for PlantProcessor {
    async fn process(
        &self,
        agent: &AgentConfig,
        _message: &str,
        auto_triggered: bool,
    ) -> anyhow::Result<String> {
        self.calls
            .lock()
            .push((agent.id.to_string(), auto_triggered));
        if agent.id.as_str().contains("flaky") {
            anyhow::bail!("provider quota exhausted");
        }
        Ok(format!("{} processed", agent.id))
    }
}

struct Harness {
    bus: Arc<EventBus>,
    dispatcher: Arc<AgentDispatcher>,
    processor: Arc<PlantProcessor>,
    rate_limiter: Arc<RateLimiter>,
}

async fn harness(max_calls: usize) -> Harness {
    let bus = Arc::new(EventBus::with_default_capacity());
    let processor = PlantProcessor::new();
    let rate_limiter = Arc::new(RateLimiter::new(max_calls, Duration::from_secs(60)));
    let dispatcher = Arc::new(AgentDispatcher::new(
        bus.clone(),
        processor.clone(),
        rate_limiter.clone(),
        Arc::new(NoopAuditSink),
    ));

    let roster = AgentConfigParser::parse_yaml(ROSTER_YAML).expect("roster parses");
    dispatcher.install_agents(roster.spec.agents).await;

    Harness {
        bus,
        dispatcher,
        processor,
        rate_limiter,
    }
}

#[tokio::test]
async fn test_publish_returns_one_outcome_per_subscriber() {
    let h = harness(100).await;

    let receipt = h
        .bus
        .publish(
            "oee/updated",
            json!({"line": "L2", "oee": 0.71}),
            "mock-adapter",
            PublishOptions::default(),
        )
        .await;

    // Three subscribers, three outcomes, regardless of the flaky failure.
    assert_eq!(receipt.results.len(), 3);
    let successes = receipt.results.iter().filter(|r| r.success).count();
    assert_eq!(successes, 2);

    let flaky = receipt
        .results
        .iter()
        .find(|r| r.agent_id == AgentId::new("flaky-agent"))
        .expect("flaky outcome present");
    assert!(!flaky.success);
    assert!(flaky.error.as_deref().unwrap().contains("quota exhausted"));
}

#[tokio::test]
async fn test_cascade_depth_is_exactly_one_hop() {
    let h = harness(100).await;

    h.bus
        .publish(
            "oee/updated",
            json!({"oee": 0.65}),
            "mock-adapter",
            PublishOptions::default(),
        )
        .await;

    let calls = h.processor.calls();
    // All three subscribers ran as automatic triggers. oee-agent and
    // maintenance-agent both declare `publishes`, but their dispatches were
    // auto-triggered, so nothing was republished and nothing else ran.
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, auto)| *auto));

    let history = h.bus.event_history(&EventFilter::default());
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_manual_dispatch_cascades_once_then_stops() {
    let h = harness(100).await;

    let outcome = h
        .dispatcher
        .dispatch(&AgentId::new("oee-agent"), "analyze morning shift", false, None)
        .await;
    assert_eq!(outcome.status, DispatchStatus::Succeeded);

    // The manual hop republished "oee/analyzed"; nothing subscribes to it in
    // this roster, so the cascade ends there as a logged no-op.
    let history = h.bus.event_history(&EventFilter {
        event_type: Some("oee/analyzed".to_string()),
        ..Default::default()
    });
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, "oee-agent");

    assert_eq!(h.processor.calls().len(), 1);
}

#[tokio::test]
async fn test_rate_limiter_gates_cascaded_dispatches() {
    let h = harness(5).await;

    // Each publish notifies 3 subscribers; the second publish exhausts the
    // 5-call window partway through.
    let first = h
        .bus
        .publish("oee/updated", json!({}), "t", PublishOptions::default())
        .await;
    let second = h
        .bus
        .publish("oee/updated", json!({}), "t", PublishOptions::default())
        .await;

    let admitted = first
        .results
        .iter()
        .chain(second.results.iter())
        .filter(|r| r.error.as_deref() != Some("rate limit exceeded"))
        .count();
    assert_eq!(admitted, 5);
    assert_eq!(h.rate_limiter.blocked_total(), 1);
    assert_eq!(h.processor.calls().len(), 5);
}

#[tokio::test]
async fn test_publish_without_subscribers_is_structured_noop() {
    let h = harness(100).await;

    let receipt = h
        .bus
        .publish(
            "energy/spike",
            json!({"kw": 1200}),
            "scada-adapter",
            PublishOptions::default(),
        )
        .await;

    assert!(receipt.results.is_empty());
    assert_eq!(receipt.event.event_type, "energy/spike");
    assert_eq!(h.processor.calls().len(), 0);
}

#[tokio::test]
async fn test_roster_reload_replaces_subscriptions() {
    let h = harness(100).await;

    // Reload with a single agent; the old wiring must be gone.
    let replacement = vec![AgentConfig {
        id: AgentId::new("quality-agent"),
        description: None,
        trigger: plantmesh_coordinator_core::domain::agent::TriggerKind::Event,
        subscribes: vec!["qc/alert".to_string()],
        publishes: vec![],
        priority: 0,
        timeout: None,
    }];
    let installed = h.dispatcher.install_agents(replacement).await;
    assert_eq!(installed, 1);

    let receipt = h
        .bus
        .publish("oee/updated", json!({}), "t", PublishOptions::default())
        .await;
    assert!(receipt.results.is_empty());

    let receipt = h
        .bus
        .publish("qc/alert", json!({"lot": "B-17"}), "t", PublishOptions::default())
        .await;
    assert_eq!(receipt.results.len(), 1);
    assert!(receipt.results[0].success);
}
