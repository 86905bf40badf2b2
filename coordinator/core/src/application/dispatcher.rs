// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Dispatcher Application Service
//!
//! Bridges event-bus deliveries to agent processing and enforces the two
//! admission rules that keep cascades bounded:
//!
//! 1. **Rate limiting**: every dispatch passes the sliding-window gate
//!    before the agent processor is invoked; a rejected dispatch is dropped
//!    and counted, never queued.
//! 2. **Loop prevention**: an agent invoked as part of an automatic cascade
//!    (`auto_triggered = true`) has its configured `publishes` suppressed, so
//!    no event that arose from an automatic trigger can trigger another
//!    automatic cascade. Cascade depth is exactly one hop by construction.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Dispatch orchestration, subscription wiring, audit trail
//! - **Dependencies:** Domain (AgentConfig, Event), Infrastructure (EventBus,
//!   RateLimiter, AuditSink)

use crate::domain::agent::{AgentConfig, AgentId};
use crate::domain::event::{Event, PublishOptions};
use crate::domain::subscription::{EventHandler, Subscription};
use crate::infrastructure::audit::{AuditEntry, AuditFlags, AuditSink};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Longest response excerpt kept in an audit entry.
const AUDIT_RESPONSE_EXCERPT: usize = 200;

// ============================================================================
// Ports
// ============================================================================

/// External agent processing collaborator (prompting, provider calls, data
/// access all live behind this seam).
#[async_trait]
pub trait AgentProcessor: Send + Sync {
    async fn process(
        &self,
        agent: &AgentConfig,
        message: &str,
        auto_triggered: bool,
    ) -> anyhow::Result<String>;
}

// ============================================================================
// Dispatch Outcomes
// ============================================================================

/// Terminal state of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Dropped by admission control before the processor ran.
    Rejected,
    Succeeded,
    Failed,
    TimedOut,
}

/// Structured result of one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub agent_id: AgentId,
    pub status: DispatchStatus,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// Application Service: AgentDispatcher
// ============================================================================

/// Invokes agents in response to bus events or direct commands, enforcing
/// admission control and loop prevention, and deriving the bus subscription
/// set from the installed agent configuration.
pub struct AgentDispatcher {
    bus: Arc<EventBus>,
    processor: Arc<dyn AgentProcessor>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
    /// Installed roster, in declaration order (ties in subscription priority
    /// are broken by this order).
    configs: RwLock<Vec<AgentConfig>>,
}

impl AgentDispatcher {
    pub fn new(
        bus: Arc<EventBus>,
        processor: Arc<dyn AgentProcessor>,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            bus,
            processor,
            rate_limiter,
            audit,
            configs: RwLock::new(Vec::new()),
        }
    }

    /// Install a new agent configuration and rebuild the subscription set.
    ///
    /// Safe to re-run on every configuration reload: the bus subscription set
    /// is replaced wholesale, never diffed.
    pub async fn install_agents(self: &Arc<Self>, agents: Vec<AgentConfig>) -> usize {
        {
            let mut configs = self.configs.write().await;
            *configs = agents;
        }
        self.build_event_subscriptions().await
    }

    /// Derive and install the bus subscription set from the current
    /// configuration (idempotent full replace). Returns the subscription
    /// count.
    pub async fn build_event_subscriptions(self: &Arc<Self>) -> usize {
        let configs = self.configs.read().await;
        let mut subscriptions = Vec::new();

        for agent in configs.iter() {
            for event_type in &agent.subscribes {
                let handler: Arc<dyn EventHandler> = Arc::new(CascadeHandler {
                    dispatcher: Arc::downgrade(self),
                    agent_id: agent.id.clone(),
                });
                subscriptions.push(Subscription::new(
                    event_type.clone(),
                    agent.id.clone(),
                    agent.priority,
                    handler,
                ));
            }
        }
        drop(configs);

        let installed = self.bus.replace_subscriptions(subscriptions).await;
        info!(subscriptions = installed, "event subscriptions rebuilt");
        installed
    }

    /// Dispatch a message to one agent.
    ///
    /// `auto_triggered` marks invocations that are themselves the product of
    /// an event cascade; such dispatches never republish. `trigger` carries
    /// the bus event that caused an automatic dispatch, for the audit trail.
    pub async fn dispatch(
        &self,
        agent_id: &AgentId,
        message: &str,
        auto_triggered: bool,
        trigger: Option<&Event>,
    ) -> DispatchOutcome {
        let Some(agent) = self.agent_config(agent_id).await else {
            return DispatchOutcome {
                agent_id: agent_id.clone(),
                status: DispatchStatus::Failed,
                response: None,
                error: Some(format!("agent '{agent_id}' is not configured")),
            };
        };

        if !self.rate_limiter.try_admit(agent_id.as_str()) {
            debug!(agent_id = %agent_id, "dispatch rejected by rate limiter");
            return DispatchOutcome {
                agent_id: agent_id.clone(),
                status: DispatchStatus::Rejected,
                response: None,
                error: Some("rate limit exceeded".to_string()),
            };
        }

        let processing = self.processor.process(&agent, message, auto_triggered);
        let result = match agent.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, processing).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(agent_id = %agent_id, timeout = ?deadline, "agent processing timed out");
                    self.record_audit(&agent, trigger, auto_triggered, Err("timed out"));
                    return DispatchOutcome {
                        agent_id: agent_id.clone(),
                        status: DispatchStatus::TimedOut,
                        response: None,
                        error: Some(format!("processing timed out after {deadline:?}")),
                    };
                }
            },
            None => processing.await,
        };

        match result {
            Ok(response) => {
                self.record_audit(&agent, trigger, auto_triggered, Ok(&response));

                if auto_triggered {
                    if !agent.publishes.is_empty() {
                        debug!(
                            agent_id = %agent_id,
                            suppressed = agent.publishes.len(),
                            "loop prevention: auto-triggered dispatch does not republish"
                        );
                    }
                } else {
                    self.republish(&agent, &response).await;
                }

                DispatchOutcome {
                    agent_id: agent_id.clone(),
                    status: DispatchStatus::Succeeded,
                    response: Some(response),
                    error: None,
                }
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(agent_id = %agent_id, error = %message, "agent processing failed");
                self.record_audit(&agent, trigger, auto_triggered, Err(&message));
                DispatchOutcome {
                    agent_id: agent_id.clone(),
                    status: DispatchStatus::Failed,
                    response: None,
                    error: Some(message),
                }
            }
        }
    }

    /// Publish the agent's declared derived events after a manual dispatch.
    async fn republish(&self, agent: &AgentConfig, response: &str) {
        for event_type in &agent.publishes {
            let receipt = self
                .bus
                .publish(
                    event_type,
                    json!({ "text": response }),
                    agent.id.as_str(),
                    PublishOptions {
                        priority: agent.priority,
                        timeout: agent.timeout,
                        parallel: true,
                    },
                )
                .await;
            debug!(
                event_type = %event_type,
                source = %agent.id,
                deliveries = receipt.results.len(),
                "derived event republished"
            );
        }
    }

    /// Best-effort audit record; never blocks or fails the dispatch.
    fn record_audit(
        &self,
        agent: &AgentConfig,
        trigger: Option<&Event>,
        auto_triggered: bool,
        result: Result<&str, &str>,
    ) {
        let (response, error) = match result {
            Ok(response) => (Some(excerpt(response)), None),
            Err(error) => (None, Some(error.to_string())),
        };
        let entry = AuditEntry::new(
            trigger
                .map(|e| e.event_type.clone())
                .unwrap_or_else(|| "dispatch/manual".to_string()),
            trigger
                .map(|e| e.source.clone())
                .unwrap_or_else(|| agent.id.to_string()),
            json!({
                "agent": agent.id,
                "trigger_event": trigger.map(|e| e.id.to_string()),
                "response": response,
                "error": error,
            }),
            AuditFlags {
                auto_triggered,
                a2a: false,
            },
        );

        let audit = self.audit.clone();
        tokio::spawn(async move { audit.record(entry).await });
    }

    async fn agent_config(&self, agent_id: &AgentId) -> Option<AgentConfig> {
        self.configs
            .read()
            .await
            .iter()
            .find(|a| &a.id == agent_id)
            .cloned()
    }
}

fn excerpt(response: &str) -> String {
    if response.len() <= AUDIT_RESPONSE_EXCERPT {
        response.to_string()
    } else {
        let mut cut = AUDIT_RESPONSE_EXCERPT;
        while !response.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &response[..cut])
    }
}

/// Renders a bus event as the text message handed to the agent processor.
/// Prompt construction proper is the processor's concern.
fn render_event_message(event: &Event) -> String {
    format!("[{}] {}", event.event_type, event.payload)
}

// ============================================================================
// Bus Handler: automatic cascade hop
// ============================================================================

/// Subscription handler installed per (agent, event type). Every delivery
/// through here is by definition an automatic trigger, so the dispatch runs
/// with `auto_triggered = true` and can never republish.
struct CascadeHandler {
    dispatcher: Weak<AgentDispatcher>,
    agent_id: AgentId,
}

#[async_trait]
impl EventHandler for CascadeHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<serde_json::Value> {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            anyhow::bail!("dispatcher has shut down");
        };

        let message = render_event_message(event);
        let outcome = dispatcher
            .dispatch(&self.agent_id, &message, true, Some(event))
            .await;

        match outcome.status {
            DispatchStatus::Succeeded => Ok(json!({
                "agent": outcome.agent_id,
                "response": outcome.response,
            })),
            _ => anyhow::bail!(
                outcome
                    .error
                    .unwrap_or_else(|| "dispatch failed".to_string())
            ),
        }
    }
}
