// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Configuration Domain Model
//!
//! Defines the configuration records that describe coordinated agents: what
//! triggers them, which event types they subscribe to, and which event types
//! they publish after processing. Agents themselves (prompting, data access,
//! provider calls) live outside this crate and are reached through the
//! [`crate::application::dispatcher::AgentProcessor`] port.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent identity and declared event wiring
//!
//! # Invariants
//!
//! - Agent ids are unique within a roster and never empty
//! - Subscription entries are non-empty event-type strings

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Identifier of a configured agent (e.g. `"quality-agent"`).
///
/// Agents are declared in configuration rather than allocated at runtime, so
/// the identifier is the configured name, not a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Entities: Agent Configuration
// ============================================================================

/// How an agent is primarily triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Invoked by an operator chat command.
    Chat,
    /// Invoked on a schedule.
    Timer,
    /// Invoked by bus events it subscribes to.
    Event,
    /// Invoked by direct agent-to-agent requests.
    A2a,
}

/// Declared event wiring for a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier.
    pub id: AgentId,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// Primary trigger kind.
    pub trigger: TriggerKind,

    /// Event types this agent is notified about (may include `"*"`).
    #[serde(default)]
    pub subscribes: Vec<String>,

    /// Event types this agent republishes after a manual dispatch.
    ///
    /// Suppressed entirely when the dispatch itself was auto-triggered;
    /// see the loop-prevention rule on
    /// [`crate::application::dispatcher::AgentDispatcher`].
    #[serde(default)]
    pub publishes: Vec<String>,

    /// Subscriber priority; higher values are notified first.
    #[serde(default)]
    pub priority: i32,

    /// Per-dispatch timeout override (e.g. `timeout: 30s`).
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

// ============================================================================
// Aggregate: Agent Roster Manifest
// ============================================================================

/// K8s-style manifest wrapping the agent roster.
///
/// ```yaml
/// apiVersion: 100monkeys.ai/v1
/// kind: AgentRoster
/// metadata:
///   name: plant-floor
/// spec:
///   agents:
///     - id: oee-agent
///       trigger: event
///       subscribes: ["oee/updated"]
///       publishes: ["oee/analyzed"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoster {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: RosterMetadata,
    pub spec: RosterSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMetadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterSpec {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Expected `apiVersion` for roster manifests.
pub const ROSTER_API_VERSION: &str = "100monkeys.ai/v1";

/// Expected `kind` for roster manifests.
pub const ROSTER_KIND: &str = "AgentRoster";

impl AgentRoster {
    /// Validate manifest envelope and agent records.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if self.api_version != ROSTER_API_VERSION {
            return Err(AgentConfigError::InvalidApiVersion(
                self.api_version.clone(),
            ));
        }
        if self.kind != ROSTER_KIND {
            return Err(AgentConfigError::InvalidKind(self.kind.clone()));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.spec.agents {
            if agent.id.as_str().is_empty() {
                return Err(AgentConfigError::EmptyAgentId);
            }
            if !seen.insert(agent.id.clone()) {
                return Err(AgentConfigError::DuplicateAgentId(agent.id.clone()));
            }
            if agent.subscribes.iter().any(|s| s.is_empty()) {
                return Err(AgentConfigError::EmptySubscription {
                    agent: agent.id.clone(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("Invalid API version: expected '{ROSTER_API_VERSION}', got '{0}'")]
    InvalidApiVersion(String),

    #[error("Invalid kind: expected '{ROSTER_KIND}', got '{0}'")]
    InvalidKind(String),

    #[error("Agent id cannot be empty")]
    EmptyAgentId,

    #[error("Duplicate agent id '{0}' in roster")]
    DuplicateAgentId(AgentId),

    #[error("Agent '{agent}' declares an empty subscription event type")]
    EmptySubscription { agent: AgentId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(agents: Vec<AgentConfig>) -> AgentRoster {
        AgentRoster {
            api_version: ROSTER_API_VERSION.to_string(),
            kind: ROSTER_KIND.to_string(),
            metadata: RosterMetadata {
                name: "test".to_string(),
                version: None,
                description: None,
            },
            spec: RosterSpec { agents },
        }
    }

    fn agent(id: &str) -> AgentConfig {
        AgentConfig {
            id: AgentId::new(id),
            description: None,
            trigger: TriggerKind::Event,
            subscribes: vec!["oee/updated".to_string()],
            publishes: vec![],
            priority: 0,
            timeout: None,
        }
    }

    #[test]
    fn test_valid_roster() {
        let r = roster(vec![agent("oee-agent"), agent("quality-agent")]);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_duplicate_agent_id_rejected() {
        let r = roster(vec![agent("oee-agent"), agent("oee-agent")]);
        assert!(matches!(
            r.validate(),
            Err(AgentConfigError::DuplicateAgentId(_))
        ));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let mut r = roster(vec![agent("oee-agent")]);
        r.kind = "AgentManifest".to_string();
        assert!(matches!(r.validate(), Err(AgentConfigError::InvalidKind(_))));
    }

    #[test]
    fn test_empty_subscription_rejected() {
        let mut bad = agent("oee-agent");
        bad.subscribes.push(String::new());
        let r = roster(vec![bad]);
        assert!(matches!(
            r.validate(),
            Err(AgentConfigError::EmptySubscription { .. })
        ));
    }
}
