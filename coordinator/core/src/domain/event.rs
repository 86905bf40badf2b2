// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event Domain Model
//!
//! Defines the immutable [`Event`] record carried by the coordination bus,
//! the publish-time options, the history filter, and the per-subscriber
//! delivery outcome records returned from a publish call.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Event records and delivery outcome value objects
//!
//! # Invariants
//!
//! - An `Event` is never mutated after construction
//! - Event types are hierarchical strings, e.g. `oee/updated`

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Delivery deadline applied when a publish does not override it.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier for a published [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entity: Event
// ============================================================================

/// Immutable event record.
///
/// Constructed once at publish time, appended to the bus history, and handed
/// to subscribers by shared reference. The retry budget is carried as data
/// for parity with the operational schema; no automatic re-delivery exists,
/// so it is always zero in practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    /// Hierarchical event type, e.g. `order/created` or `oee/updated`.
    pub event_type: String,

    /// Opaque structured payload; the bus never inspects it.
    pub payload: serde_json::Value,

    /// Identifier of the publishing component or agent.
    pub source: String,

    pub created_at: DateTime<Utc>,

    /// Subscriber notification priority carried for observability; the
    /// ordering that matters is the per-subscription priority.
    pub priority: i32,

    /// Per-handler delivery deadline for this event.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Remaining automatic re-deliveries. Always 0; see type docs.
    pub retry_budget: u32,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
        options: &PublishOptions,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            payload,
            source: source.into(),
            created_at: Utc::now(),
            priority: options.priority,
            timeout: options.timeout.unwrap_or(DEFAULT_DISPATCH_TIMEOUT),
            retry_budget: 0,
        }
    }
}

// ============================================================================
// Value Objects: Publish Options & History Filter
// ============================================================================

/// Options accepted by `EventBus::publish`.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Priority stamped on the event record.
    pub priority: i32,

    /// Per-handler delivery deadline; `None` uses the bus default.
    pub timeout: Option<Duration>,

    /// Dispatch handlers concurrently (`true`, default) or one at a time in
    /// subscriber order.
    pub parallel: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            timeout: None,
            parallel: true,
        }
    }
}

/// Pure filter over the bounded event history.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &event.source != source {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Value Objects: Delivery Outcomes
// ============================================================================

/// Outcome of delivering one event to one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub agent_id: AgentId,
    pub success: bool,

    /// Handler result on success.
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Failure description (handler error or delivery timeout).
    #[serde(default)]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn succeeded(agent_id: AgentId, result: serde_json::Value) -> Self {
        Self {
            agent_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(agent_id: AgentId, error: impl Into<String>) -> Self {
        Self {
            agent_id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a publish call: the constructed event plus one outcome per
/// notified subscriber (empty when nothing was subscribed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub event: Event,
    pub results: Vec<DeliveryOutcome>,
}
