// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Subscription Domain Model
//!
//! A [`Subscription`] binds an event type to an agent's delivery handler with
//! a notification priority. Within one event type, subscribers are ordered by
//! descending priority with ties broken by insertion order.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Subscription records and the handler port

use crate::domain::agent::AgentId;
use crate::domain::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Event type that matches every published event.
pub const WILDCARD_EVENT_TYPE: &str = "*";

/// Unique identifier for a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery handler invoked for each event a subscriber receives.
///
/// Implemented by the dispatcher's cascade handlers in production and by
/// closures-in-structs in tests. A returned error is reported as a
/// per-subscriber delivery failure and never aborts the publish call.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<serde_json::Value>;
}

/// One agent's interest in one event type.
#[derive(Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub event_type: String,
    pub agent_id: AgentId,
    pub priority: i32,
    pub subscribed_at: DateTime<Utc>,
    pub handler: Arc<dyn EventHandler>,
}

impl Subscription {
    pub fn new(
        event_type: impl Into<String>,
        agent_id: AgentId,
        priority: i32,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            event_type: event_type.into(),
            agent_id,
            priority,
            subscribed_at: Utc::now(),
            handler,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("agent_id", &self.agent_id)
            .field("priority", &self.priority)
            .field("subscribed_at", &self.subscribed_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl EventHandler for EchoHandler {
        async fn handle(&self, event: &Event) -> anyhow::Result<serde_json::Value> {
            Ok(event.payload.clone())
        }
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = Subscription::new("oee/updated", AgentId::new("a"), 0, Arc::new(EchoHandler));
        let b = Subscription::new("oee/updated", AgentId::new("b"), 0, Arc::new(EchoHandler));
        assert_ne!(a.id, b.id);
    }
}
