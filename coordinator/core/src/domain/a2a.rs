// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent-to-Agent (A2A) Domain Model
//!
//! Direct request/response calls between agents, outside the publish/subscribe
//! bus. Each request is keyed by a generated [`RequestId`] and resolved exactly
//! once; the correlation machinery lives in
//! [`crate::infrastructure::a2a::A2ACorrelator`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** A2A request records, resolutions, and error taxonomy

use crate::domain::agent::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an A2A request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An in-flight request from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2ARequest {
    pub id: RequestId,
    pub target_agent: AgentId,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl A2ARequest {
    pub fn new(target_agent: AgentId, action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: RequestId::new(),
            target_agent,
            action: action.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// The single resolution recorded for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum A2AResolution {
    Success(serde_json::Value),
    Failure(String),
}

/// Read model describing a pending request, for operational surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingA2AInfo {
    pub id: RequestId,
    pub target_agent: AgentId,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum A2AError {
    /// No resolution arrived before the request deadline.
    #[error("A2A request {0} timed out before resolution")]
    Timeout(RequestId),

    /// The target agent has no registered handler.
    #[error("No A2A handler registered for agent '{0}'")]
    TargetNotRegistered(AgentId),

    /// The target handler resolved the request as a failure.
    #[error("A2A request {request_id} failed: {message}")]
    Remote {
        request_id: RequestId,
        message: String,
    },

    /// A second resolution arrived for an already-resolved request. The
    /// first resolution stands; this one is discarded.
    #[error("A2A request {0} was already resolved")]
    AlreadyResolved(RequestId),
}
