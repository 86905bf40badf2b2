// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! A2A Correlator: Request/Response Matching for Agent-to-Agent Calls
//!
//! Generates a unique request id per call, registers a pending entry, forwards
//! the request to the target agent's handler, and hands the caller exactly one
//! resolution. The caller's awaiting context is fully decoupled from the
//! handler's execution: resolutions travel over a oneshot channel keyed by the
//! request id.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** A2A correlation, timeout purging, duplicate discard
//!
//! # Invariants
//!
//! - At most one resolution is honored per request id; later ones are
//!   discarded and logged
//! - An unresolved request is purged and fails with a timeout error

use crate::domain::a2a::{A2AError, A2ARequest, A2AResolution, PendingA2AInfo, RequestId};
use crate::domain::agent::AgentId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

/// Default deadline for an A2A request awaiting resolution.
pub const DEFAULT_A2A_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler exposed by an agent reachable over A2A.
///
/// The three production roles (compliance, assessment, status) and any mock
/// stand-ins implement this; each must be assumed to fail independently and
/// intermittently.
#[async_trait]
pub trait A2ATargetService: Send + Sync {
    async fn handle(&self, action: &str, payload: serde_json::Value)
        -> anyhow::Result<serde_json::Value>;
}

struct PendingEntry {
    request: A2ARequest,
    response_tx: oneshot::Sender<A2AResolution>,
}

/// Correlates A2A requests with their asynchronous resolutions.
pub struct A2ACorrelator {
    targets: RwLock<HashMap<AgentId, Arc<dyn A2ATargetService>>>,
    pending: Arc<DashMap<RequestId, PendingEntry>>,
    default_timeout: Duration,
}

impl A2ACorrelator {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            pending: Arc::new(DashMap::new()),
            default_timeout,
        }
    }

    /// Register (or replace) the handler for a target agent.
    pub async fn register_target(&self, agent_id: AgentId, service: Arc<dyn A2ATargetService>) {
        self.targets.write().await.insert(agent_id, service);
    }

    /// Issue a request with the correlator's default timeout.
    pub async fn request(
        &self,
        target: &AgentId,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, A2AError> {
        self.request_with_timeout(target, action, payload, self.default_timeout)
            .await
    }

    /// Issue a request and await its single resolution.
    ///
    /// The target handler runs in its own task and reports back through
    /// [`resolve`](Self::resolve); if nothing resolves the request before
    /// `timeout`, the pending entry is purged and the caller receives
    /// [`A2AError::Timeout`].
    pub async fn request_with_timeout(
        &self,
        target: &AgentId,
        action: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, A2AError> {
        let service = self.targets.read().await.get(target).cloned();
        let Some(service) = service else {
            return Err(A2AError::TargetNotRegistered(target.clone()));
        };

        let request = A2ARequest::new(target.clone(), action, payload.clone());
        let request_id = request.id;
        let (response_tx, response_rx) = oneshot::channel();

        self.pending.insert(
            request_id,
            PendingEntry {
                request,
                response_tx,
            },
        );

        debug!(
            request_id = %request_id,
            target = %target,
            action,
            "a2a request registered"
        );

        // Purge task: an entry still pending after the deadline is dropped,
        // which surfaces as a timeout to the awaiting caller below.
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.remove(&request_id).is_some() {
                warn!(request_id = %request_id, "a2a request timed out before resolution");
            }
        });

        // Forward task: the handler's outcome becomes the resolution.
        let pending = Arc::clone(&self.pending);
        let action = action.to_string();
        tokio::spawn(async move {
            let resolution = match service.handle(&action, payload).await {
                Ok(value) => A2AResolution::Success(value),
                Err(error) => A2AResolution::Failure(format!("{error:#}")),
            };
            if resolve_entry(&pending, request_id, resolution).is_err() {
                debug!(
                    request_id = %request_id,
                    "handler resolution arrived after purge; discarded"
                );
            }
        });

        match response_rx.await {
            Ok(A2AResolution::Success(value)) => Ok(value),
            Ok(A2AResolution::Failure(message)) => Err(A2AError::Remote {
                request_id,
                message,
            }),
            // Sender dropped without a send: the purge task won the race.
            Err(_) => Err(A2AError::Timeout(request_id)),
        }
    }

    /// Record a resolution for a pending request.
    ///
    /// Exactly one resolution is honored per request id; a duplicate returns
    /// [`A2AError::AlreadyResolved`] and is otherwise ignored.
    pub fn resolve(
        &self,
        request_id: RequestId,
        resolution: A2AResolution,
    ) -> Result<(), A2AError> {
        let outcome = resolve_entry(&self.pending, request_id, resolution);
        if outcome.is_err() {
            warn!(request_id = %request_id, "duplicate a2a resolution ignored");
        }
        outcome
    }

    /// Requests currently awaiting resolution.
    pub fn pending_requests(&self) -> Vec<PendingA2AInfo> {
        self.pending
            .iter()
            .map(|entry| PendingA2AInfo {
                id: entry.request.id,
                target_agent: entry.request.target_agent.clone(),
                action: entry.request.action.clone(),
                created_at: entry.request.created_at,
            })
            .collect()
    }
}

fn resolve_entry(
    pending: &DashMap<RequestId, PendingEntry>,
    request_id: RequestId,
    resolution: A2AResolution,
) -> Result<(), A2AError> {
    match pending.remove(&request_id) {
        Some((_, entry)) => {
            // Receiver may have gone away with its caller; nothing to do then.
            let _ = entry.response_tx.send(resolution);
            Ok(())
        }
        None => Err(A2AError::AlreadyResolved(request_id)),
    }
}
