// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit Sink: Best-Effort Dispatch Trail
//!
//! Every agent dispatch and workflow disposition is offered to the audit sink
//! as a fire-and-forget entry. The sink is an explicit capability: callers
//! that do not care inject [`NoopAuditSink`], and the coordinator never blocks
//! or fails its own operation on a slow or erroring sink.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Structured audit records over `tracing`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Classification flags attached to an audit entry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditFlags {
    /// The recorded activity arose from an automatic cascade hop.
    pub auto_triggered: bool,
    /// The recorded activity was an agent-to-agent call.
    pub a2a: bool,
}

/// One auditable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    pub source: String,
    pub data: serde_json::Value,
    pub flags: AuditFlags,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
        flags: AuditFlags,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data,
            flags,
            recorded_at: Utc::now(),
        }
    }
}

/// Best-effort audit capability.
///
/// Implementations must not assume callers await durability: the coordinator
/// records entries from spawned tasks and discards any sink-side problems.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Writes audit entries to the structured tracing log.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "plantmesh::audit",
            event_type = %entry.event_type,
            source = %entry.source,
            auto_triggered = entry.flags.auto_triggered,
            a2a = entry.flags.a2a,
            data = %entry.data,
            "audit"
        );
    }
}

/// Documented default when no audit surface is wired in: accepts and drops
/// every entry.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _entry: AuditEntry) {}
}
