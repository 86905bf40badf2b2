// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Production Workflow Domain Model
//!
//! The order-analysis workflow is a fixed three-step pipeline (compliance
//! validation, conditional batch assessment, status reporting) replacing the
//! uncontrolled event cascades those operations used to ride on. This module
//! holds the aggregate, its step records, and the disposition derivation.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** [`OrderWorkflow`]
//!
//! # Invariants
//!
//! - Steps 1 (compliance) and 3 (status update) always execute; step 2 may be
//!   skipped but is still recorded
//! - Disposition keyword matching is substring-based and precedence-ordered;
//!   both properties are regulatory-relevant and must not be "improved"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Value Objects: Identifiers & Statuses
// ============================================================================

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    ComplianceCheck,
    AssessmentCheck,
    StatusUpdate,
    Completed,
    Failed,
    Cancelled,
}

/// Terminal disposition reported for an analyzed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDisposition {
    Approved,
    Blocked,
    Delayed,
    ReviewRequired,
}

impl std::fmt::Display for FinalDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approved => "APPROVED",
            Self::Blocked => "BLOCKED",
            Self::Delayed => "DELAYED",
            Self::ReviewRequired => "REVIEW_REQUIRED",
        };
        write!(f, "{s}")
    }
}

/// Outcome status of one workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

// ============================================================================
// Entities: Step Records
// ============================================================================

pub const STEP_COMPLIANCE: &str = "compliance_check";
pub const STEP_ASSESSMENT: &str = "assessment_check";
pub const STEP_STATUS_UPDATE: &str = "status_update";

/// Record of one executed (or skipped) workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the pipeline.
    pub ordinal: u8,
    pub name: String,
    pub status: StepStatus,

    /// Collaborator result, or the structured fallback recorded when the
    /// collaborator failed (`{"status": "error", "fallback": true, ...}`).
    pub result: serde_json::Value,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl StepRecord {
    pub fn new(
        ordinal: u8,
        name: impl Into<String>,
        status: StepStatus,
        result: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            ordinal,
            name: name.into(),
            status,
            result,
            duration,
        }
    }

    /// Record a skipped step with its reason; contributes no findings.
    pub fn skipped(ordinal: u8, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ordinal,
            name,
            StepStatus::Skipped,
            serde_json::json!({ "skipped": true, "reason": reason.into() }),
            Duration::ZERO,
        )
    }

    /// The textual payload of the step result: the string itself for string
    /// results, else the `text` field, else the `message` field.
    pub fn result_text(&self) -> Option<&str> {
        if let Some(s) = self.result.as_str() {
            return Some(s);
        }
        self.result
            .get("text")
            .and_then(|v| v.as_str())
            .or_else(|| self.result.get("message").and_then(|v| v.as_str()))
    }

    /// Whether the result carries an error status (fallback results do).
    pub fn has_error_status(&self) -> bool {
        self.result.get("status").and_then(|v| v.as_str()) == Some("error")
    }

    /// Whether the result is a fallback recorded for a failed collaborator.
    pub fn is_fallback(&self) -> bool {
        self.result.get("fallback").and_then(|v| v.as_bool()) == Some(true)
    }
}

// ============================================================================
// Disposition Rules
// ============================================================================

/// Keywords that force the batch assessment step to run.
pub const CRITICAL_KEYWORDS: [&str; 5] = [
    "CRITICAL",
    "BLOCKED",
    "NON-COMPLIANT",
    "QUARANTINE",
    "HIGH RISK",
];

/// Case-insensitive substring check against [`CRITICAL_KEYWORDS`].
pub fn contains_critical_keyword(text: &str) -> bool {
    let upper = text.to_uppercase();
    CRITICAL_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

/// Whether the assessment step must run, given the compliance result text.
///
/// Assessment is required unless the text is present and contains none of the
/// critical keywords. An absent text (fallback results have none) always
/// requires assessment.
pub fn assessment_required(compliance_text: Option<&str>) -> bool {
    match compliance_text {
        Some(text) => contains_critical_keyword(text),
        None => true,
    }
}

fn text_contains(step: &StepRecord, needle: &str) -> bool {
    step.result_text()
        .map(|t| t.to_uppercase().contains(needle))
        .unwrap_or(false)
}

/// Derive the final disposition from the recorded steps, first match wins:
///
/// 1. compliance text contains `BLOCKED` → `Blocked`
/// 2. assessment ran and its text contains `BLOCK` → `Blocked`
/// 3. any step's result carries an error status → `ReviewRequired`
/// 4. any step's text contains `DELAYED` or `WARNING` → `Delayed`
/// 5. otherwise → `Approved`
///
/// Matching is substring-based by design: `BLOCK` matches inside `BLOCKED`.
pub fn derive_final_disposition(steps: &[StepRecord]) -> FinalDisposition {
    let compliance = steps.iter().find(|s| s.name == STEP_COMPLIANCE);
    let assessment = steps
        .iter()
        .find(|s| s.name == STEP_ASSESSMENT && s.status != StepStatus::Skipped);

    if let Some(step) = compliance {
        if text_contains(step, "BLOCKED") {
            return FinalDisposition::Blocked;
        }
    }

    if let Some(step) = assessment {
        if text_contains(step, "BLOCK") {
            return FinalDisposition::Blocked;
        }
    }

    if steps.iter().any(|s| s.has_error_status()) {
        return FinalDisposition::ReviewRequired;
    }

    if steps
        .iter()
        .any(|s| text_contains(s, "DELAYED") || text_contains(s, "WARNING"))
    {
        return FinalDisposition::Delayed;
    }

    FinalDisposition::Approved
}

// ============================================================================
// Aggregate Root: OrderWorkflow
// ============================================================================

/// One order-analysis workflow run.
///
/// Owned exclusively by the production workflow engine for its lifetime;
/// never mutated concurrently by more than one logical execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWorkflow {
    pub id: WorkflowId,
    pub order_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub final_status: Option<FinalDisposition>,
    pub cancellation_reason: Option<String>,
}

impl OrderWorkflow {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            order_id: order_id.into(),
            status: WorkflowStatus::Running,
            steps: Vec::with_capacity(3),
            started_at: Utc::now(),
            final_status: None,
            cancellation_reason: None,
        }
    }

    pub fn record_step(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub fn transition(&mut self, status: WorkflowStatus) {
        self.status = status;
    }

    pub fn complete(&mut self, disposition: FinalDisposition) {
        self.status = WorkflowStatus::Completed;
        self.final_status = Some(disposition);
    }

    pub fn fail(&mut self) {
        self.status = WorkflowStatus::Failed;
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = WorkflowStatus::Cancelled;
        self.cancellation_reason = Some(reason.into());
    }
}

// ============================================================================
// Value Objects: Statistics Snapshot
// ============================================================================

/// Running aggregates over all workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total_executed: u64,
    pub completed: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    /// completed / (completed + failed); 1.0 when nothing finished yet.
    pub success_rate: f64,
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow {0} not found in the active set")]
    NotFound(WorkflowId),
}
