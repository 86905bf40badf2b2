// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Production Workflow Application Service
//!
//! Runs the fixed compliance → assessment → status pipeline for one order.
//! Order-centric operations deliberately bypass the event bus and use A2A
//! calls, so the sequence is bounded and auditable instead of an uncontrolled
//! cascade.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrate the 3-step order analysis (strict sequencing)
//! - **Dependencies:** Domain (OrderWorkflow), Infrastructure (A2ACorrelator,
//!   AuditSink)
//!
//! # Failure model
//!
//! Collaborator failures never abort a run: each failed call is absorbed into
//! a structured `{"status": "error", "fallback": true}` step result and the
//! pipeline continues. Only unexpected internal errors propagate, after
//! marking the run failed.

use crate::domain::a2a::A2AError;
use crate::domain::agent::AgentId;
use crate::domain::workflow::{
    assessment_required, derive_final_disposition, FinalDisposition, OrderWorkflow, StepRecord,
    StepStatus, WorkflowError, WorkflowId, WorkflowStats, WorkflowStatus, STEP_ASSESSMENT,
    STEP_COMPLIANCE, STEP_STATUS_UPDATE,
};
use crate::infrastructure::a2a::A2ACorrelator;
use crate::infrastructure::audit::{AuditEntry, AuditFlags, AuditSink};
use anyhow::Result;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Wiring and tuning for the production workflow engine.
#[derive(Debug, Clone)]
pub struct ProductionWorkflowConfig {
    pub compliance_agent: AgentId,
    pub assessment_agent: AgentId,
    pub status_agent: AgentId,

    /// Standards set sent with every compliance validation request.
    pub required_standards: Vec<String>,

    /// Per-step A2A deadline.
    pub step_timeout: Duration,

    /// How long finished runs stay visible in the active set.
    pub retention: Duration,
}

impl Default for ProductionWorkflowConfig {
    fn default() -> Self {
        Self {
            compliance_agent: AgentId::new("compliance-agent"),
            assessment_agent: AgentId::new("assessment-agent"),
            status_agent: AgentId::new("status-agent"),
            required_standards: vec![
                "ISO-9001".to_string(),
                "FDA-21CFR11".to_string(),
                "GMP".to_string(),
            ],
            step_timeout: Duration::from_secs(30),
            retention: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Application Service: ProductionWorkflowEngine
// ============================================================================

#[derive(Default)]
struct StatsInner {
    total: u64,
    completed: u64,
    failed: u64,
    avg_duration_ms: f64,
}

impl StatsInner {
    fn record_finished(&mut self, duration_ms: f64, completed: bool) {
        if completed {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        let finished = (self.completed + self.failed) as f64;
        self.avg_duration_ms += (duration_ms - self.avg_duration_ms) / finished;
    }
}

/// Orchestrates order-analysis workflow runs.
pub struct ProductionWorkflowEngine {
    a2a: Arc<A2ACorrelator>,
    audit: Arc<dyn AuditSink>,
    config: ProductionWorkflowConfig,
    active: Arc<RwLock<HashMap<WorkflowId, OrderWorkflow>>>,
    stats: Mutex<StatsInner>,
}

impl ProductionWorkflowEngine {
    pub fn new(
        a2a: Arc<A2ACorrelator>,
        audit: Arc<dyn AuditSink>,
        config: ProductionWorkflowConfig,
    ) -> Self {
        Self {
            a2a,
            audit,
            config,
            active: Arc::new(RwLock::new(HashMap::new())),
            stats: Mutex::new(StatsInner::default()),
        }
    }

    // ========================================================================
    // Workflow Execution
    // ========================================================================

    /// Analyze one order through the fixed 3-step pipeline.
    ///
    /// Always returns a structured [`OrderWorkflow`] snapshot: completed
    /// with a disposition, or cancelled if [`cancel`](Self::cancel) removed
    /// the run mid-flight. An `Err` means an unexpected internal failure; the
    /// run is then marked failed and leaves the active set after retention.
    pub async fn run_order_analysis(&self, order_id: &str) -> Result<OrderWorkflow> {
        let mut workflow = OrderWorkflow::new(order_id);
        let workflow_id = workflow.id;
        let started = Instant::now();

        self.active
            .write()
            .await
            .insert(workflow_id, workflow.clone());
        self.stats.lock().total += 1;

        info!(workflow_id = %workflow_id, order_id, "order analysis started");

        match self.execute_steps(&mut workflow).await {
            Ok(true) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.stats.lock().record_finished(duration_ms, true);
                self.mirror(&workflow).await;
                self.schedule_removal(workflow_id);

                let disposition = workflow
                    .final_status
                    .expect("completed workflow carries a disposition");
                info!(
                    workflow_id = %workflow_id,
                    order_id,
                    disposition = %disposition,
                    "order analysis completed"
                );
                self.record_audit(&workflow, "workflow/completed");
                Ok(workflow)
            }
            Ok(false) => {
                // Cancelled: already out of the active set.
                info!(workflow_id = %workflow_id, order_id, "order analysis cancelled mid-run");
                Ok(workflow)
            }
            Err(error) => {
                warn!(
                    workflow_id = %workflow_id,
                    order_id,
                    error = %format!("{error:#}"),
                    "order analysis failed"
                );
                workflow.fail();
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.stats.lock().record_finished(duration_ms, false);
                self.mirror(&workflow).await;
                self.schedule_removal(workflow_id);
                self.record_audit(&workflow, "workflow/failed");
                Err(error)
            }
        }
    }

    /// Run the three steps in strict sequence.
    ///
    /// Returns `Ok(false)` when the run was cancelled out from under us.
    async fn execute_steps(&self, workflow: &mut OrderWorkflow) -> Result<bool> {
        // -- Step 1: compliance check (always runs)
        workflow.transition(WorkflowStatus::ComplianceCheck);
        if !self.mirror(workflow).await {
            workflow.cancel("cancelled before compliance check");
            return Ok(false);
        }

        let step1 = self
            .run_step(
                1,
                STEP_COMPLIANCE,
                &self.config.compliance_agent,
                "validate_compliance",
                json!({
                    "order_id": workflow.order_id,
                    "required_standards": self.config.required_standards,
                }),
            )
            .await;
        workflow.record_step(step1);

        // -- Step 2: batch assessment (conditional, recorded either way)
        workflow.transition(WorkflowStatus::AssessmentCheck);
        if !self.mirror(workflow).await {
            workflow.cancel("cancelled before assessment check");
            return Ok(false);
        }

        let compliance_text = workflow.steps[0].result_text().map(str::to_owned);
        if assessment_required(compliance_text.as_deref()) {
            let step2 = self
                .run_step(
                    2,
                    STEP_ASSESSMENT,
                    &self.config.assessment_agent,
                    "assess_batch",
                    json!({
                        "order_id": workflow.order_id,
                        "compliance_findings": compliance_text,
                    }),
                )
                .await;
            workflow.record_step(step2);
        } else {
            debug!(workflow_id = %workflow.id, "assessment skipped: no critical compliance findings");
            workflow.record_step(StepRecord::skipped(
                2,
                STEP_ASSESSMENT,
                "no critical compliance findings",
            ));
        }

        // Disposition is derived from steps 1-2; the status update reports it
        // and cannot retroactively change it.
        let disposition: FinalDisposition = derive_final_disposition(&workflow.steps);

        // -- Step 3: status update (always runs)
        workflow.transition(WorkflowStatus::StatusUpdate);
        if !self.mirror(workflow).await {
            workflow.cancel("cancelled before status update");
            return Ok(false);
        }

        let step3 = self
            .run_step(
                3,
                STEP_STATUS_UPDATE,
                &self.config.status_agent,
                "update_order_status",
                json!({
                    "order_id": workflow.order_id,
                    "status": disposition.to_string(),
                }),
            )
            .await;
        workflow.record_step(step3);

        workflow.complete(disposition);
        Ok(true)
    }

    /// Execute one A2A-backed step, absorbing collaborator failure into a
    /// structured fallback result.
    async fn run_step(
        &self,
        ordinal: u8,
        name: &str,
        target: &AgentId,
        action: &str,
        payload: serde_json::Value,
    ) -> StepRecord {
        let started = Instant::now();
        let result = match self
            .a2a
            .request_with_timeout(target, action, payload, self.config.step_timeout)
            .await
        {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    step = name,
                    target = %target,
                    error = %error,
                    "step collaborator failed; recording fallback result"
                );
                fallback_result(&error)
            }
        };

        StepRecord::new(ordinal, name, StepStatus::Completed, result, started.elapsed())
    }

    // ========================================================================
    // Cancellation, Introspection & Statistics
    // ========================================================================

    /// Cancel a run by id: records the reason and removes it from the active
    /// set immediately, regardless of any in-flight step.
    pub async fn cancel(
        &self,
        workflow_id: WorkflowId,
        reason: impl Into<String>,
    ) -> Result<OrderWorkflow, WorkflowError> {
        let removed = self.active.write().await.remove(&workflow_id);
        match removed {
            Some(mut workflow) => {
                workflow.cancel(reason);
                info!(
                    workflow_id = %workflow_id,
                    reason = workflow.cancellation_reason.as_deref().unwrap_or(""),
                    "workflow cancelled"
                );
                self.record_audit(&workflow, "workflow/cancelled");
                Ok(workflow)
            }
            None => Err(WorkflowError::NotFound(workflow_id)),
        }
    }

    pub async fn get(&self, workflow_id: WorkflowId) -> Option<OrderWorkflow> {
        self.active.read().await.get(&workflow_id).cloned()
    }

    pub async fn active_workflows(&self) -> Vec<OrderWorkflow> {
        self.active.read().await.values().cloned().collect()
    }

    /// Running aggregates over all runs.
    pub fn stats(&self) -> WorkflowStats {
        let inner = self.stats.lock();
        let finished = inner.completed + inner.failed;
        WorkflowStats {
            total_executed: inner.total,
            completed: inner.completed,
            failed: inner.failed,
            avg_duration_ms: inner.avg_duration_ms,
            success_rate: if finished == 0 {
                1.0
            } else {
                inner.completed as f64 / finished as f64
            },
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Mirror the runner-owned workflow into the active set for observers.
    /// Returns false, without writing, when the run has been cancelled
    /// (removed) out from under the runner.
    async fn mirror(&self, workflow: &OrderWorkflow) -> bool {
        let mut active = self.active.write().await;
        match active.get_mut(&workflow.id) {
            Some(slot) => {
                *slot = workflow.clone();
                true
            }
            None => false,
        }
    }

    /// Drop a finished run from the active set after the retention delay.
    fn schedule_removal(&self, workflow_id: WorkflowId) {
        let active = Arc::clone(&self.active);
        let retention = self.config.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if active.write().await.remove(&workflow_id).is_some() {
                debug!(workflow_id = %workflow_id, "finished workflow removed after retention");
            }
        });
    }

    fn record_audit(&self, workflow: &OrderWorkflow, event_type: &str) {
        let entry = AuditEntry::new(
            event_type,
            "production-workflow",
            json!({
                "workflow_id": workflow.id,
                "order_id": workflow.order_id,
                "status": workflow.status,
                "final_status": workflow.final_status,
                "cancellation_reason": workflow.cancellation_reason,
            }),
            AuditFlags {
                auto_triggered: false,
                a2a: true,
            },
        );
        let audit = self.audit.clone();
        tokio::spawn(async move { audit.record(entry).await });
    }
}

fn fallback_result(error: &A2AError) -> serde_json::Value {
    json!({
        "status": "error",
        "fallback": true,
        "error": error.to_string(),
    })
}
