// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event Bus: Priority-Ordered Pub/Sub for Coordination Events
//!
//! In-memory addressed-delivery bus: every publish resolves the interested
//! subscribers (direct matches first, then wildcard), dispatches to each with
//! a per-handler deadline, and returns one outcome record per subscriber.
//! An individual handler failure or timeout never aborts the publish call.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Event delivery, bounded history, bus metrics
//!
//! # Invariants
//!
//! - Subscriber order per event type: descending priority, stable insertion
//! - History is bounded; oldest events evicted first
//! - The bus exclusively owns the subscription index and the history

use crate::domain::agent::AgentId;
use crate::domain::event::{
    DeliveryOutcome, Event, EventFilter, PublishOptions, PublishReceipt,
};
use crate::domain::subscription::{
    EventHandler, Subscription, SubscriptionId, WILDCARD_EVENT_TYPE,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

// ============================================================================
// Subscription Index
// ============================================================================

/// Event type → ordered subscriber list.
///
/// Rebuilt wholesale whenever agent configuration changes; incremental
/// subscribe/unsubscribe exists for ad-hoc observers.
#[derive(Default)]
pub struct SubscriptionIndex {
    by_type: HashMap<String, Vec<Subscription>>,
}

impl SubscriptionIndex {
    /// Insert preserving descending priority with stable ties.
    fn insert(&mut self, subscription: Subscription) {
        let entries = self
            .by_type
            .entry(subscription.event_type.clone())
            .or_default();
        let position = entries
            .iter()
            .position(|s| s.priority < subscription.priority)
            .unwrap_or(entries.len());
        entries.insert(position, subscription);
    }

    /// Remove every subscription for the agent/event pair. No-op if absent.
    fn remove(&mut self, event_type: &str, agent_id: &AgentId) -> usize {
        match self.by_type.get_mut(event_type) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|s| &s.agent_id != agent_id);
                before - entries.len()
            }
            None => 0,
        }
    }

    /// Subscribers for one event type: direct matches first, then wildcard.
    fn subscribers_for(&self, event_type: &str) -> Vec<Subscription> {
        let mut subscribers: Vec<Subscription> = self
            .by_type
            .get(event_type)
            .map(|entries| entries.to_vec())
            .unwrap_or_default();

        if event_type != WILDCARD_EVENT_TYPE {
            if let Some(entries) = self.by_type.get(WILDCARD_EVENT_TYPE) {
                subscribers.extend(entries.iter().cloned());
            }
        }
        subscribers
    }

    fn replace_all(&mut self, subscriptions: Vec<Subscription>) {
        self.by_type.clear();
        for subscription in subscriptions {
            self.insert(subscription);
        }
    }

    fn total(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    fn unique_event_types(&self) -> usize {
        self.by_type.values().filter(|v| !v.is_empty()).count()
    }
}

// ============================================================================
// Bus Metrics
// ============================================================================

#[derive(Default)]
struct MetricsInner {
    published: u64,
    processed: u64,
    failed: u64,
    avg_processing_ms: f64,
}

impl MetricsInner {
    fn record_delivery(&mut self, elapsed_ms: f64, success: bool) {
        self.processed += 1;
        if !success {
            self.failed += 1;
        }
        // Cumulative moving average.
        self.avg_processing_ms += (elapsed_ms - self.avg_processing_ms) / self.processed as f64;
    }
}

/// Point-in-time view of bus activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMetrics {
    pub events_published: u64,
    pub events_processed: u64,
    pub failed_deliveries: u64,
    pub avg_processing_ms: f64,
    pub total_subscriptions: usize,
    pub unique_event_types: usize,
    /// (processed − failed) / processed; 1.0 before any delivery.
    pub success_rate: f64,
}

// ============================================================================
// Event Bus
// ============================================================================

const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Publish/subscribe dispatcher with bounded history and per-subscriber
/// delivery outcomes.
pub struct EventBus {
    index: RwLock<SubscriptionIndex>,
    history: Mutex<VecDeque<Event>>,
    history_capacity: usize,
    metrics: Mutex<MetricsInner>,
}

impl EventBus {
    /// Create a bus keeping at most `history_capacity` events.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            index: RwLock::new(SubscriptionIndex::default()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            metrics: Mutex::new(MetricsInner::default()),
        }
    }

    /// Create a bus with the default history capacity (500).
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }

    // ========================================================================
    // Subscription Management
    // ========================================================================

    /// Subscribe `agent_id` to `event_type` at the given priority.
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
        agent_id: AgentId,
        priority: i32,
    ) -> SubscriptionId {
        let subscription = Subscription::new(event_type, agent_id, priority, handler);
        let id = subscription.id;
        self.index.write().await.insert(subscription);
        id
    }

    /// Remove all subscriptions for the agent/event pair; no-op if absent.
    pub async fn unsubscribe(&self, event_type: &str, agent_id: &AgentId) -> usize {
        self.index.write().await.remove(event_type, agent_id)
    }

    /// Atomically replace the entire subscription set (configuration reload).
    pub async fn replace_subscriptions(&self, subscriptions: Vec<Subscription>) -> usize {
        let mut index = self.index.write().await;
        index.replace_all(subscriptions);
        index.total()
    }

    pub async fn subscription_count(&self) -> usize {
        self.index.read().await.total()
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Publish an event and dispatch it to every subscriber.
    ///
    /// Returns the constructed event and one [`DeliveryOutcome`] per notified
    /// subscriber. Never errors: handler failures and timeouts are reported
    /// per subscriber, and a publish with zero subscribers is a logged no-op.
    pub async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        source: &str,
        options: PublishOptions,
    ) -> PublishReceipt {
        let event = Event::new(event_type, payload, source, &options);

        {
            let mut history = self.history.lock();
            if history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        self.metrics.lock().published += 1;

        let subscribers = self.index.read().await.subscribers_for(event_type);
        if subscribers.is_empty() {
            debug!(
                event_type,
                source, "published event has no subscribers"
            );
            return PublishReceipt {
                event,
                results: Vec::new(),
            };
        }

        debug!(
            event_type,
            event_id = %event.id,
            subscribers = subscribers.len(),
            parallel = options.parallel,
            "dispatching event"
        );

        let results = if options.parallel {
            futures::future::join_all(
                subscribers
                    .iter()
                    .map(|subscription| self.deliver(subscription, &event)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(subscribers.len());
            for subscription in &subscribers {
                results.push(self.deliver(subscription, &event).await);
            }
            results
        };

        PublishReceipt { event, results }
    }

    /// Deliver one event to one subscriber under the event's deadline.
    ///
    /// The handler runs in its own task; on timeout the delivery is reported
    /// failed but the task is left running to completion (best-effort
    /// cancellation; the wrapped agent work may be uninterruptible).
    async fn deliver(&self, subscription: &Subscription, event: &Event) -> DeliveryOutcome {
        let handler = subscription.handler.clone();
        let event_for_handler = event.clone();
        let agent_id = subscription.agent_id.clone();
        let started = Instant::now();

        let task = tokio::spawn(async move { handler.handle(&event_for_handler).await });

        let outcome = match tokio::time::timeout(event.timeout, task).await {
            Ok(Ok(Ok(result))) => DeliveryOutcome::succeeded(agent_id, result),
            Ok(Ok(Err(error))) => {
                warn!(
                    agent_id = %subscription.agent_id,
                    event_type = %event.event_type,
                    error = %format!("{error:#}"),
                    "handler failed"
                );
                DeliveryOutcome::failed(agent_id, format!("{error:#}"))
            }
            Ok(Err(join_error)) => {
                warn!(
                    agent_id = %subscription.agent_id,
                    event_type = %event.event_type,
                    "handler panicked"
                );
                DeliveryOutcome::failed(agent_id, format!("handler panicked: {join_error}"))
            }
            Err(_) => {
                warn!(
                    agent_id = %subscription.agent_id,
                    event_type = %event.event_type,
                    timeout = ?event.timeout,
                    "handler exceeded delivery deadline"
                );
                DeliveryOutcome::failed(
                    agent_id,
                    format!("delivery timed out after {:?}", event.timeout),
                )
            }
        };

        self.metrics
            .lock()
            .record_delivery(started.elapsed().as_secs_f64() * 1000.0, outcome.success);
        outcome
    }

    // ========================================================================
    // History & Metrics
    // ========================================================================

    /// Matching events, most recent first. Pure: does not mutate history.
    pub fn event_history(&self, filter: &EventFilter) -> Vec<Event> {
        let history = self.history.lock();
        history
            .iter()
            .rev()
            .filter(|event| filter.matches(event))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn metrics(&self) -> BusMetrics {
        let index = self.index.read().await;
        let inner = self.metrics.lock();
        BusMetrics {
            events_published: inner.published,
            events_processed: inner.processed,
            failed_deliveries: inner.failed,
            avg_processing_ms: inner.avg_processing_ms,
            total_subscriptions: index.total(),
            unique_event_types: index.unique_event_types(),
            success_rate: if inner.processed == 0 {
                1.0
            } else {
                (inner.processed - inner.failed) as f64 / inner.processed as f64
            },
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct RecordingHandler {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<serde_json::Value> {
            self.order.lock().push(self.name);
            Ok(json!({"handled_by": self.name}))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("provider unavailable")
        }
    }

    struct SlowHandler {
        delay: Duration,
    }

    #[async_trait]
    impl EventHandler for SlowHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<serde_json::Value> {
            tokio::time::sleep(self.delay).await;
            Ok(json!("done"))
        }
    }

    fn recorder(
        name: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn EventHandler> {
        Arc::new(RecordingHandler {
            name,
            order: order.clone(),
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let bus = EventBus::with_default_capacity();
        let receipt = bus
            .publish("oee/updated", json!({"oee": 0.82}), "mock-adapter", PublishOptions::default())
            .await;

        assert!(receipt.results.is_empty());
        assert_eq!(receipt.event.event_type, "oee/updated");
        assert_eq!(bus.metrics().await.events_published, 1);
    }

    #[tokio::test]
    async fn test_one_outcome_per_subscriber_despite_failures() {
        let bus = EventBus::with_default_capacity();
        let order = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("order/created", recorder("a", &order), AgentId::new("a"), 0)
            .await;
        bus.subscribe("order/created", Arc::new(FailingHandler), AgentId::new("b"), 0)
            .await;
        bus.subscribe("order/created", recorder("c", &order), AgentId::new("c"), 0)
            .await;

        let receipt = bus
            .publish("order/created", json!({}), "test", PublishOptions::default())
            .await;

        assert_eq!(receipt.results.len(), 3);
        let failed: Vec<_> = receipt.results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].agent_id, AgentId::new("b"));
        assert!(failed[0].error.as_deref().unwrap().contains("provider unavailable"));
    }

    #[tokio::test]
    async fn test_sequential_dispatch_respects_priority_order() {
        let bus = EventBus::with_default_capacity();
        let order = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("qc/alert", recorder("low", &order), AgentId::new("low"), 0)
            .await;
        bus.subscribe("qc/alert", recorder("high", &order), AgentId::new("high"), 10)
            .await;
        // Same priority as "high": stable insertion keeps it second.
        bus.subscribe("qc/alert", recorder("high2", &order), AgentId::new("high2"), 10)
            .await;

        let receipt = bus
            .publish(
                "qc/alert",
                json!({}),
                "test",
                PublishOptions {
                    parallel: false,
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(*order.lock(), vec!["high", "high2", "low"]);
        assert_eq!(receipt.results.len(), 3);
        assert_eq!(receipt.results[0].agent_id, AgentId::new("high"));
    }

    #[tokio::test]
    async fn test_wildcard_subscribers_come_after_direct() {
        let bus = EventBus::with_default_capacity();
        let order = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("*", recorder("audit", &order), AgentId::new("audit"), 100)
            .await;
        bus.subscribe("oee/updated", recorder("oee", &order), AgentId::new("oee"), 0)
            .await;

        let receipt = bus
            .publish(
                "oee/updated",
                json!({}),
                "test",
                PublishOptions {
                    parallel: false,
                    ..Default::default()
                },
            )
            .await;

        // Direct first despite the wildcard's higher priority.
        assert_eq!(*order.lock(), vec!["oee", "audit"]);
        assert_eq!(receipt.results.len(), 2);
    }

    #[tokio::test]
    async fn test_handler_timeout_reported_not_fatal() {
        let bus = EventBus::with_default_capacity();
        bus.subscribe(
            "order/created",
            Arc::new(SlowHandler {
                delay: Duration::from_millis(500),
            }),
            AgentId::new("slow"),
            0,
        )
        .await;

        let receipt = bus
            .publish(
                "order/created",
                json!({}),
                "test",
                PublishOptions {
                    timeout: Some(Duration::from_millis(50)),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(receipt.results.len(), 1);
        assert!(!receipt.results[0].success);
        assert!(receipt.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));

        let metrics = bus.metrics().await;
        assert_eq!(metrics.failed_deliveries, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_noop_when_absent() {
        let bus = EventBus::with_default_capacity();
        assert_eq!(bus.unsubscribe("oee/updated", &AgentId::new("ghost")).await, 0);

        let order = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("oee/updated", recorder("a", &order), AgentId::new("a"), 0)
            .await;
        assert_eq!(bus.unsubscribe("oee/updated", &AgentId::new("a")).await, 1);
        assert_eq!(bus.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_replace_subscriptions_is_full_swap() {
        let bus = EventBus::with_default_capacity();
        let order = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("old/event", recorder("old", &order), AgentId::new("old"), 0)
            .await;

        let replacement = vec![Subscription::new(
            "new/event",
            AgentId::new("new"),
            0,
            recorder("new", &order),
        )];
        assert_eq!(bus.replace_subscriptions(replacement).await, 1);

        let receipt = bus
            .publish("old/event", json!({}), "test", PublishOptions::default())
            .await;
        assert!(receipt.results.is_empty());
    }

    #[tokio::test]
    async fn test_history_bounded_and_filtered() {
        let bus = EventBus::new(2);
        for i in 0..3 {
            bus.publish(
                "oee/updated",
                json!({"seq": i}),
                "mock-adapter",
                PublishOptions::default(),
            )
            .await;
        }

        let all = bus.event_history(&EventFilter::default());
        assert_eq!(all.len(), 2);
        // Most recent first; the first publish was evicted.
        assert_eq!(all[0].payload, json!({"seq": 2}));
        assert_eq!(all[1].payload, json!({"seq": 1}));

        let limited = bus.event_history(&EventFilter {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);

        let none = bus.event_history(&EventFilter {
            source: Some("sap-adapter".to_string()),
            ..Default::default()
        });
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_success_rate() {
        let bus = EventBus::with_default_capacity();
        let order = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("order/created", recorder("ok", &order), AgentId::new("ok"), 0)
            .await;
        bus.subscribe("order/created", Arc::new(FailingHandler), AgentId::new("bad"), 0)
            .await;

        bus.publish("order/created", json!({}), "test", PublishOptions::default())
            .await;

        let metrics = bus.metrics().await;
        assert_eq!(metrics.events_published, 1);
        assert_eq!(metrics.events_processed, 2);
        assert_eq!(metrics.failed_deliveries, 1);
        assert!((metrics.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.total_subscriptions, 2);
        assert_eq!(metrics.unique_event_types, 1);
    }
}
