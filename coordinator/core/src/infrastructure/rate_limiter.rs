// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sliding-Window Rate Limiter
//!
//! Admission control gating outbound provider calls. The window is a list of
//! timestamped call records; entries older than the window are purged lazily
//! on each admission check. Admission is a hard reject, never a queue: a
//! rejected call is dropped and counted.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Admission control for agent dispatch
//!
//! # Invariants
//!
//! - `calls.len() <= max_calls` after every admission
//! - All read-modify-write happens under one mutex (one logical counter)

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

struct CallRecord {
    caller: String,
    at: Instant,
}

#[derive(Default)]
struct WindowState {
    calls: Vec<CallRecord>,
    blocked: u64,
}

impl WindowState {
    fn purge(&mut self, window: Duration) {
        let now = Instant::now();
        self.calls.retain(|c| now.duration_since(c.at) < window);
    }
}

/// Sliding-window admission gate.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Admit the call iff fewer than `max_calls` admissions remain in the
    /// window. On admission the call is recorded against `caller`; on
    /// rejection the blocked counter is incremented.
    pub fn try_admit(&self, caller: &str) -> bool {
        let mut state = self.state.lock();
        state.purge(self.window);

        if state.calls.len() < self.max_calls {
            state.calls.push(CallRecord {
                caller: caller.to_string(),
                at: Instant::now(),
            });
            true
        } else {
            state.blocked += 1;
            debug!(caller, blocked_total = state.blocked, "admission rejected");
            false
        }
    }

    /// Fraction of the window currently consumed (count in window / max).
    pub fn utilization(&self) -> f64 {
        let mut state = self.state.lock();
        state.purge(self.window);
        if self.max_calls == 0 {
            return 1.0;
        }
        state.calls.len() as f64 / self.max_calls as f64
    }

    /// Total calls rejected since construction or the last [`reset`](Self::reset).
    pub fn blocked_total(&self) -> u64 {
        self.state.lock().blocked
    }

    /// Admitted-call counts per caller for the current window.
    pub fn per_caller(&self) -> HashMap<String, usize> {
        let mut state = self.state.lock();
        state.purge(self.window);

        let mut breakdown: HashMap<String, usize> = HashMap::new();
        for call in &state.calls {
            *breakdown.entry(call.caller.clone()).or_default() += 1;
        }
        breakdown
    }

    /// Clear the window and the blocked counter (operational recovery).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.blocked = 0;
    }

    /// Serializable snapshot for operational surfaces.
    pub fn stats(&self) -> RateLimiterStats {
        let per_caller = self.per_caller();
        let in_window = per_caller.values().sum();
        RateLimiterStats {
            max_calls: self.max_calls,
            window_ms: self.window.as_millis() as u64,
            in_window,
            utilization: if self.max_calls == 0 {
                1.0
            } else {
                in_window as f64 / self.max_calls as f64
            },
            blocked_total: self.blocked_total(),
            per_caller,
        }
    }
}

/// Point-in-time view of the admission window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub max_calls: usize,
    pub window_ms: u64,
    pub in_window: usize,
    pub utilization: f64,
    pub blocked_total: u64,
    pub per_caller: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hard_reject_at_capacity() {
        let limiter = RateLimiter::new(5, Duration::from_millis(60_000));

        for _ in 0..5 {
            assert!(limiter.try_admit("oee-agent"));
        }
        assert!(!limiter.try_admit("oee-agent"));
        assert_eq!(limiter.blocked_total(), 1);
        assert_eq!(limiter.utilization(), 1.0);
    }

    #[tokio::test]
    async fn test_admission_resumes_after_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));

        assert!(limiter.try_admit("a"));
        assert!(limiter.try_admit("a"));
        assert!(!limiter.try_admit("a"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.try_admit("a"));
    }

    #[test]
    fn test_per_caller_breakdown() {
        let limiter = RateLimiter::new(10, Duration::from_millis(60_000));

        limiter.try_admit("oee-agent");
        limiter.try_admit("oee-agent");
        limiter.try_admit("quality-agent");

        let breakdown = limiter.per_caller();
        assert_eq!(breakdown.get("oee-agent"), Some(&2));
        assert_eq!(breakdown.get("quality-agent"), Some(&1));
    }

    #[test]
    fn test_reset_clears_window_and_counter() {
        let limiter = RateLimiter::new(1, Duration::from_millis(60_000));
        limiter.try_admit("a");
        assert!(!limiter.try_admit("a"));

        limiter.reset();
        assert_eq!(limiter.blocked_total(), 0);
        assert!(limiter.try_admit("a"));
    }

    #[tokio::test]
    async fn test_concurrent_admission_never_exceeds_max() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_millis(60_000)));

        let mut handles = Vec::new();
        for i in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.try_admit(&format!("caller-{}", i % 3))
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(limiter.blocked_total(), 15);
    }
}
