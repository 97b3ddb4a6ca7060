//! Adaptive concurrency throttle (§4.5)

use crate::config::EngineConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Debug)]
struct ThrottleState {
    capacity: usize,
    min_concurrency: usize,
    max_concurrency: usize,
    healthy_latency_ms: u64,
    growth_streak_threshold: u32,
    success_streak: u32,
    total_successes: u64,
    total_failures: u64,
    total_rate_limits: u64,
}

/// Bounds in-flight concurrency and adapts it to server latency and explicit
/// rate-limit feedback (§4.5).
///
/// A single `tokio::sync::Semaphore` provides the blocking wait; its permit
/// count is adjusted out-of-band by forgetting permits (to shrink) or adding
/// permits (to grow) whenever [`ThrottleState::capacity`] changes, so the
/// *effective* capacity always matches `capacity` by the next acquire.
/// Counters live behind a `parking_lot::Mutex` since they are only ever
/// touched by synchronous bookkeeping, never held across an `.await`.
#[derive(Debug)]
pub struct AdaptiveThrottle {
    semaphore: Arc<Semaphore>,
    state: Mutex<ThrottleState>,
}

/// A held concurrency slot; releasing it (drop) returns the permit to the
/// semaphore.
pub struct ThrottleSlot<'a> {
    _permit: SemaphorePermit<'a>,
}

impl AdaptiveThrottle {
    pub fn new(config: &EngineConfig) -> Self {
        let initial = config.clamped_initial_concurrency();
        Self {
            semaphore: Arc::new(Semaphore::new(initial)),
            state: Mutex::new(ThrottleState {
                capacity: initial,
                min_concurrency: config.min_concurrency,
                max_concurrency: config.max_concurrency,
                healthy_latency_ms: config.healthy_latency_ms,
                growth_streak_threshold: config.growth_streak_threshold,
                success_streak: 0,
                total_successes: 0,
                total_failures: 0,
                total_rate_limits: 0,
            }),
        }
    }

    /// Acquire one concurrency slot, waiting if the throttle is saturated.
    pub async fn acquire(&self) -> ThrottleSlot<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("throttle semaphore is never closed");
        ThrottleSlot { _permit: permit }
    }

    /// Record a successful operation's latency. A streak of
    /// `growth_streak_threshold` consecutive successes under
    /// `healthy_latency_ms` raises capacity by one (§4.5).
    pub fn record_success(&self, latency_ms: u64) {
        let mut state = self.state.lock();
        state.total_successes += 1;
        if latency_ms <= state.healthy_latency_ms {
            state.success_streak += 1;
            if state.success_streak >= state.growth_streak_threshold && state.capacity < state.max_concurrency {
                state.capacity += 1;
                state.success_streak = 0;
                tracing::info!(new_capacity = state.capacity, "throttle capacity increased");
                self.semaphore.add_permits(1);
            }
        } else {
            state.success_streak = 0;
        }
    }

    /// Record a failed operation. A rate-limit failure immediately halves
    /// capacity (floored at `min_concurrency`) and resets the success streak;
    /// any other failure only resets the streak (§4.5).
    pub fn record_failure(&self, is_rate_limit: bool) {
        let mut state = self.state.lock();
        state.total_failures += 1;
        state.success_streak = 0;
        if is_rate_limit {
            state.total_rate_limits += 1;
            let new_capacity = (state.capacity / 2).max(state.min_concurrency);
            if new_capacity < state.capacity {
                let shrink_by = state.capacity - new_capacity;
                state.capacity = new_capacity;
                tracing::info!(new_capacity, "throttle capacity halved after rate limit");
                for _ in 0..shrink_by {
                    // Shrinking by forgetting permits: the permit count only
                    // decreases once the forgotten permits would otherwise be
                    // returned (i.e. it takes effect for future acquires, per
                    // §4.5 "Capacity changes take effect on the next acquire").
                    if let Ok(permit) = self.semaphore.try_acquire() {
                        permit.forget();
                    }
                }
            }
        }
    }

    /// Sleep for the server-provided `retry_after` before the caller retries
    /// the same operation exactly once (§4.5, §4.6 step 6).
    pub async fn wait_retry_after(&self, retry_after_secs: u64) {
        tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
    }

    pub fn metrics(&self) -> ThrottleMetrics {
        let state = self.state.lock();
        ThrottleMetrics {
            capacity: state.capacity,
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            total_rate_limits: state.total_rate_limits,
        }
    }
}

/// Point-in-time throttle metrics, surfaced in `ExecutionSummary` (§4.6 "Statistics").
#[derive(Debug, Clone, Copy)]
pub struct ThrottleMetrics {
    pub capacity: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rate_limits: u64,
}
