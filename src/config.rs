//! Engine-wide policy configuration
//!
//! Constructed and owned by the embedding CLI (out of scope for this crate)
//! and threaded into the diff engine, planner, throttle, and executor.

use serde::{Deserialize, Serialize};

/// How the diff engine reconciles a row's declared `action` against whether
/// the resource currently exists on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// `create` + exists => NOOP ("already exists"); never falls back to UPDATE.
    CreateOnly,
    /// `update` + not-exists => NOOP with `conflict_detected = true`.
    Strict,
    /// `update` + not-exists => CREATE; `create` + exists => UPDATE/NOOP.
    Upsert,
}

impl Default for UpdateMode {
    fn default() -> Self {
        UpdateMode::Upsert
    }
}

/// Full policy surface for one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// §4.1 policy surface
    pub update_mode: UpdateMode,
    /// Downgrades DELETE and ORPHAN to NOOP when true
    pub safe_mode: bool,
    /// Whether orphan detection runs at all
    pub enable_orphan_detection: bool,
    /// Caps the size of any single execution batch; `None` means unbounded
    pub max_batch_size: Option<usize>,
    /// Throttle: floor on in-flight concurrency
    pub min_concurrency: usize,
    /// Throttle: ceiling on in-flight concurrency
    pub max_concurrency: usize,
    /// Throttle: starting capacity, must lie within `[min_concurrency, max_concurrency]`
    pub initial_concurrency: usize,
    /// Throttle: latency, in milliseconds, below which a success counts toward a growth streak
    pub healthy_latency_ms: u64,
    /// Throttle: consecutive healthy successes required before capacity grows by one
    pub growth_streak_threshold: u32,
    /// Checkpoint retention window; rows older than this and in a terminal state are purged
    pub checkpoint_retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::default(),
            safe_mode: false,
            enable_orphan_detection: true,
            max_batch_size: None,
            min_concurrency: 1,
            max_concurrency: 16,
            initial_concurrency: 4,
            healthy_latency_ms: 2000,
            growth_streak_threshold: 5,
            checkpoint_retention_days: 30,
        }
    }
}

impl EngineConfig {
    /// Clamp `initial_concurrency` into `[min_concurrency, max_concurrency]`.
    ///
    /// Malformed bounds (e.g. `min > max`) are a caller bug; this only fixes
    /// up the initial value, it does not validate the bounds themselves.
    pub fn clamped_initial_concurrency(&self) -> usize {
        self.initial_concurrency
            .clamp(self.min_concurrency, self.max_concurrency.max(self.min_concurrency))
    }
}
