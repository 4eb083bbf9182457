//! Session Metrics
//!
//! Counters for one narrator session:
//! - Lines shown (ambient, mind, immediate)
//! - Queued reactive events that expired before retry
//! - Completions dropped as stale
//! - Denials by reason
//! - Emotion transitions

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::rate_limit::DenialReason;

/// Live counters, owned by the orchestrator
#[derive(Clone, Debug)]
pub struct SessionMetrics {
    session_id: Uuid,
    immediate_responses: u64,
    ambient_lines: u64,
    mind_lines: u64,
    queued_misses: u64,
    stale_completions: u64,
    transitions: u64,
    denials: BTreeMap<DenialReason, u64>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    /// Fresh counters with a random session id
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            immediate_responses: 0,
            ambient_lines: 0,
            mind_lines: 0,
            queued_misses: 0,
            stale_completions: 0,
            transitions: 0,
            denials: BTreeMap::new(),
        }
    }

    /// Session id
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub(crate) fn record_immediate(&mut self) {
        self.immediate_responses += 1;
    }

    pub(crate) fn record_ambient(&mut self) {
        self.ambient_lines += 1;
    }

    pub(crate) fn record_mind(&mut self) {
        self.mind_lines += 1;
    }

    pub(crate) fn record_queued_miss(&mut self) {
        self.queued_misses += 1;
    }

    pub(crate) fn record_transition(&mut self) {
        self.transitions += 1;
    }

    pub(crate) fn record_denial(&mut self, reason: DenialReason) {
        if reason == DenialReason::StaleTextComplete {
            self.stale_completions += 1;
        }
        *self.denials.entry(reason).or_default() += 1;
    }

    /// Count for one denial reason
    #[must_use]
    pub fn denials(&self, reason: DenialReason) -> u64 {
        self.denials.get(&reason).copied().unwrap_or(0)
    }

    /// Serializable copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            session_id: self.session_id.to_string(),
            immediate_responses: self.immediate_responses,
            ambient_lines: self.ambient_lines,
            mind_lines: self.mind_lines,
            queued_misses: self.queued_misses,
            stale_completions: self.stale_completions,
            transitions: self.transitions,
            denials: self
                .denials
                .iter()
                .map(|(reason, count)| (reason.as_str().to_string(), *count))
                .collect(),
        }
    }
}

/// Point-in-time copy of [`SessionMetrics`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Session id
    pub session_id: String,
    /// Immediate responses shown
    pub immediate_responses: u64,
    /// Ambient lines shown
    pub ambient_lines: u64,
    /// Mind lines shown
    pub mind_lines: u64,
    /// Queued reactive events that expired
    pub queued_misses: u64,
    /// Stale completions dropped
    pub stale_completions: u64,
    /// Emotion transitions
    pub transitions: u64,
    /// Denials keyed by reason code
    pub denials: BTreeMap<String, u64>,
}
