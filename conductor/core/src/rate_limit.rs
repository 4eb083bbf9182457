//! Response Rate Limiting
//!
//! Admission control for immediate responses. A narrator that answers every
//! hover and slider twitch becomes noise, so each reactive event must pass
//! five checks, in this order, before it earns a response:
//!
//! 1. **Event cooldown** - the same (event, target) pair answered recently
//! 2. **Global lock** - any response in the last few seconds
//! 3. **Budget** - a token bucket of responses, refilled in whole units
//! 4. **Recent suppression** - identical signature in the recent ring
//! 5. **Display busy** - the display cannot be interrupted right now
//!
//! The first failing check short-circuits and becomes the [`DenialReason`].
//! Only a full pass commits side effects (cooldown, budget, ring, lock).
//!
//! # Design
//!
//! Denials are plain values, not errors. A few event kinds that matter even
//! when the display is busy can be parked in a single-slot queue with a short
//! TTL and retried the next time any reactive event routes through.
//!
//! # Usage
//!
//! ```
//! use std::time::Instant;
//! use narrator_core::content::InteractionTarget;
//! use narrator_core::events::{ReactiveEvent, ReactiveKind};
//! use narrator_core::rate_limit::{ResponseLimitConfig, ResponseLimiter};
//!
//! let mut limiter = ResponseLimiter::new(ResponseLimitConfig::default().with_budget_max(5));
//! let event = ReactiveEvent::new(ReactiveKind::StateReset, InteractionTarget::None);
//! assert!(limiter.admit(&event, Instant::now(), true).is_ok());
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::events::{ReactiveEvent, ReactiveKind};

// =============================================================================
// Configuration
// =============================================================================

/// Per-kind cooldowns (milliseconds)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindCooldowns {
    /// Button hesitation
    pub button_hesitation_ms: u64,
    /// State reset
    pub state_reset_ms: u64,
    /// Slider exploration
    pub slider_exploration_ms: u64,
    /// Preset exploration
    pub preset_exploration_ms: u64,
    /// Orientation adjustment
    pub orientation_adjustment_ms: u64,
}

impl Default for KindCooldowns {
    fn default() -> Self {
        Self {
            button_hesitation_ms: 20_000,
            state_reset_ms: 15_000,
            slider_exploration_ms: 25_000,
            preset_exploration_ms: 25_000,
            orientation_adjustment_ms: 20_000,
        }
    }
}

impl KindCooldowns {
    /// Cooldown for `kind`
    #[must_use]
    pub fn get(&self, kind: ReactiveKind) -> Duration {
        let ms = match kind {
            ReactiveKind::ButtonHesitation => self.button_hesitation_ms,
            ReactiveKind::StateReset => self.state_reset_ms,
            ReactiveKind::SliderExploration => self.slider_exploration_ms,
            ReactiveKind::PresetExploration => self.preset_exploration_ms,
            ReactiveKind::OrientationAdjustment => self.orientation_adjustment_ms,
        };
        Duration::from_millis(ms)
    }

    fn scaled(&self, factor: f64) -> Self {
        let scale = |ms: u64| (ms as f64 * factor).round() as u64;
        Self {
            button_hesitation_ms: scale(self.button_hesitation_ms),
            state_reset_ms: scale(self.state_reset_ms),
            slider_exploration_ms: scale(self.slider_exploration_ms),
            preset_exploration_ms: scale(self.preset_exploration_ms),
            orientation_adjustment_ms: scale(self.orientation_adjustment_ms),
        }
    }
}

/// Admission control tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseLimitConfig {
    /// Per-(event, target) cooldowns by kind
    pub cooldowns: KindCooldowns,

    /// Quiet period after any successful response (milliseconds)
    pub global_lock_ms: u64,

    /// Maximum responses held in the budget
    pub budget_max: u32,

    /// One budget unit returns after this long (milliseconds)
    pub budget_refill_ms: u64,

    /// Identical signatures inside this window are suppressed (milliseconds)
    pub suppression_window_ms: u64,

    /// Size of the recent-signature ring
    pub recent_capacity: usize,

    /// How long a queued event stays retryable (milliseconds)
    pub queue_ttl_ms: u64,

    /// Kinds that may be queued when the display is busy
    pub queueable: Vec<ReactiveKind>,

    /// Whether checks 1-4 run at all (the busy check always does)
    pub enabled: bool,
}

impl Default for ResponseLimitConfig {
    fn default() -> Self {
        Self {
            cooldowns: KindCooldowns::default(),
            global_lock_ms: 8_000,
            budget_max: 3,
            budget_refill_ms: 45_000,
            suppression_window_ms: 60_000,
            recent_capacity: 8,
            queue_ttl_ms: 2_000,
            queueable: vec![
                ReactiveKind::ButtonHesitation,
                ReactiveKind::StateReset,
                ReactiveKind::OrientationAdjustment,
            ],
            enabled: true,
        }
    }
}

impl ResponseLimitConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global lock
    #[must_use]
    pub fn with_global_lock_ms(mut self, ms: u64) -> Self {
        self.global_lock_ms = ms;
        self
    }

    /// Set the budget size
    #[must_use]
    pub fn with_budget_max(mut self, max: u32) -> Self {
        self.budget_max = max;
        self
    }

    /// Set the budget refill interval
    #[must_use]
    pub fn with_budget_refill_ms(mut self, ms: u64) -> Self {
        self.budget_refill_ms = ms;
        self
    }

    /// Set the suppression window
    #[must_use]
    pub fn with_suppression_window_ms(mut self, ms: u64) -> Self {
        self.suppression_window_ms = ms;
        self
    }

    /// Set the per-kind cooldowns
    #[must_use]
    pub fn with_cooldowns(mut self, cooldowns: KindCooldowns) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    /// Enable or disable checks 1-4
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Only the busy check remains (for testing)
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Fewer, rarer responses
    #[must_use]
    pub fn strict() -> Self {
        let base = Self::default();
        Self {
            cooldowns: base.cooldowns.scaled(2.0),
            global_lock_ms: 15_000,
            budget_max: 2,
            budget_refill_ms: 90_000,
            suppression_window_ms: 120_000,
            ..base
        }
    }

    /// A chattier narrator
    #[must_use]
    pub fn relaxed() -> Self {
        let base = Self::default();
        Self {
            cooldowns: base.cooldowns.scaled(0.5),
            global_lock_ms: 4_000,
            budget_max: 5,
            budget_refill_ms: 20_000,
            suppression_window_ms: 30_000,
            ..base
        }
    }
}

// =============================================================================
// Denials
// =============================================================================

/// Why the narrator did not respond
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Same event and target answered recently
    EventCooldown,
    /// Any response in the global quiet period
    GlobalLock,
    /// Response budget empty
    BudgetExhausted,
    /// Identical signature in the recent ring
    RecentSuppression,
    /// Display cannot be interrupted
    FsmBusy,
    /// A multi-line sequence is running
    SequenceLocked,
    /// Nothing suitable to say
    NoContent,
    /// A completion arrived for a superseded request
    StaleTextComplete,
    /// Mind request while the page is hidden
    MindSuppressed,
}

impl DenialReason {
    /// Stable snake_case code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventCooldown => "event_cooldown",
            Self::GlobalLock => "global_lock",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RecentSuppression => "recent_suppression",
            Self::FsmBusy => "fsm_busy",
            Self::SequenceLocked => "sequence_locked",
            Self::NoContent => "no_content",
            Self::StaleTextComplete => "stale_text_complete",
            Self::MindSuppressed => "mind_suppressed",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Budget
// =============================================================================

/// Token bucket refilled in whole units
#[derive(Clone, Debug)]
pub struct ResponseBudget {
    current: u32,
    max: u32,
    refill: Duration,
    last_refill: Option<Instant>,
}

impl ResponseBudget {
    /// A full budget
    #[must_use]
    pub fn new(max: u32, refill: Duration) -> Self {
        Self {
            current: max,
            max,
            refill,
            last_refill: None,
        }
    }

    /// Units available
    #[must_use]
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Add `floor(elapsed / refill)` units, capped at the maximum
    pub fn refill(&mut self, now: Instant) {
        let last = *self.last_refill.get_or_insert(now);
        if self.current >= self.max {
            self.last_refill = Some(now);
            return;
        }
        if self.refill.is_zero() {
            self.current = self.max;
            self.last_refill = Some(now);
            return;
        }

        let elapsed = now.saturating_duration_since(last);
        let units = elapsed.as_millis() / self.refill.as_millis();
        if units == 0 {
            return;
        }
        let units = u32::try_from(units).unwrap_or(u32::MAX);
        self.current = self.current.saturating_add(units).min(self.max);
        self.last_refill = Some(if self.current >= self.max {
            now
        } else {
            last + self.refill * units
        });
    }

    /// Spend one unit; `false` when empty
    pub fn try_spend(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Result of draining the queue slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingEvent {
    /// Nothing queued
    Empty,
    /// The queued event outlived its TTL
    Expired(ReactiveEvent),
    /// Retry this event
    Ready(ReactiveEvent),
}

#[derive(Clone, Debug)]
struct Queued {
    event: ReactiveEvent,
    queued_at: Instant,
}

/// Counters kept by the limiter
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    /// Events admitted
    pub admitted: u64,
    /// Denials by reason
    pub denied: HashMap<DenialReason, u64>,
    /// Events parked in the queue slot
    pub queued: u64,
}

/// Configured thresholds, for instrumentation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LimiterThresholds {
    /// Per-kind cooldowns
    pub cooldowns: KindCooldowns,
    /// Global lock
    pub global_lock: Duration,
    /// Budget size
    pub budget_max: u32,
    /// Budget refill interval
    pub budget_refill: Duration,
    /// Suppression window
    pub suppression_window: Duration,
    /// Queue TTL
    pub queue_ttl: Duration,
}

/// Five-layer admission controller for reactive responses
#[derive(Debug)]
pub struct ResponseLimiter {
    config: ResponseLimitConfig,
    cooldowns: HashMap<ReactiveEvent, Instant>,
    global_lock_until: Option<Instant>,
    budget: ResponseBudget,
    recent: VecDeque<(ReactiveEvent, Instant)>,
    pending: Option<Queued>,
    stats: LimiterStats,
}

impl ResponseLimiter {
    /// Create a limiter with a full budget
    #[must_use]
    pub fn new(config: ResponseLimitConfig) -> Self {
        let budget = ResponseBudget::new(
            config.budget_max,
            Duration::from_millis(config.budget_refill_ms),
        );
        Self {
            recent: VecDeque::with_capacity(config.recent_capacity),
            config,
            cooldowns: HashMap::new(),
            global_lock_until: None,
            budget,
            pending: None,
            stats: LimiterStats::default(),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ResponseLimitConfig::default())
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &ResponseLimitConfig {
        &self.config
    }

    /// Run the five checks and commit on success
    pub fn admit(
        &mut self,
        event: &ReactiveEvent,
        now: Instant,
        interruptible: bool,
    ) -> Result<(), DenialReason> {
        let verdict = self.check(event, now, interruptible);
        match verdict {
            Ok(()) => self.commit(event, now),
            Err(reason) => {
                *self.stats.denied.entry(reason).or_default() += 1;
                tracing::debug!(
                    kind = %event.kind,
                    target = %event.target,
                    reason = %reason,
                    "Reactive event denied"
                );
            }
        }
        verdict
    }

    fn check(
        &mut self,
        event: &ReactiveEvent,
        now: Instant,
        interruptible: bool,
    ) -> Result<(), DenialReason> {
        if self.config.enabled {
            if self.cooldowns.get(event).is_some_and(|until| now < *until) {
                return Err(DenialReason::EventCooldown);
            }
            if self.global_lock_until.is_some_and(|until| now < until) {
                return Err(DenialReason::GlobalLock);
            }
            self.budget.refill(now);
            if self.budget.current() == 0 {
                return Err(DenialReason::BudgetExhausted);
            }
            let window = Duration::from_millis(self.config.suppression_window_ms);
            if self
                .recent
                .iter()
                .any(|(sig, at)| sig == event && now.saturating_duration_since(*at) < window)
            {
                return Err(DenialReason::RecentSuppression);
            }
        }
        if !interruptible {
            return Err(DenialReason::FsmBusy);
        }
        Ok(())
    }

    fn commit(&mut self, event: &ReactiveEvent, now: Instant) {
        self.stats.admitted += 1;
        if !self.config.enabled {
            return;
        }

        self.cooldowns
            .insert(event.clone(), now + self.config.cooldowns.get(event.kind));
        self.budget.try_spend();
        if self.config.recent_capacity > 0 {
            if self.recent.len() >= self.config.recent_capacity {
                self.recent.pop_front();
            }
            self.recent.push_back((event.clone(), now));
        }
        self.global_lock_until = Some(now + Duration::from_millis(self.config.global_lock_ms));

        // Expired cooldowns only matter for memory
        self.cooldowns.retain(|_, until| *until > now);

        tracing::debug!(
            kind = %event.kind,
            target = %event.target,
            budget = self.budget.current(),
            "Reactive event admitted"
        );
    }

    /// Whether `kind` may wait in the queue slot
    #[must_use]
    pub fn is_queueable(&self, kind: ReactiveKind) -> bool {
        self.config.queueable.contains(&kind)
    }

    /// Park an event denied as busy; returns `false` for other kinds
    ///
    /// A newer event replaces an older one in the slot.
    pub fn queue(&mut self, event: ReactiveEvent, now: Instant) -> bool {
        if !self.is_queueable(event.kind) {
            return false;
        }
        self.stats.queued += 1;
        tracing::debug!(kind = %event.kind, target = %event.target, "Reactive event queued");
        self.pending = Some(Queued {
            event,
            queued_at: now,
        });
        true
    }

    /// Whether the queue slot is occupied
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the queued event, checking its TTL
    pub fn take_pending(&mut self, now: Instant) -> PendingEvent {
        let Some(queued) = self.pending.take() else {
            return PendingEvent::Empty;
        };
        let age = now.saturating_duration_since(queued.queued_at);
        if age > Duration::from_millis(self.config.queue_ttl_ms) {
            tracing::debug!(kind = %queued.event.kind, "Queued reactive event expired");
            PendingEvent::Expired(queued.event)
        } else {
            PendingEvent::Ready(queued.event)
        }
    }

    /// Budget units left, after refilling to `now`
    pub fn budget_remaining(&mut self, now: Instant) -> u32 {
        self.budget.refill(now);
        self.budget.current()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> &LimiterStats {
        &self.stats
    }

    /// Configured thresholds
    #[must_use]
    pub fn thresholds(&self) -> LimiterThresholds {
        LimiterThresholds {
            cooldowns: self.config.cooldowns.clone(),
            global_lock: Duration::from_millis(self.config.global_lock_ms),
            budget_max: self.config.budget_max,
            budget_refill: Duration::from_millis(self.config.budget_refill_ms),
            suppression_window: Duration::from_millis(self.config.suppression_window_ms),
            queue_ttl: Duration::from_millis(self.config.queue_ttl_ms),
        }
    }
}
