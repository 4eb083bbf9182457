//! Event Router
//!
//! The routing half of the orchestrator: admission control for reactive
//! events (delegated to [`ResponseLimiter`]) and pacing of the ambient cycle.
//!
//! # Ambient pacing
//!
//! ```text
//! delay = base_idle
//!       × (1 + (speech_multiplier − 1) × damping)
//!       × (1 + min(chars / chars_per_unit, max_length_bonus))
//! delay = max(delay, theme_floor)
//! delay = clamp(delay, min_delay, max_delay)
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::content::ContentSelector;
use crate::emotion::EmotionEngine;
use crate::events::ReactiveEvent;
use crate::rate_limit::{
    DenialReason, LimiterThresholds, PendingEvent, ResponseLimitConfig, ResponseLimiter,
};

/// Ambient pacing tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayPolicy {
    /// Fraction of the emotion's speech multiplier that takes effect
    pub speech_damping: f64,

    /// Characters per unit of length bonus
    pub chars_per_unit: f64,

    /// Cap on the length bonus
    pub max_length_bonus: f64,

    /// Minimum delay after content with a theme (milliseconds)
    pub theme_floors_ms: BTreeMap<String, u64>,

    /// Hard lower bound (milliseconds)
    pub min_delay_ms: u64,

    /// Hard upper bound (milliseconds)
    pub max_delay_ms: u64,

    /// Retry delay when nothing could be selected (milliseconds)
    pub empty_retry_ms: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        let theme_floors_ms = [
            ("mathematical", 12_000),
            ("existential", 12_000),
            ("philosophical", 10_000),
            ("cosmic", 9_000),
        ]
        .into_iter()
        .map(|(theme, ms)| (theme.to_string(), ms))
        .collect();

        Self {
            speech_damping: 0.75,
            chars_per_unit: 240.0,
            max_length_bonus: 0.6,
            theme_floors_ms,
            min_delay_ms: 3_000,
            max_delay_ms: 30_000,
            empty_retry_ms: 5_000,
        }
    }
}

impl DelayPolicy {
    /// Set the clamp band
    #[must_use]
    pub fn with_bounds_ms(mut self, min: u64, max: u64) -> Self {
        self.min_delay_ms = min.min(max);
        self.max_delay_ms = max.max(min);
        self
    }

    /// Add or replace a theme floor
    #[must_use]
    pub fn with_theme_floor(mut self, theme: impl Into<String>, ms: u64) -> Self {
        self.theme_floors_ms.insert(theme.into(), ms);
        self
    }

    /// Compose the delay from its inputs
    #[must_use]
    pub fn delay(
        &self,
        base_idle: Duration,
        speech_multiplier: f64,
        last_chars: usize,
        last_themes: &[String],
    ) -> Duration {
        let speech = 1.0 + (speech_multiplier - 1.0) * self.speech_damping;
        let length = 1.0
            + (last_chars as f64 / self.chars_per_unit.max(1.0)).min(self.max_length_bonus);
        let mut secs = base_idle.as_secs_f64() * speech.max(0.0) * length;

        let floor_ms = last_themes
            .iter()
            .filter_map(|theme| self.theme_floors_ms.get(&theme.to_ascii_lowercase()))
            .max()
            .copied()
            .unwrap_or(0);
        secs = secs.max(floor_ms as f64 / 1000.0);

        let min = self.min_delay_ms.min(self.max_delay_ms) as f64 / 1000.0;
        let max = self.max_delay_ms as f64 / 1000.0;
        Duration::from_secs_f64(secs.clamp(min, max))
    }

    /// Retry delay after an empty selection
    #[must_use]
    pub fn empty_retry(&self) -> Duration {
        Duration::from_millis(self.empty_retry_ms)
    }
}

/// Admission control plus ambient pacing
#[derive(Debug)]
pub struct EventRouter {
    limiter: ResponseLimiter,
    policy: DelayPolicy,
}

impl EventRouter {
    /// Create a router
    #[must_use]
    pub fn new(limits: ResponseLimitConfig, policy: DelayPolicy) -> Self {
        Self {
            limiter: ResponseLimiter::new(limits),
            policy,
        }
    }

    /// Pacing policy
    #[must_use]
    pub fn policy(&self) -> &DelayPolicy {
        &self.policy
    }

    /// The limiter
    #[must_use]
    pub fn limiter(&self) -> &ResponseLimiter {
        &self.limiter
    }

    /// Run the admission checks for a reactive event
    pub fn admit(
        &mut self,
        event: &ReactiveEvent,
        now: Instant,
        interruptible: bool,
    ) -> Result<(), DenialReason> {
        self.limiter.admit(event, now, interruptible)
    }

    /// Park a busy-denied event if its kind allows it
    pub fn queue(&mut self, event: ReactiveEvent, now: Instant) -> bool {
        self.limiter.queue(event, now)
    }

    /// Drain the queue slot
    pub fn take_pending(&mut self, now: Instant) -> PendingEvent {
        self.limiter.take_pending(now)
    }

    /// Limiter thresholds
    #[must_use]
    pub fn thresholds(&self) -> LimiterThresholds {
        self.limiter.thresholds()
    }

    /// Delay until the next ambient cycle
    #[must_use]
    pub fn next_ambient_delay(&self, emotion: &EmotionEngine, selector: &ContentSelector) -> Duration {
        let (chars, themes) = selector.last_shown();
        let delay = self.policy.delay(
            emotion.base_idle_time(),
            emotion.speech_multiplier(),
            chars,
            themes,
        );
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            emotion = %emotion.emotion(),
            chars,
            "Next ambient delay"
        );
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(d: Duration) -> f64 {
        d.as_secs_f64()
    }

    #[test]
    fn test_neutral_composition() {
        let policy = DelayPolicy::default();
        let d = policy.delay(Duration::from_secs(8), 1.0, 0, &[]);
        assert!((secs(d) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_speech_multiplier_is_damped() {
        let policy = DelayPolicy::default();
        // 1 + (0.6 - 1) * 0.75 = 0.7
        let d = policy.delay(Duration::from_secs(10), 0.6, 0, &[]);
        assert!((secs(d) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_bonus_capped() {
        let policy = DelayPolicy::default();
        let short = policy.delay(Duration::from_secs(10), 1.0, 120, &[]);
        let long = policy.delay(Duration::from_secs(10), 1.0, 10_000, &[]);
        assert!((secs(short) - 15.0).abs() < 1e-6);
        assert!((secs(long) - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_theme_floor_and_clamp() {
        let policy = DelayPolicy::default();
        let themes = vec!["Cosmic".to_string(), "mathematical".to_string()];
        let d = policy.delay(Duration::from_secs(4), 1.0, 0, &themes);
        assert!((secs(d) - 12.0).abs() < 1e-6);

        let tiny = policy.delay(Duration::from_millis(500), 0.5, 0, &[]);
        assert!((secs(tiny) - 3.0).abs() < 1e-6);

        let huge = policy.delay(Duration::from_secs(60), 1.4, 240, &[]);
        assert!((secs(huge) - 30.0).abs() < 1e-6);
    }
}
