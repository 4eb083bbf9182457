//! Typing Cadence
//!
//! Surface-agnostic timing for the narrator's typewriter effect. The display
//! state machine asks this module how long to wait before each character,
//! how long a finished line stays on screen, and how long the very first
//! line of a session "thinks" before it starts.
//!
//! # Jitter
//!
//! Per-character delays are multiplied by a jitter factor drawn from a
//! triangular distribution (the mean of two uniform samples) mapped onto
//! `[1 - jitter, 1 + jitter]`. Small deviations are common, large ones rare,
//! which reads as less mechanical than a flat uniform spread.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cadence tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Base delay per typed character (milliseconds)
    pub char_delay_ms: u64,

    /// Delay per deleted character (milliseconds)
    pub delete_delay_ms: u64,

    /// Lower clamp for any per-character delay (milliseconds)
    pub min_char_delay_ms: u64,

    /// Upper clamp for any per-character delay (milliseconds)
    pub max_char_delay_ms: u64,

    /// Relative jitter, 0.15 means +/-15%
    pub jitter: f64,

    /// Fixed part of a line's display time (milliseconds)
    pub display_base_ms: u64,

    /// Display time added per visible character (milliseconds)
    pub display_per_char_ms: u64,

    /// Shortest display time (milliseconds)
    pub display_min_ms: u64,

    /// Longest display time (milliseconds)
    pub display_max_ms: u64,

    /// Gap between lines of one sequence (milliseconds)
    pub line_gap_ms: u64,

    /// Shortest wait before the first line of a session (milliseconds)
    pub contemplation_min_ms: u64,

    /// Longest wait before the first line of a session (milliseconds)
    pub contemplation_max_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            char_delay_ms: 42,
            delete_delay_ms: 16,
            min_char_delay_ms: 12,
            max_char_delay_ms: 140,
            jitter: 0.15,
            display_base_ms: 2_500,
            display_per_char_ms: 55,
            display_min_ms: 2_000,
            display_max_ms: 12_000,
            line_gap_ms: 600,
            contemplation_min_ms: 3_000,
            contemplation_max_ms: 5_000,
        }
    }
}

impl CadenceConfig {
    /// Set the base typing delay
    #[must_use]
    pub fn with_char_delay_ms(mut self, ms: u64) -> Self {
        self.char_delay_ms = ms;
        self
    }

    /// Set the jitter fraction
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.9);
        self
    }

    /// Set the contemplation window
    #[must_use]
    pub fn with_contemplation_ms(mut self, min: u64, max: u64) -> Self {
        self.contemplation_min_ms = min.min(max);
        self.contemplation_max_ms = max.max(min);
        self
    }

    /// Near-instant cadence, handy in tests and headless runs
    #[must_use]
    pub fn instant() -> Self {
        Self {
            char_delay_ms: 1,
            delete_delay_ms: 1,
            min_char_delay_ms: 1,
            max_char_delay_ms: 1,
            jitter: 0.0,
            display_base_ms: 100,
            display_per_char_ms: 0,
            display_min_ms: 100,
            display_max_ms: 100,
            line_gap_ms: 10,
            contemplation_min_ms: 0,
            contemplation_max_ms: 0,
        }
    }
}

/// Lower and upper bounds on per-character delay for a given pace
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedBounds {
    /// Fastest possible character
    pub min: Duration,
    /// Slowest possible character
    pub max: Duration,
}

/// Produces typing, deleting and display durations
#[derive(Debug)]
pub struct TypingCadence {
    config: CadenceConfig,
    rng: StdRng,
}

impl TypingCadence {
    /// Create a cadence with its own RNG
    pub fn new(config: CadenceConfig, rng: StdRng) -> Self {
        Self { config, rng }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Delay before the next typed character at `pace` (above 1.0 is faster)
    pub fn char_delay(&mut self, pace: f64) -> Duration {
        let base = self.config.char_delay_ms as f64 / sanitize_pace(pace);
        let ms = base * self.jitter_multiplier();
        self.clamp_char(ms)
    }

    /// Delay before the next deleted character
    pub fn delete_delay(&mut self, pace: f64) -> Duration {
        let base = self.config.delete_delay_ms as f64 / sanitize_pace(pace);
        let ms = base * self.jitter_multiplier();
        Duration::from_millis(ms.round().max(1.0) as u64)
    }

    /// How long a fully typed line stays visible
    ///
    /// Slower paces read slower, so the hold grows as pace drops.
    #[must_use]
    pub fn display_time(&self, chars: usize, duration_mult: f64, pace: f64) -> Duration {
        let raw = self.config.display_base_ms as f64
            + self.config.display_per_char_ms as f64 * chars as f64;
        let scaled = raw * duration_mult.max(0.1) / sanitize_pace(pace).sqrt();
        let clamped = scaled.clamp(
            self.config.display_min_ms as f64,
            self.config.display_max_ms.max(self.config.display_min_ms) as f64,
        );
        Duration::from_millis(clamped.round() as u64)
    }

    /// Gap between lines of a sequence
    #[must_use]
    pub fn line_gap(&self) -> Duration {
        Duration::from_millis(self.config.line_gap_ms)
    }

    /// Random wait before the first line of a session
    pub fn contemplation_delay(&mut self) -> Duration {
        let (min, max) = (
            self.config.contemplation_min_ms,
            self.config.contemplation_max_ms.max(self.config.contemplation_min_ms),
        );
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Delay range for typing at `pace`
    #[must_use]
    pub fn speed_bounds(&self, pace: f64) -> SpeedBounds {
        let base = self.config.char_delay_ms as f64 / sanitize_pace(pace);
        SpeedBounds {
            min: self.clamp_char(base * (1.0 - self.config.jitter)),
            max: self.clamp_char(base * (1.0 + self.config.jitter)),
        }
    }

    fn jitter_multiplier(&mut self) -> f64 {
        let jitter = self.config.jitter;
        if jitter <= 0.0 {
            return 1.0;
        }
        let u1: f64 = self.rng.gen();
        let u2: f64 = self.rng.gen();
        let triangular = (u1 + u2) / 2.0;
        (1.0 - jitter) + triangular * (2.0 * jitter)
    }

    fn clamp_char(&self, ms: f64) -> Duration {
        let lo = self.config.min_char_delay_ms as f64;
        let hi = self.config.max_char_delay_ms.max(self.config.min_char_delay_ms) as f64;
        Duration::from_millis(ms.clamp(lo, hi).round() as u64)
    }
}

fn sanitize_pace(pace: f64) -> f64 {
    if pace.is_finite() {
        pace.clamp(0.25, 4.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cadence() -> TypingCadence {
        TypingCadence::new(CadenceConfig::default(), StdRng::seed_from_u64(8))
    }

    #[test]
    fn test_char_delay_within_bounds() {
        let mut cadence = cadence();
        for pace in [0.75, 1.0, 1.35] {
            let bounds = cadence.speed_bounds(pace);
            for _ in 0..500 {
                let d = cadence.char_delay(pace);
                assert!(d >= bounds.min && d <= bounds.max, "{d:?} outside {bounds:?}");
            }
        }
    }

    #[test]
    fn test_faster_pace_types_faster() {
        let cadence = cadence();
        assert!(cadence.speed_bounds(1.3).max < cadence.speed_bounds(0.8).min);
    }

    #[test]
    fn test_display_time_clamped() {
        let cadence = cadence();
        assert_eq!(
            cadence.display_time(0, 1.0, 1.0),
            Duration::from_millis(2_500)
        );
        assert_eq!(
            cadence.display_time(10_000, 1.0, 1.0),
            Duration::from_millis(12_000)
        );
        assert_eq!(
            cadence.display_time(0, 0.1, 1.0),
            Duration::from_millis(2_000)
        );
        assert!(cadence.display_time(40, 1.5, 1.0) > cadence.display_time(40, 1.0, 1.0));
    }

    #[test]
    fn test_contemplation_in_window() {
        let mut cadence = cadence();
        for _ in 0..100 {
            let d = cadence.contemplation_delay();
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jitter_is_centered() {
        let mut cadence = cadence();
        let n = 5_000;
        let mean: f64 = (0..n).map(|_| cadence.jitter_multiplier()).sum::<f64>() / f64::from(n);
        assert!((mean - 1.0).abs() < 0.01, "mean {mean}");
    }
}
