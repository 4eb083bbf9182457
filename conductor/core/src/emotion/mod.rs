//! Emotion Engine
//!
//! Simulates the narrator's mood. The engine owns one [`EmotionalState`] per
//! session and moves it around the [`EmotionGraph`] in response to three
//! kinds of stimulus:
//!
//! - **Event reaction** - observation and reactive events map to a table of
//!   candidate edges, scaled by personality and drawn by weight
//! - **Drift** - after dwelling long enough without a transition the state
//!   wanders along a drift edge set
//! - **Reflection** - every line shown feeds its `reflect_pull` back into a
//!   transition pressure that eventually overcomes the emotion's mass
//!
//! All three share a single cooldown, so two transitions of one engine are
//! always at least `min_transition_interval_ms` apart.
//!
//! # Design
//!
//! The engine never reads the clock. Every method that depends on time takes
//! an explicit `now: Instant`, and randomness comes from an owned `StdRng`
//! so a seeded engine replays exactly.

pub mod graph;

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use graph::{Edge, EmotionGraph, Personality};

use crate::weighted::weighted_index;

// =============================================================================
// Emotion
// =============================================================================

/// The narrator's discrete emotional states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    /// Resting state
    #[default]
    Neutral,
    /// Interested in what is happening
    Curious,
    /// Thinking in numbers
    Analytical,
    /// Finding things funny
    Amused,
    /// Worried about the simulation
    Concerned,
    /// Lost in thought
    Contemplative,
    /// Energised
    Excited,
    /// Nothing is happening
    Bored,
    /// Caught off guard
    Surprised,
}

impl Emotion {
    /// Every emotion, in declaration order
    pub const ALL: [Emotion; 9] = [
        Emotion::Neutral,
        Emotion::Curious,
        Emotion::Analytical,
        Emotion::Amused,
        Emotion::Concerned,
        Emotion::Contemplative,
        Emotion::Excited,
        Emotion::Bored,
        Emotion::Surprised,
    ];

    /// Lowercase name as used in content files
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Curious => "curious",
            Self::Analytical => "analytical",
            Self::Amused => "amused",
            Self::Concerned => "concerned",
            Self::Contemplative => "contemplative",
            Self::Excited => "excited",
            Self::Bored => "bored",
            Self::Surprised => "surprised",
        }
    }

    /// Parse a name, ignoring ASCII case
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Base seconds of silence between ambient lines at full intensity scale
    fn base_idle_secs(self) -> f64 {
        match self {
            Self::Excited => 5.0,
            Self::Surprised => 5.5,
            Self::Amused => 6.5,
            Self::Curious => 7.0,
            Self::Concerned => 8.0,
            Self::Neutral => 9.0,
            Self::Analytical => 10.0,
            Self::Contemplative => 13.0,
            Self::Bored => 15.0,
        }
    }

    /// Below 1.0 wants to speak sooner, above 1.0 later
    fn raw_speech_multiplier(self) -> f64 {
        match self {
            Self::Excited => 0.7,
            Self::Surprised => 0.75,
            Self::Amused | Self::Curious => 0.85,
            Self::Concerned => 0.9,
            Self::Neutral => 1.0,
            Self::Analytical => 1.05,
            Self::Contemplative => 1.3,
            Self::Bored => 1.4,
        }
    }

    /// Above 1.0 types faster
    fn raw_typing_pace(self) -> f64 {
        match self {
            Self::Excited => 1.35,
            Self::Surprised => 1.25,
            Self::Amused => 1.15,
            Self::Curious => 1.1,
            Self::Neutral => 1.0,
            Self::Concerned | Self::Analytical => 0.95,
            Self::Contemplative => 0.8,
            Self::Bored => 0.75,
        }
    }

    fn veto_chance(self) -> f64 {
        match self {
            Self::Bored => 0.3,
            Self::Contemplative => 0.2,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Triggers
// =============================================================================

/// Stimuli the engine reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTrigger {
    /// Bodies collided
    Collision,
    /// A body left the system
    Ejection,
    /// The system settled
    Stable,
    /// The view zoomed
    Zoom,
    /// The user dragged the view
    Drag,
    /// Simulation mode changed
    ModeChanged,
    /// Preset changed
    PresetChanged,
    /// Pointer lingered over a button
    ButtonHesitation,
    /// The simulation was reset
    StateReset,
    /// A slider was explored
    SliderExploration,
    /// The preset list was explored
    PresetExploration,
    /// Camera orientation adjusted
    OrientationAdjustment,
    /// The user went idle
    UserIdle,
    /// The user came back
    UserReturned,
    /// An immediate response was shown
    ImmediateResponse,
    /// A frame finished rendering
    RenderCompleted,
}

impl EmotionTrigger {
    /// Triggers that bump intensity
    ///
    /// Collisions, ejections and resets, plus the surprise class: a mode or
    /// preset change swaps the scene out from under the narrator.
    #[must_use]
    pub const fn is_high_salience(self) -> bool {
        matches!(
            self,
            Self::Collision
                | Self::Ejection
                | Self::StateReset
                | Self::ModeChanged
                | Self::PresetChanged
        )
    }
}

/// Why a transition happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// Reaction to an event
    Event(EmotionTrigger),
    /// Time-based wandering
    Drift,
    /// Pressure from shown content
    Reflection,
    /// Random jump taken during reflection
    Perturbation,
    /// Intensity sat at the floor too long
    Floor,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(trigger) => write!(f, "event:{trigger:?}"),
            Self::Drift => f.write_str("drift"),
            Self::Reflection => f.write_str("reflection"),
            Self::Perturbation => f.write_str("perturbation"),
            Self::Floor => f.write_str("floor"),
        }
    }
}

/// A completed transition
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionChange {
    /// Previous emotion
    pub from: Emotion,
    /// New emotion
    pub to: Emotion,
    /// Intensity after the transition
    pub intensity: f64,
    /// What caused it
    pub cause: TransitionCause,
}

// =============================================================================
// Weights
// =============================================================================

/// Emotion-keyed weight map with an implicit default of 1.0
///
/// Used for both `select_bias` and `reflect_pull` in content entries.
/// Unknown keys are dropped with a warning when deserializing.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "HashMap<String, f64>")]
pub struct EmotionWeights(HashMap<Emotion, f64>);

impl EmotionWeights {
    /// Weight for `emotion`, 1.0 when unset
    #[must_use]
    pub fn get(&self, emotion: Emotion) -> f64 {
        self.0.get(&emotion).copied().unwrap_or(1.0)
    }

    /// Set a weight
    #[must_use]
    pub fn with(mut self, emotion: Emotion, weight: f64) -> Self {
        self.0.insert(emotion, weight);
        self
    }

    /// Mean weight across all emotions, unset ones counting as 1.0
    #[must_use]
    pub fn average(&self) -> f64 {
        let sum: f64 = Emotion::ALL.iter().map(|e| self.get(*e)).sum();
        sum / Emotion::ALL.len() as f64
    }

    /// True when no emotion has an explicit weight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, f64>> for EmotionWeights {
    fn from(raw: HashMap<String, f64>) -> Self {
        let mut weights = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            match Emotion::parse(&key) {
                Some(emotion) if value.is_finite() => {
                    weights.insert(emotion, value);
                }
                Some(_) => {
                    tracing::warn!(emotion = %key, "Ignoring non-finite emotion weight");
                }
                None => {
                    tracing::warn!(emotion = %key, "Ignoring unknown emotion key");
                }
            }
        }
        Self(weights)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Emotion engine tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Shared cooldown between any two transitions (milliseconds)
    pub min_transition_interval_ms: u64,

    /// Dwell before drift for most emotions (milliseconds)
    pub drift_dwell_ms: u64,

    /// Dwell before drift for Bored and Analytical (milliseconds)
    pub slow_drift_dwell_ms: u64,

    /// Dwell before drift for Contemplative (milliseconds)
    pub contemplative_drift_dwell_ms: u64,

    /// Minimum dwell before reflection may transition (milliseconds)
    pub reflection_dwell_ms: u64,

    /// Reflections closer than this are ignored (milliseconds)
    pub reflection_spacing_ms: u64,

    /// Chance that a reflection transition jumps to a random emotion
    pub random_jump_chance: f64,

    /// Intensity added by high-salience triggers
    pub intensity_boost: f64,

    /// Interval between intensity decay steps (milliseconds)
    pub decay_interval_ms: u64,

    /// Fraction of intensity lost per decay step
    pub decay_rate: f64,

    /// Lowest intensity
    pub intensity_floor: f64,

    /// Time at the floor before forcing Neutral (milliseconds)
    pub floor_reset_ms: u64,

    /// Personality traits
    pub personality: Personality,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            min_transition_interval_ms: 15_000,
            drift_dwell_ms: 45_000,
            slow_drift_dwell_ms: 60_000,
            contemplative_drift_dwell_ms: 90_000,
            reflection_dwell_ms: 20_000,
            reflection_spacing_ms: 3_000,
            random_jump_chance: 0.15,
            intensity_boost: 0.15,
            decay_interval_ms: 10_000,
            decay_rate: 0.10,
            intensity_floor: 0.1,
            floor_reset_ms: 45_000,
            personality: Personality::default(),
        }
    }
}

impl EmotionConfig {
    /// Set the transition cooldown
    #[must_use]
    pub fn with_min_transition_interval_ms(mut self, ms: u64) -> Self {
        self.min_transition_interval_ms = ms;
        self
    }

    /// Set the personality
    #[must_use]
    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    /// Set the intensity floor
    #[must_use]
    pub fn with_intensity_floor(mut self, floor: f64) -> Self {
        self.intensity_floor = floor.clamp(0.0, 1.0);
        self
    }

    fn drift_dwell(&self, emotion: Emotion) -> Duration {
        let ms = match emotion {
            Emotion::Bored | Emotion::Analytical => self.slow_drift_dwell_ms,
            Emotion::Contemplative => self.contemplative_drift_dwell_ms,
            _ => self.drift_dwell_ms,
        };
        Duration::from_millis(ms)
    }
}

// =============================================================================
// State
// =============================================================================

/// Current emotional state
#[derive(Clone, Debug, PartialEq)]
pub struct EmotionalState {
    /// Current emotion
    pub emotion: Emotion,
    /// Intensity in `[floor, 1.0]`
    pub intensity: f64,
    /// When the current emotion began
    pub emotion_started_at: Instant,
    /// Accumulated reflection pressure
    pub transition_pressure: f64,
    /// Earliest moment the next transition may happen
    pub next_transition_allowed_at: Instant,
}

// =============================================================================
// Engine
// =============================================================================

/// Owns and evolves the session's emotional state
#[derive(Debug)]
pub struct EmotionEngine {
    config: EmotionConfig,
    graph: EmotionGraph,
    state: EmotionalState,
    rng: StdRng,
    last_reflection_at: Option<Instant>,
    last_decay_at: Instant,
    floor_since: Option<Instant>,
    transitions: u64,
}

const STARTING_EMOTIONS: [Emotion; 4] = [
    Emotion::Neutral,
    Emotion::Curious,
    Emotion::Contemplative,
    Emotion::Analytical,
];

impl EmotionEngine {
    /// Create an engine with a randomized starting emotion and intensity
    pub fn new(config: EmotionConfig, now: Instant, mut rng: StdRng) -> Self {
        let emotion = STARTING_EMOTIONS[rng.gen_range(0..STARTING_EMOTIONS.len())];
        let intensity = rng.gen_range(0.3..=0.6);
        let graph = EmotionGraph::standard(config.personality.clone());

        tracing::info!(%emotion, intensity, "Emotion engine started");

        Self {
            config,
            graph,
            state: EmotionalState {
                emotion,
                intensity,
                emotion_started_at: now,
                transition_pressure: 0.0,
                next_transition_allowed_at: now,
            },
            rng,
            last_reflection_at: None,
            last_decay_at: now,
            floor_since: None,
            transitions: 0,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &EmotionalState {
        &self.state
    }

    /// Current emotion
    #[must_use]
    pub fn emotion(&self) -> Emotion {
        self.state.emotion
    }

    /// Current intensity
    #[must_use]
    pub fn intensity(&self) -> f64 {
        self.state.intensity
    }

    /// Number of transitions so far
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// The graph in use
    #[must_use]
    pub fn graph(&self) -> &EmotionGraph {
        &self.graph
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    /// React to an event
    pub fn react(&mut self, trigger: EmotionTrigger, now: Instant) -> Option<EmotionChange> {
        if trigger.is_high_salience() {
            self.set_intensity(self.state.intensity + self.config.intensity_boost, now);
        }

        if now < self.state.next_transition_allowed_at {
            tracing::debug!(?trigger, "Emotion reaction inside cooldown");
            return None;
        }

        let edges = self.graph.reaction_edges(self.state.emotion, trigger);
        let target = self.draw(&edges)?;
        self.transition(target, TransitionCause::Event(trigger), now)
    }

    /// Advance time-based behaviour: decay, floor reset, drift
    pub fn tick(&mut self, now: Instant) -> Option<EmotionChange> {
        self.decay(now);

        if let Some(since) = self.floor_since {
            let at_floor = now.saturating_duration_since(since);
            if at_floor >= Duration::from_millis(self.config.floor_reset_ms)
                && self.state.emotion != Emotion::Neutral
            {
                if let Some(change) = self.transition(Emotion::Neutral, TransitionCause::Floor, now)
                {
                    return Some(change);
                }
            }
        }

        let dwell = now.saturating_duration_since(self.state.emotion_started_at);
        if dwell < self.config.drift_dwell(self.state.emotion)
            || now < self.state.next_transition_allowed_at
        {
            return None;
        }

        let edges = self.graph.drift_edges(self.state.emotion);
        let target = self.draw(&edges)?;
        self.transition(target, TransitionCause::Drift, now)
    }

    /// Feed shown content back into the state
    pub fn reflect(&mut self, pull: &EmotionWeights, now: Instant) -> Option<EmotionChange> {
        if let Some(last) = self.last_reflection_at {
            if now.saturating_duration_since(last)
                < Duration::from_millis(self.config.reflection_spacing_ms)
            {
                return None;
            }
        }
        self.last_reflection_at = Some(now);

        let avg = pull.average();
        let intensity = self.state.intensity;
        let coherence = self.graph.personality().coherence;
        let noise = self.rng.gen_range(-0.05..=0.05);

        let mut pressure =
            self.state.transition_pressure + coherence * (avg / 3.0) * (0.5 + intensity) + noise;
        pressure *= 1.0 - 0.03 * (1.5 - intensity);
        self.state.transition_pressure = pressure.max(0.0);

        let target_intensity = avg / 3.5;
        self.set_intensity(intensity + (target_intensity - intensity) * 0.15, now);

        let dwell = now.saturating_duration_since(self.state.emotion_started_at);
        if self.state.transition_pressure < self.graph.mass(self.state.emotion)
            || dwell < Duration::from_millis(self.config.reflection_dwell_ms)
            || now < self.state.next_transition_allowed_at
        {
            return None;
        }

        if self.rng.gen_bool(self.config.random_jump_chance.clamp(0.0, 1.0)) {
            let others: Vec<Emotion> = Emotion::ALL
                .into_iter()
                .filter(|e| *e != self.state.emotion)
                .collect();
            let target = others[self.rng.gen_range(0..others.len())];
            return self.transition(target, TransitionCause::Perturbation, now);
        }

        let damping = 1.0 - 0.7 * self.state.intensity;
        let edges: Vec<Edge> = self
            .graph
            .edges(self.state.emotion)
            .iter()
            .map(|edge| {
                let mut weight = edge.weight * pull.get(edge.target);
                if edge.target == Emotion::Neutral {
                    weight *= damping;
                }
                Edge::new(edge.target, weight)
            })
            .collect();
        let target = self.draw(&edges)?;
        self.transition(target, TransitionCause::Reflection, now)
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Base idle time before the next ambient line
    #[must_use]
    pub fn base_idle_time(&self) -> Duration {
        let secs = self.state.emotion.base_idle_secs() * (1.2 - 0.4 * self.state.intensity);
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Below 1.0 means "wants to speak sooner"
    #[must_use]
    pub fn speech_multiplier(&self) -> f64 {
        1.0 + (self.state.emotion.raw_speech_multiplier() - 1.0) * self.state.intensity
    }

    /// Typing speed multiplier for the display cadence
    #[must_use]
    pub fn typing_pace(&self) -> f64 {
        1.0 + (self.state.emotion.raw_typing_pace() - 1.0) * self.state.intensity
    }

    /// Roll whether the narrator stays quiet for this ambient cycle
    pub fn vetoes_ambient(&mut self) -> bool {
        let chance = (self.state.emotion.veto_chance() * self.state.intensity).clamp(0.0, 1.0);
        chance > 0.0 && self.rng.gen_bool(chance)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn draw(&mut self, edges: &[Edge]) -> Option<Emotion> {
        let weights: Vec<f64> = edges.iter().map(|e| e.weight).collect();
        weighted_index(&weights, &mut self.rng).map(|idx| edges[idx].target)
    }

    fn transition(
        &mut self,
        to: Emotion,
        cause: TransitionCause,
        now: Instant,
    ) -> Option<EmotionChange> {
        let from = self.state.emotion;
        if to == from || now < self.state.next_transition_allowed_at {
            return None;
        }

        self.state.emotion = to;
        self.state.emotion_started_at = now;
        self.state.transition_pressure = 0.0;
        self.state.next_transition_allowed_at =
            now + Duration::from_millis(self.config.min_transition_interval_ms);
        self.transitions += 1;

        tracing::info!(
            %from,
            %to,
            intensity = self.state.intensity,
            %cause,
            "Emotion transition"
        );

        Some(EmotionChange {
            from,
            to,
            intensity: self.state.intensity,
            cause,
        })
    }

    fn decay(&mut self, now: Instant) {
        let interval = Duration::from_millis(self.config.decay_interval_ms.max(1));
        let elapsed = now.saturating_duration_since(self.last_decay_at);
        let steps = (elapsed.as_millis() / interval.as_millis()).min(u128::from(u16::MAX));
        if steps == 0 {
            return;
        }
        let steps = u32::try_from(steps).unwrap_or(u32::from(u16::MAX));

        let factor = (1.0 - self.config.decay_rate.clamp(0.0, 1.0)).powi(steps as i32);
        self.last_decay_at += interval * steps;
        self.set_intensity(self.state.intensity * factor, now);
    }

    fn set_intensity(&mut self, value: f64, now: Instant) {
        let floor = self.config.intensity_floor;
        let value = if value.is_finite() { value } else { floor };
        self.state.intensity = value.clamp(floor, 1.0);

        if self.state.intensity <= floor + f64::EPSILON {
            self.floor_since.get_or_insert(now);
        } else {
            self.floor_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn engine(seed: u64, now: Instant) -> EmotionEngine {
        EmotionEngine::new(EmotionConfig::default(), now, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_starting_state_in_band() {
        let now = Instant::now();
        for seed in 0..50 {
            let engine = engine(seed, now);
            assert!(STARTING_EMOTIONS.contains(&engine.emotion()));
            assert!((0.3..=0.6).contains(&engine.intensity()));
        }
    }

    #[test]
    fn test_parse_emotion_names() {
        assert_eq!(Emotion::parse("Curious"), Some(Emotion::Curious));
        assert_eq!(Emotion::parse(" bored "), Some(Emotion::Bored));
        assert_eq!(Emotion::parse("grumpy"), None);
    }

    #[test]
    fn test_weights_ignore_unknown_keys() {
        let weights: EmotionWeights =
            serde_json::from_str(r#"{"curious": 2.5, "grumpy": 9.0}"#).unwrap();
        assert!((weights.get(Emotion::Curious) - 2.5).abs() < 1e-9);
        assert!((weights.get(Emotion::Bored) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_transitions_respect_cooldown() {
        let start = Instant::now();
        let mut engine = engine(11, start);
        let mut last: Option<Instant> = None;

        for step in 0..600 {
            let now = start + Duration::from_millis(step * 500);
            let changed = engine.react(EmotionTrigger::Collision, now).is_some()
                | engine.tick(now).is_some();
            if changed {
                if let Some(prev) = last {
                    assert!(now.duration_since(prev) >= Duration::from_secs(15));
                }
                last = Some(now);
            }
        }
        assert!(engine.transitions() > 0);
    }

    #[test]
    fn test_intensity_stays_in_bounds() {
        let start = Instant::now();
        let mut engine = engine(5, start);
        let heavy = EmotionWeights::default().with(Emotion::Excited, 50.0);

        for step in 0..300 {
            let now = start + Duration::from_secs(step);
            engine.react(EmotionTrigger::Ejection, now);
            engine.reflect(&heavy, now);
            engine.tick(now);
            let i = engine.intensity();
            assert!((0.1..=1.0).contains(&i), "intensity {i} out of range");
        }
    }

    #[test]
    fn test_intensity_decays_to_floor_then_neutral() {
        let start = Instant::now();
        let mut engine = engine(3, start);
        engine.state.emotion = Emotion::Excited;

        // ~22 decay steps take 0.6 down to the floor
        let mut now = start;
        let mut forced = None;
        for _ in 0..120 {
            now += Duration::from_secs(5);
            if let Some(change) = engine.tick(now) {
                if change.cause == TransitionCause::Floor {
                    forced = Some(change);
                    break;
                }
            }
        }

        assert!((engine.intensity() - 0.1).abs() < 1e-9);
        // Drift may move off Excited first; the floor reset still lands on Neutral
        if let Some(change) = forced {
            assert_eq!(change.to, Emotion::Neutral);
        } else {
            assert_eq!(engine.emotion(), Emotion::Neutral);
        }
    }

    #[test]
    fn test_high_salience_boosts_intensity() {
        let start = Instant::now();
        let mut engine = engine(9, start);
        let before = engine.intensity();
        engine.react(EmotionTrigger::Collision, start);
        assert!((engine.intensity() - (before + 0.15).min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_scene_changes_count_as_surprises() {
        assert!(EmotionTrigger::ModeChanged.is_high_salience());
        assert!(EmotionTrigger::PresetChanged.is_high_salience());
        assert!(!EmotionTrigger::Zoom.is_high_salience());
        assert!(!EmotionTrigger::ButtonHesitation.is_high_salience());

        let start = Instant::now();
        let mut engine = engine(9, start);
        let before = engine.intensity();
        engine.react(EmotionTrigger::PresetChanged, start);
        assert!((engine.intensity() - (before + 0.15).min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_reflections_too_close_are_ignored() {
        let start = Instant::now();
        let mut engine = engine(2, start);
        let pull = EmotionWeights::default().with(Emotion::Curious, 3.0);

        engine.reflect(&pull, start);
        let pressure = engine.state().transition_pressure;
        engine.reflect(&pull, start + Duration::from_secs(1));
        assert!((engine.state().transition_pressure - pressure).abs() < 1e-12);
    }

    #[test]
    fn test_reflection_pressure_eventually_transitions() {
        let start = Instant::now();
        let mut engine = engine(21, start);
        let pull = EmotionWeights::default()
            .with(Emotion::Curious, 6.0)
            .with(Emotion::Analytical, 6.0)
            .with(Emotion::Contemplative, 6.0);

        let mut changed = false;
        for step in 0..40 {
            let now = start + Duration::from_secs(5 * step);
            if let Some(change) = engine.reflect(&pull, now) {
                assert!(matches!(
                    change.cause,
                    TransitionCause::Reflection | TransitionCause::Perturbation
                ));
                assert!(now.duration_since(start) >= Duration::from_secs(20));
                changed = true;
                break;
            }
        }
        assert!(changed);
    }

    #[test]
    fn test_signals_scale_with_intensity() {
        let start = Instant::now();
        let mut engine = engine(1, start);
        engine.state.emotion = Emotion::Excited;
        engine.state.intensity = 1.0;
        assert!(engine.speech_multiplier() < 1.0);
        assert!(engine.typing_pace() > 1.0);
        assert!((engine.base_idle_time().as_secs_f64() - 4.0).abs() < 1e-9);

        engine.state.emotion = Emotion::Neutral;
        assert!(!engine.vetoes_ambient());
    }
}
