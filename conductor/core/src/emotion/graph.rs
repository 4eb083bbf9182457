//! Emotion Graph
//!
//! Fixed adjacency between emotions, the per-emotion pressure threshold
//! ("emotional mass") and the personality vector that scales event-driven
//! and drift transitions. Built once per session and never mutated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Emotion, EmotionTrigger};

/// A weighted edge from one emotion to another
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    /// Destination emotion
    pub target: Emotion,
    /// Relative weight for the weighted draw
    pub weight: f64,
}

impl Edge {
    /// Create an edge
    #[must_use]
    pub const fn new(target: Emotion, weight: f64) -> Self {
        Self { target, weight }
    }
}

/// Personality trait vector, each trait in `[0, 1]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personality {
    /// Pull toward curious/surprised states
    pub curiosity: f64,
    /// Resistance to boredom, affinity for neutral
    pub patience: f64,
    /// Pull toward amused/excited states
    pub playfulness: f64,
    /// Pull toward concern
    pub caution: f64,
    /// Pull toward contemplation
    pub philosophy: f64,
    /// How strongly shown content feeds back into transition pressure
    pub coherence: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            curiosity: 0.7,
            patience: 0.5,
            playfulness: 0.6,
            caution: 0.4,
            philosophy: 0.6,
            coherence: 0.7,
        }
    }
}

impl Personality {
    /// Trait value that governs how attractive `target` is
    #[must_use]
    pub fn affinity(&self, target: Emotion) -> f64 {
        let raw = match target {
            Emotion::Neutral => self.patience,
            Emotion::Curious | Emotion::Surprised => self.curiosity,
            Emotion::Analytical => self.coherence,
            Emotion::Amused | Emotion::Excited => self.playfulness,
            Emotion::Concerned => self.caution,
            Emotion::Contemplative => self.philosophy,
            Emotion::Bored => (1.0 - self.patience).max(0.1),
        };
        raw.clamp(0.0, 1.0)
    }

    /// Scale a base edge weight by the target's affinity
    #[must_use]
    pub fn scale(&self, edge: Edge) -> Edge {
        Edge::new(edge.target, edge.weight * (0.5 + self.affinity(edge.target)))
    }
}

/// Immutable emotion graph for one session
#[derive(Clone, Debug)]
pub struct EmotionGraph {
    edges: HashMap<Emotion, Vec<Edge>>,
    mass: HashMap<Emotion, f64>,
    personality: Personality,
}

impl Default for EmotionGraph {
    fn default() -> Self {
        Self::standard(Personality::default())
    }
}

impl EmotionGraph {
    /// The standard graph with the given personality
    #[must_use]
    pub fn standard(personality: Personality) -> Self {
        use Emotion::{
            Amused, Analytical, Bored, Concerned, Contemplative, Curious, Excited, Neutral,
            Surprised,
        };

        let table: [(Emotion, &[(Emotion, f64)], f64); 9] = [
            (
                Neutral,
                &[
                    (Curious, 3.0),
                    (Contemplative, 2.0),
                    (Analytical, 2.0),
                    (Amused, 1.0),
                    (Bored, 1.0),
                ],
                0.6,
            ),
            (
                Curious,
                &[
                    (Analytical, 3.0),
                    (Excited, 2.0),
                    (Amused, 1.5),
                    (Contemplative, 1.0),
                    (Neutral, 1.0),
                ],
                0.9,
            ),
            (
                Analytical,
                &[
                    (Contemplative, 2.5),
                    (Curious, 2.0),
                    (Concerned, 1.0),
                    (Neutral, 1.0),
                ],
                1.2,
            ),
            (
                Amused,
                &[(Excited, 2.0), (Curious, 2.0), (Neutral, 1.5)],
                0.8,
            ),
            (
                Concerned,
                &[
                    (Analytical, 2.0),
                    (Contemplative, 1.5),
                    (Neutral, 2.0),
                    (Surprised, 0.5),
                ],
                1.0,
            ),
            (
                Contemplative,
                &[
                    (Analytical, 2.0),
                    (Curious, 1.5),
                    (Neutral, 2.0),
                    (Bored, 1.0),
                ],
                1.4,
            ),
            (
                Excited,
                &[
                    (Amused, 2.5),
                    (Curious, 2.0),
                    (Surprised, 1.0),
                    (Neutral, 1.0),
                ],
                0.7,
            ),
            (
                Bored,
                &[
                    (Neutral, 2.0),
                    (Contemplative, 2.0),
                    (Curious, 1.0),
                    (Amused, 0.5),
                ],
                0.9,
            ),
            (
                Surprised,
                &[
                    (Curious, 3.0),
                    (Excited, 2.0),
                    (Concerned, 1.0),
                    (Neutral, 1.0),
                ],
                0.5,
            ),
        ];

        let mut edges = HashMap::new();
        let mut mass = HashMap::new();
        for (from, targets, threshold) in table {
            edges.insert(
                from,
                targets.iter().map(|&(t, w)| Edge::new(t, w)).collect(),
            );
            mass.insert(from, threshold);
        }

        Self {
            edges,
            mass,
            personality,
        }
    }

    /// Outgoing edges of `from` (unscaled base weights)
    #[must_use]
    pub fn edges(&self, from: Emotion) -> &[Edge] {
        self.edges.get(&from).map_or(&[], Vec::as_slice)
    }

    /// Pressure threshold for leaving `emotion` through reflection
    #[must_use]
    pub fn mass(&self, emotion: Emotion) -> f64 {
        self.mass.get(&emotion).copied().unwrap_or(1.0)
    }

    /// Personality traits
    #[must_use]
    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    /// Candidate edges for reacting to `trigger` while in `current`,
    /// personality-scaled, excluding self-loops
    #[must_use]
    pub fn reaction_edges(&self, current: Emotion, trigger: EmotionTrigger) -> Vec<Edge> {
        reaction_table(current, trigger)
            .iter()
            .filter(|(target, _)| *target != current)
            .map(|&(target, weight)| self.personality.scale(Edge::new(target, weight)))
            .collect()
    }

    /// Candidate edges for time-based drift out of `current`
    #[must_use]
    pub fn drift_edges(&self, current: Emotion) -> Vec<Edge> {
        drift_table(current)
            .iter()
            .filter(|(target, _)| *target != current)
            .map(|&(target, weight)| self.personality.scale(Edge::new(target, weight)))
            .collect()
    }
}

fn reaction_table(current: Emotion, trigger: EmotionTrigger) -> &'static [(Emotion, f64)] {
    use Emotion::{
        Amused, Analytical, Bored, Concerned, Contemplative, Curious, Excited, Neutral, Surprised,
    };
    use EmotionTrigger as T;

    match (trigger, current) {
        (T::Collision, Bored | Neutral) => &[(Surprised, 3.0), (Excited, 2.0), (Curious, 1.0)],
        (T::Collision, _) => &[(Excited, 2.0), (Amused, 1.5), (Surprised, 1.0)],
        (T::Ejection, Concerned) => &[(Surprised, 1.0), (Analytical, 1.0)],
        (T::Ejection, _) => &[(Concerned, 2.0), (Surprised, 2.0), (Amused, 0.5)],
        (T::Stable, Excited | Surprised) => {
            &[(Contemplative, 1.5), (Analytical, 1.5), (Neutral, 1.0)]
        }
        (T::Stable, _) => &[(Contemplative, 1.0), (Analytical, 1.0)],
        (T::Zoom, _) => &[(Curious, 2.0), (Analytical, 1.0)],
        (T::Drag, _) => &[(Curious, 1.5), (Amused, 1.0)],
        (T::ModeChanged | T::PresetChanged, _) => &[(Curious, 2.0), (Excited, 1.0)],
        (T::ButtonHesitation, _) => &[(Curious, 2.0), (Amused, 1.0)],
        (T::StateReset, _) => &[(Surprised, 1.5), (Amused, 1.0), (Contemplative, 0.5)],
        (T::SliderExploration | T::PresetExploration, _) => {
            &[(Curious, 2.0), (Analytical, 1.5), (Excited, 0.5)]
        }
        (T::OrientationAdjustment, _) => &[(Analytical, 1.5), (Curious, 1.0)],
        (T::UserIdle, Bored) => &[],
        (T::UserIdle, _) => &[(Bored, 2.0), (Contemplative, 1.5)],
        (T::UserReturned, Bored | Contemplative) => {
            &[(Surprised, 1.0), (Curious, 2.0), (Excited, 1.0)]
        }
        (T::UserReturned, _) => &[(Curious, 1.0)],
        (T::ImmediateResponse | T::RenderCompleted, _) => &[],
    }
}

fn drift_table(current: Emotion) -> &'static [(Emotion, f64)] {
    use Emotion::{
        Amused, Analytical, Bored, Concerned, Contemplative, Curious, Excited, Neutral, Surprised,
    };

    match current {
        Neutral => &[(Bored, 1.0), (Contemplative, 1.0), (Curious, 1.0)],
        Curious => &[(Neutral, 2.0), (Contemplative, 1.0), (Bored, 0.5)],
        Analytical => &[(Contemplative, 2.0), (Neutral, 1.0)],
        Amused => &[(Neutral, 2.0), (Curious, 1.0)],
        Concerned => &[(Neutral, 2.0), (Contemplative, 1.0)],
        Contemplative => &[(Neutral, 1.5), (Bored, 1.0), (Curious, 0.5)],
        Excited => &[(Amused, 2.0), (Neutral, 1.0)],
        Bored => &[(Neutral, 1.0), (Contemplative, 1.0)],
        Surprised => &[(Curious, 2.0), (Neutral, 1.0)],
    }
}
