//! Narrator Events
//!
//! Everything that can happen to the narrator arrives as a [`NarratorEvent`].
//! Events fall into families that the orchestrator routes differently:
//!
//! - **System** - lifecycle, timers and mind requests; never rate limited
//! - **Reactive** - user gestures that may earn an immediate response, after
//!   passing admission control
//! - **Observation** - things that happened in the simulation; they only
//!   nudge the emotion engine
//! - **Snapshot** - refreshes the values available to `\ref{}` templates
//!
//! On the wire an event is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "button_hesitation", "button": "reset"}
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::InteractionTarget;
use crate::emotion::EmotionTrigger;

/// Inbound event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarratorEvent {
    // =========================================================================
    // System
    // =========================================================================
    /// The ambient timer fired
    AmbientCycleReady,

    /// A display request finished
    TextComplete {
        /// Token of the request that finished
        token: u64,
    },

    /// The host page finished loading; starts the narrator
    PageLoaded,

    /// The host page became visible again
    PageVisible,

    /// The host page was hidden
    PageHidden,

    /// The user stopped interacting
    UserIdle,

    /// The user is back
    UserReturned,

    /// The narrator's mind has something to say
    MindWantsToSpeak {
        /// Themes to talk about
        #[serde(default)]
        themes: Vec<String>,
        /// Why, for logs
        #[serde(default)]
        reason: Option<String>,
    },

    // =========================================================================
    // Reactive
    // =========================================================================
    /// The pointer lingered over a button
    ButtonHesitation {
        /// Button id
        button: String,
    },

    /// The simulation was reset
    StateReset,

    /// A slider was dragged back and forth
    SliderExploration {
        /// Slider id
        slider: String,
    },

    /// The preset list was browsed
    PresetExploration {
        /// Select control id
        select: String,
    },

    /// The camera orientation was adjusted
    OrientationAdjustment,

    // =========================================================================
    // Observation
    // =========================================================================
    /// Bodies collided
    Collision {
        /// Number of collisions in this batch
        #[serde(default = "one")]
        count: u32,
    },

    /// A body left the system
    Ejection,

    /// The system settled into a stable configuration
    Stable,

    /// The view zoomed
    Zoom,

    /// The view was dragged
    Drag,

    /// Simulation mode changed
    ModeChanged {
        /// New mode name
        mode: String,
    },

    /// Preset changed
    PresetChanged {
        /// New preset name
        preset: String,
    },

    /// A frame finished rendering
    RenderCompleted,

    /// Another part of the host showed an immediate response
    ImmediateResponse,

    // =========================================================================
    // Snapshot
    // =========================================================================
    /// New values for template references
    SnapshotUpdated {
        /// Values to merge into the snapshot
        values: HashMap<String, serde_json::Value>,
    },
}

fn one() -> u32 {
    1
}

/// Event family
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventClass {
    /// Lifecycle, timers, mind
    System,
    /// Candidate for an immediate response
    Reactive,
    /// Feeds the emotion engine only
    Observation,
    /// Template state refresh
    Snapshot,
}

/// Kinds of reactive event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactiveKind {
    /// Pointer lingered over a button
    ButtonHesitation,
    /// Simulation reset
    StateReset,
    /// Slider explored
    SliderExploration,
    /// Preset list explored
    PresetExploration,
    /// Camera adjusted
    OrientationAdjustment,
}

impl ReactiveKind {
    /// Name used in content files' `event` context
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ButtonHesitation => "button_hesitation",
            Self::StateReset => "state_reset",
            Self::SliderExploration => "slider_exploration",
            Self::PresetExploration => "preset_exploration",
            Self::OrientationAdjustment => "orientation_adjustment",
        }
    }

    /// Matching emotion trigger
    #[must_use]
    pub const fn trigger(self) -> EmotionTrigger {
        match self {
            Self::ButtonHesitation => EmotionTrigger::ButtonHesitation,
            Self::StateReset => EmotionTrigger::StateReset,
            Self::SliderExploration => EmotionTrigger::SliderExploration,
            Self::PresetExploration => EmotionTrigger::PresetExploration,
            Self::OrientationAdjustment => EmotionTrigger::OrientationAdjustment,
        }
    }
}

impl fmt::Display for ReactiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reactive event reduced to what admission control and selection need
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReactiveEvent {
    /// Event kind
    pub kind: ReactiveKind,
    /// What it was aimed at
    pub target: InteractionTarget,
}

impl ReactiveEvent {
    /// Create a reactive event
    #[must_use]
    pub fn new(kind: ReactiveKind, target: InteractionTarget) -> Self {
        Self { kind, target }
    }
}

impl NarratorEvent {
    /// Which family the event belongs to
    #[must_use]
    pub fn class(&self) -> EventClass {
        match self {
            Self::AmbientCycleReady
            | Self::TextComplete { .. }
            | Self::PageLoaded
            | Self::PageVisible
            | Self::PageHidden
            | Self::UserIdle
            | Self::UserReturned
            | Self::MindWantsToSpeak { .. } => EventClass::System,
            Self::ButtonHesitation { .. }
            | Self::StateReset
            | Self::SliderExploration { .. }
            | Self::PresetExploration { .. }
            | Self::OrientationAdjustment => EventClass::Reactive,
            Self::Collision { .. }
            | Self::Ejection
            | Self::Stable
            | Self::Zoom
            | Self::Drag
            | Self::ModeChanged { .. }
            | Self::PresetChanged { .. }
            | Self::RenderCompleted
            | Self::ImmediateResponse => EventClass::Observation,
            Self::SnapshotUpdated { .. } => EventClass::Snapshot,
        }
    }

    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AmbientCycleReady => "ambient_cycle_ready",
            Self::TextComplete { .. } => "text_complete",
            Self::PageLoaded => "page_loaded",
            Self::PageVisible => "page_visible",
            Self::PageHidden => "page_hidden",
            Self::UserIdle => "user_idle",
            Self::UserReturned => "user_returned",
            Self::MindWantsToSpeak { .. } => "mind_wants_to_speak",
            Self::ButtonHesitation { .. } => "button_hesitation",
            Self::StateReset => "state_reset",
            Self::SliderExploration { .. } => "slider_exploration",
            Self::PresetExploration { .. } => "preset_exploration",
            Self::OrientationAdjustment => "orientation_adjustment",
            Self::Collision { .. } => "collision",
            Self::Ejection => "ejection",
            Self::Stable => "stable",
            Self::Zoom => "zoom",
            Self::Drag => "drag",
            Self::ModeChanged { .. } => "mode_changed",
            Self::PresetChanged { .. } => "preset_changed",
            Self::RenderCompleted => "render_completed",
            Self::ImmediateResponse => "immediate_response",
            Self::SnapshotUpdated { .. } => "snapshot_updated",
        }
    }

    /// The reactive view of this event, if it is one
    #[must_use]
    pub fn as_reactive(&self) -> Option<ReactiveEvent> {
        let (kind, target) = match self {
            Self::ButtonHesitation { button } => (
                ReactiveKind::ButtonHesitation,
                InteractionTarget::Button(button.clone()),
            ),
            Self::StateReset => (ReactiveKind::StateReset, InteractionTarget::None),
            Self::SliderExploration { slider } => (
                ReactiveKind::SliderExploration,
                InteractionTarget::Slider(slider.clone()),
            ),
            Self::PresetExploration { select } => (
                ReactiveKind::PresetExploration,
                InteractionTarget::Select(select.clone()),
            ),
            Self::OrientationAdjustment => {
                (ReactiveKind::OrientationAdjustment, InteractionTarget::None)
            }
            _ => return None,
        };
        Some(ReactiveEvent::new(kind, target))
    }

    /// Emotion trigger carried by this event, if any
    #[must_use]
    pub fn emotion_trigger(&self) -> Option<EmotionTrigger> {
        if let Some(reactive) = self.as_reactive() {
            return Some(reactive.kind.trigger());
        }
        let trigger = match self {
            Self::UserIdle => EmotionTrigger::UserIdle,
            Self::UserReturned => EmotionTrigger::UserReturned,
            Self::Collision { .. } => EmotionTrigger::Collision,
            Self::Ejection => EmotionTrigger::Ejection,
            Self::Stable => EmotionTrigger::Stable,
            Self::Zoom => EmotionTrigger::Zoom,
            Self::Drag => EmotionTrigger::Drag,
            Self::ModeChanged { .. } => EmotionTrigger::ModeChanged,
            Self::PresetChanged { .. } => EmotionTrigger::PresetChanged,
            Self::RenderCompleted => EmotionTrigger::RenderCompleted,
            Self::ImmediateResponse => EmotionTrigger::ImmediateResponse,
            _ => return None,
        };
        Some(trigger)
    }
}

impl From<ReactiveEvent> for NarratorEvent {
    fn from(event: ReactiveEvent) -> Self {
        let name = event.target.name().unwrap_or_default().to_string();
        match event.kind {
            ReactiveKind::ButtonHesitation => Self::ButtonHesitation { button: name },
            ReactiveKind::StateReset => Self::StateReset,
            ReactiveKind::SliderExploration => Self::SliderExploration { slider: name },
            ReactiveKind::PresetExploration => Self::PresetExploration { select: name },
            ReactiveKind::OrientationAdjustment => Self::OrientationAdjustment,
        }
    }
}
