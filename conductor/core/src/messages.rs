//! Narrator Messages
//!
//! Messages sent from the narrator to whatever surface renders it (terminal,
//! web page, test harness).
//!
//! # Design Philosophy
//!
//! The surface is a pure renderer. It never decides what to say or when; it
//! shows frames and clears the line when told to. Everything it needs for
//! styling (emotion, tone, themes) travels with `ShowText`.

use serde::{Deserialize, Serialize};

use crate::content::{InteractionTarget, Tone};
use crate::emotion::{Emotion, TransitionCause};
use crate::events::ReactiveKind;

/// Messages from the narrator to a surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarratorMessage {
    /// A new line starts typing
    ShowText {
        /// Request token (one per selection)
        token: u64,
        /// Display generation (one per line)
        generation: u64,
        /// Full visible text of the line
        text: String,
        /// How long the line is held once typed
        display_time_ms: u64,
        /// Settle time after the line is deleted
        idle_time_ms: u64,
        /// Emotion when the line was chosen
        emotion: Emotion,
        /// Intensity when the line was chosen
        intensity: f64,
        /// Delivery tone
        tone: Tone,
        /// Themes of the entry
        themes: Vec<String>,
    },

    /// The visible text changed
    Frame {
        /// Display generation
        generation: u64,
        /// Text to show now
        visible: String,
    },

    /// Clear the line
    ClearText {
        /// Display generation being cleared
        generation: u64,
    },

    /// A reactive event earned an immediate response
    ImmediateResponse {
        /// Event kind
        kind: ReactiveKind,
        /// Event target
        target: InteractionTarget,
        /// Request token of the response
        token: u64,
    },

    /// The narrator's emotion changed
    EmotionChanged {
        /// Previous emotion
        from: Emotion,
        /// New emotion
        to: Emotion,
        /// Intensity after the change
        intensity: f64,
        /// Why it changed
        cause: TransitionCause,
    },
}

impl NarratorMessage {
    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShowText { .. } => "show_text",
            Self::Frame { .. } => "frame",
            Self::ClearText { .. } => "clear_text",
            Self::ImmediateResponse { .. } => "immediate_response",
            Self::EmotionChanged { .. } => "emotion_changed",
        }
    }
}
