//! Narrator Core - Headless Companion Narrator Engine
//!
//! This crate decides what short lines a companion narrator says, when, and
//! for how long, given a stream of application events and a simulated
//! emotional state. It is independent of any UI framework: a terminal, a web
//! page, or a test harness renders the [`NarratorMessage`]s it emits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Surfaces                               │
//! │      terminal daemon  ·  web page  ·  headless test harness      │
//! │                               │                                  │
//! │                  NarratorEvent (up)  NarratorMessage (down)      │
//! └───────────────────────────────┼──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        NARRATOR CORE                             │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                        Narrator                            │  │
//! │  │ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────────┐  │  │
//! │  │ │ Emotion  │ │ Content  │ │  Event   │ │    Sequence    │  │  │
//! │  │ │ Engine   │ │ Selector │ │  Router  │ │  Coordinator   │  │  │
//! │  │ └──────────┘ └──────────┘ └──────────┘ └────────────────┘  │  │
//! │  │ ┌──────────────────────┐ ┌─────────────────────────────┐   │  │
//! │  │ │ DisplayStateMachine  │ │ TimerQueue (deadlines only) │   │  │
//! │  │ └──────────────────────┘ └─────────────────────────────┘   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Narrator`]: The orchestrator that owns every component
//! - [`NarratorEvent`]: Events sent from a surface to the narrator
//! - [`NarratorMessage`]: Messages sent from the narrator to a surface
//! - [`NarratorRuntime`]: Tokio driver around a [`Narrator`]
//! - [`NarratorConfig`]: Layered configuration (CLI, env, TOML, defaults)
//!
//! # Quick Start
//!
//! ```no_run
//! use narrator_core::{
//!     content::load_dir, load_config, Narrator, NarratorEvent, NarratorRuntime, RuntimeConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let library = load_dir(std::path::Path::new("content"))?;
//!     let narrator = Narrator::new(&config, library, tokio::time::Instant::now().into_std());
//!
//!     let (events, mut messages, _task) = NarratorRuntime::spawn(narrator, RuntimeConfig::default());
//!     events.send(NarratorEvent::PageLoaded).await?;
//!
//!     while let Some(message) = messages.recv().await {
//!         // Render the message
//!         println!("{}", message.kind());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`emotion`]: Emotion graph, personality, and the emotion engine
//! - [`content`]: Content model, JSON loader, templating, and selection
//! - [`events`]: Events from surfaces to the narrator
//! - [`messages`]: Messages from the narrator to surfaces
//! - [`rate_limit`]: Five-layer admission control for reactive events
//! - [`router`]: Admission plus ambient pacing
//! - [`sequence`]: Sequence lock for multi-line entries
//! - [`display`]: Typewriter state machine for the single text line
//! - [`animation`]: Typing cadence and jitter
//! - [`timers`]: Deadline slots for the narrator's suspension points
//! - [`conductor`]: The [`Narrator`] orchestrator
//! - [`runtime`]: Tokio driver
//! - [`config`]: TOML configuration with env and CLI overrides
//! - [`metrics`]: Session counters
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on crossterm or any other UI
//! framework. It's pure behavior that can be driven from anywhere.

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod animation;
pub mod conductor;
pub mod config;
pub mod content;
pub mod display;
pub mod emotion;
pub mod events;
pub mod messages;
pub mod metrics;
pub mod rate_limit;
pub mod router;
pub mod runtime;
pub mod sequence;
pub mod timers;
pub mod weighted;

// Re-exports for convenience
pub use animation::{CadenceConfig, SpeedBounds, TypingCadence};
pub use conductor::{Narrator, NarratorError, RouteOutcome};
pub use display::{DisplayOutput, DisplayState, DisplayStateMachine, LineConfig};
pub use emotion::{
    Emotion, EmotionChange, EmotionConfig, EmotionEngine, EmotionTrigger, EmotionWeights,
    EmotionalState, TransitionCause,
};
pub use events::{EventClass, NarratorEvent, ReactiveEvent, ReactiveKind};
pub use messages::NarratorMessage;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use rate_limit::{DenialReason, LimiterThresholds, ResponseLimitConfig, ResponseLimiter};
pub use router::{DelayPolicy, EventRouter};
pub use runtime::{NarratorRuntime, RuntimeConfig};
pub use sequence::{MindRequest, SequenceCoordinator, SequenceError, SequenceOwner};
pub use timers::{TimerKind, TimerQueue};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, NarratorConfig, NarratorToml,
};
