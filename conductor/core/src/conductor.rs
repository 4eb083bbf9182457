//! Narrator - The Orchestration Core
//!
//! The Narrator is the "brain" of the companion. It orchestrates:
//! - The ambient cycle (one timer, rescheduled after every line)
//! - Admission of reactive events and their immediate responses
//! - Mind requests and the sequence lock around multi-line entries
//! - The display state machine for the single text line
//! - Emotional reactions and reflection on shown content
//!
//! # Design Philosophy
//!
//! The Narrator is surface-agnostic and clock-agnostic. Every method takes
//! `now` explicitly and nothing ever sleeps; pending work is a set of
//! deadlines exposed through [`Narrator::next_deadline`]. A driver (the
//! tokio [`runtime`](crate::runtime), a test loop, a game loop) calls
//! [`Narrator::advance`] when the deadline passes and forwards
//! [`NarratorMessage`]s from [`Narrator::drain_messages`] to the surface.
//!
//! # Stale completions
//!
//! Every selection gets a request token and every line a display
//! generation. A completion whose token or generation no longer matches the
//! in-flight request is dropped, which is what makes interrupts safe.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::animation::{SpeedBounds, TypingCadence};
use crate::config::NarratorConfig;
use crate::content::{ContentLibrary, ContentSelector, ResolvedLine, Selection, TimeOfDay, Tone};
use crate::display::{DisplayOutput, DisplayStateMachine, LineConfig};
use crate::emotion::{EmotionChange, EmotionEngine, EmotionTrigger};
use crate::events::{NarratorEvent, ReactiveEvent};
use crate::messages::NarratorMessage;
use crate::metrics::SessionMetrics;
use crate::rate_limit::{DenialReason, LimiterThresholds, PendingEvent};
use crate::router::EventRouter;
use crate::sequence::{MindRequest, SequenceCoordinator, SequenceError, SequenceOwner};
use crate::timers::{TimerKind, TimerQueue};

/// `when` tag used for ambient selections
const AMBIENT_MODE: &str = "ambient";

/// `when` tag used for mind selections
const MIND_MODE: &str = "mind";

/// Invariant violations that stop the narrator
#[derive(Debug, Error)]
pub enum NarratorError {
    /// The sequence lock was taken twice
    #[error("sequence coordination failed: {0}")]
    Sequence(#[from] SequenceError),

    /// The surface side of the runtime went away
    #[error("narrator output channel closed")]
    OutputClosed,
}

/// What routing an event led to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Accepted with no visible effect
    Handled,
    /// A new request started with this token
    Displayed {
        /// Request token
        token: u64,
    },
    /// The ambient cycle was (re)armed
    Scheduled {
        /// Delay until the cycle
        delay: Duration,
    },
    /// Rejected as ordinary control flow
    Denied(DenialReason),
    /// Not applicable in the current state
    Ignored,
}

#[derive(Debug)]
struct ActiveRequest {
    token: u64,
    owner: SequenceOwner,
    locked: bool,
    themes: Vec<String>,
    remaining: VecDeque<ResolvedLine>,
    line_tone: Tone,
    generation: u64,
}

/// Derive an independent RNG per component from one session seed
fn component_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => {
            StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        }
        None => StdRng::from_entropy(),
    }
}

/// The companion narrator
#[derive(Debug)]
pub struct Narrator {
    emotion: EmotionEngine,
    selector: ContentSelector,
    sequence: SequenceCoordinator,
    router: EventRouter,
    display: DisplayStateMachine,
    timers: TimerQueue,
    metrics: SessionMetrics,
    first_cycle_delay: Duration,
    tick_interval: Duration,
    running: bool,
    page_hidden: bool,
    token: u64,
    active: Option<ActiveRequest>,
    outbox: Vec<NarratorMessage>,
}

impl Narrator {
    /// Create a narrator over `library`
    ///
    /// Nothing is scheduled until a `PageLoaded` event arrives.
    pub fn new(config: &NarratorConfig, library: ContentLibrary, now: Instant) -> Self {
        let seed = config.seed;
        let emotion = EmotionEngine::new(config.emotion.clone(), now, component_rng(seed, 1));
        let selector =
            ContentSelector::new(library, config.selector.clone(), component_rng(seed, 2));
        let cadence = TypingCadence::new(config.timing.cadence.clone(), component_rng(seed, 3));
        let router = EventRouter::new(config.rate_limit.clone(), config.timing.pacing.clone());
        let metrics = SessionMetrics::new();

        tracing::info!(
            session_id = %metrics.session_id(),
            emotion = %emotion.emotion(),
            seeded = seed.is_some(),
            "Narrator created"
        );

        Self {
            emotion,
            selector,
            sequence: SequenceCoordinator::new(config.sequence.clone()),
            router,
            display: DisplayStateMachine::new(cadence),
            timers: TimerQueue::new(),
            metrics,
            first_cycle_delay: Duration::from_millis(config.timing.first_cycle_delay_ms),
            tick_interval: Duration::from_millis(config.timing.emotion_tick_ms.max(1)),
            running: false,
            page_hidden: false,
            token: 0,
            active: None,
            outbox: Vec::new(),
        }
    }

    /// Pin the welcome time of day instead of reading the local clock
    #[must_use]
    pub fn with_time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.selector = self.selector.with_time_of_day(time_of_day);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Emotion engine
    #[must_use]
    pub fn emotion(&self) -> &EmotionEngine {
        &self.emotion
    }

    /// Content selector
    #[must_use]
    pub fn selector(&self) -> &ContentSelector {
        &self.selector
    }

    /// Sequence coordinator
    #[must_use]
    pub fn sequence(&self) -> &SequenceCoordinator {
        &self.sequence
    }

    /// Event router
    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Display state machine
    #[must_use]
    pub fn display(&self) -> &DisplayStateMachine {
        &self.display
    }

    /// Session counters
    #[must_use]
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Current admission thresholds
    #[must_use]
    pub fn thresholds(&self) -> LimiterThresholds {
        self.router.thresholds()
    }

    /// Per-character delay bounds at the current emotion's pace
    #[must_use]
    pub fn speed_bounds(&self) -> SpeedBounds {
        self.display
            .cadence()
            .speed_bounds(self.emotion.typing_pace())
    }

    /// Latest request token
    #[must_use]
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Whether `PageLoaded` has been seen
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the page is hidden
    #[must_use]
    pub fn is_page_hidden(&self) -> bool {
        self.page_hidden
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    /// When the ambient cycle fires next
    #[must_use]
    pub fn ambient_deadline(&self) -> Option<Instant> {
        self.timers.deadline(TimerKind::Ambient)
    }

    /// Earliest pending deadline across timers and the display
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timers.next_deadline(), self.display.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take every message produced so far
    pub fn drain_messages(&mut self) -> Vec<NarratorMessage> {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // Event Routing
    // =========================================================================

    /// Route one event
    ///
    /// Denials are returned as [`RouteOutcome::Denied`]; only invariant
    /// violations are errors.
    pub fn handle_event(
        &mut self,
        event: NarratorEvent,
        now: Instant,
    ) -> Result<RouteOutcome, NarratorError> {
        tracing::trace!(event = event.name(), "Routing event");
        let trigger = event.emotion_trigger();
        let reactive = event.as_reactive();

        let outcome = match event {
            // System
            NarratorEvent::PageLoaded => self.start(now),
            NarratorEvent::AmbientCycleReady => self.on_ambient_ready(now)?,
            NarratorEvent::TextComplete { token } => self.on_text_complete(token, now),
            NarratorEvent::PageHidden => self.on_page_hidden(now),
            NarratorEvent::PageVisible => self.on_page_visible(now),
            NarratorEvent::UserIdle | NarratorEvent::UserReturned => self.observe(trigger, now),
            NarratorEvent::MindWantsToSpeak { themes, reason } => {
                self.on_mind_request(MindRequest { themes, reason }, now)?
            }

            // Reactive
            NarratorEvent::ButtonHesitation { .. }
            | NarratorEvent::StateReset
            | NarratorEvent::SliderExploration { .. }
            | NarratorEvent::PresetExploration { .. }
            | NarratorEvent::OrientationAdjustment => match reactive {
                Some(reactive) => self.on_reactive(reactive, trigger, now)?,
                None => RouteOutcome::Ignored,
            },

            // Observation
            NarratorEvent::ModeChanged { mode } => {
                self.selector.set_what(Some(mode));
                self.observe(trigger, now)
            }
            NarratorEvent::Collision { .. }
            | NarratorEvent::Ejection
            | NarratorEvent::Stable
            | NarratorEvent::Zoom
            | NarratorEvent::Drag
            | NarratorEvent::PresetChanged { .. }
            | NarratorEvent::RenderCompleted
            | NarratorEvent::ImmediateResponse => self.observe(trigger, now),

            NarratorEvent::SnapshotUpdated { values } => {
                self.selector.snapshot_mut().merge(values);
                RouteOutcome::Handled
            }
        };

        // Work the event made due (a first typing step, say) runs right away
        self.advance(now)?;
        Ok(outcome)
    }

    /// Run every timer and display step due at `now`
    pub fn advance(&mut self, now: Instant) -> Result<(), NarratorError> {
        loop {
            let outputs = self.display.advance(now);
            let had_output = !outputs.is_empty();
            for output in outputs {
                self.on_display_output(output, now);
            }

            let due = self.timers.take_due(now);
            if due.is_empty() && !had_output {
                return Ok(());
            }
            for kind in due {
                self.on_timer(kind, now)?;
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind, now: Instant) -> Result<(), NarratorError> {
        match kind {
            TimerKind::Ambient => {
                let outcome = self.on_ambient_ready(now)?;
                tracing::trace!(?outcome, "Ambient timer fired");
            }
            TimerKind::DeferredFlush => {
                if let Some(request) = self.sequence.flush_deferred(now, self.page_hidden) {
                    tracing::debug!(reason = ?request.reason, "Flushing deferred mind request");
                    self.on_mind_request(request, now)?;
                }
            }
            TimerKind::EmotionTick => {
                let change = self.emotion.tick(now);
                self.emit_change(change);
                if self.running {
                    self.timers.set(TimerKind::EmotionTick, now + self.tick_interval);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // System Events
    // =========================================================================

    fn start(&mut self, now: Instant) -> RouteOutcome {
        if self.running {
            tracing::debug!("Narrator already running");
            return RouteOutcome::Ignored;
        }
        self.running = true;
        self.timers
            .set(TimerKind::EmotionTick, now + self.tick_interval);

        tracing::info!(
            session_id = %self.metrics.session_id(),
            first_cycle_ms = self.first_cycle_delay.as_millis() as u64,
            "Narrator started"
        );

        match self.schedule_ambient(self.first_cycle_delay, now) {
            Some(delay) => RouteOutcome::Scheduled { delay },
            None => RouteOutcome::Handled,
        }
    }

    fn on_page_hidden(&mut self, now: Instant) -> RouteOutcome {
        if self.page_hidden {
            return RouteOutcome::Ignored;
        }
        self.page_hidden = true;
        self.timers.clear(TimerKind::Ambient);
        self.timers.clear(TimerKind::DeferredFlush);

        if self.display.is_busy() || !self.display.visible().is_empty() {
            let generation = self.display.generation();
            self.display.reset();
            self.outbox.push(NarratorMessage::ClearText { generation });
        }
        if let Some(active) = self.active.take() {
            tracing::debug!(token = active.token, owner = ?active.owner, "Request abandoned");
        }
        self.sequence.discard_deferred();
        self.sequence.unlock_sequence(now);

        tracing::info!("Page hidden, narrator paused");
        RouteOutcome::Handled
    }

    fn on_page_visible(&mut self, now: Instant) -> RouteOutcome {
        if !self.page_hidden {
            return RouteOutcome::Ignored;
        }
        self.page_hidden = false;
        tracing::info!("Page visible, narrator resumed");

        if self.active.is_some() {
            return RouteOutcome::Handled;
        }
        self.reschedule(now)
    }

    fn observe(&mut self, trigger: Option<EmotionTrigger>, now: Instant) -> RouteOutcome {
        if let Some(trigger) = trigger {
            let change = self.emotion.react(trigger, now);
            self.emit_change(change);
        }
        RouteOutcome::Handled
    }

    // =========================================================================
    // Ambient Cycle
    // =========================================================================

    /// Clear the ambient timer, then arm it if the guards allow
    fn schedule_ambient(&mut self, delay: Duration, now: Instant) -> Option<Duration> {
        self.timers.clear(TimerKind::Ambient);
        if !self.running || self.page_hidden {
            tracing::debug!(
                running = self.running,
                page_hidden = self.page_hidden,
                "Ambient timer not armed"
            );
            return None;
        }
        self.timers.set(TimerKind::Ambient, now + delay);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Ambient cycle scheduled");
        Some(delay)
    }

    fn reschedule(&mut self, now: Instant) -> RouteOutcome {
        let delay = self.router.next_ambient_delay(&self.emotion, &self.selector);
        match self.schedule_ambient(delay, now) {
            Some(delay) => RouteOutcome::Scheduled { delay },
            None => RouteOutcome::Handled,
        }
    }

    fn on_ambient_ready(&mut self, now: Instant) -> Result<RouteOutcome, NarratorError> {
        self.timers.clear(TimerKind::Ambient);
        if !self.running || self.page_hidden {
            return Ok(RouteOutcome::Ignored);
        }
        if self.sequence.is_locked() {
            return Ok(self.deny(DenialReason::SequenceLocked));
        }
        if self.active.is_some() {
            // Its completion reschedules the cycle
            tracing::debug!("Ambient cycle skipped, request in flight");
            return Ok(RouteOutcome::Ignored);
        }

        if self.emotion.vetoes_ambient() {
            tracing::debug!(emotion = %self.emotion.emotion(), "Ambient cycle vetoed");
            return Ok(self.reschedule(now));
        }

        let emotion = self.emotion.emotion();
        let intensity = self.emotion.intensity();
        match self.selector.select(AMBIENT_MODE, &[], emotion, intensity) {
            Some(selection) => {
                let token = self.begin(selection, SequenceOwner::Ambient, now)?;
                Ok(RouteOutcome::Displayed { token })
            }
            None => {
                let outcome = self.deny(DenialReason::NoContent);
                let retry = self.router.policy().empty_retry();
                self.schedule_ambient(retry, now);
                Ok(outcome)
            }
        }
    }

    // =========================================================================
    // Mind Requests
    // =========================================================================

    fn on_mind_request(
        &mut self,
        request: MindRequest,
        now: Instant,
    ) -> Result<RouteOutcome, NarratorError> {
        if !self.running {
            return Ok(RouteOutcome::Ignored);
        }
        if self.page_hidden {
            return Ok(self.deny(DenialReason::MindSuppressed));
        }
        if self.sequence.is_locked() {
            self.sequence.defer(request, now);
            return Ok(self.deny(DenialReason::SequenceLocked));
        }
        if self.active.is_some() && !self.display.can_interrupt() {
            return Ok(self.deny(DenialReason::FsmBusy));
        }

        let emotion = self.emotion.emotion();
        let intensity = self.emotion.intensity();
        let Some(selection) = self
            .selector
            .select(MIND_MODE, &request.themes, emotion, intensity)
        else {
            return Ok(self.deny(DenialReason::NoContent));
        };

        self.interrupt_display();
        self.active = None;
        self.timers.clear(TimerKind::Ambient);
        let token = self.begin(selection, SequenceOwner::Mind, now)?;
        Ok(RouteOutcome::Displayed { token })
    }

    // =========================================================================
    // Reactive Events
    // =========================================================================

    fn on_reactive(
        &mut self,
        event: ReactiveEvent,
        trigger: Option<EmotionTrigger>,
        now: Instant,
    ) -> Result<RouteOutcome, NarratorError> {
        self.observe(trigger, now);
        if !self.running || self.page_hidden {
            return Ok(RouteOutcome::Ignored);
        }

        match self.router.take_pending(now) {
            PendingEvent::Empty => {}
            PendingEvent::Expired(stale) => {
                tracing::debug!(kind = %stale.kind, target = %stale.target, "Queued event expired");
                self.metrics.record_queued_miss();
            }
            PendingEvent::Ready(queued) if queued != event => {
                let outcome = self.route_reactive(queued, false, now)?;
                tracing::debug!(?outcome, "Retried queued reactive event");
            }
            PendingEvent::Ready(_) => {}
        }

        self.route_reactive(event, true, now)
    }

    fn route_reactive(
        &mut self,
        event: ReactiveEvent,
        allow_queue: bool,
        now: Instant,
    ) -> Result<RouteOutcome, NarratorError> {
        if self.sequence.is_locked() {
            return Ok(self.deny(DenialReason::SequenceLocked));
        }

        let interruptible = self.display.can_interrupt();
        if let Err(reason) = self.router.admit(&event, now, interruptible) {
            if reason == DenialReason::FsmBusy
                && allow_queue
                && self.router.queue(event.clone(), now)
            {
                tracing::debug!(kind = %event.kind, target = %event.target, "Reactive event queued");
            }
            return Ok(self.deny(reason));
        }

        let emotion = self.emotion.emotion();
        let intensity = self.emotion.intensity();
        let Some(selection) = self.selector.select_immediate(
            event.kind.as_str(),
            &event.target,
            emotion,
            intensity,
        ) else {
            return Ok(self.deny(DenialReason::NoContent));
        };

        self.interrupt_display();
        self.active = None;
        self.timers.clear(TimerKind::Ambient);
        let token = self.begin(selection, SequenceOwner::Interaction, now)?;

        self.outbox.push(NarratorMessage::ImmediateResponse {
            kind: event.kind,
            target: event.target,
            token,
        });
        self.observe(Some(EmotionTrigger::ImmediateResponse), now);
        Ok(RouteOutcome::Displayed { token })
    }

    // =========================================================================
    // Requests and Lines
    // =========================================================================

    fn begin(
        &mut self,
        selection: Selection,
        owner: SequenceOwner,
        now: Instant,
    ) -> Result<u64, NarratorError> {
        let locked = if selection.is_sequence() {
            self.sequence
                .lock_for_sequence(selection.lines.len(), owner)?;
            true
        } else {
            false
        };

        self.token += 1;
        let token = self.token;

        let change = self.emotion.reflect(&selection.reflect_pull, now);
        self.emit_change(change);
        self.selector.record_shown(&selection);
        match owner {
            SequenceOwner::Ambient => self.metrics.record_ambient(),
            SequenceOwner::Mind => self.metrics.record_mind(),
            SequenceOwner::Interaction => self.metrics.record_immediate(),
        }

        tracing::info!(
            token,
            ?owner,
            source = ?selection.source,
            lines = selection.lines.len(),
            tone = %selection.tone,
            "Narrator speaking"
        );

        let Selection { lines, themes, .. } = selection;
        self.active = Some(ActiveRequest {
            token,
            owner,
            locked,
            themes,
            remaining: lines.into(),
            line_tone: Tone::default(),
            generation: 0,
        });
        self.show_next_line(now);
        Ok(token)
    }

    /// Hand the next line of the active request to the display
    fn show_next_line(&mut self, now: Instant) -> bool {
        let pace = self.emotion.typing_pace();
        let idle_time = self.display.cadence().line_gap();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Some(line) = active.remaining.pop_front() else {
            return false;
        };

        let config = LineConfig {
            duration_mult: line.duration_mult,
            pace,
            idle_time,
        };
        active.line_tone = line.tone;
        active.generation = self.display.process_line(&line.text, config, now);
        true
    }

    fn on_display_output(&mut self, output: DisplayOutput, now: Instant) {
        match output {
            DisplayOutput::Started {
                generation,
                text,
                display_time,
            } => {
                let Some(active) = self.active.as_ref().filter(|a| a.generation == generation)
                else {
                    return;
                };
                self.outbox.push(NarratorMessage::ShowText {
                    token: active.token,
                    generation,
                    text,
                    display_time_ms: display_time.as_millis() as u64,
                    idle_time_ms: self.display.cadence().line_gap().as_millis() as u64,
                    emotion: self.emotion.emotion(),
                    intensity: self.emotion.intensity(),
                    tone: active.line_tone,
                    themes: active.themes.clone(),
                });
            }
            DisplayOutput::Frame {
                generation,
                visible,
            } => {
                self.outbox
                    .push(NarratorMessage::Frame { generation, visible });
            }
            DisplayOutput::Cleared { generation } => {
                self.outbox.push(NarratorMessage::ClearText { generation });
            }
            DisplayOutput::Completed { generation } => self.on_line_complete(generation, now),
        }
    }

    fn on_line_complete(&mut self, generation: u64, now: Instant) {
        let token = match self.active.as_ref() {
            Some(active) if active.generation == generation => active.token,
            _ => {
                tracing::debug!(generation, "Dropping completion of a replaced line");
                return;
            }
        };
        if self.show_next_line(now) {
            return;
        }
        self.on_text_complete(token, now);
    }

    fn on_text_complete(&mut self, token: u64, now: Instant) -> RouteOutcome {
        let active = match self.active.take() {
            Some(active) if active.token == token => active,
            other => {
                self.active = other;
                tracing::debug!(token, current = self.token, "Stale text completion");
                return self.deny(DenialReason::StaleTextComplete);
            }
        };

        // A surface may report completion before the local animation ends
        if self.display.is_busy() {
            let generation = self.display.generation();
            self.display.reset();
            self.outbox.push(NarratorMessage::ClearText { generation });
        }

        if active.locked {
            if let Some(flush_at) = self.sequence.unlock_sequence(now) {
                self.timers.set(TimerKind::DeferredFlush, flush_at);
            }
        }
        tracing::debug!(token, owner = ?active.owner, "Request complete");
        self.reschedule(now)
    }

    fn interrupt_display(&mut self) {
        if !self.display.is_busy() && self.display.visible().is_empty() {
            return;
        }
        let generation = self.display.generation();
        if self.display.interrupt() {
            self.outbox.push(NarratorMessage::ClearText { generation });
        }
    }

    fn emit_change(&mut self, change: Option<EmotionChange>) {
        let Some(change) = change else {
            return;
        };
        self.metrics.record_transition();
        self.outbox.push(NarratorMessage::EmotionChanged {
            from: change.from,
            to: change.to,
            intensity: change.intensity,
            cause: change.cause,
        });
    }

    fn deny(&mut self, reason: DenialReason) -> RouteOutcome {
        tracing::debug!(reason = %reason, "Denied");
        self.metrics.record_denial(reason);
        RouteOutcome::Denied(reason)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::CadenceConfig;
    use crate::config::TimingConfig;
    use crate::content::{ContentEntry, FileContext, InteractionFile, Line, TagSet};
    use crate::display::DisplayState;
    use crate::emotion::EmotionConfig;
    use crate::events::ReactiveKind;

    fn config() -> NarratorConfig {
        let timing = TimingConfig {
            first_cycle_delay_ms: 1_000,
            cadence: CadenceConfig::instant(),
            ..TimingConfig::default()
        };
        NarratorConfig::default()
            .with_seed(11)
            .with_timing(timing)
            .with_selector(crate::content::SelectorConfig::default().with_welcome(false))
            .with_emotion(EmotionConfig::default())
    }

    fn interaction_library() -> ContentLibrary {
        ContentLibrary::new()
            .with_ambient(ContentEntry::single("Hello there."))
            .with_interaction(InteractionFile {
                context: FileContext {
                    event: TagSet::new(["*"]),
                    ..FileContext::default()
                },
                entries: vec![ContentEntry::single("Go on.")],
                source: "generic".into(),
            })
    }

    /// Step through deadlines until `done` holds or `limit` passes
    fn run_until(
        narrator: &mut Narrator,
        mut now: Instant,
        limit: Duration,
        done: impl Fn(&Narrator) -> bool,
    ) -> Instant {
        let end = now + limit;
        while !done(narrator) {
            let Some(deadline) = narrator.next_deadline() else {
                break;
            };
            if deadline > end {
                break;
            }
            now = now.max(deadline);
            narrator.advance(now).unwrap();
        }
        now
    }

    #[test]
    fn test_nothing_scheduled_before_load() {
        let now = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), now);
        assert_eq!(narrator.next_deadline(), None);
        assert_eq!(
            narrator
                .handle_event(NarratorEvent::AmbientCycleReady, now)
                .unwrap(),
            RouteOutcome::Ignored
        );
    }

    #[test]
    fn test_page_loaded_schedules_first_cycle_once() {
        let now = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), now);

        let outcome = narrator.handle_event(NarratorEvent::PageLoaded, now).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Scheduled {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            narrator.handle_event(NarratorEvent::PageLoaded, now).unwrap(),
            RouteOutcome::Ignored
        );
        assert_eq!(narrator.ambient_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_empty_corpus_retries_in_five_seconds() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), ContentLibrary::new(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        // A bored narrator may veto a few cycles first
        let mut now = start;
        for _ in 0..50 {
            now = narrator.ambient_deadline().unwrap();
            narrator.advance(now).unwrap();
            if narrator.metrics().denials(DenialReason::NoContent) > 0 {
                break;
            }
        }
        assert_eq!(narrator.metrics().denials(DenialReason::NoContent), 1);
        assert_eq!(narrator.ambient_deadline(), Some(now + Duration::from_secs(5)));
        assert!(!narrator.is_speaking());
    }

    #[test]
    fn test_ambient_line_plays_and_reschedules() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        let now = run_until(&mut narrator, start, Duration::from_secs(600), |n| {
            n.metrics().snapshot().ambient_lines == 1 && !n.is_speaking()
        });
        assert_eq!(narrator.metrics().snapshot().ambient_lines, 1);

        let messages = narrator.drain_messages();
        let shown: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                NarratorMessage::ShowText { text, token, .. } => Some((text.clone(), *token)),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec![("Hello there.".to_string(), 1)]);
        assert!(messages
            .iter()
            .any(|m| matches!(m, NarratorMessage::Frame { visible, .. } if visible == "Hello there.")));
        assert!(messages
            .iter()
            .any(|m| matches!(m, NarratorMessage::ClearText { .. })));

        let next = narrator.ambient_deadline().unwrap() - now;
        assert!(next >= Duration::from_secs(3) && next <= Duration::from_secs(30));
    }

    #[test]
    fn test_stale_text_complete_is_denied() {
        let now = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), now);
        narrator.handle_event(NarratorEvent::PageLoaded, now).unwrap();

        let outcome = narrator
            .handle_event(NarratorEvent::TextComplete { token: 42 }, now)
            .unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Denied(DenialReason::StaleTextComplete)
        );
        assert_eq!(narrator.metrics().snapshot().stale_completions, 1);
    }

    #[test]
    fn test_reactive_interrupts_display_then_cools_down() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        let now = run_until(&mut narrator, start, Duration::from_secs(600), |n| {
            n.display().state() == DisplayState::Display
        });
        assert_eq!(narrator.display().state(), DisplayState::Display);
        narrator.drain_messages();

        let event = NarratorEvent::ButtonHesitation {
            button: "reset".into(),
        };
        let outcome = narrator.handle_event(event.clone(), now).unwrap();
        let RouteOutcome::Displayed { token } = outcome else {
            panic!("expected a response, got {outcome:?}");
        };
        assert_eq!(token, 2);
        assert_eq!(narrator.ambient_deadline(), None);

        let messages = narrator.drain_messages();
        let cleared = messages
            .iter()
            .position(|m| matches!(m, NarratorMessage::ClearText { .. }));
        let shown = messages
            .iter()
            .position(|m| matches!(m, NarratorMessage::ShowText { token: 2, .. }));
        assert!(cleared.is_some() && cleared < shown);
        assert!(messages
            .iter()
            .any(|m| matches!(m, NarratorMessage::ImmediateResponse { token: 2, .. })));

        let again = narrator
            .handle_event(event, now + Duration::from_secs(1))
            .unwrap();
        assert_eq!(again, RouteOutcome::Denied(DenialReason::EventCooldown));
    }

    #[test]
    fn test_busy_display_queues_whitelisted_event() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        let now = run_until(&mut narrator, start, Duration::from_secs(600), |n| {
            n.display().state() == DisplayState::Deleting
        });
        assert_eq!(narrator.display().state(), DisplayState::Deleting);

        let outcome = narrator
            .handle_event(NarratorEvent::OrientationAdjustment, now)
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Denied(DenialReason::FsmBusy));
        assert!(narrator.router().limiter().has_pending());

        let slider = narrator
            .handle_event(
                NarratorEvent::SliderExploration {
                    slider: "mass".into(),
                },
                now,
            )
            .unwrap();
        assert_eq!(slider, RouteOutcome::Denied(DenialReason::FsmBusy));
    }

    #[test]
    fn test_queued_event_retries_on_next_reactive_event() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        let now = run_until(&mut narrator, start, Duration::from_secs(600), |n| {
            n.display().state() == DisplayState::Deleting
        });
        assert_eq!(
            narrator
                .handle_event(NarratorEvent::OrientationAdjustment, now)
                .unwrap(),
            RouteOutcome::Denied(DenialReason::FsmBusy)
        );

        let now = run_until(&mut narrator, now, Duration::from_secs(1), |n| !n.is_speaking());
        assert_eq!(narrator.display().state(), DisplayState::Idle);
        narrator.drain_messages();

        // The queued event goes first and arms the global lock
        let outcome = narrator
            .handle_event(
                NarratorEvent::ButtonHesitation {
                    button: "play".into(),
                },
                now,
            )
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Denied(DenialReason::GlobalLock));

        let responses: Vec<_> = narrator
            .drain_messages()
            .into_iter()
            .filter_map(|m| match m {
                NarratorMessage::ImmediateResponse { kind, token, .. } => Some((kind, token)),
                _ => None,
            })
            .collect();
        assert_eq!(responses, vec![(ReactiveKind::OrientationAdjustment, 2)]);
        assert!(!narrator.router().limiter().has_pending());
        assert_eq!(narrator.metrics().snapshot().queued_misses, 0);
    }

    #[test]
    fn test_expired_queued_event_counts_a_miss() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        let now = run_until(&mut narrator, start, Duration::from_secs(600), |n| {
            n.display().state() == DisplayState::Deleting
        });
        narrator
            .handle_event(NarratorEvent::OrientationAdjustment, now)
            .unwrap();
        assert!(narrator.router().limiter().has_pending());

        narrator
            .handle_event(
                NarratorEvent::ButtonHesitation {
                    button: "play".into(),
                },
                now + Duration::from_millis(2_500),
            )
            .unwrap();
        assert_eq!(narrator.metrics().snapshot().queued_misses, 1);
        assert_eq!(narrator.metrics().snapshot().immediate_responses, 0);
    }

    fn two_line_library() -> ContentLibrary {
        let entry = ContentEntry::single("One.")
            .with_lines(vec![Line::plain("One."), Line::plain("Two.")]);
        ContentLibrary::new().with_ambient(entry)
    }

    fn defer_mind_request(narrator: &mut Narrator, start: Instant) -> Instant {
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();
        let now = run_until(narrator, start, Duration::from_secs(600), |n| {
            n.sequence().is_locked()
        });
        assert!(narrator.sequence().is_locked());

        let mind = NarratorEvent::MindWantsToSpeak {
            themes: vec!["cosmic".into()],
            reason: Some("test".into()),
        };
        assert_eq!(
            narrator.handle_event(mind, now).unwrap(),
            RouteOutcome::Denied(DenialReason::SequenceLocked)
        );
        assert!(narrator.sequence().has_deferred());
        now
    }

    #[test]
    fn test_deferred_mind_request_flushes_200ms_after_unlock() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), two_line_library(), start);
        let mut now = defer_mind_request(&mut narrator, start);
        assert_eq!(
            narrator
                .handle_event(NarratorEvent::StateReset, now)
                .unwrap(),
            RouteOutcome::Denied(DenialReason::SequenceLocked)
        );
        narrator.drain_messages();

        let mut unlocked_at = None;
        let mut mind_shown_at = None;
        for _ in 0..10_000 {
            let Some(deadline) = narrator.next_deadline() else {
                break;
            };
            now = now.max(deadline);
            narrator.advance(now).unwrap();
            if unlocked_at.is_none() && !narrator.sequence().is_locked() {
                unlocked_at = Some(now);
            }
            if narrator
                .drain_messages()
                .iter()
                .any(|m| matches!(m, NarratorMessage::ShowText { token: 2, .. }))
            {
                mind_shown_at = Some(now);
                break;
            }
        }

        let unlocked_at = unlocked_at.unwrap();
        let mind_shown_at = mind_shown_at.unwrap();
        assert_eq!(mind_shown_at - unlocked_at, Duration::from_millis(200));
        assert_eq!(narrator.metrics().snapshot().mind_lines, 1);
        assert!(!narrator.sequence().has_deferred());
    }

    #[test]
    fn test_page_hidden_drops_deferred_mind_request() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), two_line_library(), start);
        let now = defer_mind_request(&mut narrator, start);

        narrator.handle_event(NarratorEvent::PageHidden, now).unwrap();
        assert!(!narrator.sequence().has_deferred());
        assert!(!narrator.sequence().is_locked());
        assert!(!narrator.is_speaking());

        narrator.handle_event(NarratorEvent::PageVisible, now).unwrap();
        run_until(&mut narrator, now, Duration::from_secs(2), |_| false);
        assert_eq!(narrator.metrics().snapshot().mind_lines, 0);
    }

    #[test]
    fn test_page_hidden_pauses_everything() {
        let start = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), start);
        narrator.handle_event(NarratorEvent::PageLoaded, start).unwrap();

        narrator.handle_event(NarratorEvent::PageHidden, start).unwrap();
        assert_eq!(narrator.ambient_deadline(), None);
        assert_eq!(
            narrator
                .handle_event(NarratorEvent::AmbientCycleReady, start)
                .unwrap(),
            RouteOutcome::Ignored
        );
        assert_eq!(
            narrator
                .handle_event(
                    NarratorEvent::MindWantsToSpeak {
                        themes: vec![],
                        reason: None
                    },
                    start
                )
                .unwrap(),
            RouteOutcome::Denied(DenialReason::MindSuppressed)
        );

        let outcome = narrator.handle_event(NarratorEvent::PageVisible, start).unwrap();
        assert!(matches!(outcome, RouteOutcome::Scheduled { .. }));
        assert!(narrator.ambient_deadline().is_some());
    }

    #[test]
    fn test_mode_and_snapshot_reach_selector() {
        let now = Instant::now();
        let mut narrator = Narrator::new(&config(), interaction_library(), now);
        narrator
            .handle_event(
                NarratorEvent::ModeChanged {
                    mode: "Orbits".into(),
                },
                now,
            )
            .unwrap();
        assert_eq!(narrator.selector().what(), Some("orbits"));

        let values = [("bodies".to_string(), serde_json::json!(3))]
            .into_iter()
            .collect();
        narrator
            .handle_event(NarratorEvent::SnapshotUpdated { values }, now)
            .unwrap();
        assert_eq!(
            narrator.selector().snapshot().get("bodies"),
            Some(&serde_json::json!(3))
        );
    }
}
