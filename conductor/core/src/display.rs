//! Display State Machine
//!
//! Owns the lifecycle of one line on screen:
//!
//! ```text
//! Idle ──► Typing ──► Display ──► Deleting ──► Idle (settle) ──► completion
//! ```
//!
//! Every line gets a fresh generation number. Completions carry that number,
//! so the orchestrator can drop anything belonging to a line that has since
//! been replaced or interrupted.
//!
//! # Design
//!
//! The machine never sleeps. Each phase records the deadline of its next
//! step; [`advance`](DisplayStateMachine::advance) runs every step whose
//! deadline has passed, chaining follow-up deadlines from the previous
//! deadline rather than from `now` so that a late wake-up replays the same
//! timeline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::animation::TypingCadence;
use crate::content::template::{parse_glyphs, Glyph};

/// Phase of the current line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    /// Nothing being typed, shown or deleted
    #[default]
    Idle,
    /// Characters are appearing
    Typing,
    /// The full line is visible
    Display,
    /// Characters are disappearing
    Deleting,
}

/// Per-line display parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineConfig {
    /// Multiplier on the computed display time
    pub duration_mult: f64,
    /// Typing pace (above 1.0 is faster)
    pub pace: f64,
    /// Settle time in Idle before completion fires
    pub idle_time: Duration,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            duration_mult: 1.0,
            pace: 1.0,
            idle_time: Duration::ZERO,
        }
    }
}

/// Something the surface or orchestrator needs to hear about
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayOutput {
    /// Typing of a line began
    Started {
        /// Line generation
        generation: u64,
        /// Visible text of the whole line
        text: String,
        /// How long the full line will be held
        display_time: Duration,
    },
    /// Visible text changed
    Frame {
        /// Line generation
        generation: u64,
        /// Text currently visible
        visible: String,
    },
    /// The line finished deleting
    Cleared {
        /// Line generation
        generation: u64,
    },
    /// The line settled; fires once per generation
    Completed {
        /// Line generation
        generation: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Contemplate,
    DeleteOld,
    Type,
    Hold,
    DeleteOwn,
    Settle,
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    step: Step,
    deadline: Instant,
}

#[derive(Debug)]
struct ActiveLine {
    generation: u64,
    glyphs: Vec<Glyph>,
    cursor: usize,
    text: String,
    config: LineConfig,
}

/// Typewriter state machine for the narrator's single text line
#[derive(Debug)]
pub struct DisplayStateMachine {
    cadence: TypingCadence,
    state: DisplayState,
    generation: u64,
    visible: String,
    line: Option<ActiveLine>,
    pending: Option<Pending>,
    has_shown: bool,
}

impl DisplayStateMachine {
    /// Create an idle machine
    pub fn new(cadence: TypingCadence) -> Self {
        Self {
            cadence,
            state: DisplayState::Idle,
            generation: 0,
            visible: String::new(),
            line: None,
            pending: None,
            has_shown: false,
        }
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// Generation of the current (or last) line
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Text currently on screen
    #[must_use]
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// Whether a line is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.line.is_some()
    }

    /// The cadence in use
    #[must_use]
    pub fn cadence(&self) -> &TypingCadence {
        &self.cadence
    }

    /// Deadline of the next step, if any
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Only Idle and Display may be interrupted
    #[must_use]
    pub fn can_interrupt(&self) -> bool {
        matches!(self.state, DisplayState::Idle | DisplayState::Display)
    }

    /// Start a new line, abandoning whatever was in flight
    ///
    /// Returns the generation assigned to the line.
    pub fn process_line(&mut self, text: &str, config: LineConfig, now: Instant) -> u64 {
        self.generation += 1;
        let glyphs = parse_glyphs(text);
        let plain: String = glyphs
            .iter()
            .filter_map(|g| match g {
                Glyph::Char(c) => Some(*c),
                Glyph::Pause(_) => None,
            })
            .collect();

        self.line = Some(ActiveLine {
            generation: self.generation,
            glyphs,
            cursor: 0,
            text: plain,
            config,
        });

        if !self.has_shown {
            self.has_shown = true;
            let wait = self.cadence.contemplation_delay();
            tracing::debug!(generation = self.generation, ?wait, "Contemplating first line");
            self.state = DisplayState::Idle;
            self.pending = Some(Pending {
                step: Step::Contemplate,
                deadline: now + wait,
            });
        } else if !self.visible.is_empty() {
            self.state = DisplayState::Deleting;
            let delay = self.cadence.delete_delay(config.pace);
            self.pending = Some(Pending {
                step: Step::DeleteOld,
                deadline: now + delay,
            });
        } else {
            self.state = DisplayState::Typing;
            // Typing starts on the first advance
            self.pending = Some(Pending {
                step: Step::Contemplate,
                deadline: now,
            });
        }

        self.generation
    }

    /// Run every step that is due at `now`
    pub fn advance(&mut self, now: Instant) -> Vec<DisplayOutput> {
        let mut out = Vec::new();
        while let Some(pending) = self.pending {
            if pending.deadline > now {
                break;
            }
            self.pending = None;
            self.run_step(pending, &mut out);
        }
        out
    }

    /// Abandon the current line and clear the screen
    ///
    /// Succeeds only from Idle or Display. Returns `false` without touching
    /// anything otherwise.
    pub fn interrupt(&mut self) -> bool {
        if !self.can_interrupt() {
            tracing::debug!(state = ?self.state, "Display not interruptible");
            return false;
        }
        self.clear();
        true
    }

    /// Clear unconditionally, e.g. when the page is hidden
    pub fn reset(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.line = None;
        self.pending = None;
        self.visible.clear();
        self.state = DisplayState::Idle;
    }

    fn schedule(&mut self, step: Step, deadline: Instant) {
        self.pending = Some(Pending { step, deadline });
    }

    fn run_step(&mut self, pending: Pending, out: &mut Vec<DisplayOutput>) {
        let Some(line) = self.line.as_mut() else {
            return;
        };
        let generation = line.generation;
        let config = line.config;
        let at = pending.deadline;

        match pending.step {
            Step::Contemplate => {
                let display_time = self.cadence.display_time(
                    line.text.chars().count(),
                    config.duration_mult,
                    config.pace,
                );
                out.push(DisplayOutput::Started {
                    generation,
                    text: line.text.clone(),
                    display_time,
                });
                self.state = DisplayState::Typing;
                self.schedule(Step::Type, at);
            }
            Step::DeleteOld => {
                self.visible.pop();
                out.push(DisplayOutput::Frame {
                    generation,
                    visible: self.visible.clone(),
                });
                if self.visible.is_empty() {
                    self.schedule(Step::Contemplate, at);
                } else {
                    let delay = self.cadence.delete_delay(config.pace);
                    self.schedule(Step::DeleteOld, at + delay);
                }
            }
            Step::Type => match line.glyphs.get(line.cursor).copied() {
                Some(Glyph::Char(c)) => {
                    line.cursor += 1;
                    self.visible.push(c);
                    out.push(DisplayOutput::Frame {
                        generation,
                        visible: self.visible.clone(),
                    });
                    let delay = self.cadence.char_delay(config.pace);
                    self.schedule(Step::Type, at + delay);
                }
                Some(Glyph::Pause(hold)) => {
                    line.cursor += 1;
                    self.schedule(Step::Type, at + hold);
                }
                None => {
                    let hold = self.cadence.display_time(
                        line.text.chars().count(),
                        config.duration_mult,
                        config.pace,
                    );
                    self.state = DisplayState::Display;
                    self.schedule(Step::Hold, at + hold);
                }
            },
            Step::Hold => {
                self.state = DisplayState::Deleting;
                let delay = self.cadence.delete_delay(config.pace);
                self.schedule(Step::DeleteOwn, at + delay);
            }
            Step::DeleteOwn => {
                self.visible.pop();
                out.push(DisplayOutput::Frame {
                    generation,
                    visible: self.visible.clone(),
                });
                if self.visible.is_empty() {
                    out.push(DisplayOutput::Cleared { generation });
                    self.state = DisplayState::Idle;
                    self.schedule(Step::Settle, at + config.idle_time);
                } else {
                    let delay = self.cadence.delete_delay(config.pace);
                    self.schedule(Step::DeleteOwn, at + delay);
                }
            }
            Step::Settle => {
                self.line = None;
                out.push(DisplayOutput::Completed { generation });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::CadenceConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn machine() -> DisplayStateMachine {
        let cadence = TypingCadence::new(CadenceConfig::default(), StdRng::seed_from_u64(4));
        DisplayStateMachine::new(cadence)
    }

    /// Step through deadlines until `done` holds or nothing is pending
    fn run_until(
        display: &mut DisplayStateMachine,
        mut now: Instant,
        done: impl Fn(&DisplayStateMachine) -> bool,
    ) -> (Instant, Vec<DisplayOutput>) {
        let mut all = Vec::new();
        while !done(display) {
            let Some(deadline) = display.next_deadline() else {
                break;
            };
            now = now.max(deadline);
            all.extend(display.advance(now));
        }
        (now, all)
    }

    #[test]
    fn test_first_line_contemplates() {
        let mut display = machine();
        let start = Instant::now();
        display.process_line("hi", LineConfig::default(), start);

        let wait = display.next_deadline().unwrap() - start;
        assert!(wait >= Duration::from_secs(3) && wait <= Duration::from_secs(5));
        assert!(display.advance(start + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_full_lifecycle_completes_once() {
        let mut display = machine();
        let start = Instant::now();
        let generation = display.process_line("Hey there", LineConfig::default(), start);

        let (_, outputs) = run_until(&mut display, start, |d| !d.is_busy());

        let completions: Vec<_> = outputs
            .iter()
            .filter(|o| matches!(o, DisplayOutput::Completed { .. }))
            .collect();
        assert_eq!(completions, vec![&DisplayOutput::Completed { generation }]);
        assert!(outputs.iter().any(|o| matches!(
            o,
            DisplayOutput::Frame { visible, .. } if visible == "Hey there"
        )));
        assert_eq!(display.state(), DisplayState::Idle);
        assert_eq!(display.visible(), "");
        assert_eq!(display.next_deadline(), None);
    }

    #[test]
    fn test_pause_glyph_delays_typing() {
        let mut display = machine();
        let start = Instant::now();
        display.process_line("a", LineConfig::default(), start);
        let (now, _) = run_until(&mut display, start, |d| !d.is_busy());

        display.process_line("x\\pause{2000}y", LineConfig::default(), now);
        let (_, _) = run_until(&mut display, now, |d| d.visible() == "x");
        let before = display.next_deadline().unwrap();
        let (typed_at, _) = run_until(&mut display, before, |d| d.visible() == "xy");
        assert!(typed_at - before >= Duration::from_millis(2000));
    }

    #[test]
    fn test_interrupt_refused_while_deleting() {
        let mut display = machine();
        let start = Instant::now();
        display.process_line("abc", LineConfig::default(), start);
        let (_, _) = run_until(&mut display, start, |d| d.state() == DisplayState::Deleting);

        let generation = display.generation();
        let deadline = display.next_deadline();
        assert!(!display.interrupt());
        assert_eq!(display.state(), DisplayState::Deleting);
        assert_eq!(display.generation(), generation);
        assert_eq!(display.next_deadline(), deadline);
    }

    #[test]
    fn test_interrupt_during_display_resets() {
        let mut display = machine();
        let start = Instant::now();
        display.process_line("abc", LineConfig::default(), start);
        let (_, _) = run_until(&mut display, start, |d| d.state() == DisplayState::Display);
        assert!(display.next_deadline().is_some());

        assert!(display.interrupt());
        assert_eq!(display.state(), DisplayState::Idle);
        assert_eq!(display.visible(), "");
        assert_eq!(display.next_deadline(), None);
        assert!(!display.is_busy());
    }

    #[test]
    fn test_replacing_line_deletes_old_text_first() {
        let mut display = machine();
        let start = Instant::now();
        display.process_line("old", LineConfig::default(), start);
        let (now, _) = run_until(&mut display, start, |d| d.state() == DisplayState::Display);

        let first = display.generation();
        let second = display.process_line("new", LineConfig::default(), now);
        assert!(second > first);
        assert_eq!(display.state(), DisplayState::Deleting);

        let (_, outputs) = run_until(&mut display, now, |d| !d.is_busy());
        assert!(outputs
            .iter()
            .all(|o| !matches!(o, DisplayOutput::Completed { generation } if *generation == first)));
        assert!(outputs.contains(&DisplayOutput::Completed { generation: second }));
    }
}
