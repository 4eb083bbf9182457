//! Terminal Rendering
//!
//! Turns [`NarratorMessage`]s into output on stdout. Two modes:
//! - **Typewriter**: redraws the current line on every frame, colored by tone
//! - **Json**: one JSON object per message, for piping into another surface
//!
//! Logs go to stderr, so stdout carries nothing but the narrator's text.

use std::io::Write;

use anyhow::Result;
use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use tracing::{debug, info};

use narrator_core::{content::Tone, NarratorMessage};

/// How messages are written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Animated single line
    Typewriter,
    /// JSON lines
    Json,
}

/// Foreground color for a delivery tone
fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Neutral => Color::Reset,
        Tone::Playful => Color::Magenta,
        Tone::Wry => Color::Yellow,
        Tone::Warm => Color::DarkYellow,
        Tone::Earnest => Color::Cyan,
        Tone::Wistful => Color::Blue,
        Tone::Awed => Color::Green,
        Tone::Worried => Color::Red,
    }
}

/// Writes narrator output to a terminal (or any writer)
pub struct Renderer<W: Write> {
    out: W,
    mode: OutputMode,
    color: Color,
}

impl<W: Write> Renderer<W> {
    /// Create a renderer
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self {
            out,
            mode,
            color: Color::Reset,
        }
    }

    /// Render one message
    pub fn render(&mut self, message: &NarratorMessage) -> Result<()> {
        match self.mode {
            OutputMode::Json => {
                let line = serde_json::to_string(message)?;
                writeln!(self.out, "{line}")?;
            }
            OutputMode::Typewriter => self.render_typewriter(message)?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn render_typewriter(&mut self, message: &NarratorMessage) -> Result<()> {
        match message {
            NarratorMessage::ShowText {
                tone,
                emotion,
                text,
                ..
            } => {
                self.color = tone_color(*tone);
                debug!(%emotion, %tone, chars = text.chars().count(), "Showing line");
            }
            NarratorMessage::Frame { visible, .. } => {
                queue!(
                    self.out,
                    cursor::MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    SetForegroundColor(self.color),
                    Print(visible),
                    ResetColor
                )?;
            }
            NarratorMessage::ClearText { .. } => {
                queue!(self.out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            }
            NarratorMessage::ImmediateResponse { kind, target, .. } => {
                debug!(%kind, %target, "Immediate response");
            }
            NarratorMessage::EmotionChanged {
                from, to, cause, ..
            } => {
                info!(%from, %to, %cause, "Emotion changed");
            }
        }
        Ok(())
    }

    /// Leave the terminal on a clean line
    pub fn finish(&mut self) -> Result<()> {
        if self.mode == OutputMode::Typewriter {
            queue!(self.out, ResetColor, Print("\n"))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_core::Emotion;

    fn show_text() -> NarratorMessage {
        NarratorMessage::ShowText {
            token: 1,
            generation: 1,
            text: "Hi.".into(),
            display_time_ms: 2_000,
            idle_time_ms: 600,
            emotion: Emotion::Amused,
            intensity: 0.4,
            tone: Tone::Playful,
            themes: vec![],
        }
    }

    #[test]
    fn test_json_mode_writes_one_line_per_message() {
        let mut renderer = Renderer::new(Vec::new(), OutputMode::Json);
        renderer.render(&show_text()).unwrap();
        renderer
            .render(&NarratorMessage::ClearText { generation: 1 })
            .unwrap();

        let out = String::from_utf8(renderer.out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""type":"show_text""#));
        assert!(lines[1].contains(r#""type":"clear_text""#));
    }

    #[test]
    fn test_typewriter_prints_frames_only() {
        let mut renderer = Renderer::new(Vec::new(), OutputMode::Typewriter);
        renderer.render(&show_text()).unwrap();
        assert!(renderer.out.is_empty());

        renderer
            .render(&NarratorMessage::Frame {
                generation: 1,
                visible: "Hi".into(),
            })
            .unwrap();
        let out = String::from_utf8(renderer.out.clone()).unwrap();
        assert!(out.contains("Hi"));
        assert_eq!(renderer.color, Color::Magenta);
    }
}
