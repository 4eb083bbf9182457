//! Line Templating
//!
//! Two escapes are understood inside line text:
//!
//! - `\ref{key}` / `\ref{key|formatter}` - replaced at selection time with a
//!   value from the [`AppSnapshot`]
//! - `\pause{ms}` - left in the text and turned into a [`Glyph::Pause`] when
//!   the display types the line
//!
//! Unknown keys and formatters never fail a line; they log a warning and
//! render as `[?]`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// Rendered in place of anything that cannot be resolved
pub const PLACEHOLDER: &str = "[?]";

const REF_OPEN: &str = "\\ref{";
const PAUSE_OPEN: &str = "\\pause{";
const PAUSE_MIN_MS: u64 = 50;
const PAUSE_MAX_MS: u64 = 5_000;

/// Key/value view of application state used by `\ref{}`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppSnapshot(HashMap<String, Value>);

impl AppSnapshot {
    /// Empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`set`](Self::set)
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Overwrite keys present in `values`
    pub fn merge(&mut self, values: HashMap<String, Value>) {
        self.0.extend(values);
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Replace every `\ref{..}` in `text`
pub fn resolve_refs(text: &str, snapshot: &AppSnapshot) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(REF_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + REF_OPEN.len()..];
        let Some(end) = after.find('}') else {
            // Unterminated, keep verbatim
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (key, formatter) = match body.split_once('|') {
            Some((key, fmt)) => (key.trim(), Some(fmt.trim())),
            None => (body.trim(), None),
        };
        out.push_str(&render_ref(key, formatter, snapshot));
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn render_ref(key: &str, formatter: Option<&str>, snapshot: &AppSnapshot) -> String {
    let Some(value) = snapshot.get(key) else {
        tracing::warn!(key, "Unknown template key");
        return PLACEHOLDER.to_string();
    };

    match formatter {
        None => plain_value(value),
        Some(name) => apply_formatter(name, value).unwrap_or_else(|| {
            tracing::warn!(key, formatter = name, "Unusable template formatter");
            PLACEHOLDER.to_string()
        }),
    }
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => PLACEHOLDER.to_string(),
        other => other.to_string(),
    }
}

fn apply_formatter(name: &str, value: &Value) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "upper" => Some(plain_value(value).to_uppercase()),
        "lower" => Some(plain_value(value).to_lowercase()),
        "int" | "round" => number(value).map(|n| format!("{}", n.round() as i64)),
        "sci" | "scientific" => number(value).map(|n| format!("{n:.2e}")),
        "percent" | "pct" => number(value).map(|n| format!("{:.0}%", n * 100.0)),
        _ => {
            let digits = lower.strip_prefix("fixed")?;
            let places = if digits.is_empty() {
                2
            } else {
                digits.parse::<usize>().ok()?.min(12)
            };
            number(value).map(|n| format!("{n:.places$}"))
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

// =============================================================================
// Glyphs
// =============================================================================

/// One typed unit of a line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Glyph {
    /// A visible character
    Char(char),
    /// Hold before the next character
    Pause(Duration),
}

/// Split a line into characters and pauses
///
/// Pauses are clamped to 50..=5000 ms. A `\pause{}` whose body is not a
/// number is kept as literal text.
pub fn parse_glyphs(text: &str) -> Vec<Glyph> {
    let mut glyphs = Vec::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(PAUSE_OPEN) {
        glyphs.extend(rest[..start].chars().map(Glyph::Char));
        let after = &rest[start + PAUSE_OPEN.len()..];

        let parsed = after.find('}').and_then(|end| {
            after[..end]
                .trim()
                .parse::<u64>()
                .ok()
                .map(|ms| (ms.clamp(PAUSE_MIN_MS, PAUSE_MAX_MS), end))
        });

        match parsed {
            Some((ms, end)) => {
                glyphs.push(Glyph::Pause(Duration::from_millis(ms)));
                rest = &after[end + 1..];
            }
            None => {
                glyphs.extend(rest[start..start + PAUSE_OPEN.len()].chars().map(Glyph::Char));
                rest = after;
            }
        }
    }

    glyphs.extend(rest.chars().map(Glyph::Char));
    glyphs
}

/// Visible text of a line with pauses removed
pub fn plain_text(text: &str) -> String {
    parse_glyphs(text)
        .into_iter()
        .filter_map(|g| match g {
            Glyph::Char(c) => Some(c),
            Glyph::Pause(_) => None,
        })
        .collect()
}
