//! Content Library
//!
//! Read-only corpus of narrator lines, loaded from JSON files and
//! partitioned into three disjoint pools:
//!
//! - **welcome** - shown once, on the first ambient selection of a session
//! - **ambient** - idle chatter, filtered by `when`/`what` context and themes
//! - **interaction** - immediate responses, grouped per file and matched by
//!   event and target
//!
//! # File format
//!
//! ```json
//! {
//!   "_context": { "when": "ambient", "what": ["orbit", "*"] },
//!   "lines": [
//!     { "select_bias": { "curious": 2.0 }, "themes": ["cosmic"],
//!       "lines": ["Plain text", { "t": "Rare one", "rarity": 0.2 }] }
//!   ]
//! }
//! ```

pub mod loader;
pub mod selector;
pub mod template;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::emotion::{Emotion, EmotionWeights};

pub use loader::{load_dir, ContentError, ContentFile};
pub use selector::{
    ContentSelector, RecencyBuffer, ResolvedLine, Selection, SelectionSource, SelectorConfig,
    TimeOfDay,
};
pub use template::{parse_glyphs, plain_text, resolve_refs, AppSnapshot, Glyph};

// =============================================================================
// Tone
// =============================================================================

/// Delivery tone hint passed through to the surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Tone {
    /// Plain delivery
    #[default]
    Neutral,
    /// Light and joking
    Playful,
    /// Dry
    Wry,
    /// Friendly
    Warm,
    /// Sincere
    Earnest,
    /// Quietly sad
    Wistful,
    /// Amazed
    Awed,
    /// Uneasy
    Worried,
}

impl From<String> for Tone {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "playful" => Self::Playful,
            "wry" => Self::Wry,
            "warm" => Self::Warm,
            "earnest" => Self::Earnest,
            "wistful" => Self::Wistful,
            "awed" => Self::Awed,
            "worried" => Self::Worried,
            _ => Self::Neutral,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Neutral => "neutral",
            Self::Playful => "playful",
            Self::Wry => "wry",
            Self::Warm => "warm",
            Self::Earnest => "earnest",
            Self::Wistful => "wistful",
            Self::Awed => "awed",
            Self::Worried => "worried",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for TagSet {
    fn from(raw: OneOrMany) -> Self {
        match raw {
            OneOrMany::One(tag) => Self::new([tag]),
            OneOrMany::Many(tags) => Self::new(tags),
        }
    }
}

/// Set of context tags, written as a string or an array in content files
///
/// An empty set matches everything, as does one containing `*` or `any`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Build from tags, lowercased and trimmed
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            tags.into_iter()
                .map(|t| t.into().trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// True when no tags are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the set contains `*` or `any`
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.iter().any(|t| t == "*" || t == "any")
    }

    /// Exact membership, ignoring wildcards
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(value))
    }

    /// Empty, wildcard or containing `value`
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.is_empty() || self.is_wildcard() || self.contains(value)
    }

    /// Tags in the set
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.0
    }
}

// =============================================================================
// Lines and entries
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLine {
    Text(String),
    Rich {
        t: String,
        #[serde(default = "one")]
        rarity: f64,
        #[serde(default)]
        tone: Option<Tone>,
        #[serde(default = "one")]
        duration_mult: f64,
    },
}

fn one() -> f64 {
    1.0
}

/// One displayable line
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawLine")]
pub struct Line {
    /// Raw text, may contain `\ref{..}` and `\pause{..}`
    pub text: String,
    /// Probability in `[0, 1]` that the line is shown when drawn
    pub rarity: f64,
    /// Tone override for this line
    pub tone: Option<Tone>,
    /// Multiplier on the computed display time
    pub duration_mult: f64,
}

impl Line {
    /// A plain line with default settings
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rarity: 1.0,
            tone: None,
            duration_mult: 1.0,
        }
    }

    /// Set rarity
    #[must_use]
    pub fn with_rarity(mut self, rarity: f64) -> Self {
        self.rarity = rarity.clamp(0.0, 1.0);
        self
    }
}

impl From<RawLine> for Line {
    fn from(raw: RawLine) -> Self {
        match raw {
            RawLine::Text(text) => Self::plain(text),
            RawLine::Rich {
                t,
                rarity,
                tone,
                duration_mult,
            } => Self {
                text: t,
                rarity: if rarity.is_finite() {
                    rarity.clamp(0.0, 1.0)
                } else {
                    1.0
                },
                tone,
                duration_mult: if duration_mult.is_finite() && duration_mult > 0.0 {
                    duration_mult
                } else {
                    1.0
                },
            },
        }
    }
}

/// A selectable unit of content: one or more lines shown as a sequence
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentEntry {
    /// Emotion-dependent selection weight
    pub select_bias: EmotionWeights,
    /// How strongly this content pulls the narrator toward each emotion
    pub reflect_pull: EmotionWeights,
    /// Default tone for every line
    pub tone: Tone,
    /// Topic tags
    pub themes: Vec<String>,
    /// Mode context, inherited from the file
    #[serde(skip)]
    pub when: TagSet,
    /// Application context, inherited from the file
    #[serde(skip)]
    pub what: TagSet,
    /// Lines in display order
    pub lines: Vec<Line>,
}

impl ContentEntry {
    /// Single-line entry, mostly for tests and programmatic corpora
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            lines: vec![Line::plain(text)],
            ..Self::default()
        }
    }

    /// Set the themes
    #[must_use]
    pub fn with_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = themes
            .into_iter()
            .map(|t| t.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the `when` context
    #[must_use]
    pub fn with_when(mut self, when: TagSet) -> Self {
        self.when = when;
        self
    }

    /// Set the `what` context
    #[must_use]
    pub fn with_what(mut self, what: TagSet) -> Self {
        self.what = what;
        self
    }

    /// Set the selection bias
    #[must_use]
    pub fn with_select_bias(mut self, bias: EmotionWeights) -> Self {
        self.select_bias = bias;
        self
    }

    /// Set the reflection pull
    #[must_use]
    pub fn with_reflect_pull(mut self, pull: EmotionWeights) -> Self {
        self.reflect_pull = pull;
        self
    }

    /// Replace the lines
    #[must_use]
    pub fn with_lines(mut self, lines: Vec<Line>) -> Self {
        self.lines = lines;
        self
    }

    /// Selection weight blended toward 1.0 as intensity drops
    ///
    /// `1 + (bias - 1) * intensity`, never negative.
    #[must_use]
    pub fn effective_weight(&self, emotion: Emotion, intensity: f64) -> f64 {
        let bias = self.select_bias.get(emotion);
        (1.0 + (bias - 1.0) * intensity.clamp(0.0, 1.0)).max(0.0)
    }

    /// Whether any requested theme is present
    #[must_use]
    pub fn has_theme_overlap(&self, themes: &[String]) -> bool {
        themes
            .iter()
            .any(|want| self.themes.iter().any(|have| have.eq_ignore_ascii_case(want)))
    }
}

// =============================================================================
// Files and library
// =============================================================================

/// The `_context` block of a content file
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileContext {
    /// Mode tags (`ambient`, `welcome`, `mind`, time of day, ...)
    pub when: TagSet,
    /// Application mode tags
    pub what: TagSet,
    /// Reactive event names this file answers
    pub event: TagSet,
    /// Button targets
    pub button: TagSet,
    /// Slider targets
    pub slider: TagSet,
    /// Select targets
    pub select: TagSet,
}

/// What a reactive event was aimed at
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum InteractionTarget {
    /// No specific target
    #[default]
    None,
    /// A button by id
    Button(String),
    /// A slider by id
    Slider(String),
    /// A select control by id
    Select(String),
}

impl InteractionTarget {
    /// Target id, if any
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Button(n) | Self::Slider(n) | Self::Select(n) => Some(n),
        }
    }
}

impl fmt::Display for InteractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("-"),
            Self::Button(n) => write!(f, "button:{n}"),
            Self::Slider(n) => write!(f, "slider:{n}"),
            Self::Select(n) => write!(f, "select:{n}"),
        }
    }
}

/// Interaction entries sharing one file context
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionFile {
    /// File context
    pub context: FileContext,
    /// Entries
    pub entries: Vec<ContentEntry>,
    /// Where the file came from
    pub source: String,
}

/// How strongly an interaction file matches a target
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TargetMatch {
    Exact,
    Wildcard,
}

impl InteractionFile {
    /// True when the event tag is `*` or `any`
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.context.event.is_wildcard()
    }

    pub(crate) fn target_match(&self, target: &InteractionTarget) -> Option<TargetMatch> {
        let tags = match target {
            InteractionTarget::None => return Some(TargetMatch::Wildcard),
            InteractionTarget::Button(_) => &self.context.button,
            InteractionTarget::Slider(_) => &self.context.slider,
            InteractionTarget::Select(_) => &self.context.select,
        };
        let name = target.name().unwrap_or_default();
        if tags.contains(name) {
            Some(TargetMatch::Exact)
        } else if tags.is_empty() || tags.is_wildcard() {
            Some(TargetMatch::Wildcard)
        } else {
            None
        }
    }
}

/// The partitioned corpus
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentLibrary {
    welcome: Vec<ContentEntry>,
    ambient: Vec<ContentEntry>,
    interaction: Vec<InteractionFile>,
}

impl ContentLibrary {
    /// An empty library
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition parsed files into pools
    ///
    /// Files with an `event` context are interaction files; files whose
    /// `when` contains `welcome` feed the welcome pool; the rest are ambient.
    #[must_use]
    pub fn from_files(files: Vec<ContentFile>) -> Self {
        let mut library = Self::new();
        for file in files {
            library.add_file(file);
        }
        tracing::info!(
            welcome = library.welcome.len(),
            ambient = library.ambient.len(),
            interaction = library.interaction.len(),
            "Content library built"
        );
        library
    }

    /// Add one parsed file to the right pool
    pub fn add_file(&mut self, file: ContentFile) {
        let ContentFile {
            context,
            entries,
            source,
        } = file;

        if !context.event.is_empty() {
            self.interaction.push(InteractionFile {
                context,
                entries,
                source,
            });
            return;
        }

        let welcome = context.when.contains("welcome");
        let entries = entries.into_iter().map(|entry| {
            entry
                .with_when(context.when.clone())
                .with_what(context.what.clone())
        });
        if welcome {
            self.welcome.extend(entries);
        } else {
            self.ambient.extend(entries);
        }
    }

    /// Add an ambient entry directly
    #[must_use]
    pub fn with_ambient(mut self, entry: ContentEntry) -> Self {
        self.ambient.push(entry);
        self
    }

    /// Add a welcome entry directly
    #[must_use]
    pub fn with_welcome(mut self, entry: ContentEntry) -> Self {
        self.welcome.push(entry);
        self
    }

    /// Add an interaction file directly
    #[must_use]
    pub fn with_interaction(mut self, file: InteractionFile) -> Self {
        self.interaction.push(file);
        self
    }

    /// Welcome pool
    #[must_use]
    pub fn welcome(&self) -> &[ContentEntry] {
        &self.welcome
    }

    /// Ambient pool
    #[must_use]
    pub fn ambient(&self) -> &[ContentEntry] {
        &self.ambient
    }

    /// Interaction files
    #[must_use]
    pub fn interaction(&self) -> &[InteractionFile] {
        &self.interaction
    }

    /// True when every pool is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.welcome.is_empty() && self.ambient.is_empty() && self.interaction.is_empty()
    }
}
