//! Content Selection
//!
//! Picks what the narrator says next.
//!
//! # Ambient cascade
//!
//! Candidates are narrowed by context (`when` = request mode, `what` =
//! current application mode), requested themes and the recency buffer. When
//! a stage leaves nothing, the next one relaxes a filter:
//!
//! 1. context + themes + recency
//! 2. context + recency
//! 3. context only, after clearing the recency buffer
//! 4. the whole ambient pool
//!
//! The survivors are drawn by [`ContentEntry::effective_weight`].
//!
//! # Immediate responses
//!
//! Interaction files are tried in order of specificity: exact event with an
//! exact target, exact event with a wildcard target, then any generic file
//! whose event is `*`.

use std::collections::VecDeque;

use chrono::Timelike;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::template::{plain_text, resolve_refs, AppSnapshot};
use super::{ContentEntry, ContentLibrary, InteractionTarget, TargetMatch, Tone};
use crate::emotion::{Emotion, EmotionWeights};
use crate::weighted::weighted_index;

// =============================================================================
// Configuration
// =============================================================================

/// Selector tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Upper bound on the recency buffer (also capped at half the pool)
    pub recency_size: usize,

    /// Show a welcome line on the first ambient selection
    pub welcome_enabled: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            recency_size: 8,
            welcome_enabled: true,
        }
    }
}

impl SelectorConfig {
    /// Set the recency buffer size
    #[must_use]
    pub fn with_recency_size(mut self, size: usize) -> Self {
        self.recency_size = size;
        self
    }

    /// Enable or disable the welcome line
    #[must_use]
    pub fn with_welcome(mut self, enabled: bool) -> Self {
        self.welcome_enabled = enabled;
        self
    }
}

// =============================================================================
// Recency
// =============================================================================

/// Bounded FIFO of recently shown ambient indices
#[derive(Clone, Debug, Default)]
pub struct RecencyBuffer {
    entries: VecDeque<usize>,
    capacity: usize,
}

impl RecencyBuffer {
    /// Capacity is `min(configured, pool_len / 2)`
    #[must_use]
    pub fn new(configured: usize, pool_len: usize) -> Self {
        let capacity = configured.min(pool_len / 2);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an index, evicting the oldest when full
    pub fn push(&mut self, index: usize) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(index);
    }

    /// Whether `index` was shown recently
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains(&index)
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entries held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Selection output
// =============================================================================

/// Coarse time of day, used as a welcome context tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    /// 05:00-11:59
    Morning,
    /// 12:00-16:59
    Afternoon,
    /// 17:00-20:59
    Evening,
    /// 21:00-04:59
    Night,
}

impl TimeOfDay {
    /// Bucket an hour of the day
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// From the local wall clock
    #[must_use]
    pub fn now_local() -> Self {
        Self::from_hour(chrono::Local::now().hour())
    }

    /// Tag name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }

    const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];
}

/// Which pool a selection came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Welcome pool
    Welcome,
    /// Ambient pool
    Ambient,
    /// Interaction file
    Interaction,
}

/// A line ready to display
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLine {
    /// Text with references resolved; may still contain pauses
    pub text: String,
    /// Tone for this line
    pub tone: Tone,
    /// Display time multiplier
    pub duration_mult: f64,
}

/// The outcome of a successful selection
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Lines that survived the rarity rolls
    pub lines: Vec<ResolvedLine>,
    /// Entry tone
    pub tone: Tone,
    /// Entry themes
    pub themes: Vec<String>,
    /// Entry reflection pull
    pub reflect_pull: EmotionWeights,
    /// Pool of origin
    pub source: SelectionSource,
}

impl Selection {
    /// Visible characters across every line
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.lines
            .iter()
            .map(|l| plain_text(&l.text).chars().count())
            .sum()
    }

    /// Whether the selection spans more than one line
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        self.lines.len() > 1
    }
}

// =============================================================================
// Selector
// =============================================================================

#[derive(Clone, Copy)]
struct Filters {
    context: bool,
    themes: bool,
    recency: bool,
}

/// Chooses content from a [`ContentLibrary`]
#[derive(Debug)]
pub struct ContentSelector {
    library: ContentLibrary,
    config: SelectorConfig,
    recency: RecencyBuffer,
    rng: StdRng,
    welcomed: bool,
    what: Option<String>,
    time_of_day: Option<TimeOfDay>,
    snapshot: AppSnapshot,
    last_shown_chars: usize,
    last_shown_themes: Vec<String>,
}

impl ContentSelector {
    /// Create a selector over `library`
    pub fn new(library: ContentLibrary, config: SelectorConfig, rng: StdRng) -> Self {
        let recency = RecencyBuffer::new(config.recency_size, library.ambient().len());
        Self {
            library,
            config,
            recency,
            rng,
            welcomed: false,
            what: None,
            time_of_day: None,
            snapshot: AppSnapshot::new(),
            last_shown_chars: 0,
            last_shown_themes: Vec::new(),
        }
    }

    /// Pin the time of day instead of reading the local clock
    #[must_use]
    pub fn with_time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    /// The library in use
    #[must_use]
    pub fn library(&self) -> &ContentLibrary {
        &self.library
    }

    /// Recency buffer state
    #[must_use]
    pub fn recency(&self) -> &RecencyBuffer {
        &self.recency
    }

    /// Set the current application mode (`what` context)
    pub fn set_what(&mut self, what: Option<String>) {
        self.what = what.map(|w| w.to_ascii_lowercase());
    }

    /// Current application mode
    #[must_use]
    pub fn what(&self) -> Option<&str> {
        self.what.as_deref()
    }

    /// Template state
    #[must_use]
    pub fn snapshot(&self) -> &AppSnapshot {
        &self.snapshot
    }

    /// Mutable template state
    pub fn snapshot_mut(&mut self) -> &mut AppSnapshot {
        &mut self.snapshot
    }

    /// Remember what was shown, for pacing the next cycle
    pub fn record_shown(&mut self, selection: &Selection) {
        self.last_shown_chars = selection.total_chars();
        self.last_shown_themes.clone_from(&selection.themes);
    }

    /// Characters and themes of the last shown selection
    #[must_use]
    pub fn last_shown(&self) -> (usize, &[String]) {
        (self.last_shown_chars, &self.last_shown_themes)
    }

    /// Pick ambient content for `mode`
    ///
    /// The first call of a session draws from the welcome pool instead, when
    /// that pool has anything in it.
    pub fn select(
        &mut self,
        mode: &str,
        themes: &[String],
        emotion: Emotion,
        intensity: f64,
    ) -> Option<Selection> {
        if !self.welcomed {
            self.welcomed = true;
            if self.config.welcome_enabled && !self.library.welcome().is_empty() {
                return self.select_welcome(emotion, intensity);
            }
        }

        let pool_len = self.library.ambient().len();
        if pool_len == 0 {
            tracing::debug!(mode, "Ambient pool is empty");
            return None;
        }

        let stages = [
            Filters {
                context: true,
                themes: !themes.is_empty(),
                recency: true,
            },
            Filters {
                context: true,
                themes: false,
                recency: true,
            },
            Filters {
                context: true,
                themes: false,
                recency: false,
            },
            Filters {
                context: false,
                themes: false,
                recency: false,
            },
        ];

        let mut candidates = Vec::new();
        for (stage, filters) in stages.iter().enumerate() {
            if stage == 2 {
                self.recency.clear();
            }
            candidates = self.ambient_candidates(mode, themes, *filters);
            if !candidates.is_empty() {
                if stage > 0 {
                    tracing::debug!(mode, stage, "Relaxed ambient filters");
                }
                break;
            }
        }

        let ambient = self.library.ambient();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&i| ambient[i].effective_weight(emotion, intensity))
            .collect();
        let index = match weighted_index(&weights, &mut self.rng) {
            Some(pos) => candidates[pos],
            None => candidates[self.rng.gen_range(0..candidates.len())],
        };

        self.recency.push(index);
        let entry = self.library.ambient()[index].clone();
        self.realize(&entry, SelectionSource::Ambient)
    }

    /// Pick an immediate response for a reactive event
    pub fn select_immediate(
        &mut self,
        event: &str,
        target: &InteractionTarget,
        emotion: Emotion,
        intensity: f64,
    ) -> Option<Selection> {
        let files = self.library.interaction();

        let mut best: Option<(TargetMatch, usize)> = None;
        for (idx, file) in files.iter().enumerate() {
            if file.entries.is_empty() || !file.context.event.contains(event) {
                continue;
            }
            if let Some(quality) = file.target_match(target) {
                if best.map_or(true, |(q, _)| quality < q) {
                    best = Some((quality, idx));
                }
            }
        }

        let file_idx = best.map(|(_, idx)| idx).or_else(|| {
            files
                .iter()
                .position(|f| f.is_generic() && !f.entries.is_empty())
        });
        let Some(file_idx) = file_idx else {
            tracing::debug!(event, %target, "No interaction content");
            return None;
        };

        let entries = &self.library.interaction()[file_idx].entries;
        let weights: Vec<f64> = entries
            .iter()
            .map(|e| e.effective_weight(emotion, intensity))
            .collect();
        let pick = weighted_index(&weights, &mut self.rng).unwrap_or(0);
        let entry = entries[pick].clone();
        self.realize(&entry, SelectionSource::Interaction)
    }

    fn select_welcome(&mut self, emotion: Emotion, intensity: f64) -> Option<Selection> {
        let tod = self.time_of_day.unwrap_or_else(TimeOfDay::now_local);
        let what = self.what.clone();
        let welcome = self.library.welcome();

        let mut candidates: Vec<usize> = welcome
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                let when_ok = e.when.contains(tod.as_str())
                    || !TimeOfDay::ALL.iter().any(|t| e.when.contains(t.as_str()));
                let what_ok = what.as_deref().map_or(true, |w| e.what.matches(w));
                when_ok && what_ok
            })
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            candidates = (0..welcome.len()).collect();
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|&i| welcome[i].effective_weight(emotion, intensity))
            .collect();
        let index = weighted_index(&weights, &mut self.rng).map_or(candidates[0], |p| candidates[p]);

        tracing::debug!(time_of_day = tod.as_str(), "Selected welcome line");
        let entry = welcome[index].clone();
        self.realize(&entry, SelectionSource::Welcome)
    }

    fn ambient_candidates(&self, mode: &str, themes: &[String], filters: Filters) -> Vec<usize> {
        self.library
            .ambient()
            .iter()
            .enumerate()
            .filter(|(idx, entry)| {
                if filters.context {
                    if !entry.when.matches(mode) {
                        return false;
                    }
                    if let Some(what) = self.what.as_deref() {
                        if !entry.what.matches(what) {
                            return false;
                        }
                    }
                }
                if filters.themes && !entry.has_theme_overlap(themes) {
                    return false;
                }
                !(filters.recency && self.recency.contains(*idx))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Roll rarity and resolve templates
    fn realize(&mut self, entry: &ContentEntry, source: SelectionSource) -> Option<Selection> {
        let single = entry.lines.len() == 1;
        let mut lines = Vec::with_capacity(entry.lines.len());

        for line in &entry.lines {
            if self.rng.gen::<f64>() >= line.rarity {
                if single {
                    tracing::debug!("Single line failed its rarity roll");
                    return None;
                }
                continue;
            }
            lines.push(ResolvedLine {
                text: resolve_refs(&line.text, &self.snapshot),
                tone: line.tone.unwrap_or(entry.tone),
                duration_mult: line.duration_mult,
            });
        }

        if lines.is_empty() {
            tracing::debug!("Every line failed its rarity roll");
            return None;
        }

        Some(Selection {
            lines,
            tone: entry.tone,
            themes: entry.themes.clone(),
            reflect_pull: entry.reflect_pull.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{FileContext, InteractionFile, Line, TagSet};
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(99)
    }

    fn ambient(n: usize) -> ContentLibrary {
        (0..n).fold(ContentLibrary::new(), |lib, i| {
            lib.with_ambient(ContentEntry::single(format!("line {i}")))
        })
    }

    fn first_text(sel: &Selection) -> &str {
        &sel.lines[0].text
    }

    #[test]
    fn test_recency_capacity_is_half_pool() {
        assert_eq!(RecencyBuffer::new(8, 6).capacity(), 3);
        assert_eq!(RecencyBuffer::new(8, 40).capacity(), 8);
        assert_eq!(RecencyBuffer::new(8, 1).capacity(), 0);
    }

    #[test]
    fn test_no_repeats_within_recency_window() {
        let mut selector = ContentSelector::new(ambient(10), SelectorConfig::default(), rng());
        let cap = selector.recency().capacity();
        let mut history: Vec<String> = Vec::new();

        for _ in 0..200 {
            let sel = selector
                .select("ambient", &[], Emotion::Neutral, 0.5)
                .unwrap();
            let text = first_text(&sel).to_string();
            let window = history.iter().rev().take(cap);
            assert!(!window.clone().any(|t| *t == text), "{text} repeated");
            history.push(text);
        }
    }

    #[test]
    fn test_empty_library_selects_nothing() {
        let mut selector =
            ContentSelector::new(ContentLibrary::new(), SelectorConfig::default(), rng());
        assert!(selector.select("ambient", &[], Emotion::Neutral, 0.5).is_none());
        assert!(selector
            .select_immediate("state_reset", &InteractionTarget::None, Emotion::Neutral, 0.5)
            .is_none());
    }

    #[test]
    fn test_theme_filter_then_relaxes() {
        let library = ContentLibrary::new()
            .with_ambient(ContentEntry::single("stars").with_themes(["cosmic"]))
            .with_ambient(ContentEntry::single("numbers").with_themes(["mathematical"]));
        // Without recency the theme filter alone decides
        let config = SelectorConfig::default().with_recency_size(0);
        let mut selector = ContentSelector::new(library, config, rng());

        for _ in 0..20 {
            let sel = selector
                .select("ambient", &["cosmic".to_string()], Emotion::Neutral, 0.5)
                .unwrap();
            assert_eq!(first_text(&sel), "stars");
        }

        let sel = selector
            .select("ambient", &["culinary".to_string()], Emotion::Neutral, 0.5)
            .unwrap();
        assert!(["stars", "numbers"].contains(&first_text(&sel)));
    }

    #[test]
    fn test_context_filter_and_full_relax() {
        let library = ContentLibrary::new()
            .with_ambient(ContentEntry::single("mind").with_when(TagSet::new(["mind"])))
            .with_ambient(ContentEntry::single("idle").with_when(TagSet::new(["ambient"])));
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng());

        let sel = selector.select("mind", &[], Emotion::Neutral, 0.5).unwrap();
        assert_eq!(first_text(&sel), "mind");

        // Nothing is tagged for this mode, so every filter drops
        let sel = selector.select("sleep", &[], Emotion::Neutral, 0.5).unwrap();
        assert!(["mind", "idle"].contains(&first_text(&sel)));
    }

    #[test]
    fn test_welcome_first_then_ambient() {
        let library = ambient(2)
            .with_welcome(
                ContentEntry::single("good morning").with_when(TagSet::new(["welcome", "morning"])),
            )
            .with_welcome(
                ContentEntry::single("good night").with_when(TagSet::new(["welcome", "night"])),
            );
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng())
            .with_time_of_day(TimeOfDay::Night);

        let first = selector.select("ambient", &[], Emotion::Neutral, 0.5).unwrap();
        assert_eq!(first.source, SelectionSource::Welcome);
        assert_eq!(first_text(&first), "good night");

        let second = selector.select("ambient", &[], Emotion::Neutral, 0.5).unwrap();
        assert_eq!(second.source, SelectionSource::Ambient);
    }

    #[test]
    fn test_rarity_zero_single_line_aborts() {
        let library = ContentLibrary::new().with_ambient(
            ContentEntry::default().with_lines(vec![Line::plain("never").with_rarity(0.0)]),
        );
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng());
        assert!(selector.select("ambient", &[], Emotion::Neutral, 0.5).is_none());
    }

    #[test]
    fn test_rarity_skips_lines_in_sequence() {
        let library = ContentLibrary::new().with_ambient(ContentEntry::default().with_lines(vec![
            Line::plain("one"),
            Line::plain("hidden").with_rarity(0.0),
            Line::plain("three"),
        ]));
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng());
        let sel = selector.select("ambient", &[], Emotion::Neutral, 0.5).unwrap();
        let texts: Vec<&str> = sel.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "three"]);
        assert!(sel.is_sequence());
    }

    #[test]
    fn test_immediate_prefers_exact_target() {
        let file = |button: &str, text: &str| InteractionFile {
            context: FileContext {
                event: TagSet::new(["button_hesitation"]),
                button: TagSet::new([button]),
                ..FileContext::default()
            },
            entries: vec![ContentEntry::single(text)],
            source: text.to_string(),
        };
        let generic = InteractionFile {
            context: FileContext {
                event: TagSet::new(["*"]),
                ..FileContext::default()
            },
            entries: vec![ContentEntry::single("generic")],
            source: "generic".into(),
        };
        let library = ContentLibrary::new()
            .with_interaction(file("*", "any button"))
            .with_interaction(file("reset", "reset button"))
            .with_interaction(generic);
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng());

        let target = InteractionTarget::Button("reset".into());
        let sel = selector
            .select_immediate("button_hesitation", &target, Emotion::Neutral, 0.5)
            .unwrap();
        assert_eq!(first_text(&sel), "reset button");

        let target = InteractionTarget::Button("play".into());
        let sel = selector
            .select_immediate("button_hesitation", &target, Emotion::Neutral, 0.5)
            .unwrap();
        assert_eq!(first_text(&sel), "any button");

        let sel = selector
            .select_immediate("state_reset", &InteractionTarget::None, Emotion::Neutral, 0.5)
            .unwrap();
        assert_eq!(first_text(&sel), "generic");
        assert_eq!(sel.source, SelectionSource::Interaction);
    }

    #[test]
    fn test_refs_resolved_at_selection() {
        let library = ContentLibrary::new()
            .with_ambient(ContentEntry::single("\\ref{bodies|int} bodies in play"));
        let mut selector = ContentSelector::new(library, SelectorConfig::default(), rng());
        selector.snapshot_mut().set("bodies", 4.2);
        let sel = selector.select("ambient", &[], Emotion::Neutral, 0.5).unwrap();
        assert_eq!(first_text(&sel), "4 bodies in play");
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(13), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(19), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(2), TimeOfDay::Night);
    }
}
