//! TOML Configuration File Support
//!
//! Centralized configuration loading for the narrator, from a TOML file at
//! `~/.config/narrator/narrator.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`NARRATOR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file lives at `$XDG_CONFIG_HOME/narrator/narrator.toml`
//! (typically `~/.config/narrator/narrator.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! seed = 42
//!
//! [content]
//! dir = "/usr/share/narrator/content"
//!
//! [emotion]
//! min_transition_interval_ms = 15000
//!
//! [emotion.personality]
//! curiosity = 0.8
//!
//! [rate_limit]
//! budget_max = 3
//! global_lock_ms = 8000
//!
//! [selector]
//! recency_size = 8
//!
//! [timing]
//! first_cycle_delay_ms = 2000
//!
//! [timing.pacing]
//! min_delay_ms = 3000
//!
//! [timing.cadence]
//! char_delay_ms = 42
//!
//! [sequence]
//! deferred_ttl_ms = 5000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::animation::CadenceConfig;
use crate::content::SelectorConfig;
use crate::emotion::EmotionConfig;
use crate::rate_limit::ResponseLimitConfig;
use crate::router::DelayPolicy;
use crate::sequence::SequenceConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[content]` section
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory of content JSON files
    pub dir: Option<PathBuf>,
}

/// `[timing]` section
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay from page load to the first ambient cycle (milliseconds)
    pub first_cycle_delay_ms: u64,

    /// Interval of the emotion decay/drift tick (milliseconds)
    pub emotion_tick_ms: u64,

    /// Ambient pacing
    pub pacing: DelayPolicy,

    /// Typing cadence
    pub cadence: CadenceConfig,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            first_cycle_delay_ms: 2_000,
            emotion_tick_ms: 1_000,
            pacing: DelayPolicy::default(),
            cadence: CadenceConfig::default(),
        }
    }
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorToml {
    /// RNG seed for reproducible sessions
    pub seed: Option<u64>,

    /// Content section
    pub content: ContentConfig,

    /// Emotion engine section
    pub emotion: EmotionConfig,

    /// Admission control section
    pub rate_limit: ResponseLimitConfig,

    /// Content selector section
    pub selector: SelectorConfig,

    /// Timing section
    pub timing: TimingConfig,

    /// Sequence coordinator section
    pub sequence: SequenceConfig,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the narrator
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct NarratorConfig {
    /// RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,

    /// Content settings
    pub content: ContentConfig,

    /// Emotion engine
    pub emotion: EmotionConfig,

    /// Admission control
    pub rate_limit: ResponseLimitConfig,

    /// Content selector
    pub selector: SelectorConfig,

    /// Timing
    pub timing: TimingConfig,

    /// Sequence coordinator
    pub sequence: SequenceConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self::from_toml(NarratorToml::default())
    }
}

impl NarratorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_toml(toml: NarratorToml) -> Self {
        Self {
            seed: toml.seed,
            content: toml.content,
            emotion: toml.emotion,
            rate_limit: toml.rate_limit,
            selector: toml.selector,
            timing: toml.timing,
            sequence: toml.sequence,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the emotion configuration
    #[must_use]
    pub fn with_emotion(mut self, emotion: EmotionConfig) -> Self {
        self.emotion = emotion;
        self
    }

    /// Set the admission control configuration
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: ResponseLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the selector configuration
    #[must_use]
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    /// Set the timing configuration
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Reject values that would break invariants
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floor = self.emotion.intensity_floor;
        if !(0.0..1.0).contains(&floor) {
            return Err(ConfigError::ValidationError(format!(
                "emotion.intensity_floor must be in [0, 1), got {floor}"
            )));
        }
        if !(0.0..=1.0).contains(&self.emotion.random_jump_chance) {
            return Err(ConfigError::ValidationError(
                "emotion.random_jump_chance must be in [0, 1]".to_string(),
            ));
        }
        if self.timing.pacing.min_delay_ms > self.timing.pacing.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "timing.pacing.min_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        if self.rate_limit.budget_refill_ms == 0 && self.rate_limit.enabled {
            return Err(ConfigError::ValidationError(
                "rate_limit.budget_refill_ms must be positive".to_string(),
            ));
        }
        if self.timing.emotion_tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timing.emotion_tick_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/narrator/narrator.toml` or
/// `~/.config/narrator/narrator.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("narrator").join("narrator.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<NarratorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the merged result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<NarratorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<NarratorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = NarratorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: NarratorToml = toml::from_str(&toml_content)?;
            config = NarratorConfig::from_toml(toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false") && !value.eq_ignore_ascii_case("off")
}

/// Apply `NARRATOR_*` environment variables
fn apply_env_config<F>(config: &mut NarratorConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = env("NARRATOR_CONTENT_DIR") {
        config.content.dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(seed) = env("NARRATOR_SEED") {
        if let Ok(seed) = seed.parse::<u64>() {
            config.seed = Some(seed);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(enabled) = env("NARRATOR_RATE_LIMIT") {
        config.rate_limit.enabled = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = env("NARRATOR_BUDGET_MAX") {
        if let Ok(max) = max.parse::<u32>() {
            config.rate_limit.budget_max = max;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(ms) = env("NARRATOR_GLOBAL_LOCK_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            config.rate_limit.global_lock_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(size) = env("NARRATOR_RECENCY_SIZE") {
        if let Ok(size) = size.parse::<usize>() {
            config.selector.recency_size = size;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(ms) = env("NARRATOR_FIRST_CYCLE_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            config.timing.first_cycle_delay_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(welcome) = env("NARRATOR_WELCOME") {
        config.selector.welcome_enabled = parse_flag(&welcome);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Content directory override
    pub content_dir: Option<PathBuf>,

    /// Seed override
    pub seed: Option<u64>,

    /// Rate limiting enabled override
    pub rate_limit_enabled: Option<bool>,

    /// Welcome line override
    pub welcome_enabled: Option<bool>,

    /// First ambient cycle delay override (milliseconds)
    pub first_cycle_delay_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content directory override
    #[must_use]
    pub fn with_content_dir(mut self, dir: PathBuf) -> Self {
        self.content_dir = Some(dir);
        self
    }

    /// Set seed override
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set rate limiting override
    #[must_use]
    pub fn with_rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = Some(enabled);
        self
    }

    /// Set welcome override
    #[must_use]
    pub fn with_welcome_enabled(mut self, enabled: bool) -> Self {
        self.welcome_enabled = Some(enabled);
        self
    }

    /// Set first cycle delay override
    #[must_use]
    pub fn with_first_cycle_delay_ms(mut self, ms: u64) -> Self {
        self.first_cycle_delay_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut NarratorConfig) {
        if self.content_dir.is_some()
            || self.seed.is_some()
            || self.rate_limit_enabled.is_some()
            || self.welcome_enabled.is_some()
            || self.first_cycle_delay_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref dir) = self.content_dir {
            config.content.dir = Some(dir.clone());
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(enabled) = self.rate_limit_enabled {
            config.rate_limit.enabled = enabled;
        }
        if let Some(enabled) = self.welcome_enabled {
            config.selector.welcome_enabled = enabled;
        }
        if let Some(ms) = self.first_cycle_delay_ms {
            config.timing.first_cycle_delay_ms = ms;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = NarratorConfig::default();
        assert_eq!(config.seed, None);
        assert_eq!(config.rate_limit.budget_max, 3);
        assert_eq!(config.selector.recency_size, 8);
        assert_eq!(config.timing.first_cycle_delay_ms, 2_000);
        assert_eq!(config.sequence.flush_grace_ms, 200);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("narrator"));
            assert!(p.to_string_lossy().ends_with("narrator.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
seed = 7

[content]
dir = "/tmp/content"

[emotion]
min_transition_interval_ms = 20000

[emotion.personality]
curiosity = 0.9

[rate_limit]
budget_max = 5

[rate_limit.cooldowns]
state_reset_ms = 1000

[timing.pacing]
max_delay_ms = 20000
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.content.dir, Some(PathBuf::from("/tmp/content")));
        assert_eq!(config.emotion.min_transition_interval_ms, 20_000);
        assert!((config.emotion.personality.curiosity - 0.9).abs() < 1e-9);
        // Unset fields keep their defaults
        assert!((config.emotion.personality.patience - 0.5).abs() < 1e-9);
        assert_eq!(config.rate_limit.budget_max, 5);
        assert_eq!(config.rate_limit.cooldowns.state_reset_ms, 1_000);
        assert_eq!(config.rate_limit.cooldowns.slider_exploration_ms, 25_000);
        assert_eq!(config.timing.pacing.max_delay_ms, 20_000);
        assert_eq!(config.timing.pacing.min_delay_ms, 3_000);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let file = write_toml("[rate_limit\nbudget_max = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_rejects_bad_band() {
        let file = write_toml("[timing.pacing]\nmin_delay_ms = 9000\nmax_delay_ms = 1000\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = PathBuf::from("/nonexistent/narrator/narrator.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert_eq!(config.config_file_path, None);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("seed = 1\n[rate_limit]\nbudget_max = 5\n");
        let env = env_from(&[
            ("NARRATOR_SEED", "99"),
            ("NARRATOR_RATE_LIMIT", "off"),
            ("NARRATOR_RECENCY_SIZE", "not-a-number"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();
        assert_eq!(config.seed, Some(99));
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.budget_max, 5);
        assert_eq!(config.selector.recency_size, 8);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_everything() {
        let env = env_from(&[("NARRATOR_CONTENT_DIR", "/from/env")]);
        let mut config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.content.dir, Some(PathBuf::from("/from/env")));

        ConfigOverrides::new()
            .with_content_dir(PathBuf::from("/from/cli"))
            .with_welcome_enabled(false)
            .apply(&mut config);
        assert_eq!(config.content.dir, Some(PathBuf::from("/from/cli")));
        assert!(!config.selector.welcome_enabled);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = NarratorConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
