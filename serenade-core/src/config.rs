use crate::error::{CoreError, Result};
use crate::lyrics::DEFAULT_LYRICS;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default lyrics API base URL
pub const DEFAULT_API_BASE: &str = "http://localhost:5001";

/// Path of the lyrics endpoint below the API base
pub const DEFAULT_LYRICS_PATH: &str = "/api/love/music/lyrics";

/// Default location of the song's audio file
pub const DEFAULT_AUDIO_PATH: &str = "music/neighborhood-reflection.mp3";

/// Environment variable overriding `content.base_url`
pub const API_URL_ENV: &str = "SERENADE_API_URL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerenadeConfig {
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// API base URL; empty means lyrics come only from `[lyrics]`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_lyrics_path")]
    pub lyrics_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_lyrics_path() -> String {
    DEFAULT_LYRICS_PATH.to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_retries() -> u32 {
    2
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            lyrics_path: default_lyrics_path(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Audio file driving clock-synced timing; empty disables audio
    #[serde(default = "default_audio_path")]
    pub audio_path: String,
    /// Display time per line when no usable clock is available
    #[serde(default = "default_fallback_line_secs")]
    pub fallback_line_secs: f64,
    #[serde(default = "default_clock_poll_interval_ms")]
    pub clock_poll_interval_ms: u64,
    /// How long to wait for the clock to start and report a duration
    #[serde(default = "default_clock_wait_ms")]
    pub clock_wait_ms: u64,
    #[serde(default = "default_fade_grace_ms")]
    pub fade_grace_ms: u64,
    /// Start playing as soon as lyrics are loaded
    #[serde(default)]
    pub autoplay: bool,
}

fn default_audio_path() -> String {
    DEFAULT_AUDIO_PATH.to_string()
}

const fn default_fallback_line_secs() -> f64 {
    3.5
}

const fn default_clock_poll_interval_ms() -> u64 {
    100
}

const fn default_clock_wait_ms() -> u64 {
    1500
}

const fn default_fade_grace_ms() -> u64 {
    600
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_path: default_audio_path(),
            fallback_line_secs: default_fallback_line_secs(),
            clock_poll_interval_ms: default_clock_poll_interval_ms(),
            clock_wait_ms: default_clock_wait_ms(),
            fade_grace_ms: default_fade_grace_ms(),
            autoplay: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Lines shown when the content source fails
    #[serde(default = "default_fallback_lyrics")]
    pub fallback: Vec<String>,
}

fn default_fallback_lyrics() -> Vec<String> {
    DEFAULT_LYRICS.iter().map(ToString::to_string).collect()
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_lyrics(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `~/.config/serenade/serenade.log`
    #[serde(default)]
    pub enabled: bool,
}

impl SerenadeConfig {
    /// Get the config file path (~/.config/serenade/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create the template on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `config_path` or create the template there
    ///
    /// # Errors
    ///
    /// See [`SerenadeConfig::load_or_create`].
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error on TOML syntax errors or invalid values.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the engine relies on
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        let line_secs = self.player.fallback_line_secs;
        if !line_secs.is_finite() || line_secs <= 0.0 {
            return Err(CoreError::ConfigInvalid {
                message: format!("player.fallback_line_secs must be positive, got {line_secs}"),
            });
        }
        if self.player.clock_poll_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "player.clock_poll_interval_ms must be greater than 0".into(),
            });
        }
        if !self.content.base_url.is_empty() && url::Url::parse(&self.content.base_url).is_err()
        {
            return Err(CoreError::ConfigInvalid {
                message: format!("content.base_url is not a valid URL: {}", self.content.base_url),
            });
        }
        Ok(())
    }

    /// Apply the `SERENADE_API_URL` override, if set and non-empty
    pub fn apply_env_overrides(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.content.base_url = url.trim().to_string();
        }
    }
}

const CONFIG_TEMPLATE: &str = concatcp!(
    r#"# Serenade Configuration
# ~/.config/serenade/config.toml

[content]
# Lyrics API base URL (override with SERENADE_API_URL). Empty = offline.
base_url = ""#,
    DEFAULT_API_BASE,
    r#""
lyrics_path = ""#,
    DEFAULT_LYRICS_PATH,
    r#""
timeout_secs = 10
max_retries = 2

[player]
# Audio file used to sync lyrics. Empty or missing = fixed-interval timing.
audio_path = ""#,
    DEFAULT_AUDIO_PATH,
    r#""
fallback_line_secs = 3.5
clock_poll_interval_ms = 100
clock_wait_ms = 1500
fade_grace_ms = 600
autoplay = false

[lyrics]
# Lines shown when the lyrics API is unreachable. Remove to use the built-in list.
# fallback = ["first line", "", "second line"]

[logging]
# Also write logs to ~/.config/serenade/serenade.log
enabled = false
"#
);
