pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fade;
pub mod fetcher;
pub mod lyrics;
pub mod paths;
pub mod session;
pub mod source;
pub mod time;
pub mod timing;

pub use clock::{ClockEvent, ClockProvider, NoClock, PlaybackClock};
pub use config::{
    ContentConfig, LoggingConfig, LyricsConfig, PlayerConfig, SerenadeConfig, API_URL_ENV,
};
pub use engine::{EngineConfig, LyricsSyncEngine, SyncEvent};
pub use error::{CoreError, NoticeKind, Result};
pub use fade::FadeTrail;
pub use fetcher::{LoadedLyrics, LyricsLoader};
pub use lyrics::{LyricSheet, LyricsOrigin, DEFAULT_LYRICS};
pub use paths::{config_dir, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME};
pub use session::{EngineState, LineRole, LineView, ViewModel};
pub use source::{ContentSource, StaticSource};
pub use time::DurationExt;
pub use timing::{compute_current_line, Stopwatch, TimingMode, TimingModeKind, TimingPlan};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
