use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it if needed and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Content errors
    #[error("Lyrics unavailable from {source_name}: {reason}")]
    ContentUnavailable { source_name: String, reason: String },

    // Clock errors
    #[error("Playback clock unavailable: {reason}")]
    ClockUnavailable { reason: String },

    #[error("Playback rejected: {reason}")]
    PlaybackRejected { reason: String },

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Kind of non-blocking notice this error degrades into, if any.
    #[must_use]
    pub const fn notice_kind(&self) -> Option<NoticeKind> {
        match self {
            Self::ContentUnavailable { .. }
            | Self::NetworkError(_)
            | Self::MiddlewareError(_) => Some(NoticeKind::ContentUnavailable),
            Self::ClockUnavailable { .. } => Some(NoticeKind::ClockUnavailable),
            Self::PlaybackRejected { .. } => Some(NoticeKind::PlaybackRejected),
            Self::ConfigNotFound { .. }
            | Self::ConfigInvalid { .. }
            | Self::ConfigParseError(_)
            | Self::IoError(_) => None,
        }
    }
}

/// Recoverable failure categories surfaced to the view as status notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Lyrics fetch failed; built-in lyrics are shown instead.
    ContentUnavailable,
    /// Audio missing or never reported a duration; fixed-interval timing is used.
    ClockUnavailable,
    /// The clock refused to start; lyrics keep advancing without audio.
    PlaybackRejected,
}

pub type Result<T> = std::result::Result<T, CoreError>;
