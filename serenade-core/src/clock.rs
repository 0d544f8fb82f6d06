//! Playback clock abstraction.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Notifications emitted by a playback clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    /// Enough media is available to start playback
    CanPlay,
    /// The playback position moved
    PositionChanged { position: Duration },
    /// Playback reached the end of the media
    Ended,
    /// The media could not be loaded or played
    Error { message: String },
}

/// An audio-like timing source the sync engine follows.
///
/// Implementations may never become ready, never learn their duration, or
/// refuse to play. The engine treats all of these as recoverable.
#[async_trait]
pub trait PlaybackClock: Send + Sync {
    /// Begin loading the media. Failures are reported through [`ClockEvent::Error`].
    async fn load(&self);

    /// Start or resume playback.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PlaybackRejected`](crate::CoreError::PlaybackRejected)
    /// when playback is refused.
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Move the position back to the start of the media.
    fn rewind(&self);

    /// Current playback position
    fn position(&self) -> Duration;

    /// Total media duration, `None` while unknown
    fn duration(&self) -> Option<Duration>;

    /// Subscribe to clock notifications
    fn subscribe(&self) -> broadcast::Receiver<ClockEvent>;
}

/// Acquires a playback clock the first time playback is requested.
pub trait ClockProvider: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Create the clock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClockUnavailable`](crate::CoreError::ClockUnavailable)
    /// when no clock can be created.
    fn acquire(&self) -> Result<Arc<dyn PlaybackClock>>;
}

/// Provider for sessions that never have audio.
pub struct NoClock;

impl ClockProvider for NoClock {
    fn name(&self) -> &'static str {
        "none"
    }

    fn acquire(&self) -> Result<Arc<dyn PlaybackClock>> {
        Err(crate::CoreError::ClockUnavailable {
            reason: "no audio configured".into(),
        })
    }
}
