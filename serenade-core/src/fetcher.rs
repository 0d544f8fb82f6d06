//! Lyrics loader that falls back to built-in lines when the source fails.

use crate::error::CoreError;
use crate::lyrics::{LyricSheet, LyricsOrigin};
use crate::source::ContentSource;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a load; never an error, only a possibly degraded sheet.
#[derive(Debug, Clone)]
pub struct LoadedLyrics {
    pub sheet: LyricSheet,
    pub origin: LyricsOrigin,
    /// Why the fallback was used, for a status note
    pub failure: Option<String>,
}

/// Fetches lyrics from a content source, substituting defaults on failure
pub struct LyricsLoader {
    source: Arc<dyn ContentSource>,
    fallback: LyricSheet,
}

impl LyricsLoader {
    /// Create a new loader
    ///
    /// # Arguments
    /// * `source` - Where lyrics are normally fetched from
    /// * `fallback` - Lines used when the source fails or returns nothing usable
    pub fn new(source: Arc<dyn ContentSource>, fallback: LyricSheet) -> Self {
        Self { source, fallback }
    }

    /// Name of the underlying source
    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Fetch lyrics, never failing
    pub async fn load(&self) -> LoadedLyrics {
        info!("Fetching lyrics from {}", self.source.name());

        let error = match self.source.fetch_lyrics().await {
            Ok(lines) => {
                let sheet = LyricSheet::new(lines);
                if sheet.has_displayable() {
                    info!(
                        "Loaded {} lyric lines ({} displayable) from {}",
                        sheet.len(),
                        sheet.displayable_count(),
                        self.source.name()
                    );
                    return LoadedLyrics {
                        sheet,
                        origin: LyricsOrigin::Remote,
                        failure: None,
                    };
                }
                CoreError::ContentUnavailable {
                    source_name: self.source.name().to_string(),
                    reason: "no displayable lines".into(),
                }
            }
            Err(e) => e,
        };

        warn!("Using fallback lyrics: {}", error);
        LoadedLyrics {
            sheet: self.fallback.clone(),
            origin: LyricsOrigin::Fallback,
            failure: Some(error.to_string()),
        }
    }
}
