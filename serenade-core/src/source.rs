//! Lyrics content sources.

use crate::error::Result;
use async_trait::async_trait;

/// Trait for anything that can deliver an ordered list of lyric lines.
///
/// Implementations should fail (rather than return an empty list) whenever
/// the payload is unusable; the loader substitutes built-in lyrics then.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch the lyric lines
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or a
    /// malformed payload.
    async fn fetch_lyrics(&self) -> Result<Vec<String>>;
}

/// Source with fixed content, useful when lyrics are bundled with the player.
pub struct StaticSource {
    lines: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_lyrics(&self) -> Result<Vec<String>> {
        Ok(self.lines.clone())
    }
}
