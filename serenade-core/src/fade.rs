use std::time::Duration;
use tokio::time::Instant;

/// Default time a replaced line stays visible so its exit animation can finish
pub const DEFAULT_FADE_GRACE: Duration = Duration::from_millis(600);

/// The current line plus the line that was just replaced.
///
/// The replaced line is kept for a grace period and then pruned, so the
/// trail never holds more than two lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FadeTrail {
    grace: Duration,
    current: Option<usize>,
    fading: Option<(usize, Instant)>,
}

impl FadeTrail {
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self {
            grace,
            current: None,
            fading: None,
        }
    }

    /// Make `line` current; the previous current line starts fading.
    pub fn advance(&mut self, line: usize, now: Instant) {
        if self.current == Some(line) {
            return;
        }
        self.fading = self.current.map(|previous| (previous, now + self.grace));
        self.current = Some(line);
    }

    /// Drop the fading line once its grace period has passed.
    pub fn prune(&mut self, now: Instant) {
        if self.fading.is_some_and(|(_, until)| now >= until) {
            self.fading = None;
        }
    }

    /// When the fading line is due to be pruned
    #[must_use]
    pub fn prune_deadline(&self) -> Option<Instant> {
        self.fading.map(|(_, until)| until)
    }

    /// Visible line indices at `now`, ascending
    #[must_use]
    pub fn visible(&self, now: Instant) -> Vec<usize> {
        let fading = self
            .fading
            .filter(|&(_, until)| now < until)
            .map(|(line, _)| line);
        let mut lines: Vec<usize> = fading.into_iter().chain(self.current).collect();
        lines.sort_unstable();
        lines
    }

    /// The line that is fading out, if still inside its grace period
    #[must_use]
    pub fn fading_line(&self, now: Instant) -> Option<usize> {
        self.fading
            .filter(|&(_, until)| now < until)
            .map(|(line, _)| line)
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.fading = None;
    }
}

impl Default for FadeTrail {
    fn default() -> Self {
        Self::new(DEFAULT_FADE_GRACE)
    }
}
