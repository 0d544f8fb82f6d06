//! Timing plans: mapping elapsed playback time to lyric lines.
//!
//! Both timing modes share the same representation. Clock-synced timing
//! spreads the clock's duration evenly over the displayable lines, fixed
//! interval timing gives every displayable line the same fixed slot and
//! measures elapsed time with a [`Stopwatch`] instead of a clock.

use crate::lyrics::LyricSheet;
use std::time::Duration;
use tokio::time::Instant;

/// Start offsets of every displayable line within one playback pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPlan {
    /// `(line index, start offset)`, ascending in both
    entries: Vec<(usize, Duration)>,
    slot: Duration,
    total: Duration,
}

impl TimingPlan {
    /// Build a plan that spreads `duration` over the sheet's displayable lines.
    ///
    /// Returns `None` when the duration is zero or there is nothing to show.
    /// The plan's total never exceeds `duration`.
    #[must_use]
    pub fn from_clock_duration(sheet: &LyricSheet, duration: Duration) -> Option<Self> {
        let count = u32::try_from(sheet.displayable_count()).ok()?;
        if count == 0 || duration.is_zero() {
            return None;
        }
        Some(Self::uniform(sheet, duration / count))
    }

    /// Build a plan that gives each displayable line `per_line` of display time.
    #[must_use]
    pub fn fixed_interval(sheet: &LyricSheet, per_line: Duration) -> Self {
        Self::uniform(sheet, per_line)
    }

    fn uniform(sheet: &LyricSheet, slot: Duration) -> Self {
        let mut entries = Vec::new();
        let mut offset = Duration::ZERO;
        for index in sheet.displayable_indices() {
            entries.push((index, offset));
            offset = offset.saturating_add(slot);
        }
        Self {
            entries,
            slot,
            total: offset,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of timed lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Display time of a single line
    #[must_use]
    pub const fn slot(&self) -> Duration {
        self.slot
    }

    /// End of the last line's display window
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Start offset of a line, if it has a slot in this plan
    #[must_use]
    pub fn offset_of(&self, line: usize) -> Option<Duration> {
        self.entries
            .iter()
            .find(|&&(index, _)| index == line)
            .map(|&(_, offset)| offset)
    }

    /// Current line at `elapsed`; see [`compute_current_line`].
    #[must_use]
    pub fn line_at(&self, elapsed: Duration) -> Option<usize> {
        compute_current_line(elapsed, self)
    }

    /// The next point after `elapsed` at which the displayed line changes or
    /// the pass ends. `None` once the pass is complete.
    #[must_use]
    pub fn next_boundary_after(&self, elapsed: Duration) -> Option<Duration> {
        self.entries
            .iter()
            .map(|&(_, offset)| offset)
            .find(|&offset| offset > elapsed)
            .or_else(|| (elapsed < self.total).then_some(self.total))
    }

    /// Whether the last line's display window has elapsed
    #[must_use]
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        !self.is_empty() && elapsed >= self.total
    }
}

/// Find the line that is current at `elapsed`.
///
/// Picks the greatest line whose start offset is at or before `elapsed`.
/// Before the first offset the first timed line is returned, past the last
/// offset the last one. Only an empty plan yields `None`. For non-decreasing
/// `elapsed` the result never decreases.
#[must_use]
pub fn compute_current_line(elapsed: Duration, plan: &TimingPlan) -> Option<usize> {
    let started = plan
        .entries
        .partition_point(|&(_, offset)| offset <= elapsed);
    let position = started.saturating_sub(1);
    plan.entries.get(position).map(|&(index, _)| index)
}

/// Wall-clock stopwatch that only accumulates time while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    /// A stopped stopwatch that already reads `elapsed`
    #[must_use]
    pub const fn starting_at(elapsed: Duration) -> Self {
        Self {
            accumulated: elapsed,
            running_since: None,
        }
    }

    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated = self.accumulated.saturating_add(since.elapsed());
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated.saturating_add(since.elapsed()),
            None => self.accumulated,
        }
    }
}

/// Observable kind of a [`TimingMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingModeKind {
    ClockSynced,
    FixedInterval,
}

impl std::fmt::Display for TimingModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClockSynced => f.write_str("clock-synced"),
            Self::FixedInterval => f.write_str("fixed-interval"),
        }
    }
}

/// How elapsed time is measured for the current pass.
#[derive(Debug, Clone)]
pub enum TimingMode {
    /// Elapsed time is the playback clock's position
    ClockSynced { plan: TimingPlan },
    /// Elapsed time is measured by a wall-clock stopwatch
    FixedInterval { plan: TimingPlan, stopwatch: Stopwatch },
}

impl TimingMode {
    /// Fixed interval timing whose stopwatch already covers everything
    /// before `resume_line`, so the pass continues from that line.
    #[must_use]
    pub fn fixed_from(sheet: &LyricSheet, per_line: Duration, resume_line: Option<usize>) -> Self {
        let plan = TimingPlan::fixed_interval(sheet, per_line);
        let elapsed = resume_line
            .and_then(|line| plan.offset_of(line))
            .unwrap_or(Duration::ZERO);
        Self::FixedInterval {
            plan,
            stopwatch: Stopwatch::starting_at(elapsed),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> TimingModeKind {
        match self {
            Self::ClockSynced { .. } => TimingModeKind::ClockSynced,
            Self::FixedInterval { .. } => TimingModeKind::FixedInterval,
        }
    }

    #[must_use]
    pub const fn plan(&self) -> &TimingPlan {
        match self {
            Self::ClockSynced { plan } | Self::FixedInterval { plan, .. } => plan,
        }
    }
}
