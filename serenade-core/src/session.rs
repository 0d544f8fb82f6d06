//! Per-open playback session and the view model derived from it.

use crate::fade::FadeTrail;
use crate::lyrics::{LyricSheet, LyricsOrigin};
use crate::timing::{Stopwatch, TimingMode, TimingModeKind, TimingPlan};
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle states of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Closed; no lyrics loaded
    Idle,
    /// Waiting for the content source
    Loading,
    /// Lyrics loaded, nothing played yet
    Ready,
    Playing,
    Paused,
    /// The pass ended; the last reached line stays current
    Finished,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Mutable state of one open player
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) sheet: LyricSheet,
    pub(crate) origin: LyricsOrigin,
    pub(crate) current_line: Option<usize>,
    pub(crate) trail: FadeTrail,
    /// `None` until the pass has chosen how to measure time
    pub(crate) mode: Option<TimingMode>,
    /// Plan of the previous pass, kept so replay can tell whether it changed
    pub(crate) previous_plan: Option<TimingPlan>,
    /// Runs from the play command until a mode is chosen
    pub(crate) pass_watch: Stopwatch,
    pub(crate) last_known_position: Duration,
}

impl Session {
    pub(crate) fn new(sheet: LyricSheet, origin: LyricsOrigin, fade_grace: Duration) -> Self {
        Self {
            sheet,
            origin,
            current_line: None,
            trail: FadeTrail::new(fade_grace),
            mode: None,
            previous_plan: None,
            pass_watch: Stopwatch::default(),
            last_known_position: Duration::ZERO,
        }
    }

    /// Forget the previous pass and show `first` as the current line
    pub(crate) fn restart_at(&mut self, first: usize, now: Instant) {
        self.previous_plan = self.mode.take().map(|mode| mode.plan().clone());
        self.current_line = Some(first);
        self.trail.clear();
        self.trail.advance(first, now);
        self.pass_watch.reset();
        self.pass_watch.start();
        self.last_known_position = Duration::ZERO;
    }

    /// Move forward to `line`; returns false if that would go backwards
    pub(crate) fn advance_to(&mut self, line: usize, now: Instant) -> bool {
        if self.current_line.is_some_and(|current| line <= current) {
            return false;
        }
        self.current_line = Some(line);
        self.trail.advance(line, now);
        true
    }

    /// Stop every stopwatch this session owns
    pub(crate) fn pause_timers(&mut self) {
        self.pass_watch.pause();
        if let Some(TimingMode::FixedInterval { stopwatch, .. }) = self.mode.as_mut() {
            stopwatch.pause();
        }
    }

    /// Restart every stopwatch this session owns
    pub(crate) fn resume_timers(&mut self) {
        match self.mode.as_mut() {
            Some(TimingMode::FixedInterval { stopwatch, .. }) => stopwatch.start(),
            Some(TimingMode::ClockSynced { .. }) => {}
            None => self.pass_watch.start(),
        }
    }

    pub(crate) fn view(&self, state: EngineState, now: Instant) -> ViewModel {
        let fading = self.trail.fading_line(now);
        let visible = self
            .trail
            .visible(now)
            .into_iter()
            .filter_map(|index| {
                let role = if fading == Some(index) {
                    LineRole::Fading
                } else {
                    LineRole::Current
                };
                self.sheet.line(index).map(|text| LineView {
                    index,
                    text: text.to_string(),
                    role,
                })
            })
            .collect();

        ViewModel {
            state,
            is_playing: state == EngineState::Playing,
            current_line: self.current_line,
            visible,
            mode: self.mode.as_ref().map(TimingMode::kind),
            origin: Some(self.origin),
            position: self.last_known_position,
            total_lines: self.sheet.len(),
            fade_until: self.trail.prune_deadline().filter(|&until| now < until),
        }
    }
}

/// How a visible line should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Current,
    /// Replaced recently; render with an exit animation
    Fading,
}

/// A line the view should currently render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub index: usize,
    pub text: String,
    pub role: LineRole,
}

/// Snapshot of everything a renderer needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub state: EngineState,
    pub is_playing: bool,
    pub current_line: Option<usize>,
    /// Ascending by index; at most the current line and the one fading out
    pub visible: Vec<LineView>,
    pub mode: Option<TimingModeKind>,
    pub origin: Option<LyricsOrigin>,
    /// Last elapsed playback time used for line selection
    pub position: Duration,
    pub total_lines: usize,
    /// When the fading line drops out of `visible`
    pub fade_until: Option<Instant>,
}

impl ViewModel {
    /// View of a closed or loading engine
    #[must_use]
    pub const fn empty(state: EngineState) -> Self {
        Self {
            state,
            is_playing: false,
            current_line: None,
            visible: Vec::new(),
            mode: None,
            origin: None,
            position: Duration::ZERO,
            total_lines: 0,
            fade_until: None,
        }
    }

    /// Text of the current line
    #[must_use]
    pub fn current_text(&self) -> Option<&str> {
        self.visible
            .iter()
            .find(|line| line.role == LineRole::Current)
            .map(|line| line.text.as_str())
    }
}
