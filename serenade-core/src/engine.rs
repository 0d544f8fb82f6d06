//! Lyrics sync engine: the play/pause state machine and its driver task.
//!
//! The engine owns at most one driver task at a time. Every change the
//! driver makes happens under the engine lock after checking the driver's
//! cancellation token, and `pause`/`close` cancel that token under the same
//! lock, so no line can advance once they return.

use crate::clock::{ClockEvent, ClockProvider, PlaybackClock};
use crate::config::SerenadeConfig;
use crate::error::NoticeKind;
use crate::fade::DEFAULT_FADE_GRACE;
use crate::fetcher::LyricsLoader;
use crate::lyrics::{LyricSheet, LyricsOrigin};
use crate::session::{EngineState, Session, ViewModel};
use crate::source::ContentSource;
use crate::time::{duration_from_secs_f64, DurationExt};
use crate::timing::{TimingMode, TimingModeKind, TimingPlan};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default display time per line in fixed-interval mode
pub const DEFAULT_LINE_DURATION: Duration = Duration::from_millis(3500);

/// Default cadence for polling the clock position
pub const DEFAULT_CLOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time allowed for the clock to start and report a duration
pub const DEFAULT_CLOCK_WAIT: Duration = Duration::from_millis(1500);

/// Tunables and fallback content of the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Display time per line when no usable clock exists (3.5 s)
    pub fallback_line_duration: Duration,
    /// How often the clock position is sampled (100 ms)
    pub clock_poll_interval: Duration,
    /// Upper bound for clock start-up and duration discovery (1.5 s)
    pub clock_wait: Duration,
    /// How long a replaced line stays visible (600 ms)
    pub fade_grace: Duration,
    /// Lines used when the content source fails (built-in song)
    pub default_lyrics: LyricSheet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_line_duration: DEFAULT_LINE_DURATION,
            clock_poll_interval: DEFAULT_CLOCK_POLL_INTERVAL,
            clock_wait: DEFAULT_CLOCK_WAIT,
            fade_grace: DEFAULT_FADE_GRACE,
            default_lyrics: LyricSheet::builtin(),
        }
    }
}

impl From<&SerenadeConfig> for EngineConfig {
    fn from(config: &SerenadeConfig) -> Self {
        let player = &config.player;
        Self {
            fallback_line_duration: duration_from_secs_f64(player.fallback_line_secs)
                .filter(DurationExt::is_usable)
                .unwrap_or(DEFAULT_LINE_DURATION),
            clock_poll_interval: Duration::from_millis(player.clock_poll_interval_ms.max(1)),
            clock_wait: Duration::from_millis(player.clock_wait_ms),
            fade_grace: Duration::from_millis(player.fade_grace_ms),
            default_lyrics: LyricSheet::new(config.lyrics.fallback.iter().cloned()),
        }
    }
}

/// Events emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The engine moved to a new lifecycle state
    StateChanged { state: EngineState },
    /// Lyrics are ready to play
    LyricsLoaded { lines: usize, origin: LyricsOrigin },
    /// The current pass chose how to measure time
    ModeSelected { mode: TimingModeKind },
    /// A new line became current
    LineChanged { index: usize, text: String },
    /// Something degraded; playback continues
    Notice { kind: NoticeKind, message: String },
}

struct DriverHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl DriverHandle {
    fn stop(self) {
        self.token.cancel();
        self.task.abort();
    }
}

struct EngineInner {
    state: EngineState,
    session: Option<Session>,
    clock: Option<Arc<dyn PlaybackClock>>,
    clock_acquire_failed: bool,
    /// Set once `load()` on the held clock has run to completion
    clock_loaded: bool,
    driver: Option<DriverHandle>,
    /// Bumped on close so an in-flight load can tell it is stale
    epoch: u64,
}

struct Shared {
    inner: Mutex<EngineInner>,
    config: EngineConfig,
    event_tx: broadcast::Sender<SyncEvent>,
}

/// Engine that keeps the displayed lyric line in step with playback
pub struct LyricsSyncEngine {
    shared: Arc<Shared>,
    loader: LyricsLoader,
    clock_provider: Arc<dyn ClockProvider>,
    shutdown: CancellationToken,
}

impl LyricsSyncEngine {
    /// Create a new sync engine
    ///
    /// # Arguments
    /// * `source` - Where lyrics are fetched from on every open
    /// * `clock_provider` - Acquires the playback clock on first play
    /// * `config` - Timing tunables and fallback lyrics
    pub fn new(
        source: Arc<dyn ContentSource>,
        clock_provider: Arc<dyn ClockProvider>,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let loader = LyricsLoader::new(source, config.default_lyrics.clone());

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(EngineInner {
                    state: EngineState::Idle,
                    session: None,
                    clock: None,
                    clock_acquire_failed: false,
                    clock_loaded: false,
                    driver: None,
                    epoch: 0,
                }),
                config,
                event_tx,
            }),
            loader,
            clock_provider,
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Open the player: fetch lyrics and become ready to play.
    ///
    /// An already open session is closed first. Fetch failures fall back to
    /// the default lyrics.
    pub async fn open(&self) {
        let epoch = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state != EngineState::Idle {
                self.shared.close_locked(&mut inner);
            }
            self.shared.set_state(&mut inner, EngineState::Loading);
            info!("Opening player, lyrics from {}", self.loader.source_name());
            inner.epoch
        };

        let loaded = self.loader.load().await;

        let mut inner = self.shared.inner.lock().await;
        if inner.epoch != epoch || inner.state != EngineState::Loading {
            debug!("Discarding lyrics load for a closed session");
            return;
        }

        if let Some(reason) = loaded.failure {
            self.shared.emit(SyncEvent::Notice {
                kind: NoticeKind::ContentUnavailable,
                message: reason,
            });
        }
        self.shared.emit(SyncEvent::LyricsLoaded {
            lines: loaded.sheet.len(),
            origin: loaded.origin,
        });
        inner.session = Some(Session::new(
            loaded.sheet,
            loaded.origin,
            self.shared.config.fade_grace,
        ));
        self.shared.set_state(&mut inner, EngineState::Ready);
    }

    /// Start, resume or replay playback
    pub async fn play(&self) {
        let mut inner = self.shared.inner.lock().await;
        let state = inner.state;
        match state {
            EngineState::Idle | EngineState::Loading => {
                debug!("Play ignored while {}", state);
            }
            EngineState::Playing => {}
            EngineState::Ready | EngineState::Finished => self.start_pass(&mut inner),
            EngineState::Paused => self.resume(&mut inner),
        }
    }

    /// Pause playback, keeping the current line
    pub async fn pause(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != EngineState::Playing {
            return;
        }

        stop_driver(&mut inner);
        if let Some(session) = inner.session.as_mut() {
            session.pause_timers();
        }
        if let Some(clock) = &inner.clock {
            clock.pause();
        }
        info!("Playback paused");
        self.shared.set_state(&mut inner, EngineState::Paused);
    }

    /// Pause when playing, otherwise play
    pub async fn toggle(&self) {
        let playing = self.shared.inner.lock().await.state == EngineState::Playing;
        if playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Close the player, releasing the clock and every timer
    pub async fn close(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.shared.close_locked(&mut inner);
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EngineState {
        self.shared.inner.lock().await.state
    }

    /// Index of the current line, `None` when no line is shown
    pub async fn current_line(&self) -> Option<usize> {
        self.shared
            .inner
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|s| s.current_line)
    }

    /// Timing mode of the current pass, once chosen
    pub async fn timing_mode(&self) -> Option<TimingModeKind> {
        self.shared
            .inner
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|s| s.mode.as_ref().map(TimingMode::kind))
    }

    /// Timing plan of the current pass, once chosen
    pub async fn timing_plan(&self) -> Option<TimingPlan> {
        self.shared
            .inner
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|s| s.mode.as_ref().map(|m| m.plan().clone()))
    }

    /// Lyric sheet of the open session
    pub async fn lyrics(&self) -> Option<LyricSheet> {
        self.shared
            .inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.sheet.clone())
    }

    /// Snapshot for rendering
    pub async fn view(&self) -> ViewModel {
        let inner = self.shared.inner.lock().await;
        inner.session.as_ref().map_or_else(
            || ViewModel::empty(inner.state),
            |session| session.view(inner.state, Instant::now()),
        )
    }

    /// Begin a new pass from the first displayable line
    fn start_pass(&self, inner: &mut EngineInner) {
        let Some(first) = inner.session.as_ref().and_then(|s| s.sheet.first_displayable()) else {
            warn!("No displayable lyrics, nothing to play");
            self.shared.set_state(inner, EngineState::Finished);
            return;
        };

        let replay = inner.state == EngineState::Finished;
        self.ensure_clock(inner);
        if replay {
            if let Some(clock) = &inner.clock {
                clock.rewind();
            }
        }

        let now = Instant::now();
        if let Some(session) = inner.session.as_mut() {
            session.restart_at(first, now);
            self.shared.emit(SyncEvent::LineChanged {
                index: first,
                text: session.sheet.line(first).unwrap_or_default().to_string(),
            });
        }

        info!(
            "Starting {} from line {}",
            if replay { "replay" } else { "playback" },
            first
        );
        self.shared.set_state(inner, EngineState::Playing);
        self.spawn_driver(inner);
    }

    /// Continue a paused pass
    fn resume(&self, inner: &mut EngineInner) {
        if let Some(session) = inner.session.as_mut() {
            session.resume_timers();
        }
        info!("Playback resumed");
        self.shared.set_state(inner, EngineState::Playing);
        self.spawn_driver(inner);
    }

    /// Acquire a clock if none is held yet
    fn ensure_clock(&self, inner: &mut EngineInner) {
        if inner.clock.is_some() || inner.clock_acquire_failed {
            return;
        }
        match self.clock_provider.acquire() {
            Ok(clock) => {
                info!("Acquired playback clock from {}", self.clock_provider.name());
                inner.clock = Some(clock);
                inner.clock_loaded = false;
            }
            Err(e) => {
                warn!("Playback clock unavailable, playing lyrics only: {}", e);
                inner.clock_acquire_failed = true;
                self.shared.emit(SyncEvent::Notice {
                    kind: NoticeKind::ClockUnavailable,
                    message: e.to_string(),
                });
            }
        }
    }

    fn spawn_driver(&self, inner: &mut EngineInner) {
        stop_driver(inner);

        // A load cut short by pause or close runs again on the next start
        let load_clock = inner.clock.is_some() && !inner.clock_loaded;
        let token = self.shutdown.child_token();
        let driver = Driver {
            shared: Arc::clone(&self.shared),
            token: token.clone(),
            clock: inner.clock.clone(),
            load_clock,
        };
        let task = tokio::spawn(driver.run());
        inner.driver = Some(DriverHandle { token, task });
    }
}

impl Drop for LyricsSyncEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn stop_driver(inner: &mut EngineInner) {
    if let Some(driver) = inner.driver.take() {
        driver.stop();
    }
}

impl Shared {
    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, inner: &mut EngineInner, state: EngineState) {
        if inner.state != state {
            inner.state = state;
            self.emit(SyncEvent::StateChanged { state });
        }
    }

    fn notice(&self, kind: NoticeKind, message: String) {
        self.emit(SyncEvent::Notice { kind, message });
    }

    fn close_locked(&self, inner: &mut EngineInner) {
        stop_driver(inner);
        if let Some(clock) = inner.clock.take() {
            clock.pause();
            clock.rewind();
        }
        inner.clock_acquire_failed = false;
        inner.clock_loaded = false;
        inner.session = None;
        inner.epoch = inner.epoch.wrapping_add(1);
        if inner.state != EngineState::Idle {
            info!("Player closed");
        }
        self.set_state(inner, EngineState::Idle);
    }

    /// End the pass, holding the last reached line. Called from the driver.
    fn finish_locked(&self, inner: &mut EngineInner) {
        if let Some(driver) = inner.driver.take() {
            driver.token.cancel();
        }
        if let Some(session) = inner.session.as_mut() {
            session.pause_timers();
        }
        if let Some(clock) = &inner.clock {
            clock.pause();
        }
        info!("Lyrics finished");
        self.set_state(inner, EngineState::Finished);
    }

    /// Switch the pass to fixed-interval timing from the current line
    fn degrade_locked(&self, inner: &mut EngineInner, kind: NoticeKind, reason: String) {
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        let mut mode = TimingMode::fixed_from(
            &session.sheet,
            self.config.fallback_line_duration,
            session.current_line,
        );
        if let TimingMode::FixedInterval { stopwatch, .. } = &mut mode {
            stopwatch.start();
        }
        session.mode = Some(mode);
        warn!("Falling back to fixed-interval timing: {}", reason);
        self.notice(kind, reason);
        self.emit(SyncEvent::ModeSelected {
            mode: TimingModeKind::FixedInterval,
        });
    }

    /// Choose the timing mode for a pass that has none yet
    fn select_mode_locked(&self, inner: &mut EngineInner, clock_duration: Option<Duration>) {
        let Some(session) = inner.session.as_mut() else {
            return;
        };

        let clock_plan =
            clock_duration.and_then(|d| TimingPlan::from_clock_duration(&session.sheet, d));
        let mode = if let Some(plan) = clock_plan {
            if session.previous_plan.as_ref() == Some(&plan) {
                debug!("Clock duration unchanged, reusing timing plan");
            } else {
                info!(
                    "Built timing plan: {} lines over {} ({}ms per line)",
                    plan.len(),
                    plan.total().to_clock_string(),
                    plan.slot().as_millis_u64()
                );
            }
            TimingMode::ClockSynced { plan }
        } else {
            let plan =
                TimingPlan::fixed_interval(&session.sheet, self.config.fallback_line_duration);
            TimingMode::FixedInterval {
                plan,
                stopwatch: session.pass_watch.clone(),
            }
        };

        let kind = mode.kind();
        session.mode = Some(mode);
        info!("Timing mode: {}", kind);
        self.emit(SyncEvent::ModeSelected { mode: kind });
    }

    /// Move the current line forward to match elapsed time.
    ///
    /// Returns how long to wait before the next check, or `None` once the
    /// pass has finished.
    fn advance_locked(
        &self,
        inner: &mut EngineInner,
        clock: Option<&dyn PlaybackClock>,
    ) -> Option<Duration> {
        let now = Instant::now();
        let poll = self.config.clock_poll_interval;
        let session = inner.session.as_mut()?;

        let (elapsed, line, complete, wait) = match &session.mode {
            None => return Some(poll),
            Some(TimingMode::ClockSynced { plan }) => {
                let elapsed = clock.map_or(session.last_known_position, |clock| clock.position());
                (elapsed, plan.line_at(elapsed), plan.is_complete(elapsed), Some(poll))
            }
            Some(TimingMode::FixedInterval { plan, stopwatch }) => {
                let elapsed = stopwatch.elapsed();
                let wait = plan
                    .next_boundary_after(elapsed)
                    .map(|boundary| boundary.saturating_sub(elapsed));
                (elapsed, plan.line_at(elapsed), plan.is_complete(elapsed), wait)
            }
        };

        session.last_known_position = elapsed;
        if let Some(line) = line {
            if session.advance_to(line, now) {
                debug!("Line {} at {}", line, elapsed.to_clock_string());
                self.emit(SyncEvent::LineChanged {
                    index: line,
                    text: session.sheet.line(line).unwrap_or_default().to_string(),
                });
            }
        }
        session.trail.prune(now);

        if complete || wait.is_none() {
            self.finish_locked(inner);
            return None;
        }
        wait
    }
}

/// Background task that drives one stretch of playback
struct Driver {
    shared: Arc<Shared>,
    token: CancellationToken,
    clock: Option<Arc<dyn PlaybackClock>>,
    load_clock: bool,
}

impl Driver {
    async fn run(self) {
        let mut clock_rx = self.clock.as_ref().map(|clock| clock.subscribe());

        let audio_playing = self.start_clock().await;
        if self.token.is_cancelled() {
            return;
        }

        if !self.ensure_mode(audio_playing, &mut clock_rx).await {
            return;
        }

        self.advance_loop(clock_rx).await;
    }

    /// Load (until one load completes) and start the clock; true if audio is playing
    async fn start_clock(&self) -> bool {
        let Some(clock) = &self.clock else {
            return false;
        };

        if self.load_clock {
            clock.load().await;
            let mut inner = self.shared.inner.lock().await;
            if inner.clock.as_ref().is_some_and(|held| Arc::ptr_eq(held, clock)) {
                inner.clock_loaded = true;
            }
        }

        match tokio::time::timeout(self.shared.config.clock_wait, clock.play()).await {
            Ok(Ok(())) => {
                debug!("Audio playing");
                true
            }
            Ok(Err(e)) => {
                warn!("Audio play failed, lyrics continue: {}", e);
                if !self.token.is_cancelled() {
                    self.shared.notice(
                        e.notice_kind().unwrap_or(NoticeKind::PlaybackRejected),
                        e.to_string(),
                    );
                }
                false
            }
            Err(_) => {
                warn!("Audio did not start in time, lyrics continue");
                if !self.token.is_cancelled() {
                    self.shared.notice(
                        NoticeKind::PlaybackRejected,
                        "audio did not start in time".into(),
                    );
                }
                false
            }
        }
    }

    /// Make sure the pass has a timing mode. Returns false when cancelled.
    async fn ensure_mode(
        &self,
        audio_playing: bool,
        clock_rx: &mut Option<broadcast::Receiver<ClockEvent>>,
    ) -> bool {
        {
            let mut inner = self.shared.inner.lock().await;
            if self.token.is_cancelled() {
                return false;
            }
            let Some(session) = inner.session.as_ref() else {
                return false;
            };
            match session.mode.as_ref().map(TimingMode::kind) {
                Some(TimingModeKind::ClockSynced) if !audio_playing => {
                    self.shared.degrade_locked(
                        &mut inner,
                        NoticeKind::ClockUnavailable,
                        "audio could not resume".into(),
                    );
                    return true;
                }
                Some(_) => return true,
                None => {}
            }
        }

        let duration = match &self.clock {
            Some(clock) if audio_playing => self.wait_for_duration(clock.as_ref(), clock_rx).await,
            _ => None,
        };

        let mut inner = self.shared.inner.lock().await;
        if self.token.is_cancelled() {
            return false;
        }
        if audio_playing && duration.is_none() {
            self.shared.notice(
                NoticeKind::ClockUnavailable,
                "audio never reported a usable duration".into(),
            );
        }
        self.shared.select_mode_locked(&mut inner, duration);
        true
    }

    /// Poll the clock for a usable duration within the clock wait window
    async fn wait_for_duration(
        &self,
        clock: &dyn PlaybackClock,
        clock_rx: &mut Option<broadcast::Receiver<ClockEvent>>,
    ) -> Option<Duration> {
        let deadline = Instant::now() + self.shared.config.clock_wait;
        let mut ticker = tokio::time::interval(self.shared.config.clock_poll_interval);

        loop {
            if let Some(duration) = clock.duration().filter(DurationExt::is_usable) {
                return Some(duration);
            }

            tokio::select! {
                () = self.token.cancelled() => return None,
                () = tokio::time::sleep_until(deadline) => {
                    debug!("Clock duration still unknown after {:?}", self.shared.config.clock_wait);
                    return None;
                }
                _ = ticker.tick() => {}
                event = next_clock_event(clock_rx) => {
                    if let Some(ClockEvent::Error { message }) = event {
                        warn!("Audio error while waiting for duration: {}", message);
                        return None;
                    }
                }
            }
        }
    }

    async fn advance_loop(&self, mut clock_rx: Option<broadcast::Receiver<ClockEvent>>) {
        loop {
            let wait = {
                let mut inner = self.shared.inner.lock().await;
                if self.token.is_cancelled() {
                    return;
                }
                match self.shared.advance_locked(&mut inner, self.clock.as_deref()) {
                    Some(wait) => wait,
                    None => return,
                }
            };

            tokio::select! {
                () = self.token.cancelled() => return,
                () = tokio::time::sleep(wait) => {}
                event = next_clock_event(&mut clock_rx) => match event {
                    Some(ClockEvent::Ended) => {
                        let mut inner = self.shared.inner.lock().await;
                        if self.token.is_cancelled() {
                            return;
                        }
                        info!("Audio ended");
                        // Catch up to the final position before freezing
                        if self.shared.advance_locked(&mut inner, self.clock.as_deref()).is_some() {
                            self.shared.finish_locked(&mut inner);
                        }
                        return;
                    }
                    Some(ClockEvent::Error { message }) => {
                        let mut inner = self.shared.inner.lock().await;
                        if self.token.is_cancelled() {
                            return;
                        }
                        let clock_synced = inner
                            .session
                            .as_ref()
                            .is_some_and(|s| matches!(s.mode, Some(TimingMode::ClockSynced { .. })));
                        if clock_synced {
                            self.shared.degrade_locked(&mut inner, NoticeKind::ClockUnavailable, message);
                        } else {
                            debug!("Ignoring audio error in fixed-interval mode: {}", message);
                        }
                    }
                    Some(ClockEvent::CanPlay | ClockEvent::PositionChanged { .. }) | None => {}
                },
            }
        }
    }
}

/// Next clock notification; pends forever without a live subscription
async fn next_clock_event(
    clock_rx: &mut Option<broadcast::Receiver<ClockEvent>>,
) -> Option<ClockEvent> {
    let Some(rx) = clock_rx.as_mut() else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(event) => Some(event),
        Err(RecvError::Lagged(n)) => {
            debug!("Missed {} clock events", n);
            None
        }
        Err(RecvError::Closed) => {
            *clock_rx = None;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NoClock;
    use crate::error::{CoreError, Result};
    use crate::session::LineRole;
    use crate::source::StaticSource;
    use crate::timing::Stopwatch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockClock {
        duration: StdMutex<Option<Duration>>,
        watch: StdMutex<Stopwatch>,
        reject_play: AtomicBool,
        load_delay: StdMutex<Duration>,
        loaded: AtomicBool,
        loads: AtomicUsize,
        plays: AtomicUsize,
        rewinds: AtomicUsize,
        events: broadcast::Sender<ClockEvent>,
    }

    impl MockClock {
        fn new(duration: Option<Duration>) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                duration: StdMutex::new(duration),
                watch: StdMutex::new(Stopwatch::default()),
                reject_play: AtomicBool::new(false),
                load_delay: StdMutex::new(Duration::ZERO),
                loaded: AtomicBool::new(false),
                loads: AtomicUsize::new(0),
                plays: AtomicUsize::new(0),
                rewinds: AtomicUsize::new(0),
                events,
            })
        }

        fn set_duration(&self, duration: Option<Duration>) {
            *self.duration.lock().unwrap() = duration;
        }

        fn seek(&self, position: Duration) {
            let mut watch = self.watch.lock().unwrap();
            let running = watch.is_running();
            *watch = Stopwatch::starting_at(position);
            if running {
                watch.start();
            }
        }

        fn fire(&self, event: ClockEvent) {
            let _ = self.events.send(event);
        }
    }

    #[async_trait]
    impl PlaybackClock for MockClock {
        async fn load(&self) {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let delay = *self.load_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.loaded.store(true, Ordering::SeqCst);
            self.fire(ClockEvent::CanPlay);
        }

        async fn play(&self) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if !self.loaded.load(Ordering::SeqCst) {
                return Err(CoreError::PlaybackRejected {
                    reason: "audio is not loaded".into(),
                });
            }
            if self.reject_play.load(Ordering::SeqCst) {
                return Err(CoreError::PlaybackRejected {
                    reason: "autoplay blocked".into(),
                });
            }
            self.watch.lock().unwrap().start();
            Ok(())
        }

        fn pause(&self) {
            self.watch.lock().unwrap().pause();
        }

        fn rewind(&self) {
            self.rewinds.fetch_add(1, Ordering::SeqCst);
            self.seek(Duration::ZERO);
        }

        fn position(&self) -> Duration {
            self.watch.lock().unwrap().elapsed()
        }

        fn duration(&self) -> Option<Duration> {
            *self.duration.lock().unwrap()
        }

        fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
            self.events.subscribe()
        }
    }

    struct MockProvider(Arc<MockClock>);

    impl ClockProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn acquire(&self) -> Result<Arc<dyn PlaybackClock>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ContentSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_lyrics(&self) -> Result<Vec<String>> {
            Err(CoreError::ContentUnavailable {
                source_name: "failing".into(),
                reason: "network down".into(),
            })
        }
    }

    fn ten_lines() -> Vec<String> {
        (0..10).map(|i| format!("line {i}")).collect()
    }

    fn engine_with(source: Vec<String>, provider: Arc<dyn ClockProvider>) -> LyricsSyncEngine {
        LyricsSyncEngine::new(
            Arc::new(StaticSource::new(source)),
            provider,
            EngineConfig::default(),
        )
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loads_lyrics() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        assert_eq!(engine.state().await, EngineState::Idle);

        engine.open().await;
        assert_eq!(engine.state().await, EngineState::Ready);
        assert_eq!(engine.lyrics().await.map(|s| s.len()), Some(10));
        assert_eq!(engine.current_line().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_plays_default_lyrics() {
        let engine = LyricsSyncEngine::new(
            Arc::new(FailingSource),
            Arc::new(NoClock),
            EngineConfig::default(),
        );
        let mut rx = engine.subscribe();

        engine.open().await;
        assert_eq!(engine.state().await, EngineState::Ready);
        assert_eq!(engine.lyrics().await, Some(LyricSheet::builtin()));

        engine.play().await;
        sleep_ms(3600).await;
        assert_eq!(engine.state().await, EngineState::Playing);
        assert_eq!(engine.current_line().await, Some(1));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::Notice { kind: NoticeKind::ContentUnavailable, .. }
        )));
        assert!(events.contains(&SyncEvent::LyricsLoaded {
            lines: LyricSheet::builtin().len(),
            origin: LyricsOrigin::Fallback,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_before_open_is_ignored() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        engine.play().await;
        assert_eq!(engine.state().await, EngineState::Idle);
        assert_eq!(engine.current_line().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_synced_timing() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(3400).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::ClockSynced));
        assert_eq!(engine.current_line().await, Some(0));
        let plan = engine.timing_plan().await.unwrap();
        assert_eq!(plan.slot(), Duration::from_millis(3500));

        sleep_ms(350).await;
        assert_eq!(engine.current_line().await, Some(1));
        assert_eq!(clock.plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_seek_back_never_decreases_line() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(8000).await;
        assert_eq!(engine.current_line().await, Some(2));

        clock.seek(Duration::from_secs(1));
        sleep_ms(500).await;
        assert_eq!(engine.current_line().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_clock_uses_fixed_interval() {
        let engine = engine_with(
            vec!["first".into(), String::new(), "second".into(), "third".into()],
            Arc::new(NoClock),
        );
        let mut rx = engine.subscribe();
        engine.open().await;
        engine.play().await;

        tokio::task::yield_now().await;
        assert_eq!(engine.current_line().await, Some(0));

        sleep_ms(3400).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::FixedInterval));
        assert_eq!(engine.current_line().await, Some(0));

        // The empty line at index 1 is skipped without taking display time
        sleep_ms(200).await;
        assert_eq!(engine.current_line().await, Some(2));

        sleep_ms(3500).await;
        assert_eq!(engine.current_line().await, Some(3));

        let changes: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::LineChanged { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![0, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_duration_falls_back_after_wait() {
        let clock = MockClock::new(None);
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        tokio::task::yield_now().await;
        assert_eq!(engine.current_line().await, Some(0));

        sleep_ms(1000).await;
        assert_eq!(engine.timing_mode().await, None);

        sleep_ms(1000).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::FixedInterval));

        // The stopwatch started at play, so the wait counts toward line 0
        sleep_ms(1600).await;
        assert_eq!(engine.current_line().await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_falls_back() {
        let clock = MockClock::new(Some(Duration::ZERO));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock)));
        engine.open().await;
        engine.play().await;

        sleep_ms(2000).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::FixedInterval));
        assert_eq!(engine.current_line().await, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_play_keeps_lyrics_moving() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        clock.reject_play.store(true, Ordering::SeqCst);
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock)));
        let mut rx = engine.subscribe();
        engine.open().await;
        engine.play().await;

        sleep_ms(3600).await;
        assert_eq!(engine.state().await, EngineState::Playing);
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::FixedInterval));
        assert_eq!(engine.current_line().await, Some(1));
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            SyncEvent::Notice { kind: NoticeKind::PlaybackRejected, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_keep_line() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        engine.open().await;
        engine.play().await;

        sleep_ms(5000).await;
        assert_eq!(engine.current_line().await, Some(1));

        engine.toggle().await;
        assert_eq!(engine.state().await, EngineState::Paused);
        sleep_ms(20_000).await;
        assert_eq!(engine.current_line().await, Some(1));
        assert!(!engine.view().await.is_playing);

        engine.toggle().await;
        assert_eq!(engine.state().await, EngineState::Playing);
        // 2 s were left on line 1 when paused
        sleep_ms(1900).await;
        assert_eq!(engine.current_line().await, Some(1));
        sleep_ms(200).await;
        assert_eq!(engine.current_line().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_clock_synced() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(4000).await;
        engine.pause().await;
        let position = clock.position();
        sleep_ms(10_000).await;
        assert_eq!(clock.position(), position);
        assert_eq!(engine.current_line().await, Some(1));

        engine.play().await;
        sleep_ms(3500).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::ClockSynced));
        assert_eq!(engine.current_line().await, Some(2));
        assert_eq!(clock.plays.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_slow_load_loads_again_on_resume() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        *clock.load_delay.lock().unwrap() = Duration::from_millis(500);
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(100).await;
        engine.pause().await;
        assert!(!clock.loaded.load(Ordering::SeqCst));

        sleep_ms(1000).await;
        engine.play().await;
        sleep_ms(700).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::ClockSynced));
        assert_eq!(clock.loads.load(Ordering::SeqCst), 2);
        assert_eq!(clock.plays.load(Ordering::SeqCst), 1);

        // Loaded now, so a further pause and resume does not load again
        engine.pause().await;
        engine.play().await;
        sleep_ms(100).await;
        assert_eq!(clock.loads.load(Ordering::SeqCst), 2);
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::ClockSynced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_playing_stops_everything() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        let mut rx = engine.subscribe();
        engine.open().await;
        engine.play().await;
        sleep_ms(4000).await;

        engine.close().await;
        drain(&mut rx);

        let view = engine.view().await;
        assert_eq!(view.state, EngineState::Idle);
        assert_eq!(view.current_line, None);
        assert!(view.visible.is_empty());

        sleep_ms(30_000).await;
        assert_eq!(engine.current_line().await, None);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finishes_after_last_window_and_replays() {
        let engine = engine_with(
            vec![String::new(), "a".into(), "b".into()],
            Arc::new(NoClock),
        );
        engine.open().await;
        engine.play().await;

        sleep_ms(6900).await;
        assert_eq!(engine.state().await, EngineState::Playing);
        sleep_ms(200).await;
        assert_eq!(engine.state().await, EngineState::Finished);
        assert_eq!(engine.current_line().await, Some(2));
        assert!(!engine.view().await.is_playing);

        sleep_ms(5000).await;
        assert_eq!(engine.current_line().await, Some(2));

        engine.play().await;
        assert_eq!(engine.state().await, EngineState::Playing);
        assert_eq!(engine.current_line().await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_end_freezes_on_reached_line() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(7200).await;
        clock.fire(ClockEvent::Ended);
        sleep_ms(50).await;
        assert_eq!(engine.state().await, EngineState::Finished);
        assert_eq!(engine.current_line().await, Some(2));

        sleep_ms(10_000).await;
        assert_eq!(engine.current_line().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_synced_finishes_at_duration() {
        let clock = MockClock::new(Some(Duration::from_secs(10)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock)));
        engine.open().await;
        engine.play().await;

        sleep_ms(10_300).await;
        assert_eq!(engine.state().await, EngineState::Finished);
        assert_eq!(engine.current_line().await, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_rebuilds_plan_when_duration_changes() {
        let clock = MockClock::new(Some(Duration::from_secs(10)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(10_300).await;
        assert_eq!(engine.state().await, EngineState::Finished);
        let first_plan = engine.timing_plan().await.unwrap();
        assert_eq!(first_plan.total(), Duration::from_secs(10));

        clock.set_duration(Some(Duration::from_secs(20)));
        engine.play().await;
        assert_eq!(engine.current_line().await, Some(0));
        assert_eq!(clock.rewinds.load(Ordering::SeqCst), 1);

        sleep_ms(100).await;
        let second_plan = engine.timing_plan().await.unwrap();
        assert_eq!(second_plan.total(), Duration::from_secs(20));
        assert_eq!(second_plan.slot(), Duration::from_secs(2));

        sleep_ms(2100).await;
        assert_eq!(engine.current_line().await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_error_mid_pass_degrades() {
        let clock = MockClock::new(Some(Duration::from_secs(35)));
        let engine = engine_with(ten_lines(), Arc::new(MockProvider(clock.clone())));
        engine.open().await;
        engine.play().await;

        sleep_ms(4000).await;
        assert_eq!(engine.current_line().await, Some(1));
        clock.fire(ClockEvent::Error {
            message: "decode error".into(),
        });
        sleep_ms(50).await;
        assert_eq!(engine.timing_mode().await, Some(TimingModeKind::FixedInterval));
        assert_eq!(engine.current_line().await, Some(1));

        // Line 1 gets a fresh fixed window from the switch
        sleep_ms(3500).await;
        assert_eq!(engine.current_line().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_trail_in_view() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        engine.open().await;
        engine.play().await;

        sleep_ms(3600).await;
        let view = engine.view().await;
        assert_eq!(view.visible.len(), 2);
        assert_eq!(view.visible[0].index, 0);
        assert_eq!(view.visible[0].role, LineRole::Fading);
        assert_eq!(view.current_text(), Some("line 1"));
        let fade_until = view.fade_until.unwrap();
        assert!(fade_until > Instant::now());

        tokio::time::sleep_until(fade_until).await;
        let view = engine.view().await;
        assert_eq!(view.visible.len(), 1);
        assert_eq!(view.visible[0].index, 1);
        assert_eq!(view.fade_until, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_does_not_leak_driver() {
        let engine = engine_with(ten_lines(), Arc::new(NoClock));
        let mut rx = engine.subscribe();
        engine.open().await;
        engine.play().await;
        sleep_ms(1000).await;

        engine.open().await;
        assert_eq!(engine.state().await, EngineState::Ready);
        drain(&mut rx);

        sleep_ms(10_000).await;
        assert_eq!(engine.current_line().await, None);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_displayable_lines_finishes_immediately() {
        let engine = LyricsSyncEngine::new(
            Arc::new(StaticSource::new([""])),
            Arc::new(NoClock),
            EngineConfig {
                default_lyrics: LyricSheet::new([" "]),
                ..EngineConfig::default()
            },
        );
        engine.open().await;
        engine.play().await;
        assert_eq!(engine.state().await, EngineState::Finished);
        assert_eq!(engine.current_line().await, None);
    }

    #[test]
    fn test_engine_config_from_file_config() {
        let mut file_config = SerenadeConfig::default();
        file_config.player.fallback_line_secs = 2.0;
        file_config.player.fade_grace_ms = 250;
        file_config.lyrics.fallback = vec!["x".into()];

        let config = EngineConfig::from(&file_config);
        assert_eq!(config.fallback_line_duration, Duration::from_secs(2));
        assert_eq!(config.fade_grace, Duration::from_millis(250));
        assert_eq!(config.clock_poll_interval, Duration::from_millis(100));
        assert_eq!(config.default_lyrics.lines(), ["x"]);
    }
}
