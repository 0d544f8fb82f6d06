//! Playback clock that follows an audio file's timeline.
//!
//! The clock probes the file for its duration with lofty and then runs a
//! stopwatch across that duration, reporting `Ended` when it is reached.

use async_trait::async_trait;
use lofty::file::AudioFile;
use lofty::probe::Probe;
use serenade_core::{ClockEvent, ClockProvider, CoreError, PlaybackClock, Stopwatch};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadState {
    NotLoaded,
    Loaded,
    Failed(String),
}

struct ClockState {
    load: LoadState,
    duration: Option<Duration>,
    watch: Stopwatch,
    end_timer: Option<JoinHandle<()>>,
}

impl ClockState {
    fn position(&self) -> Duration {
        let elapsed = self.watch.elapsed();
        self.duration.map_or(elapsed, |d| elapsed.min(d))
    }

    fn stop_end_timer(&mut self) {
        if let Some(timer) = self.end_timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    path: PathBuf,
    state: Mutex<ClockState>,
    events: broadcast::Sender<ClockEvent>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ClockEvent) {
        let _ = self.events.send(event);
    }
}

/// Clock over a local audio file
pub struct FileClock {
    inner: Arc<Inner>,
}

impl FileClock {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                state: Mutex::new(ClockState {
                    load: LoadState::NotLoaded,
                    duration: None,
                    watch: Stopwatch::default(),
                    end_timer: None,
                }),
                events,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn schedule_end(inner: &Arc<Inner>, state: &mut ClockState) {
        state.stop_end_timer();
        let Some(duration) = state.duration else {
            return;
        };
        let remaining = duration.saturating_sub(state.position());

        let inner_ref = Arc::clone(inner);
        state.end_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut state = inner_ref.state();
                state.watch = Stopwatch::starting_at(duration);
                state.end_timer = None;
            }
            debug!("Reached end of {}", inner_ref.path.display());
            inner_ref.emit(ClockEvent::Ended);
        }));
    }
}

/// Read the playing time of an audio file
fn probe_duration(path: &Path) -> Result<Duration, CoreError> {
    let tagged_file = Probe::open(path)
        .and_then(lofty::probe::Probe::read)
        .map_err(|e| CoreError::ClockUnavailable {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
    Ok(tagged_file.properties().duration())
}

#[async_trait]
impl PlaybackClock for FileClock {
    async fn load(&self) {
        let path = self.inner.path.clone();
        let probed = tokio::task::spawn_blocking(move || probe_duration(&path))
            .await
            .unwrap_or_else(|e| {
                Err(CoreError::ClockUnavailable {
                    reason: format!("duration probe failed: {e}"),
                })
            });

        match probed {
            Ok(duration) => {
                info!(
                    "Loaded {} ({:.1}s)",
                    self.inner.path.display(),
                    duration.as_secs_f64()
                );
                {
                    let mut state = self.inner.state();
                    state.load = LoadState::Loaded;
                    state.duration = Some(duration);
                }
                self.inner.emit(ClockEvent::CanPlay);
            }
            Err(e) => {
                warn!("Audio unavailable: {}", e);
                let message = e.to_string();
                self.inner.state().load = LoadState::Failed(message.clone());
                self.inner.emit(ClockEvent::Error { message });
            }
        }
    }

    async fn play(&self) -> Result<(), CoreError> {
        let mut state = self.inner.state();
        match &state.load {
            LoadState::Loaded => {}
            LoadState::NotLoaded => {
                return Err(CoreError::PlaybackRejected {
                    reason: "audio is not loaded".into(),
                });
            }
            LoadState::Failed(reason) => {
                return Err(CoreError::ClockUnavailable {
                    reason: reason.clone(),
                });
            }
        }

        if state.watch.is_running() {
            return Ok(());
        }
        state.watch.start();
        Self::schedule_end(&self.inner, &mut state);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.inner.state();
        state.stop_end_timer();
        state.watch.pause();
    }

    fn rewind(&self) {
        let mut state = self.inner.state();
        let running = state.watch.is_running();
        state.watch.reset();
        if running {
            state.watch.start();
            Self::schedule_end(&self.inner, &mut state);
        }
        drop(state);
        self.inner.emit(ClockEvent::PositionChanged {
            position: Duration::ZERO,
        });
    }

    fn position(&self) -> Duration {
        self.inner.state().position()
    }

    fn duration(&self) -> Option<Duration> {
        self.inner.state().duration
    }

    fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
        self.inner.events.subscribe()
    }
}

impl Drop for FileClock {
    fn drop(&mut self) {
        self.inner.state().stop_end_timer();
    }
}

/// Provides a [`FileClock`] for a configured audio path
pub struct FileClockProvider {
    path: PathBuf,
}

impl FileClockProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClockProvider for FileClockProvider {
    fn name(&self) -> &'static str {
        "audio-file"
    }

    fn acquire(&self) -> Result<Arc<dyn PlaybackClock>, CoreError> {
        Ok(Arc::new(FileClock::new(self.path.clone())))
    }
}
