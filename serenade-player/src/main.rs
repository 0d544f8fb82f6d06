mod bridge;
mod command;
mod render;

use crate::bridge::run_view_bridge;
use crate::command::{Command, HELP};
use crate::render::render_view;
use serenade_audio::FileClockProvider;
use serenade_core::{
    ClockProvider, ContentSource, CoreError, EngineConfig, EngineState, LyricsSyncEngine,
    NoClock, SerenadeConfig, StaticSource, SyncEvent, API_URL_ENV,
};
use serenade_lyrics_http::HttpContentSource;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const APP_NAME: &str = "Serenade";

fn main() {
    // Check config for logging.enabled before full config load
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let config = match SerenadeConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            // First run: the template holds the defaults, so carry on with them
            println!("Created a configuration file at {}", path.display());
            let mut config = SerenadeConfig::default();
            config.apply_env_overrides(std::env::var(API_URL_ENV).ok());
            config
        }
        Err(CoreError::ConfigParseError(parse_error)) => {
            eprintln!(
                "{APP_NAME}: {} has a syntax error and cannot be loaded:\n{parse_error}",
                SerenadeConfig::config_path().display()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{APP_NAME}: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    runtime.block_on(run(config, cancel_token));

    // The stdin reader may still be blocked on a read
    runtime.shutdown_timeout(Duration::from_millis(500));
}

async fn run(config: SerenadeConfig, cancel_token: CancellationToken) {
    let engine = Arc::new(LyricsSyncEngine::new(
        create_source(&config),
        create_clock_provider(&config),
        EngineConfig::from(&config),
    ));

    tokio::spawn(log_sync_events(Arc::clone(&engine)));
    let bridge = tokio::spawn(run_view_bridge(Arc::clone(&engine), cancel_token.clone()));

    println!("{APP_NAME}\n{HELP}");
    engine.open().await;
    if config.player.autoplay {
        engine.play().await;
    }

    read_commands(&engine, &cancel_token).await;

    engine.close().await;
    cancel_token.cancel();
    let _ = bridge.await;
    info!("Goodbye");
}

/// Apply stdin commands until quit, Ctrl+C or end of input
async fn read_commands(engine: &LyricsSyncEngine, cancel_token: &CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => return,
            line = lines.next_line() => line,
        };

        let input = match line {
            Ok(Some(input)) => input,
            Ok(None) => {
                info!("Input closed, press Ctrl+C to quit");
                cancel_token.cancelled().await;
                return;
            }
            Err(e) => {
                error!("Failed to read input: {}", e);
                return;
            }
        };

        let Some(command) = Command::parse(&input) else {
            println!("Unknown command: {}\n{HELP}", input.trim());
            continue;
        };

        debug!("Command: {:?}", command);
        match command {
            Command::Toggle => engine.toggle().await,
            Command::Replay => {
                engine.open().await;
                engine.play().await;
            }
            Command::Reopen => engine.open().await,
            Command::Close => engine.close().await,
            Command::Status => println!("{}", render_view(&engine.view().await)),
            Command::Help => println!("{HELP}"),
            Command::Quit => return,
        }
    }
}

/// Lyrics come from the HTTP API unless no base URL is configured
fn create_source(config: &SerenadeConfig) -> Arc<dyn ContentSource> {
    if config.content.base_url.is_empty() {
        info!("No lyrics API configured, using configured lyrics");
        return Arc::new(StaticSource::new(config.lyrics.fallback.iter().cloned()));
    }

    match HttpContentSource::new(&config.content) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to create lyrics API client: {}", e);
            Arc::new(StaticSource::new(config.lyrics.fallback.iter().cloned()))
        }
    }
}

/// Audio drives timing unless no audio file is configured
fn create_clock_provider(config: &SerenadeConfig) -> Arc<dyn ClockProvider> {
    let audio_path = config.player.audio_path.trim();
    if audio_path.is_empty() {
        info!("No audio configured, lyrics use fixed-interval timing");
        return Arc::new(NoClock);
    }
    Arc::new(FileClockProvider::new(audio_path))
}

/// Log all sync events
async fn log_sync_events(engine: Arc<LyricsSyncEngine>) {
    let mut rx = engine.subscribe();
    drop(engine);

    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                SyncEvent::StateChanged { state } => {
                    if *state == EngineState::Finished {
                        info!("Lyrics finished");
                    } else {
                        debug!("State: {}", state);
                    }
                }
                SyncEvent::LyricsLoaded { lines, origin } => {
                    info!("Lyrics loaded: {} lines ({:?})", lines, origin);
                }
                SyncEvent::ModeSelected { mode } => {
                    info!("Timing mode: {}", mode);
                }
                SyncEvent::LineChanged { index, text } => {
                    debug!("Line {}: {}", index, text);
                }
                SyncEvent::Notice { kind, message } => {
                    warn!("{:?}: {}", kind, message);
                }
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                info!("Sync event channel closed");
                break;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} sync events", n);
            }
        }
    }
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled() -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(SerenadeConfig::config_path()) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with stderr output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,serenade_core=info,serenade_audio=info"));

    // Lyrics go to stdout, logs stay out of their way
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = serenade_core::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
