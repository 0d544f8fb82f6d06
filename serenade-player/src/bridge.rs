use crate::render::{render_notice, render_view};
use serenade_core::{LyricsSyncEngine, SyncEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

const LOG_TARGET: &str = "serenade::bridge";

/// What the terminal should do in response to an engine event
#[derive(Debug, Clone, PartialEq, Eq)]
enum ViewUpdate {
    /// Redraw the lyrics view
    Redraw,
    /// Print a standalone message
    Print(String),
}

fn handle_sync_event(event: &SyncEvent) -> ViewUpdate {
    match event {
        SyncEvent::Notice { kind, message } => ViewUpdate::Print(render_notice(*kind, message)),
        SyncEvent::LineChanged { .. }
        | SyncEvent::StateChanged { .. }
        | SyncEvent::LyricsLoaded { .. }
        | SyncEvent::ModeSelected { .. } => ViewUpdate::Redraw,
    }
}

/// Print the engine's view to the terminal whenever it changes.
///
/// A view with a fading line is drawn again once that line expires.
/// Runs until `cancel_token` is cancelled or the event channel closes.
pub async fn run_view_bridge(engine: Arc<LyricsSyncEngine>, cancel_token: CancellationToken) {
    let mut rx = engine.subscribe();
    let mut last_frame = String::new();
    let mut fade_redraw_at: Option<Instant> = None;

    loop {
        let deadline = fade_redraw_at;
        let fade_expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let update = tokio::select! {
            () = cancel_token.cancelled() => break,
            () = fade_expired => {
                fade_redraw_at = None;
                ViewUpdate::Redraw
            }
            event = rx.recv() => match event {
                Ok(event) => handle_sync_event(&event),
                Err(RecvError::Closed) => {
                    info!(target: LOG_TARGET, "Sync event channel closed");
                    break;
                }
                Err(RecvError::Lagged(n)) => {
                    info!(target: LOG_TARGET, "Missed {} sync events", n);
                    ViewUpdate::Redraw
                }
            },
        };

        match update {
            ViewUpdate::Print(message) => println!("{message}"),
            ViewUpdate::Redraw => {
                let view = engine.view().await;
                fade_redraw_at = view.fade_until;
                let frame = render_view(&view);
                if frame != last_frame {
                    println!("{frame}");
                    last_frame = frame;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenade_core::{EngineState, NoticeKind};

    #[test]
    fn test_line_change_redraws() {
        let event = SyncEvent::LineChanged {
            index: 1,
            text: "x".into(),
        };
        assert_eq!(handle_sync_event(&event), ViewUpdate::Redraw);
    }

    #[test]
    fn test_notice_is_printed() {
        let event = SyncEvent::Notice {
            kind: NoticeKind::ContentUnavailable,
            message: "timeout".into(),
        };
        assert!(matches!(handle_sync_event(&event), ViewUpdate::Print(text) if text.contains("timeout")));
    }

    #[test]
    fn test_state_change_redraws() {
        let event = SyncEvent::StateChanged {
            state: EngineState::Paused,
        };
        assert_eq!(handle_sync_event(&event), ViewUpdate::Redraw);
    }
}
