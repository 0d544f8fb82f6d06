use serenade_core::{DurationExt, EngineState, LineRole, LyricsOrigin, NoticeKind, ViewModel};
use std::fmt::Write;

/// Render a view snapshot as terminal text
#[must_use]
pub fn render_view(view: &ViewModel) -> String {
    match view.state {
        EngineState::Idle => return "■ closed".to_string(),
        EngineState::Loading => return "… loading lyrics".to_string(),
        EngineState::Ready => {
            let origin = origin_label(view.origin);
            return format!(
                "● ready: {} lines ({origin}), press p to play",
                view.total_lines
            );
        }
        EngineState::Playing | EngineState::Paused | EngineState::Finished => {}
    }

    let icon = match view.state {
        EngineState::Playing => "▶",
        EngineState::Paused => "⏸",
        _ => "⏹",
    };
    let line_number = view.current_line.map_or(0, |line| line + 1);
    let mode = view
        .mode
        .map_or_else(|| "syncing".to_string(), |mode| mode.to_string());

    let mut out = format!(
        "{icon} {line_number:02}/{:02} [{mode}] {}",
        view.total_lines,
        view.position.to_clock_string()
    );
    for line in &view.visible {
        let marker = match line.role {
            LineRole::Current => '>',
            LineRole::Fading => '~',
        };
        let _ = write!(out, "\n  {marker} {}", line.text);
    }
    if view.state == EngineState::Finished {
        out.push_str("\n  (finished, press p to replay)");
    }
    out
}

/// Render a degradation notice
#[must_use]
pub fn render_notice(kind: NoticeKind, message: &str) -> String {
    let label = match kind {
        NoticeKind::ContentUnavailable => "lyrics unavailable, using built-in lyrics",
        NoticeKind::ClockUnavailable => "audio unavailable, lyrics keep their own time",
        NoticeKind::PlaybackRejected => "audio did not start, lyrics keep their own time",
    };
    format!("! {label} ({message})")
}

const fn origin_label(origin: Option<LyricsOrigin>) -> &'static str {
    match origin {
        Some(LyricsOrigin::Remote) => "from server",
        Some(LyricsOrigin::Fallback) => "built-in",
        None => "none",
    }
}
