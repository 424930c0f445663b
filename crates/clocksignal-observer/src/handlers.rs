//! Status page and run settings handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/clocksignal/settings` | Current run settings |
//! | `POST` | `/api/clocksignal/settings` | Validate and store run settings |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use clocksignal_core::settings::RunSettings;
use tracing::info;
use validator::Validate;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing run status, stored settings, and
/// API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.service.status();
    let run_state = if status.is_running { "RUNNING" } else { "IDLE" };
    let last_error = status
        .error_message
        .as_deref()
        .map_or_else(|| "none".to_owned(), escape_html);
    let subscribers = state.hub.subscriber_count();

    let (mode, range, hours, factor) = match state.settings.get() {
        Ok(s) => (
            s.mode.to_string(),
            format!("{} .. {}", s.start_date, s.end_date),
            format!("{} - {}", s.start_time, s.end_time),
            s.time_factor.to_string(),
        ),
        Err(e) => {
            let unavailable = escape_html(&e.to_string());
            (unavailable.clone(), unavailable.clone(), unavailable.clone(), unavailable)
        }
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Clock Signal</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.2rem; font-weight: bold; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        .error {{ color: #f85149; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Clock Signal</h1>
    <p class="subtitle">Day-by-day session orchestrator</p>

    <p>Status: <span class="status">{run_state}</span></p>
    <p>Last error: <span class="error">{last_error}</span></p>

    <div>
        <div class="metric">
            <div class="label">Mode</div>
            <div class="value">{mode}</div>
        </div>
        <div class="metric">
            <div class="label">Dates</div>
            <div class="value">{range}</div>
        </div>
        <div class="metric">
            <div class="label">Hours</div>
            <div class="value">{hours}</div>
        </div>
        <div class="metric">
            <div class="label">Time factor</div>
            <div class="value">{factor}</div>
        </div>
        <div class="metric">
            <div class="label">Subscribers</div>
            <div class="value">{subscribers}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET  /api/clocksignal/settings -- Stored run settings</li>
        <li>POST /api/clocksignal/settings -- Replace run settings</li>
        <li>POST /api/clocksignal/start -- Start a run</li>
        <li>POST /api/clocksignal/stop -- Stop the run</li>
        <li>GET  /api/clocksignal/state -- Run status</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws/clocksignal</code> -- Live state and clock stream</li>
    </ul>
</body>
</html>"#
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// GET /api/clocksignal/settings
// ---------------------------------------------------------------------------

/// Return the stored run settings.
///
/// A store with nothing saved yet returns the defaults.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunSettings>, ObserverError> {
    Ok(Json(state.settings.get()?))
}

// ---------------------------------------------------------------------------
// POST /api/clocksignal/settings
// ---------------------------------------------------------------------------

/// Validate and store new run settings.
///
/// An active run keeps the settings it started with; the new values
/// apply from the next `start`.
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<RunSettings>,
) -> Result<Json<RunSettings>, ObserverError> {
    settings.validate()?;
    state.settings.save(&settings)?;

    info!(
        mode = %settings.mode,
        start_date = %settings.start_date,
        end_date = %settings.end_date,
        time_factor = settings.time_factor,
        "Run settings saved"
    );

    Ok(Json(settings))
}
