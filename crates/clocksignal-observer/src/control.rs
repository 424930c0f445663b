//! Run control REST handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/clocksignal/start` | Start a run (409 if one is active) |
//! | `POST` | `/api/clocksignal/stop` | Stop the run (500 on timeout) |
//! | `GET` | `/api/clocksignal/state` | `{isRunning, isError, errorMessage}` |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use clocksignal_core::service::RunId;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Generic success response.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
    /// Identifier of the started run, for `start` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<RunId>,
}

// ---------------------------------------------------------------------------
// POST /api/clocksignal/start
// ---------------------------------------------------------------------------

/// Start a run over the stored date range.
///
/// Returns as soon as the run task is spawned.
pub async fn start(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let run_id = state.service.start().await?;

    Ok(Json(ControlResponse {
        ok: true,
        message: "Run started".to_owned(),
        run_id: Some(run_id),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/clocksignal/stop
// ---------------------------------------------------------------------------

/// Cancel the active run and wait for the current day to finish.
///
/// Succeeds immediately when nothing is running.
pub async fn stop(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    state.service.stop().await?;

    Ok(Json(ControlResponse {
        ok: true,
        message: "Run stopped".to_owned(),
        run_id: None,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/clocksignal/state
// ---------------------------------------------------------------------------

/// Return the current run status.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.status())
}
