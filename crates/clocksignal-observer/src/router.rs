//! Axum router construction for the Clock Signal API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{control, handlers, ws};

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/clocksignal` -- `WebSocket` notification stream
/// - `GET|POST /api/clocksignal/settings` -- read or replace run settings
/// - `POST /api/clocksignal/start` -- start a run
/// - `POST /api/clocksignal/stop` -- stop the run
/// - `GET /api/clocksignal/state` -- run status
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/clocksignal", get(ws::ws_clocksignal))
        // Settings
        .route(
            "/api/clocksignal/settings",
            get(handlers::get_settings).post(handlers::save_settings),
        )
        // Run control
        .route("/api/clocksignal/start", post(control::start))
        .route("/api/clocksignal/stop", post(control::stop))
        .route("/api/clocksignal/state", get(control::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
