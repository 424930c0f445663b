//! Integration tests for the Clock Signal API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Runs are driven by stub sessions so no test
//! depends on wall-clock pacing.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{NaiveDate, NaiveTime};
use clocksignal_core::relay::{Notification, SessionState};
use clocksignal_core::session::{SessionFactory, StubScript, StubSessionFactory};
use clocksignal_core::settings::{InMemorySettingsStore, Mode, RunSettings, SettingsStore};
use clocksignal_observer::router::build_router;
use clocksignal_observer::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_settings() -> RunSettings {
    RunSettings {
        mode: Mode::Backtesting,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        time_factor: 60.0,
    }
}

fn make_test_state(script: StubScript, stop_timeout: Duration) -> Arc<AppState> {
    let store: Arc<dyn SettingsStore> = Arc::new(InMemorySettingsStore::new(test_settings()));
    let sessions: Arc<dyn SessionFactory> = Arc::new(StubSessionFactory::new(script));
    Arc::new(AppState::assemble(store, sessions, 64, stop_timeout))
}

fn idle_state() -> Arc<AppState> {
    make_test_state(StubScript::default(), Duration::from_secs(3))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_until_idle(state: &AppState) {
    for _ in 0..200 {
        if !state.service.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!state.service.is_running(), "run did not finish");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_index_returns_html() {
    let router = build_router(idle_state());

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_get_settings() {
    let router = build_router(idle_state());

    let response = router
        .oneshot(
            Request::get("/api/clocksignal/settings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["mode"], "Backtesting");
    assert_eq!(json["startDate"], "2024-01-01");
    assert_eq!(json["endDate"], "2024-01-02");
    assert_eq!(json["startTime"], "09:00:00");
    assert_eq!(json["endTime"], "17:00:00");
    assert_eq!(json["timeFactor"], 60.0);
}

#[tokio::test]
async fn test_save_settings_persists() {
    let state = idle_state();
    let router = build_router(Arc::clone(&state));

    let body = json!({
        "mode": "Realtime",
        "startDate": "2024-03-04",
        "endDate": "2024-03-08",
        "startTime": "08:30:00",
        "endTime": "16:30:00",
        "timeFactor": 1.0,
    });
    let response = router
        .oneshot(post_json("/api/clocksignal/settings", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = state.settings.get().unwrap();
    assert_eq!(stored.mode, Mode::Realtime);
    assert_eq!(stored.start_date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(stored.end_time, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
}

#[tokio::test]
async fn test_save_settings_rejects_zero_time_factor() {
    let state = idle_state();
    let router = build_router(Arc::clone(&state));

    let body = json!({
        "mode": "Backtesting",
        "startDate": "2024-01-01",
        "endDate": "2024-01-05",
        "startTime": "09:00:00",
        "endTime": "17:00:00",
        "timeFactor": 0.0,
    });
    let response = router
        .oneshot(post_json("/api/clocksignal/settings", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
    assert!(json["fields"].as_object().is_some_and(|f| !f.is_empty()));

    // Nothing was stored.
    assert_eq!(state.settings.get().unwrap(), test_settings());
}

#[tokio::test]
async fn test_save_settings_rejects_reversed_dates() {
    let router = build_router(idle_state());

    let body = json!({
        "mode": "Realtime",
        "startDate": "2024-01-05",
        "endDate": "2024-01-01",
        "startTime": "09:00:00",
        "endTime": "17:00:00",
        "timeFactor": 1.0,
    });
    let response = router
        .oneshot(post_json("/api/clocksignal/settings", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_state_when_idle() {
    let router = build_router(idle_state());

    let response = router
        .oneshot(
            Request::get("/api/clocksignal/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(
        json,
        json!({ "isRunning": false, "isError": false, "errorMessage": null })
    );
}

#[tokio::test]
async fn test_stop_without_run_is_ok() {
    let router = build_router(idle_state());

    let response = router.oneshot(post("/api/clocksignal/stop")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn test_start_twice_conflicts() {
    let script = StubScript {
        day_duration: Duration::from_millis(200),
        ..StubScript::default()
    };
    let state = make_test_state(script, Duration::from_secs(5));
    let router = build_router(Arc::clone(&state));

    let first = router
        .clone()
        .oneshot(post("/api/clocksignal/start"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_to_json(first.into_body()).await;
    assert_eq!(json["ok"], true);
    assert!(json["runId"].is_string());

    let second = router
        .clone()
        .oneshot(post("/api/clocksignal/start"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = body_to_json(second.into_body()).await;
    assert_eq!(json["status"], 409);

    let stop = router.oneshot(post("/api/clocksignal/stop")).await.unwrap();
    assert_eq!(stop.status(), StatusCode::OK);
    assert!(!state.service.is_running());
}

#[tokio::test]
async fn test_stop_timeout_returns_500() {
    let script = StubScript {
        hanging_dates: vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()],
        ..StubScript::default()
    };
    let state = make_test_state(script, Duration::from_millis(50));
    let router = build_router(Arc::clone(&state));

    let start = router
        .clone()
        .oneshot(post("/api/clocksignal/start"))
        .await
        .unwrap();
    assert_eq!(start.status(), StatusCode::OK);

    let stop = router
        .clone()
        .oneshot(post("/api/clocksignal/stop"))
        .await
        .unwrap();
    assert_eq!(stop.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = router
        .oneshot(
            Request::get("/api/clocksignal/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["isRunning"], true);
}

#[tokio::test]
async fn test_session_error_shows_in_state() {
    let script = StubScript {
        failing_dates: vec![NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()],
        ..StubScript::default()
    };
    let state = make_test_state(script, Duration::from_secs(3));
    let router = build_router(Arc::clone(&state));

    let start = router
        .clone()
        .oneshot(post("/api/clocksignal/start"))
        .await
        .unwrap();
    assert_eq!(start.status(), StatusCode::OK);
    wait_until_idle(&state).await;

    let response = router
        .oneshot(
            Request::get("/api/clocksignal/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(
        json,
        json!({
            "isRunning": false,
            "isError": true,
            "errorMessage": "session failed on 2024-01-02",
        })
    );
}

#[tokio::test]
async fn test_run_notifications_reach_subscribers() {
    let script = StubScript {
        ticks: 1,
        ..StubScript::default()
    };
    let state = make_test_state(script, Duration::from_secs(3));
    let mut rx = state.subscribe();

    state.service.start().await.unwrap();
    wait_until_idle(&state).await;

    let mut received = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        received.push(notification);
    }

    // Two days, each: Starting, virtual, clock, Stopped.
    assert_eq!(received.len(), 8);
    assert_eq!(
        received.first(),
        Some(&Notification::StateChanged {
            state: SessionState::Starting
        })
    );
    assert!(matches!(received.get(1), Some(Notification::NewVirtualTime { .. })));
    assert!(matches!(received.get(2), Some(Notification::NewClockTime { .. })));
    assert_eq!(
        received.get(3),
        Some(&Notification::StateChanged {
            state: SessionState::Stopped
        })
    );
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let router = build_router(idle_state());

    let response = router
        .oneshot(
            Request::get("/api/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
