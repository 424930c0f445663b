//! Control API and notification stream for the Clock Signal service.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/clocksignal`) streaming state changes,
//!   clock time, and virtual time via [`tokio::sync::broadcast`]
//! - **Settings endpoints** for reading and replacing the run settings
//! - **Control endpoints** to start and stop a run and query its status
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The [`NotificationHub`] is the event relay's sink. Publishing never
//! waits on a subscriber: each `WebSocket` connection has its own bounded
//! receiver, and one that falls behind skips ahead.
//!
//! [`NotificationHub`]: state::NotificationHub

pub mod control;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use startup::{ServerHandle, spawn_server};
pub use state::{AppState, NotificationHub};
