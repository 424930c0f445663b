//! Translation of session events into subscriber notifications.
//!
//! # Routing
//!
//! | Session event | Notification | Condition |
//! |---------------|--------------|-----------|
//! | `Starting` | `StateChanged(Starting)` | always |
//! | `Stopped` | `StateChanged(Stopped)` | always |
//! | `Error(msg)` | `StateChanged(Error)`, error state := `msg` | always |
//! | `VirtualTimeAdvanced(t)` | `NewVirtualTime(t)` | always |
//! | `VirtualTimeAdvanced(t)` | `NewClockTime(t)` | `Realtime` |
//! | `ClockTimeAdvanced(t)` | `NewClockTime(t)` | `Backtesting` |
//!
//! In realtime mode the virtual clock is the clock. In backtesting mode the
//! session's own wall-clock feed is authoritative and virtual time is
//! relayed separately.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error_state::ErrorState;
use crate::session::SessionEvent;
use crate::settings::Mode;

/// Message recorded when a session fails without saying why.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Session lifecycle state as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// A session is starting.
    Starting,
    /// A session completed.
    Stopped,
    /// A session or the run failed.
    Error,
}

impl core::fmt::Display for SessionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Starting => f.write_str("Starting"),
            Self::Stopped => f.write_str("Stopped"),
            Self::Error => f.write_str("Error"),
        }
    }
}

/// A one-way message pushed to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The session lifecycle state changed.
    StateChanged {
        /// The new state.
        state: SessionState,
    },
    /// The authoritative clock moved.
    NewClockTime {
        /// The new clock time.
        time: NaiveDateTime,
    },
    /// The simulated clock moved.
    NewVirtualTime {
        /// The new virtual time.
        time: NaiveDateTime,
    },
}

/// Fan-out target for notifications.
///
/// Publishing must not block and must not fail from the caller's point of
/// view; delivery problems are the sink's own business.
pub trait NotificationSink: Send + Sync {
    /// Push `notification` to all current subscribers.
    fn publish(&self, notification: Notification);
}

/// How a session day ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayOutcome {
    /// The session reported `Stopped`.
    Completed,
    /// The session reported `Error` with this message.
    Failed(String),
}

/// Applies the routing table for one run.
#[derive(Clone)]
pub struct EventRelay {
    mode: Mode,
    sink: Arc<dyn NotificationSink>,
    errors: Arc<ErrorState>,
}

impl EventRelay {
    /// Create a relay for a run in `mode`.
    pub fn new(mode: Mode, sink: Arc<dyn NotificationSink>, errors: Arc<ErrorState>) -> Self {
        Self { mode, sink, errors }
    }

    /// Relay one session event.
    ///
    /// Returns the day outcome when `event` is terminal, `None` otherwise.
    pub fn relay(&self, event: SessionEvent) -> Option<DayOutcome> {
        match event {
            SessionEvent::Starting => {
                self.state_changed(SessionState::Starting);
                None
            }
            SessionEvent::Stopped => {
                self.state_changed(SessionState::Stopped);
                Some(DayOutcome::Completed)
            }
            SessionEvent::Error { message } => {
                let message = if message.is_empty() {
                    UNKNOWN_ERROR.to_owned()
                } else {
                    message
                };
                warn!(error = %message, "Session reported an error");
                self.fail(&message);
                Some(DayOutcome::Failed(message))
            }
            SessionEvent::VirtualTimeAdvanced(time) => {
                self.sink.publish(Notification::NewVirtualTime { time });
                if self.mode == Mode::Realtime {
                    self.sink.publish(Notification::NewClockTime { time });
                }
                None
            }
            SessionEvent::ClockTimeAdvanced(time) => {
                if self.mode == Mode::Backtesting {
                    self.sink.publish(Notification::NewClockTime { time });
                }
                None
            }
        }
    }

    /// Record `message` as the current error and announce the `Error` state.
    pub fn fail(&self, message: &str) {
        self.errors.record(message);
        self.state_changed(SessionState::Error);
    }

    fn state_changed(&self, state: SessionState) {
        debug!(%state, "Relaying state change");
        self.sink.publish(Notification::StateChanged { state });
    }
}

/// A sink that keeps every notification, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notifications: std::sync::Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications published so far, in order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Only the state changes published so far, in order.
    pub fn states(&self) -> Vec<SessionState> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification);
    }
}
