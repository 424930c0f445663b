//! Day-by-day run loop.
//!
//! [`DaySequencer::run`] is the body of a run. It reads the settings once,
//! then walks the date range one calendar day at a time:
//!
//! 1. stop if cancellation was requested (checked only between days),
//! 2. derive the day's [`SessionSchedule`],
//! 3. open a per-day event channel, create and start the session,
//! 4. relay its events until `Stopped` or `Error` arrives,
//! 5. move on to the next day whatever the outcome.
//!
//! A day in progress is never interrupted; the cancellation token is
//! handed to the session so it may finish early on its own terms.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use validator::Validate;

use crate::error_state::ErrorState;
use crate::relay::{DayOutcome, EventRelay, Notification, NotificationSink, SessionState};
use crate::schedule::{ScheduleError, SessionSchedule};
use crate::session::{self, SessionEvent, SessionFactory};
use crate::settings::{RunSettings, SettingsError, SettingsStore};

/// Message relayed when a session drops its channel without finishing.
const ABANDONED_SESSION: &str = "session ended without reporting completion";

/// Errors that abort a run before the date range is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// Settings could not be loaded or are invalid.
    #[error("settings error: {source}")]
    Settings {
        /// The underlying settings error.
        #[from]
        source: SettingsError,
    },

    /// A schedule could not be derived for a day in the range.
    #[error("schedule error: {source}")]
    Schedule {
        /// The underlying schedule error.
        #[from]
        source: ScheduleError,
    },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEndReason {
    /// Every day in the range was simulated.
    RangeExhausted,
    /// Cancellation was observed at a day boundary.
    Cancelled,
}

/// Result of a run that was not aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// Number of sessions started.
    pub days_started: u32,
    /// Number of sessions that ended in error.
    pub days_failed: u32,
}

/// Drives one session per day across the configured date range.
#[derive(Clone)]
pub struct DaySequencer {
    store: Arc<dyn SettingsStore>,
    sessions: Arc<dyn SessionFactory>,
    sink: Arc<dyn NotificationSink>,
    errors: Arc<ErrorState>,
}

impl DaySequencer {
    /// Assemble a sequencer from its collaborators.
    pub fn new(
        store: Arc<dyn SettingsStore>,
        sessions: Arc<dyn SessionFactory>,
        sink: Arc<dyn NotificationSink>,
        errors: Arc<ErrorState>,
    ) -> Self {
        Self {
            store,
            sessions,
            sink,
            errors,
        }
    }

    /// Run the configured date range until it is exhausted or `cancel`
    /// fires.
    ///
    /// Session failures are recorded and do not end the run.
    ///
    /// # Errors
    ///
    /// Returns [`SequencerError`] if the settings cannot be read or fail
    /// validation, or if a schedule cannot be derived. The error is also
    /// recorded in the error state and announced as the `Error` state.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, SequencerError> {
        let settings = match self.load_settings() {
            Ok(settings) => settings,
            Err(e) => {
                self.abort(&e);
                return Err(e);
            }
        };
        let relay = EventRelay::new(settings.mode, Arc::clone(&self.sink), Arc::clone(&self.errors));

        info!(
            mode = %settings.mode,
            start_date = %settings.start_date,
            end_date = %settings.end_date,
            time_factor = settings.time_factor,
            "Run starting"
        );

        let mut days_started: u32 = 0;
        let mut days_failed: u32 = 0;

        for date in days(settings.start_date, settings.end_date) {
            // --- Check cancellation (day boundary only) ---
            if cancel.is_cancelled() {
                info!(%date, "Cancellation observed, not starting day");
                return Ok(RunSummary {
                    end_reason: RunEndReason::Cancelled,
                    days_started,
                    days_failed,
                });
            }

            let schedule = match SessionSchedule::for_date(&settings, date) {
                Ok(schedule) => schedule,
                Err(e) => {
                    let e = SequencerError::from(e);
                    self.abort(&e);
                    return Err(e);
                }
            };

            days_started = days_started.saturating_add(1);
            info!(
                %date,
                effective_time_factor = schedule.effective_time_factor(),
                "Day starting"
            );

            // --- Run one session to its terminal event ---
            match self.run_day(&schedule, &relay, cancel).await {
                DayOutcome::Completed => info!(%date, "Day completed"),
                DayOutcome::Failed(message) => {
                    days_failed = days_failed.saturating_add(1);
                    warn!(%date, error = %message, "Day failed, continuing with next day");
                }
            }
        }

        Ok(RunSummary {
            end_reason: RunEndReason::RangeExhausted,
            days_started,
            days_failed,
        })
    }

    fn load_settings(&self) -> Result<RunSettings, SequencerError> {
        let settings = self.store.get()?;
        settings.validate().map_err(SettingsError::from)?;
        Ok(settings)
    }

    fn abort(&self, error: &SequencerError) {
        tracing::error!(error = %error, "Run aborted");
        self.errors.record(error.to_string());
        self.sink.publish(Notification::StateChanged {
            state: SessionState::Error,
        });
    }

    /// Start the session for `schedule` and relay its events until it
    /// reports a terminal event.
    async fn run_day(
        &self,
        schedule: &SessionSchedule,
        relay: &EventRelay,
        cancel: &CancellationToken,
    ) -> DayOutcome {
        // The channel exists before the session starts, so no event is lost.
        let (events, mut rx) = session::channel();
        self.sessions
            .create(schedule)
            .start(events, cancel.clone());

        while let Some(event) = rx.recv().await {
            if let Some(outcome) = relay.relay(event) {
                return outcome;
            }
        }

        relay
            .relay(SessionEvent::Error {
                message: ABANDONED_SESSION.to_owned(),
            })
            .unwrap_or_else(|| DayOutcome::Failed(ABANDONED_SESSION.to_owned()))
    }
}

/// Every calendar day in `[start, end]`, in order.
fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Log the end of a run.
pub fn log_run_end(result: &Result<RunSummary, SequencerError>) {
    match result {
        Ok(summary) => info!(
            reason = ?summary.end_reason,
            days_started = summary.days_started,
            days_failed = summary.days_failed,
            "Run ended"
        ),
        Err(e) => warn!(error = %e, "Run ended early"),
    }
}
