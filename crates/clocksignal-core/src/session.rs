//! Session contract and the bundled session engines.
//!
//! A session simulates one day. The core never looks inside it: it builds
//! the session from a [`SessionSchedule`], starts it with the run's
//! cancellation token, and consumes the [`SessionEvent`]s the session sends
//! on its per-day channel until a terminal event arrives.
//!
//! Two engines ship with the crate:
//!
//! - [`PacedSessionFactory`] -- steps virtual time across the daily window,
//!   pacing each step by the schedule's effective time factor. Used by the
//!   service binary.
//! - [`StubSessionFactory`] -- scripted sessions with configurable ticks,
//!   failures, and hangs. Used by tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::schedule::SessionSchedule;

/// An event emitted by a running session.
///
/// `Stopped` and `Error` are terminal and mutually exclusive; a session
/// emits exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is about to produce its first tick.
    Starting,
    /// The session completed gracefully.
    Stopped,
    /// The session failed.
    Error {
        /// Failure description reported by the engine.
        message: String,
    },
    /// The simulated clock moved.
    VirtualTimeAdvanced(NaiveDateTime),
    /// The session's wall-clock reading moved.
    ClockTimeAdvanced(NaiveDateTime),
}

impl SessionEvent {
    /// Whether this event ends the session.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error { .. })
    }
}

/// Sending half of a per-day session event channel.
///
/// Sends never block and never fail loudly: once the receiving side is
/// gone, events are dropped and [`is_closed`](Self::is_closed) turns true.
#[derive(Debug, Clone)]
pub struct SessionEventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Create a fresh per-day session event channel.
pub fn channel() -> (SessionEventSender, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionEventSender { tx }, rx)
}

impl SessionEventSender {
    /// Send an event. Returns `false` if nobody is listening any more.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Report that the session is starting.
    pub fn starting(&self) -> bool {
        self.send(SessionEvent::Starting)
    }

    /// Report graceful completion.
    pub fn stopped(&self) -> bool {
        self.send(SessionEvent::Stopped)
    }

    /// Report a failure.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(SessionEvent::Error {
            message: message.into(),
        })
    }

    /// Report a new virtual time.
    pub fn virtual_time(&self, time: NaiveDateTime) -> bool {
        self.send(SessionEvent::VirtualTimeAdvanced(time))
    }

    /// Report a new wall-clock time.
    pub fn clock_time(&self, time: NaiveDateTime) -> bool {
        self.send(SessionEvent::ClockTimeAdvanced(time))
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A single day's simulation.
pub trait Session: Send {
    /// Begin the simulation and return immediately.
    ///
    /// Progress is reported through `events`. `cancel` fires when the run
    /// is asked to stop; engines may use it to finish early but must still
    /// send a terminal event.
    fn start(self: Box<Self>, events: SessionEventSender, cancel: CancellationToken);
}

/// Builds one [`Session`] per simulated day.
pub trait SessionFactory: Send + Sync {
    /// Create the session for `schedule`.
    fn create(&self, schedule: &SessionSchedule) -> Box<dyn Session>;
}

// ---------------------------------------------------------------------------
// Paced session
// ---------------------------------------------------------------------------

/// Factory for [`PacedSession`]s.
#[derive(Debug, Clone)]
pub struct PacedSessionFactory {
    tick_interval: Duration,
}

impl PacedSessionFactory {
    /// Create a factory whose sessions advance virtual time by
    /// `tick_interval` per step.
    pub const fn new(tick_interval: Duration) -> Self {
        Self { tick_interval }
    }
}

impl SessionFactory for PacedSessionFactory {
    fn create(&self, schedule: &SessionSchedule) -> Box<dyn Session> {
        Box::new(PacedSession {
            schedule: schedule.clone(),
            tick_interval: self.tick_interval,
        })
    }
}

/// Steps virtual time from the schedule's start to its end.
///
/// Each step advances virtual time by the tick interval and waits
/// `tick_interval / effective_time_factor` of wall time. Every step emits
/// the virtual time and the local wall-clock time.
#[derive(Debug)]
pub struct PacedSession {
    schedule: SessionSchedule,
    tick_interval: Duration,
}

impl Session for PacedSession {
    fn start(self: Box<Self>, events: SessionEventSender, cancel: CancellationToken) {
        tokio::spawn(async move {
            self.run(&events, &cancel).await;
        });
    }
}

impl PacedSession {
    async fn run(self, events: &SessionEventSender, cancel: &CancellationToken) {
        let step = i64::try_from(self.tick_interval.as_millis())
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .filter(|d| *d > TimeDelta::zero());
        let Some(step) = step else {
            events.error(format!(
                "tick interval {}ms is not a positive step",
                self.tick_interval.as_millis()
            ));
            return;
        };

        let Ok(pause) = Duration::try_from_secs_f64(
            self.tick_interval.as_secs_f64() / self.schedule.effective_time_factor(),
        ) else {
            events.error(format!(
                "time factor {} cannot pace a {}ms tick",
                self.schedule.effective_time_factor(),
                self.tick_interval.as_millis()
            ));
            return;
        };

        let end = self.schedule.ends_at();
        let mut now = self.schedule.starts_at();

        debug!(
            date = %self.schedule.date(),
            pause_ms = pause.as_millis(),
            "Paced session starting"
        );
        events.starting();

        loop {
            events.virtual_time(now);
            events.clock_time(Local::now().naive_local());

            if now >= end || events.is_closed() {
                break;
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(date = %self.schedule.date(), "Paced session cancelled");
                    break;
                }
                () = tokio::time::sleep(pause) => {}
            }

            now = now.checked_add_signed(step).map_or(end, |t| t.min(end));
        }

        events.stopped();
    }
}

// ---------------------------------------------------------------------------
// Stub session
// ---------------------------------------------------------------------------

/// How stub sessions behave.
#[derive(Debug, Clone, Default)]
pub struct StubScript {
    /// Virtual/clock tick pairs emitted per day. Virtual tick `i` is at
    /// `start + i minutes`; clock tick `i` is 30 seconds later.
    pub ticks: u32,
    /// Wall time each day takes before its terminal event. Cancellation is
    /// deliberately ignored while waiting.
    pub day_duration: Duration,
    /// Days that end with an error event.
    pub failing_dates: Vec<NaiveDate>,
    /// Days that never send a terminal event and keep their sender alive.
    pub hanging_dates: Vec<NaiveDate>,
    /// Days that drop their sender without a terminal event.
    pub abandoned_dates: Vec<NaiveDate>,
}

/// Factory for scripted sessions that records every schedule it builds.
#[derive(Debug, Default)]
pub struct StubSessionFactory {
    script: StubScript,
    created: Mutex<Vec<SessionSchedule>>,
}

impl StubSessionFactory {
    /// Create a factory that plays `script` for every day.
    pub const fn new(script: StubScript) -> Self {
        Self {
            script,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Schedules of every session created so far, in creation order.
    pub fn created(&self) -> Vec<SessionSchedule> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The virtual time of tick `index` for `schedule`.
    pub fn virtual_tick(schedule: &SessionSchedule, index: u32) -> NaiveDateTime {
        schedule
            .starts_at()
            .checked_add_signed(TimeDelta::minutes(i64::from(index)))
            .unwrap_or_else(|| schedule.ends_at())
    }

    /// The clock time of tick `index` for `schedule`.
    pub fn clock_tick(schedule: &SessionSchedule, index: u32) -> NaiveDateTime {
        let virtual_time = Self::virtual_tick(schedule, index);
        virtual_time
            .checked_add_signed(TimeDelta::seconds(30))
            .unwrap_or(virtual_time)
    }
}

impl SessionFactory for StubSessionFactory {
    fn create(&self, schedule: &SessionSchedule) -> Box<dyn Session> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(schedule.clone());
        Box::new(StubSession {
            schedule: schedule.clone(),
            script: self.script.clone(),
        })
    }
}

/// A scripted session built by [`StubSessionFactory`].
#[derive(Debug)]
struct StubSession {
    schedule: SessionSchedule,
    script: StubScript,
}

impl Session for StubSession {
    fn start(self: Box<Self>, events: SessionEventSender, _cancel: CancellationToken) {
        tokio::spawn(async move {
            let date = self.schedule.date();
            events.starting();
            for i in 0..self.script.ticks {
                events.virtual_time(StubSessionFactory::virtual_tick(&self.schedule, i));
                events.clock_time(StubSessionFactory::clock_tick(&self.schedule, i));
            }
            if !self.script.day_duration.is_zero() {
                tokio::time::sleep(self.script.day_duration).await;
            }

            if self.script.hanging_dates.contains(&date) {
                let _held = events;
                std::future::pending::<()>().await;
            } else if self.script.abandoned_dates.contains(&date) {
                drop(events);
            } else if self.script.failing_dates.contains(&date) {
                events.error(format!("session failed on {date}"));
            } else {
                events.stopped();
            }
        });
    }
}
