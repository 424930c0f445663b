//! Per-day session schedule derived from [`RunSettings`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::settings::{Mode, RunSettings};

/// Errors that can occur when deriving a schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The requested day lies outside the configured range.
    #[error("date {date} is outside the configured range {start}..={end}")]
    DateOutOfRange {
        /// The requested day.
        date: NaiveDate,
        /// First configured day.
        start: NaiveDate,
        /// Last configured day.
        end: NaiveDate,
    },
}

/// The schedule of a single session day.
///
/// Built once per loop iteration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSchedule {
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    effective_time_factor: f64,
}

impl SessionSchedule {
    /// Derive the schedule for `date` from the run settings.
    ///
    /// The effective time factor is `1.0` in [`Mode::Realtime`] and the
    /// configured factor in [`Mode::Backtesting`].
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::DateOutOfRange`] if `date` is not within
    /// `[start_date, end_date]`.
    pub fn for_date(settings: &RunSettings, date: NaiveDate) -> Result<Self, ScheduleError> {
        if date < settings.start_date || date > settings.end_date {
            return Err(ScheduleError::DateOutOfRange {
                date,
                start: settings.start_date,
                end: settings.end_date,
            });
        }

        let effective_time_factor = match settings.mode {
            Mode::Realtime => 1.0,
            Mode::Backtesting => settings.time_factor,
        };

        Ok(Self {
            date,
            start_time: settings.start_time,
            end_time: settings.end_time,
            effective_time_factor,
        })
    }

    /// The simulated day.
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Time of day the session begins.
    pub const fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    /// Time of day the session ends.
    pub const fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    /// Speed multiplier applied by the session engine.
    pub const fn effective_time_factor(&self) -> f64 {
        self.effective_time_factor
    }

    /// First virtual instant of the session.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Last virtual instant of the session.
    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}
