//! Run settings and the store that persists them.
//!
//! [`RunSettings`] is the single user-editable configuration of a run: the
//! mode, the inclusive date range, the daily time window, and the
//! backtesting speed. It is serialized as camelCase JSON so the control API
//! and the settings file share one representation.
//!
//! The core only ever reads settings once per run through the
//! [`SettingsStore`] trait. [`JsonFileSettingsStore`] backs the service
//! binary; [`InMemorySettingsStore`] serves tests and embedding.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::{Validate, ValidationError};

/// Errors that can occur when reading or writing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file could not be read or written.
    #[error("settings I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The settings payload is not valid JSON for [`RunSettings`].
    #[error("settings JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The settings violate a field or cross-field constraint.
    #[error("invalid settings: {source}")]
    Invalid {
        /// The collected validation failures.
        #[from]
        source: validator::ValidationErrors,
    },
}

/// Which time stream is authoritative for subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Virtual time tracks wall time 1:1.
    #[default]
    Realtime,
    /// Virtual time advances at `time_factor` relative to wall time.
    Backtesting,
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Realtime => f.write_str("Realtime"),
            Self::Backtesting => f.write_str("Backtesting"),
        }
    }
}

/// The configuration of a run, read once when the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_bounds"))]
pub struct RunSettings {
    /// Realtime or backtesting.
    pub mode: Mode,

    /// First simulated day (inclusive).
    pub start_date: NaiveDate,

    /// Last simulated day (inclusive).
    pub end_date: NaiveDate,

    /// Time of day at which every session begins.
    pub start_time: NaiveTime,

    /// Time of day at which every session ends.
    pub end_time: NaiveTime,

    /// Speed multiplier, only meaningful in [`Mode::Backtesting`].
    #[validate(range(exclusive_min = 0.0))]
    pub time_factor: f64,
}

impl Default for RunSettings {
    /// A single realtime trading day today, 09:00 to 17:00.
    fn default() -> Self {
        let today = Local::now().date_naive();
        Self {
            mode: Mode::Realtime,
            start_date: today,
            end_date: today,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            time_factor: 1.0,
        }
    }
}

fn validate_bounds(settings: &RunSettings) -> Result<(), ValidationError> {
    if settings.start_date > settings.end_date {
        let mut err = ValidationError::new("date_range");
        err.message = Some("startDate must not be after endDate".into());
        return Err(err);
    }
    if settings.start_time > settings.end_time {
        let mut err = ValidationError::new("time_range");
        err.message = Some("startTime must not be after endTime".into());
        return Err(err);
    }
    Ok(())
}

/// Persistence for the single current [`RunSettings`].
///
/// Both operations may fail with an I/O error; callers surface it as is.
pub trait SettingsStore: Send + Sync {
    /// Load the current settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the backing storage cannot be read or
    /// does not contain valid settings JSON.
    fn get(&self) -> Result<RunSettings, SettingsError>;

    /// Replace the current settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the backing storage cannot be written.
    fn save(&self, settings: &RunSettings) -> Result<(), SettingsError>;
}

/// Settings stored as a pretty-printed JSON file.
///
/// A missing file reads as [`RunSettings::default`]. Writes go to a
/// sibling temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self) -> Result<RunSettings, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Settings file not found, using defaults");
                Ok(RunSettings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, settings: &RunSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// Settings held in memory.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: Mutex<RunSettings>,
}

impl InMemorySettingsStore {
    /// Create a store holding `settings`.
    pub const fn new(settings: RunSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get(&self) -> Result<RunSettings, SettingsError> {
        Ok(self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, settings: &RunSettings) -> Result<(), SettingsError> {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backtest_settings() -> RunSettings {
        RunSettings {
            mode: Mode::Backtesting,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            time_factor: 60.0,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("clocksignal-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    #[test]
    fn json_uses_camel_case_and_string_mode() {
        let json = serde_json::to_value(backtest_settings()).unwrap();
        assert_eq!(json["mode"], "Backtesting");
        assert_eq!(json["startDate"], "2024-01-01");
        assert_eq!(json["endDate"], "2024-01-02");
        assert_eq!(json["startTime"], "09:30:00");
        assert_eq!(json["timeFactor"], 60.0);
    }

    #[test]
    fn parses_payload_from_control_api() {
        let payload = r#"{
            "mode": "Realtime",
            "startDate": "2024-03-04",
            "endDate": "2024-03-08",
            "startTime": "08:00:00",
            "endTime": "12:00:00",
            "timeFactor": 1.0
        }"#;
        let settings: RunSettings = serde_json::from_str(payload).unwrap();
        assert_eq!(settings.mode, Mode::Realtime);
        assert_eq!(settings.end_date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
    }

    #[test]
    fn valid_settings_pass_validation() {
        assert!(backtest_settings().validate().is_ok());
        assert!(RunSettings::default().validate().is_ok());
    }

    #[test]
    fn reversed_date_range_is_rejected() {
        let mut settings = backtest_settings();
        settings.start_date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn single_day_range_is_accepted() {
        let mut settings = backtest_settings();
        settings.end_date = settings.start_date;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn non_positive_time_factor_is_rejected() {
        let mut settings = backtest_settings();
        settings.time_factor = 0.0;
        let errors = settings.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("time_factor"));

        settings.time_factor = -2.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn reversed_time_window_is_rejected() {
        let mut settings = backtest_settings();
        settings.end_time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn file_store_missing_file_reads_defaults() {
        let store = JsonFileSettingsStore::new(temp_path("missing.json"));
        let settings = store.get().unwrap();
        assert_eq!(settings.mode, Mode::Realtime);
        assert_eq!(settings.start_date, settings.end_date);
    }

    #[test]
    fn file_store_persists_saved_settings() {
        let path = temp_path("settings.json");
        let store = JsonFileSettingsStore::new(&path);
        store.save(&backtest_settings()).unwrap();

        let reopened = JsonFileSettingsStore::new(&path);
        assert_eq!(reopened.get().unwrap(), backtest_settings());
        assert!(!path.with_extension("json.tmp").exists());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn file_store_surfaces_corrupt_json() {
        let path = temp_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileSettingsStore::new(&path);
        assert!(matches!(store.get(), Err(SettingsError::Json { .. })));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn in_memory_store_replaces_settings() {
        let store = InMemorySettingsStore::default();
        store.save(&backtest_settings()).unwrap();
        assert_eq!(store.get().unwrap().mode, Mode::Backtesting);
    }
}
