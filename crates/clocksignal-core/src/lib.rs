//! Run lifecycle, day sequencing, and event relay for the Clock Signal
//! service.
//!
//! A run walks a configured date range one calendar day at a time. For each
//! day a session is created from the day's schedule, its events are relayed
//! to subscribers, and the next day starts only after the session reports
//! `Stopped` or `Error`.
//!
//! # Modules
//!
//! - [`config`] -- Service configuration loaded from `clocksignal-config.yaml`.
//! - [`settings`] -- [`RunSettings`] and the [`SettingsStore`] persistence trait.
//! - [`schedule`] -- Per-day [`SessionSchedule`] derivation.
//! - [`session`] -- The session contract, the paced session, and the stub
//!   session used in tests.
//! - [`relay`] -- Session event routing into [`Notification`]s.
//! - [`error_state`] -- The last recorded run error.
//! - [`sequencer`] -- The per-run day loop.
//! - [`service`] -- [`ClockSignalService`], the start/stop/status controller.
//!
//! [`RunSettings`]: settings::RunSettings
//! [`SettingsStore`]: settings::SettingsStore
//! [`SessionSchedule`]: schedule::SessionSchedule
//! [`Notification`]: relay::Notification
//! [`ClockSignalService`]: service::ClockSignalService

pub mod config;
pub mod error_state;
pub mod relay;
pub mod schedule;
pub mod sequencer;
pub mod service;
pub mod session;
pub mod settings;
