//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: clocksignal_core::config::ConfigError,
    },

    /// The API server failed to start.
    #[error("server error: {source}")]
    Server {
        /// The underlying startup error.
        #[from]
        source: clocksignal_observer::startup::StartupError,
    },

    /// The active run could not be stopped during shutdown.
    #[error("shutdown error: {source}")]
    Shutdown {
        /// The underlying control error.
        #[from]
        source: clocksignal_core::service::ControlError,
    },
}
