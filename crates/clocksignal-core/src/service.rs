//! Run lifecycle control.
//!
//! [`ClockSignalService`] owns the run state and is the only way to start
//! or stop a run. It is shared between the transport handlers and the
//! background run task.
//!
//! # Architecture
//!
//! - The run slot (cancellation token + task handle) sits behind a
//!   [`tokio::sync::Mutex`], so concurrent `start`/`stop` calls see one
//!   consistent answer to "is a run active".
//! - `running` is an [`AtomicBool`] so [`status`](ClockSignalService::status)
//!   never waits on the guard, including while a `stop` is in progress.
//! - The run task clears `running` itself when the date range is
//!   exhausted, through a drop guard that also covers panics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error_state::ErrorState;
use crate::sequencer::{self, DaySequencer};

/// Default bound on how long [`ClockSignalService::stop`] waits.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(3000);

/// Errors surfaced to callers of `start` and `stop`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// A run is already active.
    #[error("a run is already active")]
    AlreadyRunning,

    /// The run task did not finish within the stop timeout. It is still
    /// running and the service still reports `running`.
    #[error("run did not stop within {timeout_ms}ms")]
    StopTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

/// Identifier minted for every started run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JSON-serializable run status for the control API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// Whether a run task is active.
    pub is_running: bool,
    /// Whether an error has been recorded.
    pub is_error: bool,
    /// The recorded error, if any.
    pub error_message: Option<String>,
}

#[derive(Debug, Default)]
struct RunSlot {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Clears the running flag when the run task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Lifecycle controller: at most one run at a time.
pub struct ClockSignalService {
    sequencer: DaySequencer,
    errors: Arc<ErrorState>,
    running: Arc<AtomicBool>,
    slot: Mutex<RunSlot>,
    stop_timeout: Duration,
}

impl ClockSignalService {
    /// Create an idle service.
    ///
    /// `errors` must be the same error state the sequencer writes to, so
    /// that [`status`](Self::status) reports session failures.
    pub fn new(sequencer: DaySequencer, errors: Arc<ErrorState>, stop_timeout: Duration) -> Self {
        Self {
            sequencer,
            errors,
            running: Arc::new(AtomicBool::new(false)),
            slot: Mutex::new(RunSlot::default()),
            stop_timeout,
        }
    }

    /// Start a run on a background task.
    ///
    /// Returns as soon as the task is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::AlreadyRunning`] if a run is active. No task
    /// is spawned in that case.
    pub async fn start(&self) -> Result<RunId, ControlError> {
        let mut slot = self.slot.lock().await;

        if self.running.load(Ordering::Acquire) {
            warn!("Start rejected, a run is already active");
            return Err(ControlError::AlreadyRunning);
        }

        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        self.running.store(true, Ordering::Release);

        let guard = RunningGuard(Arc::clone(&self.running));
        let sequencer = self.sequencer.clone();
        let token = cancel.clone();
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                let result = sequencer.run(&token).await;
                sequencer::log_run_end(&result);
            }
            .instrument(info_span!("run", %run_id)),
        );

        // A previous run that ended on its own leaves a finished handle here.
        slot.cancel = Some(cancel);
        slot.task = Some(task);

        info!(%run_id, "Run started");
        Ok(run_id)
    }

    /// Request cancellation and wait for the run task to finish.
    ///
    /// Succeeds immediately when no run was ever started or the last one
    /// has already been reaped.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::StopTimeout`] if the task is still running
    /// after the stop timeout. The task is left alive and the service keeps
    /// reporting `running`.
    pub async fn stop(&self) -> Result<(), ControlError> {
        let mut slot = self.slot.lock().await;

        if let Some(cancel) = &slot.cancel {
            cancel.cancel();
        }

        if let Some(task) = slot.task.as_mut() {
            match tokio::time::timeout(self.stop_timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    error!(error = %join_error, "Run task panicked");
                }
                Err(_elapsed) => {
                    let timeout_ms = u64::try_from(self.stop_timeout.as_millis()).unwrap_or(u64::MAX);
                    error!(timeout_ms, "Could not stop run task within timeout");
                    return Err(ControlError::StopTimeout { timeout_ms });
                }
            }
            info!("Run stopped");
        }

        slot.cancel = None;
        slot.task = None;
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Current run status. Never waits on `start` or `stop`.
    pub fn status(&self) -> RunStatus {
        let error_message = self.errors.message();
        RunStatus {
            is_running: self.running.load(Ordering::Acquire),
            is_error: error_message.is_some(),
            error_message,
        }
    }

    /// Whether a run task is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The configured stop timeout.
    pub const fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }
}
