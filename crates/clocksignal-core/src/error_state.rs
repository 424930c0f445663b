//! The last error reported by a run.

use std::sync::{PoisonError, RwLock};

/// Holds the most recent error message, if any.
///
/// Written on session or run failure, read by status queries. Nothing
/// clears it: a later successful run leaves the previous message in place.
#[derive(Debug, Default)]
pub struct ErrorState {
    message: RwLock<Option<String>>,
}

impl ErrorState {
    /// Create an empty error state.
    pub const fn new() -> Self {
        Self {
            message: RwLock::new(None),
        }
    }

    /// Replace the stored message.
    pub fn record(&self, message: impl Into<String>) {
        *self.message.write().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// The stored message, if any.
    pub fn message(&self) -> Option<String> {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an error has been recorded.
    pub fn is_error(&self) -> bool {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
