//! Shared application state for the Clock Signal API server.
//!
//! [`AppState`] holds the notification hub that feeds `WebSocket`
//! subscribers, the lifecycle controller, and the settings store that the
//! REST endpoints read and write.

use std::sync::Arc;
use std::time::Duration;

use clocksignal_core::error_state::ErrorState;
use clocksignal_core::relay::{Notification, NotificationSink};
use clocksignal_core::sequencer::DaySequencer;
use clocksignal_core::service::ClockSignalService;
use clocksignal_core::session::SessionFactory;
use clocksignal_core::settings::SettingsStore;
use tokio::sync::broadcast;
use tracing::debug;

/// Default capacity of the notification broadcast channel.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Fan-out point for notifications.
///
/// Every `WebSocket` connection holds one receiver. Publishing never
/// blocks and never fails; with no subscribers the message is dropped.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Create a hub buffering up to `capacity` notifications per
    /// subscriber. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to the notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification to all connected subscribers.
    ///
    /// Returns the number of receivers that received the message.
    /// Returns 0 if no clients are connected (this is not an error).
    pub fn broadcast(&self, notification: Notification) -> usize {
        // send returns Err only when there are zero receivers.
        self.tx.send(notification).unwrap_or(0)
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl NotificationSink for NotificationHub {
    fn publish(&self, notification: Notification) {
        let receivers = self.broadcast(notification);
        debug!(receivers, "Notification published");
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Notification fan-out shared with the run's event relay.
    pub hub: Arc<NotificationHub>,
    /// The run lifecycle controller.
    pub service: Arc<ClockSignalService>,
    /// Run settings persistence.
    pub settings: Arc<dyn SettingsStore>,
}

impl AppState {
    /// Wire a complete service around `settings` and `sessions`.
    ///
    /// The hub is the relay's notification sink, so every event a session
    /// reports reaches the `WebSocket` subscribers of this state.
    pub fn assemble(
        settings: Arc<dyn SettingsStore>,
        sessions: Arc<dyn SessionFactory>,
        notification_capacity: usize,
        stop_timeout: Duration,
    ) -> Self {
        let hub = Arc::new(NotificationHub::new(notification_capacity));
        let errors = Arc::new(ErrorState::new());
        let sequencer = DaySequencer::new(
            Arc::clone(&settings),
            sessions,
            Arc::clone(&hub) as Arc<dyn NotificationSink>,
            Arc::clone(&errors),
        );
        let service = Arc::new(ClockSignalService::new(sequencer, errors, stop_timeout));
        Self {
            hub,
            service,
            settings,
        }
    }

    /// Subscribe to the notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use clocksignal_core::relay::SessionState;

    use super::*;

    #[test]
    fn broadcast_without_subscribers_is_dropped() {
        let hub = NotificationHub::new(4);
        let receivers = hub.broadcast(Notification::StateChanged {
            state: SessionState::Starting,
        });
        assert_eq!(receivers, 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_notification() {
        let hub = NotificationHub::new(4);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 1)
            .unwrap();
        hub.publish(Notification::NewClockTime { time });

        assert_eq!(a.recv().await.unwrap(), Notification::NewClockTime { time });
        assert_eq!(b.recv().await.unwrap(), Notification::NewClockTime { time });
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = NotificationHub::new(2);
        let mut rx = hub.subscribe();

        for state in [SessionState::Starting, SessionState::Stopped, SessionState::Error] {
            hub.publish(Notification::StateChanged { state });
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::StateChanged {
                state: SessionState::Stopped
            }
        );
    }
}
