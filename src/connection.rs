//! Connection contract between the posting pool and NNTP sessions
//!
//! The pool never touches sockets itself. A [`Connection`] implementation owns
//! the handshake, authentication and transmission for one session and reports
//! back through its [`Notifier`]:
//!
//! - [`Notifier::ready`] once connected, and again after every finished post
//! - [`Notifier::disconnected`] whenever the session drops (setting its own
//!   [`Connection::retry_at`] first)
//!
//! [`ReconnectPolicy`] is provided for implementations that want the standard
//! exponential backoff when computing their retry time.

use crate::article::ArticlePayload;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Externally observable state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; may carry a future retry time
    Disconnected,
    /// Handshake or authentication in progress
    Connecting,
    /// Connected with no article in flight
    Idle,
    /// Article in flight
    Posting,
    /// Shutting down or failed; will report `Disconnected` next
    Closing,
}

/// A single NNTP session driven by the posting pool
///
/// Both [`connect`](Self::connect) and [`post`](Self::post) only *begin* work
/// and must return immediately. Completion is signalled through the
/// [`Notifier`] handed to the connection factory.
pub trait Connection {
    /// Current session state
    fn state(&self) -> ConnectionState;

    /// When a disconnected session may be reconnected
    ///
    /// Only meaningful while [`state`](Self::state) is
    /// [`ConnectionState::Disconnected`]. `None` means "immediately".
    fn retry_at(&self) -> Option<Instant>;

    /// Begin connecting and authenticating
    fn connect(&mut self);

    /// Begin transmitting a fully rendered article (POST + body + terminator)
    fn post(&mut self, payload: ArticlePayload);
}

/// Notification sent from a connection to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection is connected and has no article in flight
    Ready(usize),
    /// Connection dropped; any in-flight article is lost
    Disconnected(usize),
}

/// Handle a connection uses to report state transitions to the pool
#[derive(Debug, Clone)]
pub struct Notifier {
    id: usize,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Notifier {
    pub(crate) fn new(id: usize, tx: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { id, tx }
    }

    /// Index of the connection this notifier belongs to
    pub fn id(&self) -> usize {
        self.id
    }

    /// Report that the connection is idle and can take an article
    pub fn ready(&self) {
        self.send(ConnectionEvent::Ready(self.id));
    }

    /// Report that the connection dropped
    pub fn disconnected(&self) {
        self.send(ConnectionEvent::Disconnected(self.id));
    }

    fn send(&self, event: ConnectionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Posting pool gone, dropping {:?}", event);
        }
    }
}

/// Reconnect backoff and abandon policy
///
/// The backoff part is used by [`Connection`] implementations to compute
/// their retry time. `max_attempts` is enforced by the pool: a connection that
/// is reconnected that many times in a row without ever reporting ready is
/// abandoned. `None` keeps retrying forever.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReconnectPolicy {
    /// Consecutive reconnects before a connection is abandoned
    pub max_attempts: Option<u32>,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier (exponential factor)
    pub backoff_multiplier: f64,
    /// Whether to add jitter so connections don't reconnect in lockstep
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that abandons a connection after `max_attempts` failed reconnects
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Backoff before reconnect attempt `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let base_ms = ((self.initial_backoff_ms as f64 * factor) as u64).min(self.max_backoff_ms);

        let sleep_ms = if self.jitter && base_ms > 1 {
            // Add 0-50% random jitter
            base_ms + rand::thread_rng().gen_range(0..=(base_ms / 2))
        } else {
            base_ms
        };

        Duration::from_millis(sleep_ms)
    }

    /// Instant at which reconnect attempt `attempt` becomes due
    pub fn retry_at(&self, attempt: u32) -> Instant {
        Instant::now() + self.backoff(attempt)
    }

    /// Whether `attempts` consecutive reconnects exhaust this policy
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy_default() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.initial_backoff_ms, 1000);
        assert_eq!(policy.max_backoff_ms, 60_000);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert!(policy.jitter);
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = ReconnectPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(20), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = ReconnectPolicy::default();
        for _ in 0..100 {
            let delay = policy.backoff(0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_with_max_attempts() {
        let policy = ReconnectPolicy::with_max_attempts(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn test_notifier_sends_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(2, tx);
        assert_eq!(notifier.id(), 2);

        notifier.ready();
        notifier.disconnected();

        assert_eq!(rx.try_recv().unwrap(), ConnectionEvent::Ready(2));
        assert_eq!(rx.try_recv().unwrap(), ConnectionEvent::Disconnected(2));
    }

    #[test]
    fn test_notifier_survives_closed_pool() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Notifier::new(0, tx).ready();
    }
}
