//! Out-of-band alerts.
//!
//! A [`Notifier`] wraps one [`NotificationChannel`] with the shared retry
//! policy. [`Notifier::send`] never waits for delivery: each message is
//! handed to its own tokio task, retried up to `max_attempts` times, and a
//! final failure is only logged.

mod telegram;
mod webhook;

pub use telegram::TelegramChannel;
pub use webhook::{WebhookChannel, WebhookPayload};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::RetryPolicy;
use crate::error::NotifyError;

/// A destination that accepts plain-text messages.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make a single delivery attempt.
    async fn deliver(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("channel", &self.channel.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, policy: RetryPolicy) -> Self {
        Self { channel, policy }
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver in the background. The handle may be dropped; the task runs regardless.
    pub fn send(&self, message: impl Into<String>) -> JoinHandle<Result<u32, NotifyError>> {
        let notifier = self.clone();
        let message = message.into();
        tokio::spawn(async move {
            let result = notifier.deliver_with_retry(&message).await;
            if let Err(ref e) = result {
                error!(channel = notifier.channel.name(), error = %e, "Notification delivery failed");
            }
            result
        })
    }

    /// Returns the number of attempts used on success.
    pub async fn deliver_with_retry(&self, message: &str) -> Result<u32, NotifyError> {
        let channel = self.channel.name();
        let mut last_error = String::new();

        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let backoff = self.policy.backoff_for(attempt) + jitter(self.policy.base_backoff);
                debug!(channel, attempt, backoff_ms = backoff.as_millis() as u64, "Retrying notification");
                tokio::time::sleep(backoff).await;
            }

            let timeout = self.policy.attempt_timeout;
            match tokio::time::timeout(timeout, self.channel.deliver(message)).await {
                Ok(Ok(())) => {
                    debug!(channel, attempt, "Notification delivered");
                    return Ok(attempt + 1);
                }
                Ok(Err(e)) => {
                    warn!(channel, attempt, error = %e, "Notification attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    let e = NotifyError::Timeout { channel, timeout };
                    warn!(channel, attempt, error = %e, "Notification attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(NotifyError::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}

/// Up to a quarter of the base backoff, so parallel senders do not retry in lockstep.
fn jitter(base: Duration) -> Duration {
    let max_ms = base.as_millis() as u64 / 4;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingChannel;
    use super::*;
    use std::sync::atomic::Ordering;

    struct HangingChannel;

    #[async_trait]
    impl NotificationChannel for HangingChannel {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn deliver(&self, _text: &str) -> Result<(), NotifyError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(3)
            .with_attempt_timeout(1000)
            .with_base_backoff(10)
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let (channel, mut rx) = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), fast_policy());

        let attempts = notifier.send("hello").await.unwrap().unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (channel, mut rx) = RecordingChannel::failing(2);
        let notifier = Notifier::new(channel.clone(), fast_policy());

        let attempts = notifier.deliver_with_retry("retry me").await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(rx.recv().await.unwrap(), "retry me");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (channel, _rx) = RecordingChannel::failing(10);
        let notifier = Notifier::new(channel.clone(), fast_policy());

        let err = notifier.deliver_with_retry("lost").await.unwrap_err();
        assert!(matches!(err, NotifyError::Exhausted { attempts: 3, .. }), "{:?}", err);
        assert!(err.to_string().contains("HTTP 503"));
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_channel_is_bounded_by_attempts_times_timeout() {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_attempt_timeout(5000)
            .with_base_backoff(0);
        let notifier = Notifier::new(Arc::new(HangingChannel), policy);

        let start = tokio::time::Instant::now();
        let err = notifier.deliver_with_retry("stuck").await.unwrap_err();
        assert!(matches!(err, NotifyError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("timed out"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(16), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn send_returns_without_waiting_for_delivery() {
        let notifier = Notifier::new(Arc::new(HangingChannel), fast_policy());
        let start = tokio::time::Instant::now();
        let handle = notifier.send("background");
        assert_eq!(start.elapsed(), Duration::ZERO);
        handle.abort();
    }

    #[test]
    fn jitter_stays_within_quarter_of_base() {
        for _ in 0..100 {
            assert!(jitter(Duration::from_millis(400)) <= Duration::from_millis(100));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
