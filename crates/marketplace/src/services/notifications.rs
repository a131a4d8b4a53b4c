//! User notifications.
//!
//! Notifications are written by the `create-notification` function with the
//! service role, so a buyer can notify a farmer without write access to the
//! farmer's rows. Delivery is at-least-once: transient failures are retried,
//! and every request carries an idempotency key derived from the
//! notification's kind, related record and recipient so the function can drop
//! duplicates.

use std::sync::Arc;
use std::time::Duration;

use rural_grow_core::{NotificationKind, UserId};
use serde_json::json;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::baas::{AccessToken, BaasError, FunctionsApi};

const FUNCTION: &str = "create-notification";

/// Error returned when a notification could not be delivered.
#[derive(Debug, Error)]
#[error("notification not delivered after {attempts} attempt(s): {source}")]
pub struct NotificationError {
    pub attempts: u32,
    #[source]
    pub source: BaasError,
}

/// A notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    /// Record the notification is about (checkout session, request, order).
    pub related_id: Option<String>,
}

impl Notification {
    /// Key identifying this notification across retries.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            self.related_id.as_deref().unwrap_or("-"),
            self.recipient
        )
    }
}

/// Retry schedule for notification delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32 << retry.saturating_sub(1).min(16))
    }
}

/// Sends notifications through the `create-notification` function.
#[derive(Clone)]
pub struct Notifier {
    functions: Arc<dyn FunctionsApi>,
    policy: RetryPolicy,
}

impl Notifier {
    #[must_use]
    pub fn new(functions: Arc<dyn FunctionsApi>) -> Self {
        Self::with_policy(functions, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(functions: Arc<dyn FunctionsApi>, policy: RetryPolicy) -> Self {
        Self { functions, policy }
    }

    /// Deliver a notification, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError` when a non-transient error occurs or the
    /// attempts run out.
    #[instrument(skip(self, notification, token), fields(
        recipient = %notification.recipient,
        kind = notification.kind.as_str(),
    ))]
    pub async fn send(
        &self,
        notification: &Notification,
        token: Option<&AccessToken>,
    ) -> Result<(), NotificationError> {
        let body = json!({
            "userId": notification.recipient,
            "title": notification.title,
            "message": notification.message,
            "type": notification.kind.as_str(),
            "relatedId": notification.related_id,
            "idempotencyKey": notification.idempotency_key(),
        });

        let mut attempt = 1;
        loop {
            match self.functions.invoke(FUNCTION, body.clone(), token).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "Notification failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(NotificationError {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}
