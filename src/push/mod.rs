//! Web push subscriptions and fan-out delivery.
//!
//! ```text
//! client saves PushSubscription (endpoint + keys)
//!     ↓
//! SubscriptionRegistry (one descriptor per user, last write wins)
//!     ↓
//! BroadcastEngine snapshots the registry, delivers to each via PushTransport
//!     ↓
//! DeliveryReport (attempted / succeeded / failed + per-user failures)
//! ```
//!
//! Descriptors are stored verbatim; only the transport looks inside them.

pub mod broadcast;
pub mod registry;
pub mod vapid;
pub mod webpush;

use crate::error::ValidationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use broadcast::{BroadcastEngine, DeliveryFailure, DeliveryReport, TargetedSendError};
pub use registry::{InMemorySubscriptionStore, SubscriptionRegistry, SubscriptionStore};
pub use vapid::VapidKeys;
pub use webpush::WebPushTransport;

/// A browser's push subscription as sent by `PushSubscription.toJSON()`.
///
/// Kept as raw JSON so whatever the push-capable agent sent is what gets
/// stored and handed back to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushSubscription(serde_json::Value);

impl PushSubscription {
    /// Wrap a client-supplied descriptor. Only `null` is rejected.
    pub fn new(value: serde_json::Value) -> Result<Self, ValidationError> {
        if value.is_null() {
            return Err(ValidationError::MissingSubscription);
        }
        Ok(Self(value))
    }

    /// Push service endpoint URL, if the descriptor carries one.
    pub fn endpoint(&self) -> Option<&str> {
        self.0.get("endpoint").and_then(serde_json::Value::as_str)
    }

    /// `keys.<name>` (e.g. `p256dh`, `auth`), if present.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.0
            .get("keys")
            .and_then(|keys| keys.get(name))
            .and_then(serde_json::Value::as_str)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Why a single delivery attempt failed. Recorded per recipient in the
/// [`DeliveryReport`]; never aborts a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// The attempt did not finish within the per-delivery timeout.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The push service says the subscription no longer exists (404/410).
    #[error("subscription expired or unsubscribed")]
    Gone,

    /// The push service answered with a non-success status.
    #[error("push service rejected the message (HTTP {status})")]
    Rejected {
        /// HTTP status returned by the push service.
        status: u16,
    },

    /// The stored descriptor lacks the fields needed to deliver.
    #[error("invalid push subscription: {0}")]
    InvalidSubscription(String),

    /// Encryption, signing or network failure before a response arrived.
    #[error("push transport error: {0}")]
    Transport(String),
}

/// Delivers one payload to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_descriptor_is_rejected() {
        assert_eq!(
            PushSubscription::new(serde_json::Value::Null).unwrap_err(),
            ValidationError::MissingSubscription
        );
    }

    #[test]
    fn descriptor_is_kept_verbatim() {
        let raw = json!({
            "endpoint": "https://push.example.com/abc",
            "expirationTime": null,
            "keys": { "p256dh": "pk", "auth": "au" },
            "vendorExtra": 7
        });
        let sub = PushSubscription::new(raw.clone()).unwrap();
        assert_eq!(sub.as_json(), &raw);
        assert_eq!(sub.endpoint(), Some("https://push.example.com/abc"));
        assert_eq!(sub.key("p256dh"), Some("pk"));
        assert_eq!(sub.key("auth"), Some("au"));
        assert_eq!(serde_json::to_value(&sub).unwrap(), raw);
    }

    #[test]
    fn accessors_tolerate_odd_shapes() {
        let sub = PushSubscription::new(json!("just-a-string")).unwrap();
        assert!(sub.endpoint().is_none());
        assert!(sub.key("auth").is_none());
    }
}
