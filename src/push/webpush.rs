//! Web push delivery over HTTP (RFC 8030).
//!
//! Uses the `web-push` crate for RFC 8291 payload encryption and VAPID
//! signing, then sends the request through a shared `reqwest::Client` so
//! connections to the same push service are pooled across a broadcast.

use super::vapid::VapidKeys;
use super::{DeliveryError, PushSubscription, PushTransport};
use async_trait::async_trait;
use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder};

/// How long the push service should hold an undelivered message.
const MESSAGE_TTL_SECS: u32 = 86_400;

/// [`PushTransport`] that speaks the Web Push protocol.
pub struct WebPushTransport {
    client: reqwest::Client,
    vapid: VapidKeys,
    subject: String,
}

impl WebPushTransport {
    /// `subject` is the VAPID `sub` claim (`mailto:` or `https:` contact).
    pub fn new(client: reqwest::Client, vapid: VapidKeys, subject: impl Into<String>) -> Self {
        Self {
            client,
            vapid,
            subject: subject.into(),
        }
    }

    pub fn public_key(&self) -> &str {
        self.vapid.public_key_base64url()
    }

    fn subscription_info(subscription: &PushSubscription) -> Result<SubscriptionInfo, DeliveryError> {
        let endpoint = subscription
            .endpoint()
            .ok_or_else(|| DeliveryError::InvalidSubscription("missing endpoint".into()))?;
        let p256dh = subscription
            .key("p256dh")
            .ok_or_else(|| DeliveryError::InvalidSubscription("missing keys.p256dh".into()))?;
        let auth = subscription
            .key("auth")
            .ok_or_else(|| DeliveryError::InvalidSubscription("missing keys.auth".into()))?;
        Ok(SubscriptionInfo::new(endpoint, p256dh, auth))
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let sub_info = Self::subscription_info(subscription)?;

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(self.vapid.private_key_base64url(), &sub_info)
                .map_err(|e| DeliveryError::Transport(format!("VAPID key rejected: {e}")))?;
        sig_builder.add_claim("sub", self.subject.as_str());
        let signature = sig_builder
            .build()
            .map_err(|e| DeliveryError::Transport(format!("VAPID signing failed: {e}")))?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(MESSAGE_TTL_SECS);
        let message = builder
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to build message: {e}")))?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            request = request.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("HTTP request failed: {e}")))?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            404 | 410 => Err(DeliveryError::Gone),
            status => Err(DeliveryError::Rejected { status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
    use p256::elliptic_curve::rand_core::{OsRng, RngCore};
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A descriptor with real P-256 client keys so encryption succeeds.
    fn browser_subscription(endpoint: &str) -> PushSubscription {
        let client_secret = p256::SecretKey::random(&mut OsRng);
        let p256dh = client_secret.public_key().to_encoded_point(false);
        let mut auth = [0u8; 16];
        OsRng.fill_bytes(&mut auth);

        PushSubscription::new(json!({
            "endpoint": endpoint,
            "expirationTime": null,
            "keys": {
                "p256dh": BASE64URL.encode(p256dh.as_bytes()),
                "auth": BASE64URL.encode(auth),
            }
        }))
        .unwrap()
    }

    fn transport() -> WebPushTransport {
        WebPushTransport::new(
            reqwest::Client::new(),
            VapidKeys::generate(),
            "mailto:ops@example.com",
        )
    }

    #[tokio::test]
    async fn delivers_encrypted_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/abc"))
            .and(header("Content-Encoding", "aes128gcm"))
            .and(header_exists("Authorization"))
            .and(header_exists("TTL"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sub = browser_subscription(&format!("{}/push/abc", server.uri()));
        transport().deliver(&sub, b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn gone_subscription_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let sub = browser_subscription(&format!("{}/push/old", server.uri()));
        assert_eq!(
            transport().deliver(&sub, b"hello").await,
            Err(DeliveryError::Gone)
        );
    }

    #[tokio::test]
    async fn server_error_is_rejected_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sub = browser_subscription(&format!("{}/push/busy", server.uri()));
        assert_eq!(
            transport().deliver(&sub, b"hello").await,
            Err(DeliveryError::Rejected { status: 503 })
        );
    }

    #[tokio::test]
    async fn descriptor_without_keys_is_invalid() {
        let sub = PushSubscription::new(json!({ "endpoint": "https://push.example.com/x" }))
            .unwrap();
        assert!(matches!(
            transport().deliver(&sub, b"hello").await,
            Err(DeliveryError::InvalidSubscription(_))
        ));
    }
}
