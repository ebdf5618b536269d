//! Fan-out delivery with per-recipient failure isolation.

use super::registry::SubscriptionRegistry;
use super::{DeliveryError, PushSubscription, PushTransport};
use crate::auth::Username;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of deliveries in flight at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// One recipient whose delivery failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub username: Username,
    pub error: DeliveryError,
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sorted by username.
    pub failures: Vec<DeliveryFailure>,
}

/// Error from [`BroadcastEngine::send_to`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetedSendError {
    /// The user never saved a subscription; the client should re-register.
    #[error("no push subscription registered")]
    NoSubscription,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Delivers payloads to every registered subscription.
pub struct BroadcastEngine {
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn PushTransport>,
    delivery_timeout: Duration,
    max_in_flight: usize,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<SubscriptionRegistry>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            registry,
            transport,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Deliver `payload` to every registered user except `exclude`.
    ///
    /// Never fails as a whole: each recipient's error is caught and counted.
    pub async fn broadcast(&self, payload: &[u8], exclude: Option<&Username>) -> DeliveryReport {
        let targets: Vec<(Username, PushSubscription)> = self
            .registry
            .all()
            .into_iter()
            .filter(|(username, _)| exclude != Some(username))
            .collect();

        let attempted = targets.len();
        let outcomes: Vec<(Username, Result<(), DeliveryError>)> = stream::iter(targets)
            .map(|(username, subscription)| async move {
                let result = self.attempt(&subscription, payload).await;
                (username, result)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        let mut report = DeliveryReport {
            attempted,
            ..DeliveryReport::default()
        };
        for (username, result) in outcomes {
            match result {
                Ok(()) => {
                    tracing::debug!(user = %username, "Push delivered");
                    report.succeeded += 1;
                }
                Err(error) => {
                    tracing::warn!(user = %username, "Push delivery failed: {error}");
                    report.failed += 1;
                    report.failures.push(DeliveryFailure { username, error });
                }
            }
        }
        report.failures.sort_by(|a, b| a.username.cmp(&b.username));

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Broadcast finished"
        );
        report
    }

    /// Deliver `payload` to a single user.
    pub async fn send_to(
        &self,
        username: &Username,
        payload: &[u8],
    ) -> Result<(), TargetedSendError> {
        let subscription = self
            .registry
            .get(username)
            .ok_or(TargetedSendError::NoSubscription)?;
        self.attempt(&subscription, payload).await?;
        tracing::info!(user = %username, "Targeted push delivered");
        Ok(())
    }

    async fn attempt(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(
            self.delivery_timeout,
            self.transport.deliver(subscription, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::registry::InMemorySubscriptionStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records endpoints it delivered to; fails or hangs for chosen ones.
    #[derive(Default)]
    struct MockTransport {
        delivered: Mutex<Vec<String>>,
        fail_for: Vec<String>,
        hang_for: Vec<String>,
    }

    #[async_trait]
    impl PushTransport for MockTransport {
        async fn deliver(
            &self,
            subscription: &PushSubscription,
            _payload: &[u8],
        ) -> Result<(), DeliveryError> {
            let endpoint = subscription.endpoint().unwrap_or_default().to_string();
            if self.hang_for.contains(&endpoint) {
                std::future::pending::<()>().await;
            }
            if self.fail_for.contains(&endpoint) {
                return Err(DeliveryError::Rejected { status: 500 });
            }
            self.delivered.lock().push(endpoint);
            Ok(())
        }
    }

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn sub(endpoint: &str) -> PushSubscription {
        PushSubscription::new(json!({ "endpoint": endpoint })).unwrap()
    }

    fn setup(transport: Arc<MockTransport>, users: &[&str]) -> BroadcastEngine {
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(
            InMemorySubscriptionStore::new(),
        )));
        for name in users {
            registry.save(&user(name), sub(name));
        }
        BroadcastEngine::new(registry, transport)
    }

    #[tokio::test]
    async fn delivers_to_everyone() {
        let transport = Arc::new(MockTransport::default());
        let engine = setup(Arc::clone(&transport), &["alice", "bob", "carol"]);

        let report = engine.broadcast(b"hi", None).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(transport.delivered.lock().len(), 3);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_rest() {
        let transport = Arc::new(MockTransport {
            fail_for: vec!["bob".into()],
            ..MockTransport::default()
        });
        let engine = setup(Arc::clone(&transport), &["alice", "bob", "carol", "dave"]);

        let report = engine.broadcast(b"hi", None).await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].username, user("bob"));
        assert_eq!(
            report.failures[0].error,
            DeliveryError::Rejected { status: 500 }
        );
    }

    #[tokio::test]
    async fn exclude_skips_only_that_user() {
        let transport = Arc::new(MockTransport::default());
        let engine = setup(Arc::clone(&transport), &["alice", "bob"]);

        let report = engine.broadcast(b"hi", Some(&user("alice"))).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(*transport.delivered.lock(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn hung_delivery_times_out_per_recipient() {
        let transport = Arc::new(MockTransport {
            hang_for: vec!["alice".into()],
            ..MockTransport::default()
        });
        let engine = setup(Arc::clone(&transport), &["alice", "bob"])
            .with_delivery_timeout(Duration::from_millis(50));

        let report = engine.broadcast(b"hi", None).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.failures[0].error,
            DeliveryError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_report() {
        let engine = setup(Arc::new(MockTransport::default()), &[]);
        assert_eq!(engine.broadcast(b"hi", None).await, DeliveryReport::default());
    }

    #[tokio::test]
    async fn failures_are_sorted_by_username() {
        let transport = Arc::new(MockTransport {
            fail_for: vec!["zed".into(), "amy".into(), "kim".into()],
            ..MockTransport::default()
        });
        let engine = setup(transport, &["zed", "kim", "amy"]).with_max_in_flight(3);

        let report = engine.broadcast(b"hi", None).await;
        let names: Vec<_> = report.failures.iter().map(|f| f.username.to_string()).collect();
        assert_eq!(names, ["amy", "kim", "zed"]);
    }

    #[tokio::test]
    async fn send_to_without_subscription() {
        let engine = setup(Arc::new(MockTransport::default()), &["alice"]);
        assert_eq!(
            engine.send_to(&user("bob"), b"hi").await,
            Err(TargetedSendError::NoSubscription)
        );
        assert_eq!(engine.send_to(&user("alice"), b"hi").await, Ok(()));
    }

    #[tokio::test]
    async fn send_to_surfaces_delivery_error() {
        let transport = Arc::new(MockTransport {
            fail_for: vec!["alice".into()],
            ..MockTransport::default()
        });
        let engine = setup(transport, &["alice"]);
        assert_eq!(
            engine.send_to(&user("alice"), b"hi").await,
            Err(TargetedSendError::Delivery(DeliveryError::Rejected {
                status: 500
            }))
        );
    }
}
