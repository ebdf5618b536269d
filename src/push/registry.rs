//! Per-user push subscription registry.
//!
//! One descriptor per user, overwritten on every save. Broadcasts read a
//! snapshot copy, so a save racing with a broadcast can never make the
//! broadcast crash or send twice; the racing user gets either the old or
//! the new descriptor.

use super::PushSubscription;
use crate::auth::Username;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Backing storage for descriptors.
pub trait SubscriptionStore: Send + Sync {
    fn get(&self, username: &Username) -> Option<PushSubscription>;
    fn set(&self, username: Username, subscription: PushSubscription);
    /// Atomic copy of every entry, ordered by username.
    fn snapshot(&self) -> Vec<(Username, PushSubscription)>;
}

/// Process-memory [`SubscriptionStore`].
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: RwLock<BTreeMap<Username, PushSubscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn get(&self, username: &Username) -> Option<PushSubscription> {
        self.subscriptions.read().get(username).cloned()
    }

    fn set(&self, username: Username, subscription: PushSubscription) {
        self.subscriptions.write().insert(username, subscription);
    }

    fn snapshot(&self) -> Vec<(Username, PushSubscription)> {
        self.subscriptions
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Records each user's current push endpoint.
///
/// Callers must have passed the auth guard for `username` before saving.
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Add or replace the subscription for a user.
    pub fn save(&self, username: &Username, subscription: PushSubscription) {
        self.store.set(username.clone(), subscription);
        tracing::info!(user = %username, "Push subscription saved");
    }

    pub fn get(&self, username: &Username) -> Option<PushSubscription> {
        self.store.get(username)
    }

    pub fn contains(&self, username: &Username) -> bool {
        self.store.get(username).is_some()
    }

    /// Snapshot of all subscriptions, ordered by username.
    pub fn all(&self) -> Vec<(Username, PushSubscription)> {
        self.store.snapshot()
    }
}
