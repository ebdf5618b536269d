//! `NotifyService`: the operations the HTTP gateway calls.
//!
//! Wires the credential layer (hasher, token store, guard, allow-list) to
//! the push layer (registry, broadcast engine) and the login handshake.
//! Every authenticated operation checks `(username, raw token)` first and
//! fails closed.

use crate::auth::{
    AllowList, AuthGuard, CredentialHasher, InMemoryCredentialStore, SessionToken, TokenDigest,
    TokenStore, Username,
};
use crate::config::{Config, Secret};
use crate::error::{ServiceError, ValidationError};
use crate::identity::{
    HandshakeError, HandshakeKey, HandshakeLedger, IdentityProvider, ProviderKind,
};
use crate::push::{
    BroadcastEngine, DeliveryReport, InMemorySubscriptionStore, PushSubscription, PushTransport,
    SubscriptionRegistry,
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Result of `save_subscription`. `success: false` means the caller was
/// not authorized and nothing was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
}

/// Result of `send_broadcast`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub success: bool,
    /// The caller has no stored subscription and should re-register its
    /// service worker. Nothing was sent.
    pub update_required: bool,
    pub report: DeliveryReport,
}

impl BroadcastOutcome {
    fn denied() -> Self {
        Self {
            success: false,
            update_required: false,
            report: DeliveryReport::default(),
        }
    }
}

/// A completed login: the identity plus the freshly issued token.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub username: Username,
    pub display_name: String,
    pub token: SessionToken,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("{0} is not on the user allow list")]
    NotAllowed(Username),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub struct NotifyService {
    tokens: Arc<TokenStore>,
    guard: AuthGuard,
    registry: Arc<SubscriptionRegistry>,
    engine: BroadcastEngine,
    allow_list: AllowList,
    identity: Option<Arc<dyn IdentityProvider>>,
    ledger: HandshakeLedger,
    exclude_sender: bool,
}

impl NotifyService {
    /// Service over fresh in-memory stores.
    pub fn new(
        hasher: CredentialHasher,
        transport: Arc<dyn PushTransport>,
        allow_list: AllowList,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(
            Arc::new(hasher),
            Arc::new(InMemoryCredentialStore::new()),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(
            InMemorySubscriptionStore::new(),
        )));
        Self {
            guard: AuthGuard::new(tokens.clone()),
            engine: BroadcastEngine::new(registry.clone(), transport),
            tokens,
            registry,
            allow_list,
            identity: None,
            ledger: HandshakeLedger::new(),
            exclude_sender: true,
        }
    }

    /// Build from loaded config. Fails when the pepper is missing or a
    /// provisioned credential is malformed.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn PushTransport>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(config.auth.pepper.as_ref().map(Secret::expose))
            .context("Set auth.pepper in config.toml or PUSHGATE_PEPPER")?;

        let mut service = Self::new(
            hasher,
            transport,
            AllowList::new(&config.auth.allowed_users),
        )
        .with_handshake_ttl(Duration::from_secs(config.identity.handshake_ttl_secs))
        .with_delivery_limits(
            config.push.delivery_timeout(),
            config.push.max_concurrent_deliveries,
        )
        .with_exclude_sender(config.push.exclude_sender);
        if let Some(provider) = identity {
            service = service.with_identity_provider(provider);
        }

        for (name, hex_digest) in &config.auth.provisioned {
            let username = Username::parse(name)
                .with_context(|| format!("Invalid provisioned username {name:?}"))?;
            let digest = TokenDigest::from_hex(hex_digest).with_context(|| {
                format!("Provisioned digest for {username} is not a 128-character hex string")
            })?;
            service.tokens.provision(username, digest);
        }

        tracing::info!(
            allowed = service.allow_list.len(),
            provisioned = service.tokens.user_count(),
            exclude_sender = service.exclude_sender,
            "Notify service ready"
        );
        Ok(service)
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub fn with_handshake_ttl(mut self, ttl: Duration) -> Self {
        self.ledger = HandshakeLedger::with_ttl(ttl);
        self
    }

    pub fn with_delivery_limits(mut self, timeout: Duration, max_in_flight: usize) -> Self {
        self.engine = self
            .engine
            .with_delivery_timeout(timeout)
            .with_max_in_flight(max_in_flight);
        self
    }

    pub fn with_exclude_sender(mut self, exclude_sender: bool) -> Self {
        self.exclude_sender = exclude_sender;
        self
    }

    pub fn is_allowed(&self, username: &Username) -> bool {
        self.allow_list.is_allowed(username)
    }

    /// Mint a session for a user the identity provider already vouched for.
    /// Any previous token for the user stops working.
    pub fn issue_session_after_login(&self, username: &Username) -> SessionToken {
        self.tokens.issue(username)
    }

    pub fn check_authorized(&self, username: &str, raw_token: &str) -> bool {
        self.guard.is_authorized(username, raw_token)
    }

    /// Store the caller's push subscription, replacing any previous one.
    pub fn save_subscription(
        &self,
        username: &str,
        raw_token: &str,
        descriptor: Option<serde_json::Value>,
    ) -> Result<SaveOutcome, ValidationError> {
        let Some(username) = self.authorize(username, raw_token) else {
            tracing::info!("Subscription save rejected");
            return Ok(SaveOutcome { success: false });
        };
        let subscription =
            PushSubscription::new(descriptor.ok_or(ValidationError::MissingSubscription)?)?;
        self.registry.save(&username, subscription);
        Ok(SaveOutcome { success: true })
    }

    /// Send `payload` to every registered subscriber, leaving out the sender
    /// when `push.exclude_sender` is set.
    pub async fn send_broadcast(
        &self,
        username: &str,
        raw_token: &str,
        payload: &[u8],
    ) -> BroadcastOutcome {
        let Some(sender) = self.authorize(username, raw_token) else {
            tracing::info!("Broadcast rejected");
            return BroadcastOutcome::denied();
        };
        if !self.registry.contains(&sender) {
            tracing::info!(user = %sender, "Sender has no subscription, asking for re-registration");
            return BroadcastOutcome {
                success: false,
                update_required: true,
                report: DeliveryReport::default(),
            };
        }

        let exclude = self.exclude_sender.then_some(&sender);
        let report = self.engine.broadcast(payload, exclude).await;
        BroadcastOutcome {
            success: true,
            update_required: false,
            report,
        }
    }

    /// Send `payload` to the caller's own subscription only.
    pub async fn send_test(
        &self,
        username: &str,
        raw_token: &str,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let username = self
            .authorize(username, raw_token)
            .ok_or(ServiceError::Unauthorized)?;
        self.engine.send_to(&username, payload).await?;
        Ok(())
    }

    /// Start a login: ask the provider for a handshake and remember its
    /// secret until the callback. Returns the URL to redirect the user to.
    pub async fn begin_login(&self, callback_url: &str) -> Result<String, HandshakeError> {
        let provider = self.provider()?;
        let pending = provider.begin_handshake(callback_url).await?;
        self.ledger.insert(pending.key, pending.secret);
        Ok(pending.redirect_url)
    }

    /// Finish a login from the provider callback.
    ///
    /// The pending handshake is consumed whether or not the rest succeeds.
    pub async fn complete_login(
        &self,
        provider: ProviderKind,
        token: &str,
        verifier: &str,
    ) -> Result<LoginSuccess, LoginError> {
        if token.is_empty() || verifier.is_empty() {
            return Err(HandshakeError::Denied.into());
        }
        let key = HandshakeKey::new(provider, token);
        let secret = self.ledger.take(&key).ok_or(HandshakeError::Expired)?;

        let identity = self
            .provider()?
            .complete_handshake(&key, &secret, verifier)
            .await?;
        let username = Username::parse(&identity.username)?;
        if !self.is_allowed(&username) {
            tracing::warn!(user = %username, "Login refused: not on allow list");
            return Err(LoginError::NotAllowed(username));
        }

        let token = self.issue_session_after_login(&username);
        tracing::info!(user = %username, provider = %provider, "Login completed");
        Ok(LoginSuccess {
            username,
            display_name: identity.display_name,
            token,
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.all().len()
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, HandshakeError> {
        self.identity
            .as_ref()
            .ok_or_else(|| HandshakeError::Provider("no identity provider configured".into()))
    }

    fn authorize(&self, username: &str, raw_token: &str) -> Option<Username> {
        if !self.guard.is_authorized(username, raw_token) {
            return None;
        }
        Username::parse(username).ok()
    }
}
