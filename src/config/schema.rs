use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A config value that must never be printed. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub identity: IdentityConfig,
    pub push: PushConfig,
}

/// `[gateway]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Front-end origin. Used for CORS and post-login redirects.
    pub client_url: String,
    /// Public URL of this gateway. Used to build the OAuth callback URL.
    pub server_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            client_url: "http://localhost:3000".into(),
            server_url: "http://localhost:3001".into(),
        }
    }
}

/// `[auth]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide pepper for token digests. Required.
    pub pepper: Option<Secret>,
    /// Usernames allowed to log in (case-insensitive).
    pub allowed_users: Vec<String>,
    /// Pre-computed token digests (username → hex digest), as printed by
    /// `pushgate provision-user`.
    pub provisioned: BTreeMap<String, String>,
}

/// `[identity]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub twitter_key: Option<Secret>,
    pub twitter_key_secret: Option<Secret>,
    pub twitter_api_base: String,
    /// Seconds a started login may take before its handshake expires.
    pub handshake_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            twitter_key: None,
            twitter_key_secret: None,
            twitter_api_base: crate::identity::twitter::TWITTER_API_BASE.into(),
            handshake_ttl_secs: crate::identity::ledger::DEFAULT_HANDSHAKE_TTL_SECS,
        }
    }
}

/// `[push]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<Secret>,
    /// VAPID `sub` claim: a `mailto:` or `https:` contact for push services.
    pub vapid_subject: String,
    pub delivery_timeout_secs: u64,
    pub max_concurrent_deliveries: usize,
    /// Leave the sender out of their own broadcasts.
    pub exclude_sender: bool,
}

impl PushConfig {
    /// Per-delivery timeout, never below one second.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs.max(1))
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: "mailto:admin@localhost".into(),
            delivery_timeout_secs: 10,
            max_concurrent_deliveries: 16,
            exclude_sender: true,
        }
    }
}
