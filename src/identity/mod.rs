//! Social-login handshakes.
//!
//! An [`IdentityProvider`] runs a redirect-based handshake and, on success,
//! vouches for a username. The only concrete provider is Twitter (OAuth
//! 1.0a); pending handshake secrets live in a [`HandshakeLedger`] between
//! the redirect and the callback.

pub mod ledger;
pub mod twitter;

use async_trait::async_trait;
use std::fmt;

pub use ledger::HandshakeLedger;
pub use twitter::TwitterProvider;

/// Which provider issued a handshake token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Twitter,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger key for a pending handshake: provider plus the public request
/// token that comes back on the callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandshakeKey {
    pub provider: ProviderKind,
    pub token: String,
}

impl HandshakeKey {
    pub fn new(provider: ProviderKind, token: impl Into<String>) -> Self {
        Self {
            provider,
            token: token.into(),
        }
    }
}

/// Secret half of a pending handshake. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeSecret(String);

impl HandshakeSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HandshakeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandshakeSecret(<redacted>)")
    }
}

/// Result of starting a handshake: where to send the user, and what to
/// remember until they come back.
#[derive(Debug, Clone)]
pub struct PendingHandshake {
    pub redirect_url: String,
    pub key: HandshakeKey,
    pub secret: HandshakeSecret,
}

/// Identity the provider vouched for. `username` is the raw handle; it is
/// normalized before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub username: String,
    pub display_name: String,
}

/// Handshake failures. Shown to the user as a denial page, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// Callback arrived without the expected parameters (user denied).
    #[error("handshake denied")]
    Denied,

    /// No pending handshake for this token (expired, reused, or forged).
    #[error("handshake expired or unknown")]
    Expired,

    /// The provider rejected a request or returned something unusable.
    #[error("identity provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Obtain a request token and the URL to redirect the user to.
    async fn begin_handshake(&self, callback_url: &str) -> Result<PendingHandshake, HandshakeError>;

    /// Exchange the request token + verifier for the user's identity.
    async fn complete_handshake(
        &self,
        key: &HandshakeKey,
        secret: &HandshakeSecret,
        verifier: &str,
    ) -> Result<VerifiedIdentity, HandshakeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_from_different_providers_never_collide() {
        let mut keys = HashSet::new();
        keys.insert(HandshakeKey::new(ProviderKind::Twitter, "abc"));
        assert!(keys.contains(&HandshakeKey::new(ProviderKind::Twitter, "abc")));
        assert!(!keys.contains(&HandshakeKey::new(ProviderKind::Twitter, "twitter_abc")));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = HandshakeSecret::new("s3cr3t");
        assert!(!format!("{secret:?}").contains("s3cr3t"));
    }
}
