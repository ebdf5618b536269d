//! In-memory session token store.
//!
//! Holds one digest per user:
//! - `issue` mints a random token, stores only its digest, and hands the raw
//!   value back exactly once
//! - a later `issue` for the same user overwrites the digest, which revokes
//!   the previous token
//! - nothing is written to disk; a restart logs everyone out

use super::hasher::{CredentialHasher, TokenDigest};
use super::username::Username;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// A raw session token. Only ever handed to the client that logged in.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a fresh random token without storing it. Used for offline
    /// provisioning; the live path goes through [`TokenStore::issue`].
    pub fn generate() -> Self {
        Self(generate_token())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Backing storage for credential digests, keyed by canonical username.
///
/// Swap this out to move digests into a shared or durable store without
/// touching the guard or the issuance path.
pub trait CredentialStore: Send + Sync {
    fn get(&self, username: &Username) -> Option<TokenDigest>;
    fn set(&self, username: Username, digest: TokenDigest);
    fn len(&self) -> usize;
}

/// Process-memory [`CredentialStore`].
#[derive(Default)]
pub struct InMemoryCredentialStore {
    digests: RwLock<HashMap<Username, TokenDigest>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, username: &Username) -> Option<TokenDigest> {
        self.digests.read().get(username).cloned()
    }

    fn set(&self, username: Username, digest: TokenDigest) {
        self.digests.write().insert(username, digest);
    }

    fn len(&self) -> usize {
        self.digests.read().len()
    }
}

/// Issues session tokens and answers "what is this user's current digest".
pub struct TokenStore {
    hasher: Arc<CredentialHasher>,
    backend: Arc<dyn CredentialStore>,
}

impl TokenStore {
    pub fn new(hasher: Arc<CredentialHasher>, backend: Arc<dyn CredentialStore>) -> Self {
        Self { hasher, backend }
    }

    /// Create a session token for `username`, replacing any previous one.
    /// Returns the plaintext token (only revealed once).
    pub fn issue(&self, username: &Username) -> SessionToken {
        let token = generate_token();
        let digest = self.hasher.hash(&token);
        self.backend.set(username.clone(), digest);
        tracing::info!(user = %username, "Session token issued");
        SessionToken(token)
    }

    /// Seed a digest computed offline (see `pushgate provision-user`).
    pub fn provision(&self, username: Username, digest: TokenDigest) {
        tracing::debug!(user = %username, "Provisioned credential loaded");
        self.backend.set(username, digest);
    }

    pub(crate) fn current_hash(&self, username: &Username) -> Option<TokenDigest> {
        self.backend.get(username)
    }

    pub(crate) fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Number of users holding a credential.
    pub fn user_count(&self) -> usize {
        self.backend.len()
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
