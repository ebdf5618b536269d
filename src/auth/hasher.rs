//! Peppered PBKDF2 digests for session tokens.

use sha2::Sha512;
use std::fmt;

/// PBKDF2 rounds. Matches the digests produced by `pushgate provision-user`
/// and by earlier deployments, so changing it invalidates provisioned users.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Derived key length in bytes (hex-encoded to twice this).
pub const DIGEST_BYTES: usize = 64;

/// Errors raised while constructing a [`CredentialHasher`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HasherError {
    /// No pepper configured; refusing to hash without one.
    #[error("token pepper is missing or empty (set auth.pepper or PUSHGATE_PEPPER)")]
    MissingPepper,
}

/// A stored one-way token digest (lowercase hex).
///
/// Intentionally has no `Display` and no `Serialize` impl, and `Debug` is
/// redacted, so a digest cannot leak through logs or responses by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenDigest(String);

impl TokenDigest {
    /// Accept an operator-provisioned digest. Must be exactly
    /// `2 * DIGEST_BYTES` hex characters; normalized to lowercase.
    pub fn from_hex(hex_digest: &str) -> Option<Self> {
        let trimmed = hex_digest.trim();
        if trimmed.len() != DIGEST_BYTES * 2 || hex::decode(trimmed).is_err() {
            return None;
        }
        Some(Self(trimmed.to_ascii_lowercase()))
    }

    /// Reveal the hex digest. Only for operator tooling that prints it.
    pub fn expose_hex(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenDigest(<redacted>)")
    }
}

/// Deterministic keyed one-way transform of raw session tokens.
///
/// PBKDF2-HMAC-SHA512 with the process-wide pepper as salt.
#[derive(Clone)]
pub struct CredentialHasher {
    pepper: Vec<u8>,
}

impl CredentialHasher {
    pub fn new(pepper: Option<&str>) -> Result<Self, HasherError> {
        match pepper {
            Some(p) if !p.trim().is_empty() => Ok(Self {
                pepper: p.as_bytes().to_vec(),
            }),
            _ => Err(HasherError::MissingPepper),
        }
    }

    pub fn hash(&self, raw_token: &str) -> TokenDigest {
        let mut out = [0u8; DIGEST_BYTES];
        pbkdf2::pbkdf2_hmac::<Sha512>(
            raw_token.as_bytes(),
            &self.pepper,
            PBKDF2_ITERATIONS,
            &mut out,
        );
        TokenDigest(hex::encode(out))
    }
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("pepper", &"<redacted>")
            .field("iterations", &PBKDF2_ITERATIONS)
            .finish()
    }
}
