//! Session authentication for allow-listed users.
//!
//! Provides:
//! - Canonical usernames (trimmed + lowercased at every boundary)
//! - Peppered PBKDF2 digests of opaque session tokens
//! - A token store holding one digest per user (single active session)
//! - A guard that compares digests in constant time
//! - The allow-list consulted after the identity provider handshake
//!
//! ## Design Decisions
//! - Opaque random tokens, no JWT: the server keeps the digest and looks it up.
//! - Raw tokens are never stored and digests are never returned to callers;
//!   both types redact themselves in `Debug`.
//! - Storage sits behind [`CredentialStore`] so the guard and the issuance
//!   path do not care where digests live.

pub mod allowlist;
pub mod guard;
pub mod hasher;
pub mod store;
pub mod username;

pub use allowlist::AllowList;
pub use guard::AuthGuard;
pub use hasher::{CredentialHasher, HasherError, TokenDigest};
pub use store::{CredentialStore, InMemoryCredentialStore, SessionToken, TokenStore};
pub use username::Username;
