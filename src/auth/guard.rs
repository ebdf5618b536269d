use super::hasher::TokenDigest;
use super::store::TokenStore;
use super::username::Username;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Admit/deny check for `(username, raw token)` pairs.
///
/// Unknown users and wrong tokens take the same path: the token is always
/// hashed and compared, against a fixed dummy digest when the user has none.
pub struct AuthGuard {
    tokens: Arc<TokenStore>,
    dummy: TokenDigest,
}

impl AuthGuard {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        let dummy = tokens.hasher().hash("");
        Self { tokens, dummy }
    }

    pub fn is_authorized(&self, username: &str, raw_token: &str) -> bool {
        if username.trim().is_empty() || raw_token.is_empty() {
            return false;
        }
        let Ok(username) = Username::parse(username) else {
            return false;
        };
        self.check(&username, raw_token)
    }

    /// Same as [`Self::is_authorized`] for an already-canonical username.
    pub fn check(&self, username: &Username, raw_token: &str) -> bool {
        if raw_token.is_empty() {
            return false;
        }
        let attempt = self.tokens.hasher().hash(raw_token);
        match self.tokens.current_hash(username) {
            Some(stored) => constant_time_eq(&stored, &attempt),
            None => {
                // Same comparison work as a known user, then deny.
                let _ = constant_time_eq(&self.dummy, &attempt);
                false
            }
        }
    }
}

/// Constant-time digest comparison to prevent timing attacks.
fn constant_time_eq(a: &TokenDigest, b: &TokenDigest) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hasher::CredentialHasher;
    use crate::auth::store::InMemoryCredentialStore;

    fn setup() -> (Arc<TokenStore>, AuthGuard) {
        let hasher = Arc::new(CredentialHasher::new(Some("pepper")).unwrap());
        let tokens = Arc::new(TokenStore::new(
            hasher,
            Arc::new(InMemoryCredentialStore::new()),
        ));
        let guard = AuthGuard::new(Arc::clone(&tokens));
        (tokens, guard)
    }

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn issued_token_is_authorized() {
        let (tokens, guard) = setup();
        let token = tokens.issue(&user("alice"));
        assert!(guard.is_authorized("alice", token.expose()));
    }

    #[test]
    fn username_case_does_not_matter() {
        let (tokens, guard) = setup();
        let token = tokens.issue(&user("Alice"));
        assert!(guard.is_authorized("ALICE", token.expose()));
        assert!(guard.is_authorized(" alice ", token.expose()));
    }

    #[test]
    fn second_issue_invalidates_first_token() {
        let (tokens, guard) = setup();
        let first = tokens.issue(&user("alice"));
        let second = tokens.issue(&user("alice"));

        assert!(!guard.is_authorized("alice", first.expose()));
        assert!(guard.is_authorized("alice", second.expose()));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let (tokens, guard) = setup();
        tokens.issue(&user("alice"));
        assert!(!guard.is_authorized("alice", "not-the-token"));
    }

    #[test]
    fn unknown_user_is_rejected_for_any_token() {
        let (tokens, guard) = setup();
        let token = tokens.issue(&user("alice"));
        assert!(!guard.is_authorized("mallory", token.expose()));
        assert!(!guard.is_authorized("mallory", "anything"));
    }

    #[test]
    fn missing_inputs_are_rejected() {
        let (tokens, guard) = setup();
        let token = tokens.issue(&user("alice"));
        assert!(!guard.is_authorized("", token.expose()));
        assert!(!guard.is_authorized("   ", token.expose()));
        assert!(!guard.is_authorized("alice", ""));
    }

    #[test]
    fn token_of_one_user_does_not_authorize_another() {
        let (tokens, guard) = setup();
        let alice = tokens.issue(&user("alice"));
        tokens.issue(&user("bob"));
        assert!(!guard.is_authorized("bob", alice.expose()));
    }

    #[test]
    fn dummy_digest_is_peppered_like_real_ones() {
        let (tokens, guard) = setup();
        assert!(constant_time_eq(&guard.dummy, &tokens.hasher().hash("")));
        assert!(!guard.check(&user("nobody"), "x"));
    }
}
