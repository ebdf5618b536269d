use super::username::Username;
use std::collections::BTreeSet;

/// Fixed set of usernames permitted to obtain a session after the identity
/// provider vouches for them. An empty list admits nobody.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    users: BTreeSet<Username>,
}

impl AllowList {
    /// Build from raw config entries. Blank entries are skipped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let users = entries
            .into_iter()
            .filter_map(|raw| match Username::parse(raw.as_ref()) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!("Skipping allow-list entry: {e}");
                    None
                }
            })
            .collect();
        Self { users }
    }

    pub fn is_allowed(&self, username: &Username) -> bool {
        self.users.contains(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
