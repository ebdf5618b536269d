use crate::error::ValidationError;
use std::fmt;

/// Maximum accepted username length (after trimming).
pub const MAX_USERNAME_LEN: usize = 64;

/// A canonical username: trimmed and lowercased.
///
/// Every boundary (login callback, allow-list, request headers, provisioned
/// digests) goes through [`Username::parse`], so two spellings of the same
/// handle always map to the same store entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingUsername);
        }
        if trimmed.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::UsernameTooLong {
                max: MAX_USERNAME_LEN,
            });
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
