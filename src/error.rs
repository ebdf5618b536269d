//! Error types shared across the auth, push and gateway layers.
//!
//! Domain failures are `thiserror` enums so callers can match on them;
//! process plumbing (config loading, binding the listener) uses `anyhow`.

/// A required request field was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Username was absent or blank after trimming.
    #[error("username is required")]
    MissingUsername,

    /// Username exceeds the maximum length.
    #[error("username too long (max {max} characters)")]
    UsernameTooLong {
        /// Maximum accepted length.
        max: usize,
    },

    /// Session token was absent or blank.
    #[error("session token is required")]
    MissingToken,

    /// Push subscription descriptor was absent or `null`.
    #[error("push subscription is required")]
    MissingSubscription,
}

/// Errors surfaced by [`crate::service::NotifyService`] to the gateway.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// The username/token pair did not authorize. Deliberately carries no
    /// cause so unknown users and wrong tokens look identical.
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed client input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A targeted send could not be completed.
    #[error(transparent)]
    Send(#[from] crate::push::TargetedSendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_message_is_uniform() {
        assert_eq!(ServiceError::Unauthorized.to_string(), "unauthorized");
    }

    #[test]
    fn validation_converts_into_service_error() {
        let err: ServiceError = ValidationError::MissingToken.into();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MissingToken)
        ));
        assert_eq!(err.to_string(), "session token is required");
    }
}
