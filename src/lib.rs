//! pushgate: allow-listed social login, opaque session tokens, and web push
//! fan-out behind one small HTTP gateway.
//!
//! Everything lives in memory. A restart logs every user out and drops all
//! push subscriptions; provisioned credentials are reloaded from config.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod push;
pub mod service;

pub use config::Config;
pub use error::{ServiceError, ValidationError};
pub use service::{BroadcastOutcome, LoginError, LoginSuccess, NotifyService, SaveOutcome};
