//! Configuration: `config.toml` plus `PUSHGATE_*` environment overrides.
//!
//! Secrets (pepper, OAuth consumer keys, VAPID private key) are usually
//! supplied through the environment so the file can be checked in.

pub mod schema;

pub use schema::{AuthConfig, Config, GatewayConfig, IdentityConfig, PushConfig, Secret};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Prefix for per-user provisioned digests: `PUSHGATE_USER_<NAME>=<digest>`.
const PROVISIONED_USER_PREFIX: &str = "PUSHGATE_USER_";

impl Config {
    /// `<config dir>/pushgate/config.toml` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pushgate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path` (or the default path), then apply env overrides.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(std::env::vars());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply `PUSHGATE_*` overrides from the given variables.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "PUSHGATE_PEPPER" => self.auth.pepper = Some(Secret::new(value)),
                "PUSHGATE_TWITTER_KEY" => self.identity.twitter_key = Some(Secret::new(value)),
                "PUSHGATE_TWITTER_KEY_SECRET" => {
                    self.identity.twitter_key_secret = Some(Secret::new(value));
                }
                "PUSHGATE_VAPID_PUBLIC_KEY" => self.push.vapid_public_key = Some(value),
                "PUSHGATE_VAPID_PRIVATE_KEY" => {
                    self.push.vapid_private_key = Some(Secret::new(value));
                }
                "PUSHGATE_CLIENT_URL" => self.gateway.client_url = value,
                "PUSHGATE_SERVER_URL" => self.gateway.server_url = value,
                _ => {
                    if let Some(name) = key.strip_prefix(PROVISIONED_USER_PREFIX) {
                        self.auth
                            .provisioned
                            .insert(name.to_lowercase(), value.trim().to_string());
                    }
                }
            }
        }
    }
}
