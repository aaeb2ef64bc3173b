//! Registry credentials, sessions and the `RegistryClient` trait.
//!
//! A job acquires one scoped, time-limited session and never renews it
//! mid-job. Every registry operation must check the session before use; an
//! operation attempted after the TTL elapses fails as an authentication
//! error rather than silently succeeding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default credential lifetime.
pub const DEFAULT_TTL_SECONDS: u64 = 600;

/// A registry credential before exchange for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Username presented to the registry. Token-based registries commonly
    /// use a fixed value here (e.g., "nologin").
    pub username: String,
    /// The secret token.
    pub token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

/// An authenticated registry session, valid for a fixed TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySession {
    /// Registry host (e.g., "rg.example.com").
    pub registry: String,
    pub username: String,
    pub token: String,
    pub acquired_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl RegistrySession {
    pub fn new(
        registry: impl Into<String>,
        credential: &Credential,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            registry: registry.into(),
            username: credential.username.clone(),
            token: credential.token.clone(),
            acquired_at: Utc::now(),
            ttl_seconds,
        }
    }

    /// Session age in whole seconds.
    pub fn age_seconds(&self) -> u64 {
        (Utc::now() - self.acquired_at).num_seconds().max(0) as u64
    }

    pub fn is_expired(&self) -> bool {
        self.age_seconds() >= self.ttl_seconds
    }

    /// Fail if the session has outlived its TTL.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_expired() {
            return Err(Error::SessionExpired {
                ttl_seconds: self.ttl_seconds,
            });
        }
        Ok(())
    }
}

/// Trait for registry backends.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Exchange a credential for a scoped, time-limited session.
    /// Fails if the credential is absent or rejected by the registry.
    async fn authenticate(&self, credential: &Credential) -> Result<RegistrySession>;

    /// Look up the content digest for `<image>:<tag>`.
    async fn digest(&self, session: &RegistrySession, image: &str, tag: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_aged(seconds: i64) -> RegistrySession {
        let credential = Credential::new("nologin", "secret-token");
        let mut session = RegistrySession::new("rg.example.com", &credential, DEFAULT_TTL_SECONDS);
        session.acquired_at = Utc::now() - Duration::seconds(seconds);
        session
    }

    #[test]
    fn test_fresh_session_is_valid() {
        let session = session_aged(0);
        assert!(!session.is_expired());
        assert!(session.ensure_valid().is_ok());
    }

    #[test]
    fn test_session_valid_just_under_ttl() {
        let session = session_aged(598);
        assert!(session.ensure_valid().is_ok());
    }

    #[test]
    fn test_session_expired_after_ttl() {
        let session = session_aged(600);
        assert!(session.is_expired());
        assert!(matches!(
            session.ensure_valid(),
            Err(Error::SessionExpired { ttl_seconds: 600 })
        ));
    }

    #[test]
    fn test_session_expired_well_past_ttl() {
        let session = session_aged(3600);
        assert!(session.is_expired());
    }
}
