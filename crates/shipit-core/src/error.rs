//! Error types for shipit.
//!
//! The variants mirror the failure domains of a run: checkout, credential
//! acquisition, registry authentication, image build, image push. Cache and
//! digest-lookup failures are not represented here as run-fatal errors; the
//! orchestrator downgrades them to warnings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("checkout failed: {0}")]
    Checkout(String),

    #[error("credential rejected: {0}")]
    Credential(String),

    #[error("session expired after {ttl_seconds}s; re-authentication required")]
    SessionExpired { ttl_seconds: u64 },

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
