//! HTTP registry client.
//!
//! Speaks the registry v2 API: `GET /v2/` to verify a credential when
//! acquiring a session, `HEAD /v2/<name>/manifests/<tag>` to read back the
//! digest of a pushed tag.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use shipit_core::registry::{Credential, RegistryClient, RegistrySession};
use shipit_core::{Error, Result};

use crate::reference::{registry_host, split_registry};

/// Manifest media types accepted when resolving a digest.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Registry client over the HTTP v2 API.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    /// Registry host (no namespace), e.g. "rg.example.com".
    registry: String,
    ttl_seconds: u64,
}

impl HttpRegistryClient {
    /// Create a client for the registry named in the configuration.
    /// `host` may carry a namespace ("rg.example.com/my-app"); only the host
    /// part identifies the registry endpoint.
    pub fn new(host: &str, ttl_seconds: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry: registry_host(host),
            ttl_seconds,
        }
    }

    fn manifest_url(&self, image: &str, tag: &str) -> String {
        let (host, repository) = split_registry(image);
        format!("https://{}/v2/{}/manifests/{}", host, repository, tag)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn authenticate(&self, credential: &Credential) -> Result<RegistrySession> {
        if credential.token.is_empty() {
            return Err(Error::Credential("empty registry token".to_string()));
        }

        // Probe /v2/ to have the registry reject a bad token up front.
        let url = format!("https://{}/v2/", self.registry);
        let response = self
            .http
            .get(&url)
            .basic_auth(&credential.username, Some(&credential.token))
            .send()
            .await
            .map_err(|e| Error::Registry(format!("registry unreachable: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                tracing::debug!(registry = %self.registry, ttl = self.ttl_seconds, "Acquired registry session");
                Ok(RegistrySession::new(
                    self.registry.clone(),
                    credential,
                    self.ttl_seconds,
                ))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Credential(format!(
                "registry {} rejected the credential ({})",
                self.registry,
                response.status()
            ))),
            status => Err(Error::Registry(format!(
                "unexpected status {} from {}",
                status, url
            ))),
        }
    }

    async fn digest(&self, session: &RegistrySession, image: &str, tag: &str) -> Result<String> {
        session.ensure_valid()?;

        let url = self.manifest_url(image, tag);
        let response = self
            .http
            .head(&url)
            .basic_auth(&session.username, Some(&session.token))
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("digest lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => response
                .headers()
                .get("Docker-Content-Digest")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    Error::Registry(format!("no Docker-Content-Digest header for {}:{}", image, tag))
                }),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("{}:{}", image, tag))),
            StatusCode::UNAUTHORIZED => Err(Error::Credential(format!(
                "registry {} rejected the session token",
                session.registry
            ))),
            status => Err(Error::Registry(format!(
                "unexpected status {} from {}",
                status, url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_manifest_url() {
        let client = HttpRegistryClient::new("rg.example.com/my-app", 600);
        assert_eq!(
            client.manifest_url("rg.example.com/my-app/api", "latest"),
            "https://rg.example.com/v2/my-app/api/manifests/latest"
        );
    }

    #[test]
    fn test_registry_host_stripped_of_namespace() {
        let client = HttpRegistryClient::new("rg.example.com/my-app", 600);
        assert_eq!(client.registry, "rg.example.com");
    }

    #[tokio::test]
    async fn test_empty_token_rejected_before_any_request() {
        let client = HttpRegistryClient::new("rg.example.com", 600);
        let credential = Credential::new("nologin", "");
        assert!(matches!(
            client.authenticate(&credential).await,
            Err(Error::Credential(_))
        ));
    }

    #[tokio::test]
    async fn test_digest_with_expired_session_fails_as_auth() {
        let client = HttpRegistryClient::new("rg.example.com", 600);
        let credential = Credential::new("nologin", "tok");
        let mut session = RegistrySession::new("rg.example.com", &credential, 600);
        session.acquired_at = Utc::now() - Duration::seconds(601);

        // Fails on the TTL check, before any network traffic.
        let result = client.digest(&session, "rg.example.com/app/api", "latest").await;
        assert!(matches!(result, Err(Error::SessionExpired { .. })));
    }
}
