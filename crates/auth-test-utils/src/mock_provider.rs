//! Mock identity provider
//!
//! A wiremock server that serves a realm's certs and token endpoints under
//! the same paths as Keycloak.

use crate::crypto_fixtures::{jwks_json, TestKeyPair};
use crate::token_builders::TEST_REALM;
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock identity provider for one realm
///
/// # Example
/// ```rust,ignore
/// let provider = MockIdentityProvider::start().await;
/// let key = TestKeyPair::new("k1", &RSA_KEY_1);
/// provider.mount_jwks(&[&key]).await;
///
/// let cache = KeySetCache::new(provider.certs_url(), Duration::from_secs(5))?;
/// ```
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL (the `KEYCLOAK_URL` equivalent)
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn realm(&self) -> &'static str {
        TEST_REALM
    }

    /// Realm URL, the `iss` of every token it issues
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server.uri(), TEST_REALM)
    }

    pub fn certs_path(&self) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/certs")
    }

    pub fn token_path(&self) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/token")
    }

    pub fn certs_url(&self) -> String {
        format!("{}{}", self.server.uri(), self.certs_path())
    }

    /// Serve a JWKS containing `keys`
    pub async fn mount_jwks(&self, keys: &[&TestKeyPair]) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS containing `keys` after `delay`
    pub async fn mount_slow_jwks(&self, keys: &[&TestKeyPair], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_json(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS containing `keys` for the first `times` requests only
    pub async fn mount_jwks_times(&self, keys: &[&TestKeyPair], times: u64) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Answer the certs endpoint with an error status
    pub async fn mount_jwks_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer the certs endpoint with an error status after `delay`
    pub async fn mount_slow_jwks_failure(&self, status: u16, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Answer the certs endpoint with a raw body
    pub async fn mount_certs_body(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer the token endpoint with `status` and a JSON body
    pub async fn mount_token_endpoint(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Drop all mocks and recorded requests
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Requests received by the certs endpoint since start or last reset
    pub async fn certs_request_count(&self) -> usize {
        let certs_path = self.certs_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == certs_path)
            .count()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }
}
