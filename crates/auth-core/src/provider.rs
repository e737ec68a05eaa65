//! Identity provider realm configuration.
//!
//! A realm on a Keycloak-style provider exposes its OpenID Connect endpoints
//! below `{server_url}/realms/{realm}`. That base URL is also the `iss` claim
//! of every token the realm issues.

use crate::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default provider base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Default realm name.
pub const DEFAULT_REALM: &str = "caretwin";

/// Default client identifier of the protected API.
pub const DEFAULT_CLIENT_ID: &str = "3dgs-api-service";

/// Default timeout for every HTTP call to the provider.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeout for provider HTTP calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const OIDC_PATH: &str = "protocol/openid-connect";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderConfigError {
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid realm: {0}")]
    InvalidRealm(String),

    #[error("Invalid client id: {0}")]
    InvalidClientId(String),
}

/// Connection details for one realm of the identity provider.
///
/// The client secret is optional: pure token verification never needs it,
/// only the token endpoint grants do.
#[derive(Clone)]
pub struct ProviderConfig {
    server_url: String,
    realm: String,
    client_id: String,
    client_secret: Option<SecretString>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("server_url", &self.server_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ProviderConfig {
    /// Create a configuration for a realm.
    ///
    /// A trailing slash on `server_url` is ignored. Any path on it is kept,
    /// so legacy deployments served below `/auth` work unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the realm or client id
    /// is empty.
    pub fn new(
        server_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self, ProviderConfigError> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let realm = realm.into();
        let client_id = client_id.into();

        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(ProviderConfigError::InvalidUrl(format!(
                "must start with http:// or https://, got '{server_url}'"
            )));
        }
        if realm.is_empty() || realm.contains('/') {
            return Err(ProviderConfigError::InvalidRealm(format!(
                "must be a non-empty path segment, got '{realm}'"
            )));
        }
        if client_id.is_empty() {
            return Err(ProviderConfigError::InvalidClientId(
                "must not be empty".to_string(),
            ));
        }

        Ok(Self {
            server_url,
            realm,
            client_id,
            client_secret: None,
        })
    }

    /// Attach the confidential client secret.
    #[must_use]
    pub fn with_client_secret(mut self, client_secret: SecretString) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    /// Load from `KEYCLOAK_URL`, `KEYCLOAK_REALM`, `API_CLIENT_ID` and
    /// `API_CLIENT_SECRET`, falling back to the local development defaults.
    ///
    /// # Errors
    ///
    /// See [`ProviderConfig::new`].
    pub fn from_env() -> Result<Self, ProviderConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load from a variable map (for testing).
    ///
    /// # Errors
    ///
    /// See [`ProviderConfig::new`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ProviderConfigError> {
        let server_url = vars
            .get("KEYCLOAK_URL")
            .map_or(DEFAULT_SERVER_URL, String::as_str);
        let realm = vars
            .get("KEYCLOAK_REALM")
            .map_or(DEFAULT_REALM, String::as_str);
        let client_id = vars
            .get("API_CLIENT_ID")
            .map_or(DEFAULT_CLIENT_ID, String::as_str);

        let config = Self::new(server_url, realm, client_id)?;

        Ok(match vars.get("API_CLIENT_SECRET") {
            Some(secret) if !secret.is_empty() => {
                config.with_client_secret(SecretString::from(secret.clone()))
            }
            _ => config,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Client identifier; verified tokens must carry it in `aud`.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    /// Realm URL, compared exactly against the `iss` claim.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server_url, self.realm)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/{OIDC_PATH}/token", self.issuer())
    }

    pub fn certs_endpoint(&self) -> String {
        format!("{}/{OIDC_PATH}/certs", self.issuer())
    }

    pub fn userinfo_endpoint(&self) -> String {
        format!("{}/{OIDC_PATH}/userinfo", self.issuer())
    }
}

/// Build the HTTP client used for provider calls.
///
/// Every provider call is bounded by `timeout` so a stalled provider cannot
/// hold up token verification indefinitely.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .build()
}
