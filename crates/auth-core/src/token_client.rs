//! OAuth 2.0 token endpoint client.
//!
//! Performs the three grants the services use against the realm's token
//! endpoint:
//!
//! - `client_credentials` for service-to-service calls
//! - `authorization_code` to finish a browser login
//! - `refresh_token` to renew an expiring session
//!
//! Every grant is one form-encoded POST. There are no internal retries;
//! callers decide whether to try again.
//!
//! # Example
//!
//! ```rust,ignore
//! use auth_core::{ProviderConfig, TokenClient};
//! use auth_core::provider::DEFAULT_HTTP_TIMEOUT;
//!
//! let provider = ProviderConfig::from_env()?;
//! let client = TokenClient::new(&provider, DEFAULT_HTTP_TIMEOUT)?;
//!
//! let token = client.client_credentials_grant().await?;
//! let header = format!("Bearer {}", token.access_token.expose_secret());
//! ```
//!
//! # Security
//!
//! - Client secret and issued tokens are `SecretString` (never logged)
//! - Provider error bodies are returned to the caller but logged at trace only

use crate::provider::{build_http_client, ProviderConfig};
use crate::secret::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenClientError {
    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP client error: {0}")]
    Http(String),

    /// The provider answered with a non-2xx status.
    #[error("Provider rejected request with status {status}: {body}")]
    ProviderRejected { status: u16, body: String },

    /// The provider answered 2xx with a body that could not be decoded.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretString,

    #[serde(default)]
    pub refresh_token: Option<SecretString>,

    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    #[serde(default)]
    pub refresh_expires_in: Option<u64>,

    #[serde(default)]
    pub id_token: Option<SecretString>,

    #[serde(default)]
    pub scope: Option<String>,
}

/// Client for the realm token and userinfo endpoints.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct TokenClient {
    http_client: reqwest::Client,
    token_endpoint: String,
    userinfo_endpoint: String,
    client_id: String,
    client_secret: Option<SecretString>,
}

impl std::fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenClient")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenClient {
    /// # Errors
    ///
    /// Returns `TokenClientError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(provider: &ProviderConfig, timeout: Duration) -> Result<Self, TokenClientError> {
        let http_client = build_http_client(timeout)
            .map_err(|e| TokenClientError::Configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            token_endpoint: provider.token_endpoint(),
            userinfo_endpoint: provider.userinfo_endpoint(),
            client_id: provider.client_id().to_string(),
            client_secret: provider.client_secret().cloned(),
        })
    }

    /// Obtain a token for this client itself.
    ///
    /// # Errors
    ///
    /// `Configuration` if no client secret is configured; otherwise see
    /// [`TokenClientError`].
    pub async fn client_credentials_grant(&self) -> Result<TokenResponse, TokenClientError> {
        if self.client_secret.is_none() {
            return Err(TokenClientError::Configuration(
                "client_credentials grant requires a client secret".to_string(),
            ));
        }
        self.exchange("client_credentials", &[]).await
    }

    /// Exchange an authorization code from the login redirect.
    ///
    /// `redirect_uri` must match the one used in the authorization request.
    ///
    /// # Errors
    ///
    /// See [`TokenClientError`].
    pub async fn authorization_code_grant(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, TokenClientError> {
        self.exchange(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    /// Exchange a refresh token for a new access/refresh pair.
    ///
    /// # Errors
    ///
    /// See [`TokenClientError`].
    pub async fn refresh_grant(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, TokenClientError> {
        self.exchange(
            "refresh_token",
            &[("refresh_token", refresh_token.expose_secret())],
        )
        .await
    }

    /// Fetch the OIDC userinfo document for an access token.
    ///
    /// # Errors
    ///
    /// See [`TokenClientError`].
    #[instrument(skip_all)]
    pub async fn user_info(
        &self,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, TokenClientError> {
        debug!(target: "auth.token_client", url = %self.userinfo_endpoint, "Requesting userinfo");

        let response = self
            .http_client
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                debug!(target: "auth.token_client", error = %e, "HTTP request failed");
                TokenClientError::Http(e.to_string())
            })?;

        decode_response(response).await
    }

    #[instrument(skip_all, fields(grant_type = %grant_type))]
    async fn exchange(
        &self,
        grant_type: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, TokenClientError> {
        debug!(
            target: "auth.token_client",
            client_id = %self.client_id,
            url = %self.token_endpoint,
            "Requesting token"
        );

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant_type),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }
        form.extend_from_slice(params);

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "auth.token_client", error = %e, "HTTP request failed");
                TokenClientError::Http(e.to_string())
            })?;

        let token: TokenResponse = decode_response(response).await?;

        debug!(
            target: "auth.token_client",
            expires_in_secs = token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "Token acquired"
        );

        Ok(token)
    }
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TokenClientError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "auth.token_client", error = %e, "Failed to read error response body");
            String::new()
        });
        warn!(target: "auth.token_client", status = %status, "Provider rejected request");
        trace!(target: "auth.token_client", body = %body, "Provider rejection body");
        return Err(TokenClientError::ProviderRejected {
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(|e| {
        warn!(target: "auth.token_client", error = %e, "Failed to parse provider response");
        TokenClientError::InvalidResponse(e.to_string())
    })
}
