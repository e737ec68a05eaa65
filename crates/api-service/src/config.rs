//! API service configuration.
//!
//! Configuration is loaded from environment variables. The provider client
//! secret is redacted in Debug output.

use auth_core::jwks::DEFAULT_MAX_AGE;
use auth_core::jwt::MAX_EXPIRY_LEEWAY;
use auth_core::provider::DEFAULT_HTTP_TIMEOUT;
use auth_core::{ProviderConfig, ProviderConfigError};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default CORS origin (the local web frontend).
pub const DEFAULT_CORS_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// API service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Identity provider realm and client registration.
    pub provider: ProviderConfig,

    /// How long a fetched key set is trusted before a lookup refreshes it.
    pub jwks_cache_ttl: Duration,

    /// Grace period applied to `exp` (default: none).
    pub expiry_leeway: Duration,

    /// Timeout for calls to the identity provider.
    pub provider_http_timeout: Duration,

    /// Origins allowed to call the API from a browser.
    pub cors_allowed_origins: Vec<String>,

    /// Time to keep serving in-flight requests after a shutdown signal.
    pub drain: Duration,
}

/// Custom Debug implementation; the client secret stays inside `provider`,
/// whose own Debug redacts it.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("provider", &self.provider)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("expiry_leeway", &self.expiry_leeway)
            .field("provider_http_timeout", &self.provider_http_timeout)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("drain", &self.drain)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid identity provider configuration: {0}")]
    Provider(#[from] ProviderConfigError),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidJwksCacheTtl(String),

    #[error("Invalid JWT expiry leeway configuration: {0}")]
    InvalidExpiryLeeway(String),

    #[error("Invalid provider HTTP timeout configuration: {0}")]
    InvalidProviderTimeout(String),

    #[error("Invalid CORS origin configuration: {0}")]
    InvalidCorsOrigin(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrain(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let provider = ProviderConfig::from_vars(vars)?;

        let jwks_cache_ttl = if let Some(value_str) = vars.get("JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwksCacheTtl(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwksCacheTtl(
                    "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_MAX_AGE
        };

        let expiry_leeway = if let Some(value_str) = vars.get("JWT_EXPIRY_LEEWAY_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidExpiryLeeway(format!(
                    "JWT_EXPIRY_LEEWAY_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_EXPIRY_LEEWAY.as_secs() {
                return Err(ConfigError::InvalidExpiryLeeway(format!(
                    "JWT_EXPIRY_LEEWAY_SECONDS must not exceed {} seconds, got {}",
                    MAX_EXPIRY_LEEWAY.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::ZERO
        };

        let provider_http_timeout =
            if let Some(value_str) = vars.get("PROVIDER_HTTP_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidProviderTimeout(format!(
                        "PROVIDER_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidProviderTimeout(
                        "PROVIDER_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                Duration::from_secs(value)
            } else {
                DEFAULT_HTTP_TIMEOUT
            };

        let cors_allowed_origins = parse_origins(
            vars.get("CORS_ALLOWED_ORIGINS")
                .map_or(DEFAULT_CORS_ALLOWED_ORIGINS, String::as_str),
        )?;

        let drain = if let Some(value_str) = vars.get("API_DRAIN_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidDrain(format!(
                    "API_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;
            Duration::from_secs(value)
        } else {
            Duration::ZERO
        };

        Ok(Config {
            bind_address,
            provider,
            jwks_cache_ttl,
            expiry_leeway,
            provider_http_timeout,
            cors_allowed_origins,
            drain,
        })
    }
}

/// Split a comma separated origin list. Each origin must be an http(s) URL
/// without a path; blank entries are ignored.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut origins = Vec::new();

    for origin in raw.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let rest = origin
            .strip_prefix("https://")
            .or_else(|| origin.strip_prefix("http://"))
            .ok_or_else(|| {
                ConfigError::InvalidCorsOrigin(format!(
                    "CORS_ALLOWED_ORIGINS entries must start with http:// or https://, got '{}'",
                    origin
                ))
            })?;

        if rest.is_empty() || rest.contains('/') || !origin.is_ascii() {
            return Err(ConfigError::InvalidCorsOrigin(format!(
                "CORS_ALLOWED_ORIGINS entries must be bare origins, got '{}'",
                origin
            )));
        }

        origins.push(origin.to_string());
    }

    if origins.is_empty() {
        return Err(ConfigError::InvalidCorsOrigin(
            "CORS_ALLOWED_ORIGINS must name at least one origin".to_string(),
        ));
    }

    Ok(origins)
}
