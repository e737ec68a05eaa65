//! Signing key cache backed by the provider's JWKS endpoint.
//!
//! The JWKS (JSON Web Key Set) endpoint publishes the realm's public RSA keys.
//! [`KeySetCache`] fetches it, keeps the usable signing keys indexed by `kid`,
//! and refreshes when a token names a key it has not seen.
//!
//! # Concurrency
//!
//! The cached keys live in an immutable [`KeySnapshot`] behind an `Arc`.
//! Readers clone the `Arc` and drop the lock right away; a refresh builds a
//! complete new snapshot and swaps it in with a single assignment, so readers
//! see either the old key set or the new one, never a mix. Refreshes are
//! serialized and counted; a caller that queued behind a refresh attempt
//! reuses its outcome (success or failure) instead of fetching again.
//!
//! # Failure
//!
//! A failed fetch never clears the cache. Keys that were already known keep
//! verifying during a provider outage: a lookup of a cached key whose
//! snapshot has expired never waits on another caller's refresh, and after a
//! failed refresh it serves the stale key until the failure backoff passes.

use crate::metrics::record_jwks_refresh;
use crate::provider::{build_http_client, ProviderConfig};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default maximum snapshot age (5 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Default wait before an expired snapshot is refreshed again after a
/// failed refresh.
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(10);

/// Errors fetching or parsing the key set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("JWKS request failed: {0}")]
    Http(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("Invalid JWKS document: {0}")]
    InvalidKeySet(String),
}

/// Errors resolving a key by id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySetError {
    /// The key is not in the provider's current key set.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// The key was not cached and the key set could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// JSON Web Key as published by the provider.
///
/// Only the RSA members are modelled; certificate chains and thumbprints
/// (`x5c`, `x5t`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for usable keys).
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Why a published key cannot be used to verify tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnsupportedKey {
    #[error("key has no kid")]
    MissingKeyId,

    #[error("key type {0} is not RSA")]
    NotRsa(String),

    #[error("key use {0} is not sig")]
    NotForSigning(String),

    #[error("algorithm {0} is not supported")]
    UnsupportedAlgorithm(String),

    #[error("key is missing modulus or exponent")]
    MissingComponents,

    #[error("invalid RSA components: {0}")]
    InvalidComponents(String),
}

/// A usable RSA verification key.
pub struct SigningKey {
    key_id: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm a token must declare to be verified with this key.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TryFrom<&Jwk> for SigningKey {
    type Error = UnsupportedKey;

    fn try_from(jwk: &Jwk) -> Result<Self, Self::Error> {
        let key_id = match jwk.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => return Err(UnsupportedKey::MissingKeyId),
        };

        if jwk.kty != "RSA" {
            return Err(UnsupportedKey::NotRsa(jwk.kty.clone()));
        }

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(UnsupportedKey::NotForSigning(key_use.to_string()));
            }
        }

        let algorithm = match jwk.alg.as_deref() {
            None => Algorithm::RS256,
            Some(alg) => match Algorithm::from_str(alg) {
                Ok(algorithm @ (Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512)) => {
                    algorithm
                }
                _ => return Err(UnsupportedKey::UnsupportedAlgorithm(alg.to_string())),
            },
        };

        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(UnsupportedKey::MissingComponents);
        };

        let decoding_key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| UnsupportedKey::InvalidComponents(e.to_string()))?;

        Ok(Self {
            key_id,
            algorithm,
            decoding_key,
        })
    }
}

/// An immutable view of the key set at one point in time.
#[derive(Debug, Default)]
pub struct KeySnapshot {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
}

impl KeySnapshot {
    fn is_older_than(&self, max_age: Option<Duration>) -> bool {
        match (max_age, self.fetched_at) {
            (Some(max_age), Some(fetched_at)) => fetched_at.elapsed() >= max_age,
            _ => false,
        }
    }
}

/// Outcome of the latest refresh attempt. Guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_failure: Option<(Instant, FetchError)>,
}

impl RefreshState {
    fn failed_within(&self, window: Duration) -> bool {
        self.last_failure
            .as_ref()
            .is_some_and(|(at, _)| at.elapsed() < window)
    }
}

/// Cache of the provider's signing keys.
///
/// Starts empty; the first lookup (or an explicit [`KeySetCache::refresh`])
/// populates it. Each refresh replaces the whole key set, so keys the provider
/// has rotated out stop verifying after the next refresh.
pub struct KeySetCache {
    certs_url: String,
    http_client: reqwest::Client,
    snapshot: RwLock<Arc<KeySnapshot>>,
    refresh_lock: Mutex<RefreshState>,
    /// Completed refresh attempts, successful or not.
    attempts: AtomicU64,
    max_age: Option<Duration>,
    failure_backoff: Duration,
}

impl KeySetCache {
    /// Create an empty cache for a JWKS URL.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn new(certs_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http_client =
            build_http_client(timeout).map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            certs_url: certs_url.into(),
            http_client,
            snapshot: RwLock::new(Arc::new(KeySnapshot::default())),
            refresh_lock: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
            max_age: Some(DEFAULT_MAX_AGE),
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
        })
    }

    /// Create an empty cache for the realm's certs endpoint.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be built.
    pub fn from_provider(provider: &ProviderConfig, timeout: Duration) -> Result<Self, FetchError> {
        Self::new(provider.certs_endpoint(), timeout)
    }

    /// Set the maximum snapshot age. `None` keeps keys until a miss.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set how long an expired snapshot keeps serving after a failed refresh
    /// before the next refresh is tried.
    #[must_use]
    pub fn with_failure_backoff(mut self, failure_backoff: Duration) -> Self {
        self.failure_backoff = failure_backoff;
        self
    }

    pub fn certs_url(&self) -> &str {
        &self.certs_url
    }

    /// Look up a signing key by id.
    ///
    /// A fresh cache hit makes no network call. A miss refreshes once (or
    /// reuses the outcome of a refresh that ran while it waited) and looks
    /// again. A hit in an expired snapshot refreshes only if no other
    /// refresh is running and none failed recently; otherwise, or if the
    /// refresh fails, the cached key is served.
    ///
    /// # Errors
    ///
    /// - `KeySetError::UnknownKey` if the refreshed key set lacks `kid`
    /// - `KeySetError::Fetch` if the key is not cached and the refresh failed
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn get(&self, kid: &str) -> Result<Arc<SigningKey>, KeySetError> {
        let seen_attempt = self.attempts.load(Ordering::Acquire);
        let snapshot = self.current().await;

        match snapshot.keys.get(kid) {
            Some(key) if !snapshot.is_older_than(self.max_age) => {
                tracing::trace!(target: "auth.jwks", "JWKS cache hit");
                Ok(Arc::clone(key))
            }
            Some(key) => {
                tracing::debug!(target: "auth.jwks", "JWKS snapshot expired");
                self.refresh_expired(kid, Arc::clone(key), seen_attempt)
                    .await
            }
            None => {
                tracing::debug!(target: "auth.jwks", "Key not in JWKS cache, refreshing");
                let refreshed = self.refresh_after(seen_attempt).await?;
                refreshed.keys.get(kid).cloned().ok_or_else(|| {
                    tracing::warn!(target: "auth.jwks", "Key not found in JWKS after refresh");
                    KeySetError::UnknownKey(kid.to_string())
                })
            }
        }
    }

    /// Fetch the key set and replace the cache.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the endpoint is unreachable, answers non-2xx
    /// or serves an invalid document. The cache is left unchanged.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let mut state = self.refresh_lock.lock().await;
        self.fetch_and_swap(&mut state).await.map(|_| ())
    }

    /// Sorted ids of the currently cached keys.
    pub async fn key_ids(&self) -> Vec<String> {
        let snapshot = self.current().await;
        let mut ids: Vec<String> = snapshot.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// When the cached key set was last fetched, if ever.
    pub async fn last_refreshed(&self) -> Option<Instant> {
        self.current().await.fetched_at
    }

    async fn current(&self) -> Arc<KeySnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Refresh unless another caller attempted one since `seen_attempt`,
    /// in which case that attempt's outcome is returned.
    async fn refresh_after(&self, seen_attempt: u64) -> Result<Arc<KeySnapshot>, FetchError> {
        let mut state = self.refresh_lock.lock().await;

        if self.attempts.load(Ordering::Acquire) != seen_attempt {
            tracing::debug!(target: "auth.jwks", "Reusing concurrent JWKS refresh");
            return match &state.last_failure {
                Some((_, e)) => Err(e.clone()),
                None => Ok(self.current().await),
            };
        }

        self.fetch_and_swap(&mut state).await
    }

    /// Refresh an expired snapshot on behalf of a caller that already holds
    /// a cached `stale` key. Never waits for the refresh lock.
    async fn refresh_expired(
        &self,
        kid: &str,
        stale: Arc<SigningKey>,
        seen_attempt: u64,
    ) -> Result<Arc<SigningKey>, KeySetError> {
        let Ok(mut state) = self.refresh_lock.try_lock() else {
            tracing::debug!(target: "auth.jwks", "JWKS refresh in progress, serving stale key");
            return Ok(stale);
        };

        if state.failed_within(self.failure_backoff) {
            tracing::debug!(target: "auth.jwks", "JWKS refresh failed recently, serving stale key");
            return Ok(stale);
        }

        let refreshed = if self.attempts.load(Ordering::Acquire) != seen_attempt {
            Ok(self.current().await)
        } else {
            self.fetch_and_swap(&mut state).await
        };

        match refreshed {
            Ok(refreshed) => refreshed.keys.get(kid).cloned().ok_or_else(|| {
                tracing::warn!(target: "auth.jwks", "Key not found in JWKS after refresh");
                KeySetError::UnknownKey(kid.to_string())
            }),
            Err(e) => {
                tracing::warn!(
                    target: "auth.jwks",
                    error = %e,
                    "JWKS refresh failed, serving stale key"
                );
                Ok(stale)
            }
        }
    }

    /// Caller must hold `refresh_lock`; `state` is its guarded value.
    async fn fetch_and_swap(
        &self,
        state: &mut RefreshState,
    ) -> Result<Arc<KeySnapshot>, FetchError> {
        let start = Instant::now();
        let result = self.fetch().await;
        let status = if result.is_ok() { "success" } else { "error" };
        record_jwks_refresh(status, start.elapsed());

        let keys = match result {
            Ok(keys) => keys,
            Err(e) => {
                state.last_failure = Some((Instant::now(), e.clone()));
                self.attempts.fetch_add(1, Ordering::AcqRel);
                return Err(e);
            }
        };
        let key_count = keys.len();

        let next = Arc::new(KeySnapshot {
            keys,
            fetched_at: Some(Instant::now()),
        });
        *self.snapshot.write().await = Arc::clone(&next);
        state.last_failure = None;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        tracing::info!(target: "auth.jwks", key_count, "JWKS cache refreshed");
        Ok(next)
    }

    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<HashMap<String, Arc<SigningKey>>, FetchError> {
        tracing::debug!(target: "auth.jwks", url = %self.certs_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.certs_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "auth.jwks", error = %e, "Failed to fetch JWKS");
                FetchError::Http(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(target: "auth.jwks", status = %status, "JWKS endpoint returned error");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "auth.jwks", error = %e, "Failed to read JWKS response");
            FetchError::Http(e.to_string())
        })?;

        let jwks: JwksResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(target: "auth.jwks", error = %e, "Failed to parse JWKS response");
            FetchError::InvalidKeySet(e.to_string())
        })?;

        Ok(index_signing_keys(&jwks))
    }
}

/// Keep the usable signing keys, skipping the rest.
fn index_signing_keys(jwks: &JwksResponse) -> HashMap<String, Arc<SigningKey>> {
    let mut keys = HashMap::with_capacity(jwks.keys.len());
    for jwk in &jwks.keys {
        match SigningKey::try_from(jwk) {
            Ok(key) => {
                keys.insert(key.key_id.clone(), Arc::new(key));
            }
            Err(reason) => {
                tracing::debug!(
                    target: "auth.jwks",
                    kid = ?jwk.kid,
                    reason = %reason,
                    "Skipping JWKS entry"
                );
            }
        }
    }
    keys
}
