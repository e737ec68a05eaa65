//! Access token verification.
//!
//! Verifies RSA-signed JWTs issued by the realm against keys from
//! [`KeySetCache`](crate::jwks::KeySetCache).
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - The header `alg` must match the algorithm of the key named by `kid`
//! - Audience, issuer and expiry are checked after the signature, so claims
//!   are never trusted before the signature is known to be good
//! - Callers get a typed reason for logs and metrics; responses stay generic

use crate::claims::{Audience, Claims};
use crate::jwks::{FetchError, KeySetCache, KeySetError, SigningKey};
use crate::metrics::record_token_verification;
use crate::provider::ProviderConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Maximum accepted token size in bytes (8KB).
///
/// Keycloak access tokens with a handful of roles are 1-2KB. Larger input is
/// rejected before any base64 decoding or signature work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Upper bound for the configurable expiry leeway (10 minutes).
pub const MAX_EXPIRY_LEEWAY: Duration = Duration::from_secs(600);

/// Why a claim check failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimRejection {
    #[error("audience does not include this client")]
    AudienceMismatch,

    #[error("issuer does not match the realm")]
    IssuerMismatch,

    #[error("token has expired")]
    Expired,

    #[error("required claim {0} is missing")]
    MissingClaim(&'static str),

    #[error("claim has an invalid value: {0}")]
    InvalidClaim(String),
}

/// Why a token failed verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed token")]
    MalformedToken,

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(FetchError),

    #[error("signature verification failed")]
    BadSignature,

    #[error("claim rejected: {0}")]
    ClaimRejected(#[from] ClaimRejection),
}

impl VerificationError {
    /// Bounded label for `auth_token_verifications_total`.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed",
            Self::MissingKeyId => "missing_kid",
            Self::UnknownKey(_) => "unknown_key",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
            Self::BadSignature => "bad_signature",
            Self::ClaimRejected(ClaimRejection::Expired) => "expired",
            Self::ClaimRejected(ClaimRejection::AudienceMismatch) => "audience_mismatch",
            Self::ClaimRejected(ClaimRejection::IssuerMismatch) => "issuer_mismatch",
            Self::ClaimRejected(_) => "invalid_claims",
        }
    }
}

impl From<KeySetError> for VerificationError {
    fn from(err: KeySetError) -> Self {
        match err {
            KeySetError::UnknownKey(kid) => Self::UnknownKey(kid),
            KeySetError::Fetch(e) => Self::KeySetUnavailable(e),
        }
    }
}

/// Result of verifying one token.
pub type VerificationOutcome = Result<Claims, VerificationError>;

/// Verifies bearer tokens.
///
/// The seam between request authorization and token cryptography; tests
/// substitute their own implementation.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> VerificationOutcome;
}

/// Verifies realm-issued JWTs using the cached JWKS.
pub struct JwtVerifier {
    key_set: Arc<KeySetCache>,
    audience: String,
    issuer: String,
    leeway: Duration,
}

impl JwtVerifier {
    /// # Arguments
    ///
    /// * `key_set` - Signing key cache for the realm
    /// * `audience` - Client id that must appear in `aud`
    /// * `issuer` - Realm URL that `iss` must equal exactly
    pub fn new(
        key_set: Arc<KeySetCache>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            key_set,
            audience: audience.into(),
            issuer: issuer.into(),
            leeway: Duration::ZERO,
        }
    }

    pub fn from_provider(key_set: Arc<KeySetCache>, provider: &ProviderConfig) -> Self {
        Self::new(key_set, provider.client_id(), provider.issuer())
    }

    /// Accept tokens up to `leeway` past `exp`, capped at [`MAX_EXPIRY_LEEWAY`].
    #[must_use]
    pub fn with_expiry_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway.min(MAX_EXPIRY_LEEWAY);
        self
    }

    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.key_set
    }

    async fn verify_at(&self, token: &str, now: i64) -> VerificationOutcome {
        let kid = extract_kid(token)?;
        let key = self.key_set.get(&kid).await?;
        let payload = verify_signature(token, &key)?;
        Ok(self.validate_claims(payload, now)?)
    }

    /// Check audience, issuer, expiry and subject of a signature-verified
    /// payload.
    fn validate_claims(&self, payload: Map<String, Value>, now: i64) -> Result<Claims, ClaimRejection> {
        let aud = payload
            .get("aud")
            .ok_or(ClaimRejection::MissingClaim("aud"))?;
        let aud: Audience = serde_json::from_value(aud.clone())
            .map_err(|_| ClaimRejection::InvalidClaim("aud".to_string()))?;
        if !aud.contains(&self.audience) {
            return Err(ClaimRejection::AudienceMismatch);
        }

        let iss = payload
            .get("iss")
            .ok_or(ClaimRejection::MissingClaim("iss"))?;
        if iss.as_str() != Some(self.issuer.as_str()) {
            return Err(ClaimRejection::IssuerMismatch);
        }

        let exp = payload
            .get("exp")
            .ok_or(ClaimRejection::MissingClaim("exp"))?
            .as_i64()
            .ok_or_else(|| ClaimRejection::InvalidClaim("exp".to_string()))?;
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if exp.saturating_add(leeway) <= now {
            return Err(ClaimRejection::Expired);
        }

        match payload.get("sub") {
            None => return Err(ClaimRejection::MissingClaim("sub")),
            Some(Value::String(_)) => {}
            Some(_) => return Err(ClaimRejection::InvalidClaim("sub".to_string())),
        }

        serde_json::from_value(Value::Object(payload))
            .map_err(|e| ClaimRejection::InvalidClaim(e.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    /// Verify a token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size check and structural parse, no key lookup for junk input
    /// 2. Extract `kid` and resolve the key (at most one JWKS refresh)
    /// 3. Verify the signature with the key's algorithm
    /// 4. Validate `aud`, `iss`, `exp` and `sub`
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> VerificationOutcome {
        let now = chrono::Utc::now().timestamp();
        let outcome = self.verify_at(token, now).await;

        match &outcome {
            Ok(_) => {
                record_token_verification("valid");
                tracing::debug!(target: "auth.jwt", "Token verified");
            }
            Err(e) => {
                record_token_verification(e.metric_label());
                tracing::debug!(target: "auth.jwt", error = %e, "Token verification failed");
            }
        }

        outcome
    }
}

/// Extract the key id from a token header without verifying anything.
///
/// Also checks that the token has three non-empty segments and that the
/// payload decodes to a JSON object, so malformed input never reaches the
/// key cache.
///
/// # Errors
///
/// - `MalformedToken` for oversized or structurally invalid tokens
/// - `MissingKeyId` if the header has no non-empty string `kid`
pub fn extract_kid(token: &str) -> Result<String, VerificationError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "auth.jwt",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum"
        );
        return Err(VerificationError::MalformedToken);
    }

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VerificationError::MalformedToken);
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(VerificationError::MalformedToken);
    }

    let header = decode_segment(header)?;
    if !decode_segment(payload)?.is_object() {
        return Err(VerificationError::MalformedToken);
    }

    match header.get("kid") {
        Some(Value::String(kid)) if !kid.is_empty() => Ok(kid.clone()),
        _ => Err(VerificationError::MissingKeyId),
    }
}

fn decode_segment(segment: &str) -> Result<Value, VerificationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VerificationError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| VerificationError::MalformedToken)
}

/// Verify the signature and return the raw payload.
fn verify_signature(token: &str, key: &SigningKey) -> Result<Map<String, Value>, VerificationError> {
    let mut validation = Validation::new(key.algorithm());
    // Claims are checked by `validate_claims` with typed rejections.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Map<String, Value>>(token, key.decoding_key(), &validation).map_err(|e| {
        tracing::debug!(target: "auth.jwt", error = %e, "Token signature check failed");
        match e.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_) => VerificationError::BadSignature,
            _ => VerificationError::MalformedToken,
        }
    })?;

    Ok(data.claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_800_000_000;
    const ISSUER: &str = "http://localhost:8080/realms/caretwin";

    fn verifier() -> JwtVerifier {
        let key_set =
            KeySetCache::new("http://127.0.0.1:1/certs", Duration::from_secs(1)).unwrap();
        JwtVerifier::new(Arc::new(key_set), "3dgs-api-service", ISSUER)
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("payload must be an object")
    }

    fn valid_payload() -> Value {
        json!({
            "sub": "user-42",
            "iss": ISSUER,
            "aud": ["3dgs-api-service", "account"],
            "exp": NOW + 300,
            "iat": NOW,
            "realm_access": {"roles": ["admin"]}
        })
    }

    fn token_with_header(header: &str) -> String {
        format!(
            "{}.{}.c2ln",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(r#"{"sub":"user-42"}"#)
        )
    }

    #[test]
    fn test_extract_kid_valid_token() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"k1"}"#);
        assert_eq!(extract_kid(&token).unwrap(), "k1");
    }

    #[test]
    fn test_extract_kid_missing_or_empty_kid() {
        for header in [
            r#"{"alg":"RS256","typ":"JWT"}"#,
            r#"{"alg":"RS256","kid":""}"#,
            r#"{"alg":"RS256","kid":42}"#,
        ] {
            assert_eq!(
                extract_kid(&token_with_header(header)),
                Err(VerificationError::MissingKeyId),
                "header: {header}"
            );
        }
    }

    #[test]
    fn test_extract_kid_malformed_token() {
        for token in ["", "single", "only.two", "a.b.c.d", "..", "a..c"] {
            assert_eq!(
                extract_kid(token),
                Err(VerificationError::MalformedToken),
                "token: {token:?}"
            );
        }
    }

    #[test]
    fn test_extract_kid_invalid_segments() {
        assert_eq!(
            extract_kid("!!!invalid!!!.payload.signature"),
            Err(VerificationError::MalformedToken)
        );

        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"k1"}"#);
        let not_json = URL_SAFE_NO_PAD.encode("not valid json");
        assert_eq!(
            extract_kid(&format!("{header}.{not_json}.sig")),
            Err(VerificationError::MalformedToken)
        );

        let array = URL_SAFE_NO_PAD.encode("[1,2]");
        assert_eq!(
            extract_kid(&format!("{header}.{array}.sig")),
            Err(VerificationError::MalformedToken)
        );
    }

    #[test]
    fn test_extract_kid_rejects_oversized_token() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"k1"}"#);
        let padding = "a".repeat(MAX_TOKEN_SIZE_BYTES);
        let token = format!("{header}.{padding}.sig");

        assert_eq!(extract_kid(&token), Err(VerificationError::MalformedToken));
    }

    #[test]
    fn test_validate_claims_accepts_valid_payload() {
        let claims = verifier()
            .validate_claims(payload(valid_payload()), NOW)
            .unwrap();

        assert_eq!(claims.sub, "user-42");
        assert!(claims.has_role("admin"));
    }

    #[test]
    fn test_validate_claims_single_audience() {
        let mut value = valid_payload();
        value["aud"] = json!("3dgs-api-service");
        assert!(verifier().validate_claims(payload(value), NOW).is_ok());
    }

    #[test]
    fn test_validate_claims_audience_mismatch() {
        let mut value = valid_payload();
        value["aud"] = json!(["account"]);
        assert_eq!(
            verifier().validate_claims(payload(value), NOW),
            Err(ClaimRejection::AudienceMismatch)
        );
    }

    #[test]
    fn test_validate_claims_issuer_must_match_exactly() {
        for iss in [
            json!("http://localhost:8080/realms/caretwin/"),
            json!("http://localhost:8080/realms/other"),
            json!(42),
        ] {
            let mut value = valid_payload();
            value["iss"] = iss;
            assert_eq!(
                verifier().validate_claims(payload(value), NOW),
                Err(ClaimRejection::IssuerMismatch)
            );
        }
    }

    #[test]
    fn test_validate_claims_expiry_is_strict() {
        let mut value = valid_payload();
        value["exp"] = json!(NOW);
        assert_eq!(
            verifier().validate_claims(payload(value.clone()), NOW),
            Err(ClaimRejection::Expired)
        );

        value["exp"] = json!(NOW + 1);
        assert!(verifier().validate_claims(payload(value), NOW).is_ok());
    }

    #[test]
    fn test_validate_claims_expiry_leeway() {
        let verifier = verifier().with_expiry_leeway(Duration::from_secs(30));
        let mut value = valid_payload();

        value["exp"] = json!(NOW - 29);
        assert!(verifier.validate_claims(payload(value.clone()), NOW).is_ok());

        value["exp"] = json!(NOW - 30);
        assert_eq!(
            verifier.validate_claims(payload(value), NOW),
            Err(ClaimRejection::Expired)
        );
    }

    #[test]
    fn test_expiry_leeway_is_capped() {
        let verifier = verifier().with_expiry_leeway(Duration::from_secs(86_400));
        assert_eq!(verifier.leeway, MAX_EXPIRY_LEEWAY);
    }

    #[test]
    fn test_validate_claims_missing_required_claims() {
        for claim in ["aud", "iss", "exp", "sub"] {
            let mut value = payload(valid_payload());
            value.remove(claim);
            assert_eq!(
                verifier().validate_claims(value, NOW),
                Err(ClaimRejection::MissingClaim(claim)),
                "claim: {claim}"
            );
        }
    }

    #[test]
    fn test_validate_claims_wrong_types() {
        let mut value = valid_payload();
        value["exp"] = json!("tomorrow");
        assert_eq!(
            verifier().validate_claims(payload(value), NOW),
            Err(ClaimRejection::InvalidClaim("exp".to_string()))
        );

        let mut value = valid_payload();
        value["email"] = json!(7);
        assert!(matches!(
            verifier().validate_claims(payload(value), NOW),
            Err(ClaimRejection::InvalidClaim(_))
        ));
    }

    #[test]
    fn test_metric_labels_are_bounded() {
        assert_eq!(VerificationError::MalformedToken.metric_label(), "malformed");
        assert_eq!(
            VerificationError::UnknownKey("k9".to_string()).metric_label(),
            "unknown_key"
        );
        assert_eq!(
            VerificationError::ClaimRejected(ClaimRejection::MissingClaim("sub")).metric_label(),
            "invalid_claims"
        );
    }
}
