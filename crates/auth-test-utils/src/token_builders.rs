//! Builder patterns for test token claims
//!
//! Produces Keycloak-shaped access token payloads.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Client id the test services verify tokens for.
pub const TEST_CLIENT_ID: &str = "test-api-client";

/// Realm name used by the mock identity provider.
pub const TEST_REALM: &str = "test-realm";

/// Builder for access token claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new(&provider.issuer())
///     .for_user("user-42")
///     .with_roles(&["admin"])
///     .expires_in(300)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    iss: String,
    aud: Value,
    exp: i64,
    iat: i64,
    roles: Vec<String>,
    preferred_username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    removed: Vec<String>,
}

impl TestClaimsBuilder {
    /// Claims issued by `issuer` for [`TEST_CLIENT_ID`], valid for an hour
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: "user-42".to_string(),
            iss: issuer.to_string(),
            aud: json!(TEST_CLIENT_ID),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            roles: Vec::new(),
            preferred_username: None,
            email: None,
            name: None,
            removed: Vec::new(),
        }
    }

    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Single string audience
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = json!(audience);
        self
    }

    /// Array audience
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Realm roles (`realm_access.roles`)
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| (*r).to_string()).collect();
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.preferred_username = Some(username.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set expiration in seconds from now
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Expired an hour ago
    pub fn expired(self) -> Self {
        self.expires_in(-3600)
    }

    /// Drop a claim from the built payload
    pub fn without(mut self, claim: &str) -> Self {
        self.removed.push(claim.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("typ".to_string(), json!("Bearer"));
        claims.insert("azp".to_string(), json!(TEST_CLIENT_ID));
        claims.insert(
            "realm_access".to_string(),
            json!({ "roles": self.roles }),
        );
        if let Some(username) = self.preferred_username {
            claims.insert("preferred_username".to_string(), json!(username));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(name) = self.name {
            claims.insert("name".to_string(), json!(name));
        }
        for claim in &self.removed {
            claims.remove(claim);
        }
        Value::Object(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_keycloak_claims() {
        let claims = TestClaimsBuilder::new("http://idp/realms/test-realm")
            .for_user("alice")
            .with_roles(&["admin", "api_user"])
            .with_username("alice")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["iss"], "http://idp/realms/test-realm");
        assert_eq!(claims["aud"], TEST_CLIENT_ID);
        assert_eq!(claims["realm_access"]["roles"][1], "api_user");
        assert_eq!(claims["preferred_username"], "alice");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_builder_expired_and_without() {
        let claims = TestClaimsBuilder::new("http://idp/realms/test-realm")
            .expired()
            .without("aud")
            .build();

        assert!(claims["exp"].as_i64().unwrap() < Utc::now().timestamp());
        assert!(claims.get("aud").is_none());
    }
}
