//! Verified access token claims.
//!
//! Contains the claims of a token that passed verification. Claims the
//! service does not model are kept verbatim in `extra`, so serializing a
//! `Claims` reproduces the token payload. `sub` and `email` are redacted in
//! Debug output to keep user identifiers out of logs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(value) => value == audience,
            Self::Multiple(values) => values.iter().any(|v| v == audience),
        }
    }
}

/// Realm-level role grants (`realm_access`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claims of a verified access token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    pub iss: String,

    pub aud: Audience,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Email address - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,

    /// Every other payload claim (`azp`, `scope`, `jti`, `resource_access`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("preferred_username", &self.preferred_username)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("name", &self.name)
            .field("roles", &self.roles())
            .finish_non_exhaustive()
    }
}

impl Claims {
    /// Realm roles in token order; empty when the token carries none.
    pub fn roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map_or(&[], |access| access.roles.as_slice())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    pub fn username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }
}
