//! Bearer token verification and OAuth2 client support for CareTwin services.
//!
//! Services delegate authentication to a Keycloak-style identity provider.
//! This crate verifies the provider's signed access tokens against its
//! published JSON Web Key Set and talks to its token endpoint.
//!
//! # Components
//!
//! ```text
//! request -> gate::AuthorizationGate -> jwt::JwtVerifier -> jwks::KeySetCache
//!                 |                          |
//!                 v                          v
//!           gate::RoleGate             claims::Claims
//! ```
//!
//! - `provider` - Realm endpoints (issuer, token, certs, userinfo)
//! - `jwks` - Cached signing keys with atomic replace on refresh
//! - `jwt` - Token verification (signature, audience, issuer, expiry)
//! - `claims` - Verified claim set
//! - `gate` - Bearer extraction and role checks, framework independent
//! - `token_client` - Client credentials, authorization code and refresh grants

#![warn(clippy::pedantic)]

pub mod claims;
pub mod gate;
pub mod jwks;
pub mod jwt;
pub mod metrics;
pub mod provider;
pub mod secret;
pub mod token_client;

pub use claims::{Audience, Claims, RealmAccess};
pub use gate::{AuthorizationGate, Rejection, RoleGate, UnauthenticatedReason};
pub use jwks::{FetchError, KeySetCache, KeySetError, SigningKey};
pub use jwt::{
    ClaimRejection, JwtVerifier, TokenVerifier, VerificationError, VerificationOutcome,
};
pub use provider::{ProviderConfig, ProviderConfigError};
pub use token_client::{TokenClient, TokenClientError, TokenResponse};
