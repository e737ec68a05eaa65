//! # Auth Test Utilities
//!
//! Shared test utilities for the auth crates.
//!
//! This crate provides:
//! - Fixed RSA key fixtures with matching JWK components
//! - Claim builders producing Keycloak-shaped payloads
//! - A wiremock-backed mock identity provider
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let provider = MockIdentityProvider::start().await;
//!     let key = TestKeyPair::new("k1", &RSA_KEY_1);
//!     provider.mount_jwks(&[&key]).await;
//!
//!     let token = key.sign(
//!         &TestClaimsBuilder::new(&provider.issuer())
//!             .with_roles(&["admin"])
//!             .build(),
//!     );
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_provider;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_provider::*;
pub use token_builders::*;
