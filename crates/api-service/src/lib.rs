//! CareTwin 3DGS API Service library.
//!
//! An HTTP API whose routes are protected by bearer tokens issued by the
//! CareTwin Keycloak realm. Exposed as a library so integration tests can
//! build the router against a mock identity provider.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication, role checks and HTTP metrics
//! - `models` - Request and response types
//! - `observability` - Prometheus recorder and metric helpers
//! - `routes` - Router and application state

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
