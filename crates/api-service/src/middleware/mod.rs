//! Middleware for the API service.
//!
//! # Components
//!
//! - `auth` - Bearer authentication and role checks for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, require_role, AuthenticatedUser};
pub use http_metrics::http_metrics_middleware;
