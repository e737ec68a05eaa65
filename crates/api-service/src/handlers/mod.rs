//! HTTP request handlers.
//!
//! # Components
//!
//! - `health` - Service status and liveness (public)
//! - `profile` - Caller identity and role-gated greeting
//! - `models` - 3DGS model catalogue
//! - `metrics` - Prometheus scrape endpoint (public)

pub mod health;
pub mod metrics;
pub mod models;
pub mod profile;

pub use health::{health_check, root};
pub use metrics::metrics_handler;
pub use models::{create_model, get_model, list_models};
pub use profile::{admin_only, profile, protected};
