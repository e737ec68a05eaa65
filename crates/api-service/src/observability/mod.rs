//! Observability for the API service.
//!
//! Provides the Prometheus recorder and HTTP request metrics. Token
//! verification and key set refresh metrics are emitted by `auth_core`
//! into the same recorder.

pub mod metrics;
