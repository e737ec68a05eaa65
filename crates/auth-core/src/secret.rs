//! Secret wrappers for client secrets and issued tokens.
//!
//! Re-exports [`secrecy`] so that every crate in the workspace holds
//! credentials the same way. `SecretString` redacts itself in `Debug`
//! output and zeroizes on drop; reading the value requires an explicit
//! `expose_secret()` call, which keeps accidental logging out of
//! `tracing` fields and `{:?}` formatting.
//!
//! Use `SecretString` for:
//! - the OAuth client secret
//! - access, refresh and ID tokens returned by the provider

pub use secrecy::{ExposeSecret, SecretString};
