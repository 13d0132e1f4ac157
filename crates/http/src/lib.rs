//! Rate-limited, authenticated HTTP transport for the integrations control plane.
//!
//! Every outbound call made by flowctl goes through [`transport::Transport`], which
//! throttles per API family, injects a bearer token and maps HTTP failures into a typed
//! error taxonomy.

/// Bearer token providers.
pub mod auth;
/// Transport configuration types.
pub mod config;
/// Token bucket rate limiter.
pub mod rate_limit;
/// Request execution.
pub mod transport;
