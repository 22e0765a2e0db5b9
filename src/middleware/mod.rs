//! HTTP middleware components.
//!
//! Middleware run before route handlers. The only one here authenticates callers and
//! short-circuits unauthorized requests with 401.

/// API key authentication middleware
pub mod auth;
