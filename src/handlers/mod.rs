//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, auth context)
//! 2. Calls exactly one service operation
//! 3. Returns HTTP response (JSON, status code)

/// Account management endpoints
pub mod accounts;
/// Health check endpoint
pub mod health;
/// Product catalog endpoints
pub mod products;
/// Purchase endpoint
pub mod purchases;
/// Deposit, transfer and history endpoints
pub mod transactions;
