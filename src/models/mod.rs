//! Data models representing store records and API payloads.

/// Ledger account model
pub mod account;
/// API key authentication model
pub mod api_key;
/// Catalog product model
pub mod product;
/// Ledger entry model
pub mod transaction;
